//! GBST waste-segregation analytics: sheet ingestion, per-tab metrics,
//! non-conformance fraud heuristics and feedback correlation.

pub mod config;
pub mod dashboard;
pub mod dates;
pub mod filters;
pub mod fraud;
pub mod geo;
pub mod ketidaksesuaian;
pub mod korelasi;
pub mod logging;
pub mod metrics;
pub mod program;
pub mod sheets;
pub mod stats;
pub mod survey;
pub mod timbulan;
