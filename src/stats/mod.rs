//! Hand-rolled statistics for the feedback/non-conformance correlation:
//! normality tests, Pearson/Spearman with p-values and chart helpers.

pub mod correlation;
pub mod normality;
pub mod special;

pub use correlation::{analyze_pair, heatmap, pp_points, qq_points, Correlation, Heatmap, Method, PairAnalysis, PlotPoint};
pub use normality::{NormalityTest, NormalityVerdict};
