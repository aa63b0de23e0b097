use serde::Serialize;

use super::normality::{self, NormalityVerdict};
use super::special::{norm_cdf, norm_ppf, student_t_two_sided};
use crate::logging::log_correlation;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Method {
    Pearson,
    Spearman,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Pearson => "pearson",
            Method::Spearman => "spearman",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub method: Method,
    pub r: f64,
    /// `None` below three pairs.
    pub p_value: Option<f64>,
    pub n: usize,
}

/// Pearson r; `None` for fewer than two pairs or a constant variable.
pub fn pearson_r(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = metrics::mean(x)?;
    let my = metrics::mean(y)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// 1-based ranks, ties get the average of their positions.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < idx.len() {
        let mut j = i;
        while j + 1 < idx.len() && values[idx[j + 1]] == values[idx[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[idx[k]] = avg;
        }
        i = j + 1;
    }
    ranks
}

fn t_test_p(r: f64, n: usize) -> Option<f64> {
    if n < 3 {
        return None;
    }
    let df = (n - 2) as f64;
    if (1.0 - r * r) <= 0.0 {
        return Some(0.0);
    }
    let t = r * (df / (1.0 - r * r)).sqrt();
    Some(student_t_two_sided(t, df))
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<Correlation> {
    let r = pearson_r(x, y)?;
    let n = x.len().min(y.len());
    Some(Correlation { method: Method::Pearson, r, p_value: t_test_p(r, n), n })
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<Correlation> {
    let n = x.len().min(y.len());
    let r = pearson_r(&average_ranks(&x[..n]), &average_ranks(&y[..n]))?;
    Some(Correlation { method: Method::Spearman, r, p_value: t_test_p(r, n), n })
}

pub fn correlate(method: Method, x: &[f64], y: &[f64]) -> Option<Correlation> {
    match method {
        Method::Pearson => pearson(x, y),
        Method::Spearman => spearman(x, y),
    }
}

/// Pearson when every variable is judged normal, Spearman otherwise.
pub fn choose_method(verdicts: &[&NormalityVerdict]) -> Method {
    if !verdicts.is_empty() && verdicts.iter().all(|v| v.normal) {
        Method::Pearson
    } else {
        Method::Spearman
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairAnalysis {
    pub x_normality: NormalityVerdict,
    pub y_normality: NormalityVerdict,
    pub method: Method,
    pub correlation: Option<Correlation>,
}

/// Normality of both variables decides the method; the result is logged.
pub fn analyze_pair(x: &[f64], y: &[f64], alpha: f64) -> PairAnalysis {
    let x_normality = normality::assess(x, alpha);
    let y_normality = normality::assess(y, alpha);
    let method = choose_method(&[&x_normality, &y_normality]);
    let correlation = correlate(method, x, y);
    if let Some(c) = &correlation {
        log_correlation(method.as_str(), c.r, c.p_value.unwrap_or(f64::NAN), c.n);
    }
    PairAnalysis { x_normality, y_normality, method, correlation }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub labels: Vec<String>,
    pub method: Method,
    /// Row-major; `None` where a variable is constant.
    pub matrix: Vec<Vec<Option<f64>>>,
}

pub fn heatmap(columns: &[(&str, Vec<f64>)], method: Method) -> Heatmap {
    let matrix = columns
        .iter()
        .map(|(_, a)| {
            columns
                .iter()
                .map(|(_, b)| correlate(method, a, b).map(|c| c.r))
                .collect()
        })
        .collect();
    Heatmap { labels: columns.iter().map(|(l, _)| l.to_string()).collect(), method, matrix }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
}

fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().cloned().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v
}

/// Theoretical normal quantiles (Blom positions) against ordered values.
pub fn qq_points(values: &[f64]) -> Vec<PlotPoint> {
    let v = finite_sorted(values);
    let n = v.len() as f64;
    v.iter()
        .enumerate()
        .map(|(i, y)| PlotPoint { x: norm_ppf((i as f64 + 1.0 - 0.375) / (n + 0.25)), y: *y })
        .collect()
}

/// Empirical cumulative probability against the fitted normal cdf.
pub fn pp_points(values: &[f64]) -> Vec<PlotPoint> {
    let v = finite_sorted(values);
    let (Some(mean), Some(sd)) = (metrics::mean(&v), metrics::std_sample(&v)) else {
        return Vec::new();
    };
    if sd <= 0.0 {
        return Vec::new();
    }
    let n = v.len() as f64;
    v.iter()
        .enumerate()
        .map(|(i, y)| PlotPoint { x: (i as f64 + 0.5) / n, y: norm_cdf((y - mean) / sd) })
        .collect()
}
