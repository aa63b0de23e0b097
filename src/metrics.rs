//! Aggregation helpers shared by the dashboard tabs.

use serde::Serialize;
use std::collections::BTreeMap;

/// One bar / slice: label and value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub value: f64,
}

/// One stacked-bar cell: row label, series label, value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub x: String,
    pub series: String,
    pub value: f64,
}

/// Sums `value` per key, keys in sorted order. Missing values count as 0.
pub fn sum_by<T, K, FK, FV>(items: &[T], key: FK, value: FV) -> BTreeMap<K, f64>
where
    K: Ord,
    FK: Fn(&T) -> K,
    FV: Fn(&T) -> Option<f64>,
{
    let mut out = BTreeMap::new();
    for item in items {
        *out.entry(key(item)).or_insert(0.0) += value(item).unwrap_or(0.0);
    }
    out
}

pub fn count_by<T, K, FK>(items: &[T], key: FK) -> BTreeMap<K, usize>
where
    K: Ord,
    FK: Fn(&T) -> K,
{
    let mut out = BTreeMap::new();
    for item in items {
        *out.entry(key(item)).or_insert(0) += 1;
    }
    out
}

pub fn buckets(map: BTreeMap<String, f64>) -> Vec<Bucket> {
    map.into_iter().map(|(label, value)| Bucket { label, value }).collect()
}

/// Counts sorted descending (ties by label), like a value_counts table.
pub fn value_counts<'a>(values: impl Iterator<Item = &'a str>) -> Vec<Bucket> {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    for v in values {
        *counts.entry(v.to_string()).or_insert(0.0) += 1.0;
    }
    let mut out = buckets(counts);
    out.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    out
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1).
pub fn std_sample(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (n as f64 - 1.0)).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_sorted(&v, 0.5)
}

/// Linear-interpolated quantile of an ascending slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Most frequent value; smallest wins ties.
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < v.len() {
        let mut j = i;
        while j < v.len() && v[j] == v[i] {
            j += 1;
        }
        let run = j - i;
        if best.map_or(true, |(_, c)| run > c) {
            best = Some((v[i], run));
        }
        i = j;
    }
    best.map(|(val, _)| val)
}

/// `part / total * 100`, 0 when total is not positive.
pub fn pct(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

pub fn clamp_pct(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 100.0)
    }
}

/// Rescales values to `[lo, hi]`; a constant column maps to `lo`.
pub fn min_max_scale(values: &[f64], lo: f64, hi: f64) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    values
        .iter()
        .map(|v| {
            if range > 0.0 {
                lo + (v - min) / range * (hi - lo)
            } else {
                lo
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantiles_interpolate_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&v, 0.25), Some(1.75));
        assert_eq!(quantile_sorted(&v, 0.75), Some(3.25));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(quantile_sorted(&[], 0.5), None);
    }

    #[test]
    fn std_and_mode() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_sample(&v).unwrap() - 2.13809).abs() < 1e-4);
        assert_eq!(mode(&v), Some(4.0));
        assert_eq!(mode(&[3.0, 1.0]), Some(1.0));
        assert_eq!(std_sample(&[1.0]), None);
    }

    #[test]
    fn pct_guards_zero_and_clamps() {
        assert_eq!(pct(5.0, 0.0), 0.0);
        assert_eq!(pct(1.0, 4.0), 25.0);
        assert_eq!(clamp_pct(-12.0), 0.0);
        assert_eq!(clamp_pct(140.0), 100.0);
        assert_eq!(clamp_pct(f64::NAN), 0.0);
    }

    #[test]
    fn min_max_scale_to_zero_five() {
        assert_eq!(min_max_scale(&[0.0, 5.0, 10.0], 0.0, 5.0), vec![0.0, 2.5, 5.0]);
        assert_eq!(min_max_scale(&[3.0, 3.0], 0.0, 5.0), vec![0.0, 0.0]);
    }

    #[test]
    fn value_counts_sorted_desc() {
        let vc = value_counts(["b", "a", "b", "c"].into_iter());
        assert_eq!(vc[0], Bucket { label: "b".into(), value: 2.0 });
        assert_eq!(vc[1].label, "a");
    }
}
