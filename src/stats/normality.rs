//! Normality tests against a fitted normal distribution.

use serde::Serialize;

use super::special::{kolmogorov_sf, norm_cdf, norm_ppf};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NormalityTest {
    KolmogorovSmirnov,
    Lilliefors,
    ShapiroWilk,
    DAgostinoK2,
}

impl NormalityTest {
    pub const ALL: [NormalityTest; 4] = [
        NormalityTest::KolmogorovSmirnov,
        NormalityTest::Lilliefors,
        NormalityTest::ShapiroWilk,
        NormalityTest::DAgostinoK2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NormalityTest::KolmogorovSmirnov => "Kolmogorov-Smirnov",
            NormalityTest::Lilliefors => "Lilliefors",
            NormalityTest::ShapiroWilk => "Shapiro-Wilk",
            NormalityTest::DAgostinoK2 => "D'Agostino K2",
        }
    }

    /// Smallest sample the test is defined for.
    pub fn min_n(&self) -> usize {
        match self {
            NormalityTest::KolmogorovSmirnov | NormalityTest::Lilliefors => 4,
            NormalityTest::ShapiroWilk => 3,
            NormalityTest::DAgostinoK2 => 8,
        }
    }

    pub fn run(&self, values: &[f64]) -> Option<TestOutcome> {
        let (statistic, p_value) = match self {
            NormalityTest::KolmogorovSmirnov => kolmogorov_smirnov(values)?,
            NormalityTest::Lilliefors => lilliefors(values)?,
            NormalityTest::ShapiroWilk => shapiro_wilk(values)?,
            NormalityTest::DAgostinoK2 => dagostino_k2(values)?,
        };
        Some(TestOutcome { test: *self, statistic, p_value })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub test: NormalityTest,
    pub statistic: f64,
    pub p_value: f64,
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().cloned().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v
}

/// Largest gap between the empirical cdf and N(mean, sd).
fn ks_distance(sorted: &[f64]) -> Option<f64> {
    let mean = metrics::mean(sorted)?;
    let sd = metrics::std_sample(sorted)?;
    if sd <= 0.0 {
        return None;
    }
    let n = sorted.len() as f64;
    let d = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| {
            let f = norm_cdf((x - mean) / sd);
            let i = i as f64;
            ((i + 1.0) / n - f).max(f - i / n)
        })
        .fold(0.0, f64::max);
    Some(d)
}

/// KS against the fitted normal with the asymptotic Kolmogorov p-value.
pub fn kolmogorov_smirnov(values: &[f64]) -> Option<(f64, f64)> {
    let x = sorted(values);
    if x.len() < NormalityTest::KolmogorovSmirnov.min_n() {
        return None;
    }
    let d = ks_distance(&x)?;
    let sn = (x.len() as f64).sqrt();
    let p = kolmogorov_sf((sn + 0.12 + 0.11 / sn) * d);
    Some((d, p))
}

/// Same distance, Dallal-Wilkinson p-value for estimated parameters.
/// The approximation is accurate below 0.1; larger values are capped at 1.
pub fn lilliefors(values: &[f64]) -> Option<(f64, f64)> {
    let x = sorted(values);
    if x.len() < NormalityTest::Lilliefors.min_n() {
        return None;
    }
    let d = ks_distance(&x)?;
    let (mut dd, mut n) = (d, x.len() as f64);
    if n > 100.0 {
        dd *= (n / 100.0).powf(0.49);
        n = 100.0;
    }
    let p = (-7.01256 * dd * dd * (n + 2.78019) + 2.99587 * dd * (n + 2.78019).sqrt() - 0.122119
        + 0.974598 / n.sqrt()
        + 1.67997 / n)
        .exp();
    Some((d, p.clamp(0.0, 1.0)))
}

fn poly(coef: &[f64], x: f64) -> f64 {
    coef.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Shapiro-Wilk W with Royston's coefficients and p-value, `3 <= n <= 5000`.
pub fn shapiro_wilk(values: &[f64]) -> Option<(f64, f64)> {
    let x = sorted(values);
    let n = x.len();
    if !(3..=5000).contains(&n) {
        return None;
    }
    let mean = metrics::mean(&x)?;
    let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
    if ss <= 0.0 {
        return None;
    }
    let nf = n as f64;

    let a: Vec<f64> = if n == 3 {
        let h = 0.5f64.sqrt();
        vec![-h, 0.0, h]
    } else {
        let m: Vec<f64> = (1..=n).map(|i| norm_ppf((i as f64 - 0.375) / (nf + 0.25))).collect();
        let mm: f64 = m.iter().map(|v| v * v).sum();
        let u = 1.0 / nf.sqrt();
        let an = m[n - 1] / mm.sqrt() + poly(&[0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056], u);
        let mut a = vec![0.0; n];
        if n > 5 {
            let an1 =
                m[n - 2] / mm.sqrt() + poly(&[0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633], u);
            let phi = (mm - 2.0 * m[n - 1].powi(2) - 2.0 * m[n - 2].powi(2))
                / (1.0 - 2.0 * an * an - 2.0 * an1 * an1);
            for i in 2..n - 2 {
                a[i] = m[i] / phi.sqrt();
            }
            a[1] = -an1;
            a[n - 2] = an1;
        } else {
            let phi = (mm - 2.0 * m[n - 1].powi(2)) / (1.0 - 2.0 * an * an);
            for i in 1..n - 1 {
                a[i] = m[i] / phi.sqrt();
            }
        }
        a[0] = -an;
        a[n - 1] = an;
        a
    };

    let num: f64 = a.iter().zip(&x).map(|(ai, xi)| ai * xi).sum();
    let w = (num * num / ss).min(1.0);

    let p = if n == 3 {
        let p = 6.0 / std::f64::consts::PI * (w.sqrt().asin() - 0.75f64.sqrt().asin());
        p.clamp(0.0, 1.0)
    } else if n <= 11 {
        let gamma = poly(&[-2.273, 0.459], nf);
        let mu = poly(&[0.5440, -0.39978, 0.025054, -0.0006714], nf);
        let sigma = poly(&[1.3822, -0.77857, 0.062767, -0.0020322], nf).exp();
        let y = (1.0 - w).ln();
        if y >= gamma {
            0.0
        } else {
            let z = (-(gamma - y).ln() - mu) / sigma;
            1.0 - norm_cdf(z)
        }
    } else {
        let ln_n = nf.ln();
        let mu = poly(&[-1.5861, -0.31082, -0.083751, 0.0038915], ln_n);
        let sigma = poly(&[-0.4803, -0.082676, 0.0030302], ln_n).exp();
        let z = ((1.0 - w).ln() - mu) / sigma;
        1.0 - norm_cdf(z)
    };
    Some((w, p))
}

fn central_moment(x: &[f64], mean: f64, k: i32) -> f64 {
    x.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / x.len() as f64
}

fn skew_z(n: f64, b1: f64) -> f64 {
    let y = b1 * ((n + 1.0) * (n + 3.0) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    let y = if y == 0.0 { 1.0 } else { y };
    delta * (y / alpha + ((y / alpha).powi(2) + 1.0).sqrt()).ln()
}

fn kurtosis_z(n: f64, b2: f64) -> f64 {
    let e = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0) * (n + 1.0) * (n + 3.0) * (n + 5.0));
    let x = (b2 - e) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * (6.0 * (n + 3.0) * (n + 5.0) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0 + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    (term1 - term2) / (2.0 / (9.0 * a)).sqrt()
}

/// D'Agostino-Pearson omnibus K² = Z(skew)² + Z(kurtosis)², chi-square(2) tail.
pub fn dagostino_k2(values: &[f64]) -> Option<(f64, f64)> {
    let x = sorted(values);
    if x.len() < NormalityTest::DAgostinoK2.min_n() {
        return None;
    }
    let n = x.len() as f64;
    let mean = metrics::mean(&x)?;
    let m2 = central_moment(&x, mean, 2);
    if m2 <= 0.0 {
        return None;
    }
    let b1 = central_moment(&x, mean, 3) / m2.powf(1.5);
    let b2 = central_moment(&x, mean, 4) / (m2 * m2);
    let k2 = skew_z(n, b1).powi(2) + kurtosis_z(n, b2).powi(2);
    if !k2.is_finite() {
        return None;
    }
    Some((k2, (-k2 / 2.0).exp()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityVerdict {
    pub n: usize,
    pub outcomes: Vec<TestOutcome>,
    pub passed: usize,
    pub normal: bool,
}

/// Runs every applicable test; normal when a strict majority has `p > alpha`.
/// No applicable test means not normal.
pub fn assess(values: &[f64], alpha: f64) -> NormalityVerdict {
    let outcomes: Vec<TestOutcome> = NormalityTest::ALL.iter().filter_map(|t| t.run(values)).collect();
    let passed = outcomes.iter().filter(|o| o.p_value > alpha).count();
    NormalityVerdict {
        n: values.len(),
        normal: !outcomes.is_empty() && passed * 2 > outcomes.len(),
        passed,
        outcomes,
    }
}
