//! Statistical kernels used by the disparity analyzer.
//!
//! All functions take plain slices and return `None` when the sample is too
//! small for the statistic, so callers decide how to report it.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use serde::Serialize;
use std::cmp::Ordering;
use std::f64::consts::PI;

/// Arithmetic mean.
#[must_use]
pub fn mean(sample: &[f64]) -> Option<f64> {
    if sample.is_empty() {
        return None;
    }
    Some(sample.iter().sum::<f64>() / sample.len() as f64)
}

/// Whether every value in the sample is the same.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn is_constant(sample: &[f64]) -> bool {
    sample.windows(2).all(|w| w[0] == w[1])
}

/// Sample variance with Bessel's correction (n - 1).
///
/// A constant sample has a variance of exactly zero, whatever rounding the
/// mean picks up.
#[must_use]
pub fn sample_variance(sample: &[f64]) -> Option<f64> {
    if sample.len() < 2 {
        return None;
    }
    if is_constant(sample) {
        return Some(0.0);
    }
    let m = mean(sample)?;
    let ss = sample.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    Some(ss / (sample.len() - 1) as f64)
}

/// Sample standard deviation (n - 1).
#[must_use]
pub fn sample_std(sample: &[f64]) -> Option<f64> {
    sample_variance(sample).map(f64::sqrt)
}

/// Returns a sorted copy of the sample.
#[must_use]
pub fn sorted(sample: &[f64]) -> Vec<f64> {
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Quantile of an already sorted sample, interpolating linearly between the
/// two closest ranks.
#[must_use]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        Some(sorted[lo])
    } else {
        let t = idx - lo as f64;
        Some(sorted[lo].mul_add(1.0 - t, sorted[hi] * t))
    }
}

/// Quantile of an unsorted sample.
#[must_use]
pub fn quantile(sample: &[f64], q: f64) -> Option<f64> {
    quantile_sorted(&sorted(sample), q)
}

#[must_use]
pub fn median(sample: &[f64]) -> Option<f64> {
    quantile(sample, 0.5)
}

/// Median absolute deviation from the median, without a normal-consistency
/// scale factor.
#[must_use]
pub fn median_abs_deviation(sample: &[f64]) -> Option<f64> {
    let center = median(sample)?;
    let deviations: Vec<f64> = sample.iter().map(|x| (x - center).abs()).collect();
    median(&deviations)
}

/// Result of Welch's unequal-variance t-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WelchTest {
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Welch's t-test for a difference of means.
///
/// Returns `None` when either sample has fewer than two values or when both
/// samples are constant (the statistic is undefined).
#[must_use]
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<WelchTest> {
    let (mean_a, var_a) = (mean(a)?, sample_variance(a)?);
    let (mean_b, var_b) = (mean(b)?, sample_variance(b)?);
    if is_constant(a) && is_constant(b) {
        return None;
    }

    let se_a = var_a / a.len() as f64;
    let se_b = var_b / b.len() as f64;
    let se_sq = se_a + se_b;
    if se_sq <= 0.0 {
        return None;
    }

    let t = (mean_a - mean_b) / se_sq.sqrt();
    let df = se_sq.powi(2)
        / (se_a.powi(2) / (a.len() - 1) as f64 + se_b.powi(2) / (b.len() - 1) as f64);

    Some(WelchTest {
        t_statistic: t,
        degrees_of_freedom: df,
        p_value: student_t_two_sided_p(t, df),
    })
}

/// Two-sided tail probability `P(|T| >= |t|)` for Student's t with `df`
/// degrees of freedom.
#[must_use]
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    let x = df / t.mul_add(t, df);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Regularized incomplete beta function `I_x(a, b)`.
#[must_use]
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b)
        + a * x.ln()
        + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fastest below the mean of the distribution.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: u32 = 1_000;
    const EPS: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = f64::from(m);
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(even.mul_add(d, 1.0));
        c = guard(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(odd.mul_add(d, 1.0));
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }

    h
}

/// Natural log of the gamma function (Lanczos, g = 7).
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection formula.
        return (PI / (PI * x).sin().abs()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let t = x + G + 0.5;
    let series = COEF
        .iter()
        .enumerate()
        .skip(1)
        .fold(COEF[0], |acc, (i, c)| acc + c / (x + i as f64));

    0.5f64.mul_add((2.0 * PI).ln(), (x + 0.5) * t.ln()) - t + series.ln()
}

/// Equal-width histogram of a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// Bin edges; `edges.len() == counts.len() + 1`.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bins the sample over its own range. The last bin includes its upper
    /// edge. A constant sample is centred in a range of width one.
    #[must_use]
    pub fn build(sample: &[f64], bins: usize) -> Option<Self> {
        if sample.is_empty() || bins == 0 {
            return None;
        }

        let (mut lo, mut hi) = sample
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if (hi - lo).abs() < f64::EPSILON {
            lo -= 0.5;
            hi += 0.5;
        }

        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins)
            .map(|i| if i == bins { hi } else { (i as f64).mul_add(width, lo) })
            .collect();

        let mut counts = vec![0usize; bins];
        for &v in sample {
            let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }

        Some(Self { edges, counts })
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}
