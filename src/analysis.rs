//! Disparity analysis between the minoritized group and the reference group.
//!
//! Students without a final grade are left out of their group's statistics
//! and counted as excluded. Statistics that need more data than a group has
//! are reported as [`Measure::InsufficientData`], never as NaN or infinity.

use serde::Serialize;
use tracing::{debug, warn};

use crate::stats::{self, Histogram, WelchTest};
use crate::types::FinalGradeTable;

/// Histogram bins used by [`analyze`].
pub const DEFAULT_HISTOGRAM_BINS: usize = 50;

/// A statistic that may be undefined for the data at hand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Measure<T = f64> {
    Value(T),
    /// The group has too few graded students for this statistic.
    InsufficientData,
    /// The statistic would divide by a spread of exactly zero.
    ZeroSpread,
}

impl<T: Copy> Measure<T> {
    pub const fn value(&self) -> Option<T> {
        match self {
            Self::Value(v) => Some(*v),
            Self::InsufficientData | Self::ZeroSpread => None,
        }
    }

    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    fn sufficient(value: Option<T>) -> Self {
        value.map_or(Self::InsufficientData, Self::Value)
    }
}

/// Describe-style summary of one group's final grades.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    /// Students with a final grade.
    pub count: usize,
    /// Students in the group whose final grade is missing.
    pub excluded: usize,
    pub mean: Measure,
    /// Sample standard deviation (n - 1).
    pub std: Measure,
    pub min: Measure,
    pub q25: Measure,
    pub median: Measure,
    pub q75: Measure,
    pub max: Measure,
    /// Unscaled median absolute deviation.
    pub mad: Measure,
    pub histogram: Option<Histogram>,
}

impl GroupSummary {
    fn from_grades(grades: &[f64], excluded: usize, bins: usize) -> Self {
        let sorted = stats::sorted(grades);
        let quantile = |q| Measure::sufficient(stats::quantile_sorted(&sorted, q));

        Self {
            count: grades.len(),
            excluded,
            mean: Measure::sufficient(stats::mean(grades)),
            std: Measure::sufficient(stats::sample_std(grades)),
            min: quantile(0.0),
            q25: quantile(0.25),
            median: quantile(0.5),
            q75: quantile(0.75),
            max: quantile(1.0),
            mad: Measure::sufficient(stats::median_abs_deviation(grades)),
            histogram: Histogram::build(grades, bins),
        }
    }

    /// Students in the group, graded or not.
    pub const fn total(&self) -> usize {
        self.count + self.excluded
    }
}

/// Disparity statistics for one final grade table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisparityReport {
    /// Students flagged as minoritized (group A).
    pub minoritized: GroupSummary,
    /// All other students (group B).
    pub reference: GroupSummary,
    /// Minoritized median minus reference median.
    pub median_difference: Measure,
    pub welch: Measure<WelchTest>,
    /// `(mean_A - mean_B) / std_B`.
    pub glass_delta: Measure,
}

/// Medians as percentages rounded to two decimals, for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MedianComparison {
    pub minoritized_pct: Option<f64>,
    pub reference_pct: Option<f64>,
    pub difference_pct: Option<f64>,
}

impl DisparityReport {
    pub fn median_comparison(&self) -> MedianComparison {
        MedianComparison {
            minoritized_pct: self.minoritized.median.value().map(as_percent),
            reference_pct: self.reference.median.value().map(as_percent),
            difference_pct: self.median_difference.value().map(as_percent),
        }
    }

    pub fn p_value(&self) -> Option<f64> {
        self.welch.value().map(|w| w.p_value)
    }
}

fn as_percent(fraction: f64) -> f64 {
    (fraction * 100.0 * 100.0).round() / 100.0
}

/// Analyzes a final grade table with the default histogram resolution.
pub fn analyze(table: &FinalGradeTable) -> DisparityReport {
    analyze_with_bins(table, DEFAULT_HISTOGRAM_BINS)
}

/// Analyzes a final grade table.
pub fn analyze_with_bins(table: &FinalGradeTable, bins: usize) -> DisparityReport {
    let mut group_a = Vec::new();
    let mut group_b = Vec::new();
    let (mut excluded_a, mut excluded_b) = (0usize, 0usize);

    for row in &table.rows {
        match (row.minoritized, row.final_grade) {
            (true, Some(grade)) => group_a.push(grade),
            (false, Some(grade)) => group_b.push(grade),
            (true, None) => excluded_a += 1,
            (false, None) => excluded_b += 1,
        }
    }

    if excluded_a + excluded_b > 0 {
        warn!(
            minoritized = excluded_a,
            reference = excluded_b,
            "Students without a final grade were excluded from the analysis"
        );
    }

    let minoritized = GroupSummary::from_grades(&group_a, excluded_a, bins);
    let reference = GroupSummary::from_grades(&group_b, excluded_b, bins);

    let median_difference = match (minoritized.median, reference.median) {
        (Measure::Value(a), Measure::Value(b)) => Measure::Value(a - b),
        _ => Measure::InsufficientData,
    };

    let enough = group_a.len() >= 2 && group_b.len() >= 2;

    let welch = if enough {
        stats::welch_t_test(&group_a, &group_b).map_or(Measure::ZeroSpread, Measure::Value)
    } else {
        Measure::InsufficientData
    };

    let glass_delta = match (enough, minoritized.mean, reference.mean, reference.std) {
        (true, _, _, _) if stats::is_constant(&group_b) => Measure::ZeroSpread,
        (true, Measure::Value(mean_a), Measure::Value(mean_b), Measure::Value(std_b)) => {
            Measure::Value((mean_a - mean_b) / std_b)
        }
        _ => Measure::InsufficientData,
    };

    debug!(
        minoritized = minoritized.count,
        reference = reference.count,
        "Analyzed final grades"
    );

    DisparityReport {
        minoritized,
        reference,
        median_difference,
        welch,
        glass_delta,
    }
}
