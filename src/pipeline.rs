//! End-to-end evaluation: categorize, grade, analyze.
//!
//! Holds no state between calls; every policy change re-runs the whole
//! pipeline.

use serde::Serialize;
use tracing::debug;

use crate::analysis::{analyze_with_bins, DisparityReport, DEFAULT_HISTOGRAM_BINS};
use crate::categorize::categorize;
use crate::config::GradingConfig;
use crate::engine::compute_final_grades;
use crate::error::GradeError;
use crate::types::{Categories, FinalGradeTable, Roster};

/// Everything computed for one policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub categories: Categories,
    pub final_grades: FinalGradeTable,
    pub report: DisparityReport,
}

/// Runs the full pipeline with the default histogram resolution.
pub fn evaluate(roster: &Roster, config: &GradingConfig) -> Result<Evaluation, GradeError> {
    evaluate_with_bins(roster, config, DEFAULT_HISTOGRAM_BINS)
}

/// Runs the full pipeline.
pub fn evaluate_with_bins(
    roster: &Roster,
    config: &GradingConfig,
    bins: usize,
) -> Result<Evaluation, GradeError> {
    let categories = categorize(roster.columns(), &config.rules())?;
    let sizes: Vec<_> = categories
        .iter()
        .map(|c| format!("{}={}", c.name, c.columns.len()))
        .collect();
    debug!(categories = ?sizes, "Categorized columns");

    let final_grades = compute_final_grades(roster, &categories, &config.policy())?;
    let report = analyze_with_bins(&final_grades, bins);

    Ok(Evaluation {
        categories,
        final_grades,
        report,
    })
}
