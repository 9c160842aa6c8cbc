//! Error type shared by the grading core.
//!
//! Every variant is recoverable: the caller adjusts the roster or policy and
//! tries again.

use thiserror::Error;

/// Configuration and data errors raised before or during grading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeError {
    #[error("roster has no students")]
    EmptyRoster,

    #[error("roster is missing required column '{0}'")]
    MissingColumn(String),

    #[error("duplicate student identifier '{0}'")]
    DuplicateStudent(String),

    #[error("assignment column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("student '{student}' has {found} scores but the roster has {expected} assignment columns")]
    RowWidth {
        student: String,
        expected: usize,
        found: usize,
    },

    #[error("student '{student}' has unrecognised group flag '{value}'")]
    InvalidGroupFlag { student: String, value: String },

    #[error("columns match no category: {}", .0.join(", "))]
    UnmatchedColumns(Vec<String>),

    #[error("columns match more than one category: {}", format_ambiguous(.0))]
    AmbiguousColumns(Vec<(String, Vec<String>)>),

    #[error("category '{0}' is defined more than once")]
    DuplicateCategory(String),

    #[error("category '{0}' matches no columns")]
    EmptyCategory(String),

    #[error("category '{category}' references unknown column '{column}'")]
    UnknownColumn { category: String, column: String },

    #[error("policy has no entry for category '{0}'")]
    MissingPolicy(String),

    #[error("policy references unknown category '{0}'")]
    UnknownCategory(String),

    #[error("category '{category}' has invalid weight {weight} (must be finite and >= 0)")]
    InvalidWeight { category: String, weight: f64 },

    #[error("category '{category}' has invalid floor {floor} (must be within 0..=1)")]
    InvalidFloor { category: String, floor: f64 },

    #[error("total category weight is zero; final grades are undefined")]
    ZeroTotalWeight,

    #[error("total category weight {0} is not finite")]
    NonFiniteTotalWeight(f64),

    #[error("invalid override '{0}': {1}")]
    InvalidOverride(String, String),
}

fn format_ambiguous(columns: &[(String, Vec<String>)]) -> String {
    columns
        .iter()
        .map(|(column, categories)| format!("{column} ({})", categories.join("/")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_columns_are_listed() {
        let err = GradeError::UnmatchedColumns(vec!["Notes".into(), "Bonus".into()]);
        assert_eq!(err.to_string(), "columns match no category: Notes, Bonus");
    }

    #[test]
    fn ambiguous_columns_name_every_candidate() {
        let err = GradeError::AmbiguousColumns(vec![(
            "Quiz_Study_1".into(),
            vec!["quizzes".into(), "study_activities".into()],
        )]);
        assert_eq!(
            err.to_string(),
            "columns match more than one category: Quiz_Study_1 (quizzes/study_activities)"
        );
    }
}
