//! Common types for equigrade.
//!
//! Defines the roster, category and policy inputs of the aggregation engine
//! and the final grade table it produces.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::GradeError;

/// One student in the gradebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    /// Unique student identifier.
    pub id: String,
    /// Whether the student belongs to the minoritized group.
    pub minoritized: bool,
    /// Raw score tokens, one per roster column.
    pub scores: Vec<String>,
}

impl RosterRow {
    pub fn new<I, S>(id: impl Into<String>, minoritized: bool, scores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            minoritized,
            scores: scores.into_iter().map(Into::into).collect(),
        }
    }
}

/// Assignment columns plus the students scored in them.
#[derive(Debug, Clone)]
pub struct Roster {
    columns: Vec<String>,
    rows: Vec<RosterRow>,
}

impl Roster {
    /// Builds a roster, checking it is non-empty, column names and ids are
    /// unique and every row is as wide as the column list.
    pub fn new(columns: Vec<String>, rows: Vec<RosterRow>) -> Result<Self, GradeError> {
        {
            let mut headers = HashSet::with_capacity(columns.len());
            if let Some(repeated) = columns.iter().find(|c| !headers.insert(c.as_str())) {
                return Err(GradeError::DuplicateColumn(repeated.clone()));
            }
        }

        if rows.is_empty() {
            return Err(GradeError::EmptyRoster);
        }

        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if !seen.insert(row.id.as_str()) {
                return Err(GradeError::DuplicateStudent(row.id.clone()));
            }
            if row.scores.len() != columns.len() {
                return Err(GradeError::RowWidth {
                    student: row.id.clone(),
                    expected: columns.len(),
                    found: row.scores.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[RosterRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column in every row's score vector.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// A named group of assignment columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub name: String,
    pub columns: Vec<String>,
}

/// Categories in report order.
pub type Categories = Vec<Category>;

/// Grading policy for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryPolicy {
    /// Relative weight; normalised by the sum over all categories.
    pub weight: f64,
    /// Number of lowest scores discarded per student.
    pub drop_count: usize,
    /// Minimum score; missing and lower scores are raised to it.
    pub floor: f64,
}

impl CategoryPolicy {
    pub const fn new(weight: f64, drop_count: usize, floor: f64) -> Self {
        Self {
            weight,
            drop_count,
            floor,
        }
    }
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        Self::new(0.2, 0, 0.0)
    }
}

/// Policy entries keyed by category name.
pub type Policy = BTreeMap<String, CategoryPolicy>;

/// A student's computed grades.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalGradeRow {
    pub id: String,
    pub minoritized: bool,
    /// Category averages; `None` when every score in the category was dropped.
    pub category_averages: BTreeMap<String, Option<f64>>,
    /// Weighted final grade; `None` when a weighted category average is missing.
    pub final_grade: Option<f64>,
}

/// Output of the aggregation engine, one row per roster student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalGradeTable {
    /// Category names in report order.
    pub categories: Vec<String>,
    pub rows: Vec<FinalGradeRow>,
}

impl FinalGradeTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FinalGradeRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// Number of students whose final grade is missing.
    pub fn missing_final_grades(&self) -> usize {
        self.rows.iter().filter(|r| r.final_grade.is_none()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["Quiz_1".into(), "Quiz_2".into()]
    }

    #[test]
    fn roster_rejects_empty() {
        assert_eq!(
            Roster::new(columns(), vec![]).unwrap_err(),
            GradeError::EmptyRoster
        );
    }

    #[test]
    fn roster_rejects_duplicate_ids() {
        let rows = vec![
            RosterRow::new("s1", true, ["1", "1"]),
            RosterRow::new("s1", false, ["0", "0"]),
        ];
        assert_eq!(
            Roster::new(columns(), rows).unwrap_err(),
            GradeError::DuplicateStudent("s1".into())
        );
    }

    #[test]
    fn roster_rejects_repeated_columns() {
        let rows = vec![RosterRow::new("s1", true, ["1", "0"])];
        assert_eq!(
            Roster::new(vec!["Quiz_1".into(), "Quiz_1".into()], rows).unwrap_err(),
            GradeError::DuplicateColumn("Quiz_1".into())
        );
    }

    #[test]
    fn roster_rejects_short_rows() {
        let rows = vec![RosterRow::new("s1", true, ["1"])];
        assert!(matches!(
            Roster::new(columns(), rows),
            Err(GradeError::RowWidth {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn column_index_lookup() {
        let roster = Roster::new(columns(), vec![RosterRow::new("s1", true, ["1", "0.5"])])
            .unwrap();
        assert_eq!(roster.column_index("Quiz_2"), Some(1));
        assert_eq!(roster.column_index("Midterm"), None);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn default_policy_matches_slider_defaults() {
        let policy = CategoryPolicy::default();
        assert!((policy.weight - 0.2).abs() < f64::EPSILON);
        assert_eq!(policy.drop_count, 0);
        assert!(policy.floor.abs() < f64::EPSILON);
    }
}
