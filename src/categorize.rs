//! Column-to-category assignment.
//!
//! A column belongs to a category when its header contains the category's
//! pattern. Every column must match exactly one rule.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::GradeError;
use crate::types::{Categories, Category};

/// Maps header substrings to a category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    /// Case-sensitive substring looked for in each column header.
    pub pattern: String,
}

impl CategoryRule {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    pub fn matches(&self, column: &str) -> bool {
        column.contains(&self.pattern)
    }
}

/// Assigns every column to exactly one category, in rule order.
///
/// Column order within a category follows the input order.
pub fn categorize<S: AsRef<str>>(
    columns: &[S],
    rules: &[CategoryRule],
) -> Result<Categories, GradeError> {
    let mut names = HashSet::with_capacity(rules.len());
    for rule in rules {
        if !names.insert(rule.name.as_str()) {
            return Err(GradeError::DuplicateCategory(rule.name.clone()));
        }
    }

    let mut categories: Categories = rules
        .iter()
        .map(|rule| Category {
            name: rule.name.clone(),
            columns: Vec::new(),
        })
        .collect();
    let mut unmatched = Vec::new();
    let mut ambiguous = Vec::new();

    for column in columns {
        let column = column.as_ref();
        let hits: Vec<usize> = rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.matches(column))
            .map(|(i, _)| i)
            .collect();

        match hits.as_slice() {
            [] => unmatched.push(column.to_string()),
            [only] => categories[*only].columns.push(column.to_string()),
            many => ambiguous.push((
                column.to_string(),
                many.iter().map(|&i| rules[i].name.clone()).collect(),
            )),
        }
    }

    if !ambiguous.is_empty() {
        return Err(GradeError::AmbiguousColumns(ambiguous));
    }
    if !unmatched.is_empty() {
        return Err(GradeError::UnmatchedColumns(unmatched));
    }
    if let Some(empty) = categories.iter().find(|c| c.columns.is_empty()) {
        return Err(GradeError::EmptyCategory(empty.name.clone()));
    }

    Ok(categories)
}
