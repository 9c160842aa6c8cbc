//! Grading configuration.
//!
//! A YAML file names the id/group columns and lists each category with its
//! header pattern and policy. `--set category.field=value` overrides stand in
//! for the slider surface of an interactive front end.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::categorize::CategoryRule;
use crate::error::GradeError;
use crate::types::{CategoryPolicy, Policy};

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Column holding the unique student identifier.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Column holding the minoritized-group flag.
    #[serde(default = "default_group_column")]
    pub group_column: String,

    /// Columns that are neither scores nor id/group (names, sections, ...).
    #[serde(default)]
    pub ignore_columns: Vec<String>,

    /// Categories in report order.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
}

/// One category entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    /// Substring identifying this category's column headers.
    pub pattern: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub drop_count: usize,
    #[serde(default)]
    pub floor: f64,
}

impl CategoryConfig {
    pub fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            weight: default_weight(),
            drop_count: 0,
            floor: 0.0,
        }
    }

    pub const fn policy(&self) -> CategoryPolicy {
        CategoryPolicy::new(self.weight, self.drop_count, self.floor)
    }
}

fn default_id_column() -> String {
    "ID".to_string()
}

fn default_group_column() -> String {
    "Minoritized".to_string()
}

const fn default_weight() -> f64 {
    0.2
}

fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig::new("attendance", "Attendance"),
        CategoryConfig::new("study_activities", "Study"),
        CategoryConfig::new("quizzes", "Quiz"),
        CategoryConfig::new("midterms", "Midterm"),
        CategoryConfig::new("final_exam", "Final_Exam"),
    ]
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            group_column: default_group_column(),
            ignore_columns: Vec::new(),
            categories: default_categories(),
        }
    }
}

impl GradingConfig {
    /// Parses a config from YAML text.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        Ok(config)
    }

    /// Loads a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Renders the config as YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Categorization rules, one per category.
    pub fn rules(&self) -> Vec<CategoryRule> {
        self.categories
            .iter()
            .map(|c| CategoryRule::new(&c.name, &c.pattern))
            .collect()
    }

    /// Engine policy keyed by category name.
    pub fn policy(&self) -> Policy {
        self.categories
            .iter()
            .map(|c| (c.name.clone(), c.policy()))
            .collect()
    }

    /// Applies a `category.field=value` override.
    ///
    /// Fields: `weight`, `drop_count` (or `drop`), `floor`.
    pub fn apply_override(&mut self, setting: &str) -> Result<(), GradeError> {
        let invalid = |reason: &str| {
            GradeError::InvalidOverride(setting.to_string(), reason.to_string())
        };

        let (key, value) = setting
            .split_once('=')
            .ok_or_else(|| invalid("expected category.field=value"))?;
        let (name, field) = key
            .trim()
            .rsplit_once('.')
            .ok_or_else(|| invalid("expected category.field=value"))?;
        let value = value.trim();

        let category = self
            .categories
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| invalid(&format!("unknown category '{name}'")))?;

        match field {
            "weight" => {
                category.weight = value
                    .parse()
                    .map_err(|_| invalid(&format!("'{value}' is not a number")))?;
            }
            "floor" => {
                category.floor = value
                    .parse()
                    .map_err(|_| invalid(&format!("'{value}' is not a number")))?;
            }
            "drop" | "drop_count" => {
                category.drop_count = value
                    .parse()
                    .map_err(|_| invalid(&format!("'{value}' is not a non-negative integer")))?;
            }
            other => return Err(invalid(&format!("unknown field '{other}'"))),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_grading_config() {
        let yaml = r#"
id_column: StudentID
group_column: FirstGen
ignore_columns: [Name]
categories:
  - name: quizzes
    pattern: Quiz
    weight: 0.5
    drop_count: 2
    floor: 0.4
  - name: exams
    pattern: Exam
"#;
        let config = GradingConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.id_column, "StudentID");
        assert_eq!(config.ignore_columns, vec!["Name".to_string()]);
        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.categories[0].policy(), CategoryPolicy::new(0.5, 2, 0.4));
        assert_eq!(config.categories[1].policy(), CategoryPolicy::default());
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = GradingConfig::from_yaml("{}").unwrap();
        assert_eq!(config, GradingConfig::default());
        let names: Vec<_> = config.rules().into_iter().map(|r| r.pattern).collect();
        assert_eq!(names, vec!["Attendance", "Study", "Quiz", "Midterm", "Final_Exam"]);
    }

    #[test]
    fn yaml_round_trips() {
        let config = GradingConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(GradingConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn policy_is_keyed_by_name() {
        let policy = GradingConfig::default().policy();
        assert_eq!(policy.len(), 5);
        assert_eq!(policy["final_exam"], CategoryPolicy::default());
    }

    #[test]
    fn overrides_update_policy() {
        let mut config = GradingConfig::default();
        config.apply_override("quizzes.weight=0.35").unwrap();
        config.apply_override("quizzes.drop=2").unwrap();
        config.apply_override("midterms.floor = 0.5").unwrap();
        let policy = config.policy();
        assert_eq!(policy["quizzes"], CategoryPolicy::new(0.35, 2, 0.0));
        assert_eq!(policy["midterms"], CategoryPolicy::new(0.2, 0, 0.5));
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut config = GradingConfig::default();
        for setting in [
            "quizzes",
            "quizzes=1",
            "labs.weight=1",
            "quizzes.bonus=1",
            "quizzes.weight=lots",
            "quizzes.drop=-1",
        ] {
            assert!(
                matches!(
                    config.apply_override(setting),
                    Err(GradeError::InvalidOverride(..))
                ),
                "{setting} should be rejected"
            );
        }
    }

    #[test]
    fn load_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "categories:\n  - name: labs\n    pattern: Lab\n").unwrap();
        let config = GradingConfig::load(file.path()).unwrap();
        assert_eq!(config.categories, vec![CategoryConfig::new("labs", "Lab")]);
    }
}
