//! Grade aggregation engine.
//!
//! Turns a roster, its categories and a policy into one final grade per
//! student. Each category score is coerced, floored, trimmed of its lowest
//! values and averaged; category averages are then combined by normalised
//! weight.

#![allow(clippy::cast_precision_loss)]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::GradeError;
use crate::types::{Categories, CategoryPolicy, FinalGradeRow, FinalGradeTable, Policy, Roster};

/// Computes the final grade table.
///
/// The roster is not modified and no state is kept between calls.
pub fn compute_final_grades(
    roster: &Roster,
    categories: &Categories,
    policy: &Policy,
) -> Result<FinalGradeTable, GradeError> {
    let planned = plan(roster, categories, policy)?;
    let total_weight: f64 = planned.iter().map(|c| c.policy.weight).sum();

    for category in &planned {
        if category.policy.drop_count >= category.columns.len() {
            warn!(
                category = category.name,
                columns = category.columns.len(),
                drop_count = category.policy.drop_count,
                "Drop count leaves no scores; category averages will be missing"
            );
        }
    }

    let rows: Vec<FinalGradeRow> = roster
        .rows()
        .iter()
        .map(|student| {
            let mut category_averages = BTreeMap::new();
            let mut weighted_sum = Some(0.0);

            for category in &planned {
                let raw = category.columns.iter().map(|&i| student.scores[i].as_str());
                let average = category_average(raw, &category.policy);
                let weight = category.policy.weight;

                if weight > 0.0 {
                    weighted_sum = weighted_sum
                        .zip(average)
                        .map(|(sum, avg)| avg.mul_add(weight, sum));
                }
                category_averages.insert(category.name.to_string(), average);
            }

            FinalGradeRow {
                id: student.id.clone(),
                minoritized: student.minoritized,
                category_averages,
                final_grade: weighted_sum.map(|sum| sum / total_weight),
            }
        })
        .collect();

    let table = FinalGradeTable {
        categories: planned.iter().map(|c| c.name.to_string()).collect(),
        rows,
    };
    debug!(
        students = table.len(),
        categories = table.categories.len(),
        missing = table.missing_final_grades(),
        "Computed final grades"
    );

    Ok(table)
}

/// Average of one student's scores in one category.
///
/// Returns `None` when the drop count discards every score.
pub fn category_average<'a, I>(raw_scores: I, policy: &CategoryPolicy) -> Option<f64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scores: Vec<f64> = raw_scores
        .into_iter()
        .map(|raw| coerce_score(raw).unwrap_or(policy.floor).max(policy.floor))
        .collect();

    let keep = scores.len().saturating_sub(policy.drop_count);
    if keep == 0 {
        return None;
    }

    if keep < scores.len() {
        // Highest first; which of several equal scores survives does not
        // change the retained values.
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        scores.truncate(keep);
    }

    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Parses a raw score token. Empty, non-numeric and non-finite tokens yield
/// `None`.
pub fn coerce_score(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A category resolved against the roster's column positions.
struct PlannedCategory<'a> {
    name: &'a str,
    columns: Vec<usize>,
    policy: CategoryPolicy,
}

/// Validates the inputs and resolves column indices.
fn plan<'a>(
    roster: &Roster,
    categories: &'a Categories,
    policy: &Policy,
) -> Result<Vec<PlannedCategory<'a>>, GradeError> {
    if roster.is_empty() {
        return Err(GradeError::EmptyRoster);
    }

    if let Some(unknown) = policy
        .keys()
        .find(|name| !categories.iter().any(|c| &c.name == *name))
    {
        return Err(GradeError::UnknownCategory(unknown.clone()));
    }

    let mut planned = Vec::with_capacity(categories.len());
    for category in categories {
        let entry = *policy
            .get(&category.name)
            .ok_or_else(|| GradeError::MissingPolicy(category.name.clone()))?;

        if !entry.weight.is_finite() || entry.weight < 0.0 {
            return Err(GradeError::InvalidWeight {
                category: category.name.clone(),
                weight: entry.weight,
            });
        }
        if !(0.0..=1.0).contains(&entry.floor) {
            return Err(GradeError::InvalidFloor {
                category: category.name.clone(),
                floor: entry.floor,
            });
        }
        if category.columns.is_empty() {
            return Err(GradeError::EmptyCategory(category.name.clone()));
        }

        let columns = category
            .columns
            .iter()
            .map(|column| {
                roster
                    .column_index(column)
                    .ok_or_else(|| GradeError::UnknownColumn {
                        category: category.name.clone(),
                        column: column.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        planned.push(PlannedCategory {
            name: &category.name,
            columns,
            policy: entry,
        });
    }

    let total_weight: f64 = planned.iter().map(|c| c.policy.weight).sum();
    if !total_weight.is_finite() {
        return Err(GradeError::NonFiniteTotalWeight(total_weight));
    }
    if total_weight <= 0.0 {
        return Err(GradeError::ZeroTotalWeight);
    }

    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, RosterRow};
    use pretty_assertions::assert_eq;

    fn close(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|a| (a - expected).abs() < 1e-9)
    }

    fn quiz_roster() -> Roster {
        Roster::new(
            vec!["Quiz_1".into(), "Quiz_2".into(), "Quiz_3".into()],
            vec![
                RosterRow::new("s1", true, ["0.9", "0.5", "0.8"]),
                RosterRow::new("s2", false, ["1.0", "1.0", "1.0"]),
                RosterRow::new("s3", true, ["0.2", "", "0.3"]),
                RosterRow::new("s4", false, ["0.6", "0.6", "0.6"]),
            ],
        )
        .unwrap()
    }

    fn quizzes() -> Categories {
        vec![Category {
            name: "quizzes".into(),
            columns: vec!["Quiz_1".into(), "Quiz_2".into(), "Quiz_3".into()],
        }]
    }

    fn single(policy: CategoryPolicy) -> Policy {
        Policy::from([("quizzes".to_string(), policy)])
    }

    fn mixed_roster() -> Roster {
        Roster::new(
            vec![
                "Quiz_1".into(),
                "Quiz_2".into(),
                "Quiz_3".into(),
                "Midterm_1".into(),
                "Midterm_2".into(),
            ],
            vec![
                RosterRow::new("a", true, ["0.2", "0.9", "x", "0.7", "0.4"]),
                RosterRow::new("b", false, ["1.0", "0.0", "0.5", "", "0.9"]),
                RosterRow::new("c", true, ["0.35", "0.35", "0.8", "0.6", "0.61"]),
                RosterRow::new("d", false, ["-0.2", "1.2", "0.7", "0.1", "0.95"]),
            ],
        )
        .unwrap()
    }

    fn mixed_categories() -> Categories {
        vec![
            Category {
                name: "quizzes".into(),
                columns: vec!["Quiz_1".into(), "Quiz_2".into(), "Quiz_3".into()],
            },
            Category {
                name: "midterms".into(),
                columns: vec!["Midterm_1".into(), "Midterm_2".into()],
            },
        ]
    }

    fn mixed_policy(quiz: CategoryPolicy, midterm: CategoryPolicy) -> Policy {
        Policy::from([
            ("quizzes".to_string(), quiz),
            ("midterms".to_string(), midterm),
        ])
    }

    #[test]
    fn drop_one_with_floor() {
        let table = compute_final_grades(
            &quiz_roster(),
            &quizzes(),
            &single(CategoryPolicy::new(1.0, 1, 0.4)),
        )
        .unwrap();

        for (id, expected) in [("s1", 0.85), ("s2", 1.0), ("s3", 0.4), ("s4", 0.6)] {
            let row = table.get(id).unwrap();
            assert!(close(row.final_grade, expected), "{id}: {:?}", row.final_grade);
            assert!(close(row.category_averages["quizzes"], expected));
        }
    }

    #[test]
    fn preserves_identity_and_order() {
        let roster = quiz_roster();
        let table =
            compute_final_grades(&roster, &quizzes(), &single(CategoryPolicy::default())).unwrap();
        let ids: Vec<_> = table.rows.iter().map(|r| (r.id.as_str(), r.minoritized)).collect();
        assert_eq!(
            ids,
            vec![("s1", true), ("s2", false), ("s3", true), ("s4", false)]
        );
        assert_eq!(table.categories, vec!["quizzes".to_string()]);
    }

    #[test]
    fn missing_score_counts_as_floor() {
        // No drop: s3 averages [0.2, floor 0.0, 0.3].
        let table = compute_final_grades(
            &quiz_roster(),
            &quizzes(),
            &single(CategoryPolicy::new(1.0, 0, 0.0)),
        )
        .unwrap();
        assert!(close(table.get("s3").unwrap().final_grade, 0.5 / 3.0));
    }

    #[test]
    fn dropping_everything_yields_missing_grade() {
        let table = compute_final_grades(
            &quiz_roster(),
            &quizzes(),
            &single(CategoryPolicy::new(1.0, 3, 0.0)),
        )
        .unwrap();
        assert!(table.rows.iter().all(|r| r.final_grade.is_none()));
        assert!(table.rows.iter().all(|r| r.category_averages["quizzes"].is_none()));
        assert_eq!(table.missing_final_grades(), 4);
    }

    #[test]
    fn fully_dropped_zero_weight_category_is_harmless() {
        let table = compute_final_grades(
            &mixed_roster(),
            &mixed_categories(),
            &mixed_policy(CategoryPolicy::new(0.0, 5, 0.0), CategoryPolicy::new(1.0, 0, 0.0)),
        )
        .unwrap();
        let a = table.get("a").unwrap();
        assert_eq!(a.category_averages["quizzes"], None);
        assert!(close(a.final_grade, 0.55));
    }

    #[test]
    fn weights_are_normalised() {
        let table = compute_final_grades(
            &mixed_roster(),
            &mixed_categories(),
            &mixed_policy(CategoryPolicy::new(0.3, 0, 0.0), CategoryPolicy::new(0.1, 0, 0.0)),
        )
        .unwrap();
        // b: quizzes (1.0 + 0.0 + 0.5) / 3 = 0.5, midterms (0.0 + 0.9) / 2 = 0.45
        let b = table.get("b").unwrap();
        assert!(close(b.category_averages["quizzes"], 0.5));
        assert!(close(b.category_averages["midterms"], 0.45));
        assert!(close(b.final_grade, 0.5f64.mul_add(0.75, 0.45 * 0.25)));
    }

    #[test]
    fn scores_below_floor_are_raised() {
        let policy = CategoryPolicy::new(1.0, 0, 0.5);
        let avg = category_average(["-0.2", "1.2", "0.7"], &policy);
        assert!(close(avg, (0.5 + 1.2 + 0.7) / 3.0));
    }

    #[test]
    fn coercion_rejects_junk() {
        assert_eq!(coerce_score(" 0.75 "), Some(0.75));
        assert_eq!(coerce_score("1e-1"), Some(0.1));
        assert_eq!(coerce_score(""), None);
        assert_eq!(coerce_score("excused"), None);
        assert_eq!(coerce_score("NaN"), None);
        assert_eq!(coerce_score("inf"), None);
    }

    #[test]
    fn ties_do_not_change_the_average() {
        let policy = CategoryPolicy::new(1.0, 2, 0.0);
        let avg = category_average(["0.5", "0.9", "0.5", "0.9"], &policy);
        assert!(close(avg, 0.9));
    }

    #[test]
    fn zero_total_weight_is_rejected() {
        let err = compute_final_grades(
            &mixed_roster(),
            &mixed_categories(),
            &mixed_policy(CategoryPolicy::new(0.0, 0, 0.0), CategoryPolicy::new(0.0, 0, 0.0)),
        )
        .unwrap_err();
        assert_eq!(err, GradeError::ZeroTotalWeight);
    }

    #[test]
    fn overflowing_total_weight_is_rejected() {
        let err = compute_final_grades(
            &mixed_roster(),
            &mixed_categories(),
            &mixed_policy(CategoryPolicy::new(1e308, 0, 0.0), CategoryPolicy::new(1e308, 0, 0.0)),
        )
        .unwrap_err();
        assert_eq!(err, GradeError::NonFiniteTotalWeight(f64::INFINITY));
    }

    #[test]
    fn policy_must_cover_categories_exactly() {
        let roster = mixed_roster();
        let categories = mixed_categories();

        let missing = Policy::from([("quizzes".to_string(), CategoryPolicy::default())]);
        assert_eq!(
            compute_final_grades(&roster, &categories, &missing).unwrap_err(),
            GradeError::MissingPolicy("midterms".into())
        );

        let mut extra = mixed_policy(CategoryPolicy::default(), CategoryPolicy::default());
        extra.insert("labs".into(), CategoryPolicy::default());
        assert_eq!(
            compute_final_grades(&roster, &categories, &extra).unwrap_err(),
            GradeError::UnknownCategory("labs".into())
        );
    }

    #[test]
    fn invalid_policy_values_are_rejected() {
        let roster = quiz_roster();
        assert!(matches!(
            compute_final_grades(&roster, &quizzes(), &single(CategoryPolicy::new(-1.0, 0, 0.0))),
            Err(GradeError::InvalidWeight { .. })
        ));
        assert!(matches!(
            compute_final_grades(&roster, &quizzes(), &single(CategoryPolicy::new(f64::NAN, 0, 0.0))),
            Err(GradeError::InvalidWeight { .. })
        ));
        assert!(matches!(
            compute_final_grades(&roster, &quizzes(), &single(CategoryPolicy::new(1.0, 0, 1.5))),
            Err(GradeError::InvalidFloor { .. })
        ));
    }

    #[test]
    fn category_columns_must_exist() {
        let categories = vec![
            Category {
                name: "quizzes".into(),
                columns: vec!["Quiz_1".into(), "Quiz_9".into()],
            },
            Category {
                name: "labs".into(),
                columns: vec![],
            },
        ];
        let policy = Policy::from([
            ("quizzes".to_string(), CategoryPolicy::default()),
            ("labs".to_string(), CategoryPolicy::default()),
        ]);
        assert_eq!(
            compute_final_grades(&quiz_roster(), &categories, &policy).unwrap_err(),
            GradeError::UnknownColumn {
                category: "quizzes".into(),
                column: "Quiz_9".into()
            }
        );
    }

    #[test]
    fn empty_category_is_rejected() {
        let categories = vec![Category {
            name: "quizzes".into(),
            columns: vec![],
        }];
        assert_eq!(
            compute_final_grades(&quiz_roster(), &categories, &single(CategoryPolicy::default()))
                .unwrap_err(),
            GradeError::EmptyCategory("quizzes".into())
        );
    }

    #[test]
    fn repeated_calls_are_identical() {
        let roster = mixed_roster();
        let categories = mixed_categories();
        let policy = mixed_policy(CategoryPolicy::new(0.4, 1, 0.3), CategoryPolicy::new(0.6, 0, 0.2));
        let first = compute_final_grades(&roster, &categories, &policy).unwrap();
        let other = mixed_policy(CategoryPolicy::new(1.0, 0, 0.9), CategoryPolicy::new(0.1, 1, 0.0));
        compute_final_grades(&roster, &categories, &other).unwrap();
        let second = compute_final_grades(&roster, &categories, &policy).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn scaling_weights_changes_nothing() {
        let roster = mixed_roster();
        let categories = mixed_categories();
        let base = compute_final_grades(
            &roster,
            &categories,
            &mixed_policy(CategoryPolicy::new(0.3, 1, 0.1), CategoryPolicy::new(0.2, 0, 0.0)),
        )
        .unwrap();

        for factor in [0.5, 3.0, 10.0] {
            let scaled = compute_final_grades(
                &roster,
                &categories,
                &mixed_policy(
                    CategoryPolicy::new(0.3 * factor, 1, 0.1),
                    CategoryPolicy::new(0.2 * factor, 0, 0.0),
                ),
            )
            .unwrap();
            for (a, b) in base.rows.iter().zip(&scaled.rows) {
                assert!(close(b.final_grade, a.final_grade.unwrap()));
            }
        }
    }

    #[test]
    fn raising_the_floor_never_lowers_grades() {
        let roster = mixed_roster();
        let categories = mixed_categories();
        let mut previous: Option<FinalGradeTable> = None;

        for step in 0..=10 {
            let floor = f64::from(step) / 10.0;
            let table = compute_final_grades(
                &roster,
                &categories,
                &mixed_policy(CategoryPolicy::new(0.5, 1, floor), CategoryPolicy::new(0.5, 0, 0.0)),
            )
            .unwrap();

            if let Some(prev) = &previous {
                for (before, after) in prev.rows.iter().zip(&table.rows) {
                    assert!(
                        after.category_averages["quizzes"] >= before.category_averages["quizzes"]
                    );
                    assert!(after.final_grade.unwrap() >= before.final_grade.unwrap() - 1e-12);
                }
            }
            previous = Some(table);
        }
    }

    #[test]
    fn dropping_more_never_lowers_averages() {
        let roster = mixed_roster();
        let categories = mixed_categories();
        let mut previous: Option<FinalGradeTable> = None;

        for drop_count in 0..3 {
            let table = compute_final_grades(
                &roster,
                &categories,
                &mixed_policy(
                    CategoryPolicy::new(0.5, drop_count, 0.0),
                    CategoryPolicy::new(0.5, 0, 0.0),
                ),
            )
            .unwrap();

            if let Some(prev) = &previous {
                for (before, after) in prev.rows.iter().zip(&table.rows) {
                    let before = before.category_averages["quizzes"].unwrap();
                    let after = after.category_averages["quizzes"].unwrap();
                    assert!(after >= before - 1e-12);
                }
            }
            previous = Some(table);
        }
    }
}
