use std::collections::{HashMap, HashSet};

use crate::models::{AssignmentRecord, CategoryDefinition, CategoryRow, SummaryResult};

pub const UNCATEGORIZED_KEY: &str = "uncategorized";
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

#[derive(Debug, Clone, Default)]
struct CategoryAggregate {
    label: String,
    earned: f64,
    possible: f64,
}

impl CategoryAggregate {
    fn percent(&self) -> Option<f64> {
        percent_of(self.earned, self.possible)
    }
}

/// Aggregates keyed by normalized category name, kept in encounter order.
#[derive(Debug, Default)]
struct AggregateMap {
    entries: Vec<(String, CategoryAggregate)>,
    index: HashMap<String, usize>,
}

impl AggregateMap {
    fn entry(&mut self, key: String, label: impl FnOnce() -> String) -> &mut CategoryAggregate {
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                let position = self.entries.len();
                self.index.insert(key.clone(), position);
                self.entries.push((
                    key,
                    CategoryAggregate {
                        label: label(),
                        ..CategoryAggregate::default()
                    },
                ));
                position
            }
        };
        &mut self.entries[position].1
    }

    fn get(&self, key: &str) -> Option<&CategoryAggregate> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }
}

/// Join key shared by assignment labels and category names.
pub fn normalize_category(label: Option<&str>) -> String {
    let key = label.map(|value| value.trim().to_lowercase()).unwrap_or_default();
    if key.is_empty() {
        UNCATEGORIZED_KEY.to_string()
    } else {
        key
    }
}

/// Coerces NaN and infinities to zero.
pub fn number_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn non_negative(value: f64) -> f64 {
    number_or_zero(value).max(0.0)
}

fn percent_of(earned: f64, possible: f64) -> Option<f64> {
    if possible > 0.0 {
        Some((earned / possible) * 100.0)
    } else {
        None
    }
}

/// The label as first entered; blank labels show as "Uncategorized".
fn display_label(label: Option<&str>) -> String {
    match label {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => UNCATEGORIZED_LABEL.to_string(),
    }
}

pub fn compute_summary(
    categories: &[CategoryDefinition],
    assignments: &[AssignmentRecord],
) -> SummaryResult {
    let mut aggregates = AggregateMap::default();
    let mut total_earned = 0.0;
    let mut total_possible = 0.0;

    for assignment in assignments {
        let label = assignment.category.as_deref();
        let earned = non_negative(assignment.points_earned);
        let possible = non_negative(assignment.points_possible);

        let entry = aggregates.entry(normalize_category(label), || display_label(label));
        entry.earned += earned;
        entry.possible += possible;

        total_earned += earned;
        total_possible += possible;
    }

    let mut rows = Vec::with_capacity(categories.len() + aggregates.entries.len());
    let mut matched: HashSet<String> = HashSet::with_capacity(categories.len());
    let mut sum_weights = 0.0;

    for definition in categories {
        let key = normalize_category(Some(&definition.name));
        let weight = non_negative(definition.weight_percent);
        sum_weights += weight;

        let (earned, possible, percent) = match aggregates.get(&key) {
            Some(aggregate) => (aggregate.earned, aggregate.possible, aggregate.percent()),
            None => (0.0, 0.0, None),
        };

        rows.push(CategoryRow {
            id: definition.id,
            name: definition.name.clone(),
            weight_percent: weight,
            earned,
            possible,
            percent,
            orphan: false,
        });
        matched.insert(key);
    }

    let defined_rows = rows.len();
    for (key, aggregate) in &aggregates.entries {
        if matched.contains(key) {
            continue;
        }
        rows.push(CategoryRow {
            id: None,
            name: aggregate.label.clone(),
            weight_percent: 0.0,
            earned: aggregate.earned,
            possible: aggregate.possible,
            percent: aggregate.percent(),
            orphan: true,
        });
    }

    let flat_ratio = || percent_of(total_earned, total_possible);
    let (overall_percent, path) = if sum_weights > 0.0 {
        let (weighted_sum, effective_weight) = rows
            .iter()
            .filter(|row| row.weight_percent > 0.0)
            .filter_map(|row| row.percent.map(|percent| (percent, row.weight_percent)))
            .fold((0.0, 0.0), |(sum, weight), (percent, row_weight)| {
                (sum + percent * row_weight / 100.0, weight + row_weight)
            });

        if effective_weight > 0.0 {
            (Some(weighted_sum * (100.0 / effective_weight)), "weighted")
        } else {
            (flat_ratio(), "flat_fallback")
        }
    } else {
        (flat_ratio(), "flat_fallback")
    };

    let path = if overall_percent.is_some() { path } else { "none" };
    tracing::debug!(
        defined_rows,
        orphan_rows = rows.len() - defined_rows,
        assignments = assignments.len(),
        sum_weights,
        path,
        "computed class summary"
    );

    SummaryResult {
        overall_percent,
        categories: rows,
        sum_weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn category(name: &str, weight_percent: f64) -> CategoryDefinition {
        CategoryDefinition {
            id: Some(Uuid::new_v4()),
            name: name.to_string(),
            weight_percent,
        }
    }

    fn grade(earned: f64, possible: f64, category: Option<&str>) -> AssignmentRecord {
        AssignmentRecord {
            id: None,
            title: "Assignment".to_string(),
            points_earned: earned,
            points_possible: possible,
            category: category.map(str::to_string),
            due_date: None,
        }
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("expected a percent");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn normalizes_labels_for_matching() {
        assert_eq!(normalize_category(Some("  Quizzes ")), "quizzes");
        assert_eq!(normalize_category(Some("HOMEWORK")), "homework");
        assert_eq!(normalize_category(Some("   ")), UNCATEGORIZED_KEY);
        assert_eq!(normalize_category(None), UNCATEGORIZED_KEY);
    }

    #[test]
    fn coerces_non_finite_numbers() {
        assert_eq!(number_or_zero(f64::NAN), 0.0);
        assert_eq!(number_or_zero(f64::INFINITY), 0.0);
        assert_eq!(number_or_zero(f64::NEG_INFINITY), 0.0);
        assert_eq!(number_or_zero(12.5), 12.5);
    }

    #[test]
    fn no_categories_uses_flat_ratio() {
        let summary = compute_summary(
            &[],
            &[grade(8.0, 10.0, None), grade(9.0, 10.0, None)],
        );

        assert_close(summary.overall_percent, 85.0);
        assert_eq!(summary.sum_weights, 0.0);
        assert_eq!(summary.categories.len(), 1);
        let row = &summary.categories[0];
        assert_eq!(row.name, UNCATEGORIZED_LABEL);
        assert_eq!(row.id, None);
        assert_eq!(row.weight_percent, 0.0);
        assert_close(row.percent, 85.0);
    }

    #[test]
    fn single_fully_weighted_category() {
        let summary = compute_summary(
            &[category("Tests", 100.0)],
            &[grade(18.0, 20.0, Some("Tests"))],
        );

        assert_close(summary.overall_percent, 90.0);
        assert_eq!(summary.categories.len(), 1);
        assert_close(summary.categories[0].percent, 90.0);
        assert_eq!(summary.sum_weights, 100.0);
    }

    #[test]
    fn ungraded_category_is_renormalized_away() {
        let categories = vec![category("Tests", 60.0), category("Homework", 40.0)];
        let summary = compute_summary(&categories, &[grade(9.0, 10.0, Some("Tests"))]);

        assert_eq!(summary.categories.len(), 2);
        assert_eq!(summary.categories[1].name, "Homework");
        assert_eq!(summary.categories[1].percent, None);
        assert_eq!(summary.categories[1].possible, 0.0);
        assert_close(summary.overall_percent, 90.0);
        assert_eq!(summary.sum_weights, 100.0);
    }

    #[test]
    fn weighted_average_across_graded_categories() {
        let categories = vec![category("Tests", 60.0), category("Homework", 40.0)];
        let assignments = vec![
            grade(8.0, 10.0, Some("Tests")),
            grade(10.0, 10.0, Some("homework")),
        ];
        let summary = compute_summary(&categories, &assignments);

        // 80 * 0.6 + 100 * 0.4
        assert_close(summary.overall_percent, 88.0);
    }

    #[test]
    fn matching_ignores_case_and_whitespace() {
        let definitions = vec![category("Quizzes", 100.0)];
        let summary = compute_summary(
            &definitions,
            &[
                grade(4.0, 5.0, Some(" quizzes ")),
                grade(5.0, 5.0, Some("QUIZZES")),
            ],
        );

        assert_eq!(summary.categories.len(), 1);
        let row = &summary.categories[0];
        assert_eq!(row.id, definitions[0].id);
        assert_eq!(row.name, "Quizzes");
        assert_eq!(row.earned, 9.0);
        assert_eq!(row.possible, 10.0);
        assert_close(summary.overall_percent, 90.0);
    }

    #[test]
    fn orphan_category_is_listed_but_unweighted() {
        let summary = compute_summary(
            &[category("Tests", 100.0)],
            &[
                grade(7.0, 10.0, Some("Tests")),
                grade(5.0, 5.0, Some("Extra Credit")),
            ],
        );

        assert_eq!(summary.categories.len(), 2);
        let orphan = &summary.categories[1];
        assert_eq!(orphan.name, "Extra Credit");
        assert_eq!(orphan.id, None);
        assert_eq!(orphan.weight_percent, 0.0);
        assert_close(orphan.percent, 100.0);
        assert!(orphan.is_orphan());
        assert_close(summary.overall_percent, 70.0);
        assert_eq!(summary.sum_weights, 100.0);
    }

    #[test]
    fn orphan_label_keeps_first_entered_spelling() {
        let summary = compute_summary(
            &[],
            &[
                grade(1.0, 2.0, Some("  Extra Credit ")),
                grade(1.0, 1.0, Some("extra credit")),
            ],
        );

        assert_eq!(summary.categories.len(), 1);
        assert_eq!(summary.categories[0].name, "  Extra Credit ");
        assert_eq!(summary.categories[0].possible, 3.0);
    }

    #[test]
    fn defined_row_without_id_or_weight_is_not_an_orphan() {
        let definitions = vec![
            CategoryDefinition {
                id: None,
                name: "Labs".to_string(),
                weight_percent: 0.0,
            },
            CategoryDefinition {
                id: None,
                name: "Projects".to_string(),
                weight_percent: f64::NAN,
            },
        ];
        let summary = compute_summary(&definitions, &[grade(3.0, 4.0, Some("Bonus"))]);

        assert_eq!(summary.categories.len(), 3);
        assert!(!summary.categories[0].is_orphan());
        assert!(!summary.categories[1].is_orphan());
        assert!(summary.categories[2].is_orphan());
    }

    #[test]
    fn orphans_follow_defined_rows_in_encounter_order() {
        let summary = compute_summary(
            &[category("Tests", 50.0)],
            &[
                grade(1.0, 2.0, Some("Labs")),
                grade(1.0, 1.0, None),
                grade(2.0, 2.0, Some("Tests")),
                grade(1.0, 1.0, Some("labs")),
                grade(0.0, 1.0, Some("Participation")),
            ],
        );

        let names: Vec<&str> = summary.categories.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["Tests", "Labs", "Uncategorized", "Participation"]);
        assert_eq!(summary.categories[1].earned, 2.0);
        assert_eq!(summary.categories[1].possible, 3.0);
    }

    #[test]
    fn uncategorized_bucket_can_match_a_definition() {
        let summary = compute_summary(
            &[category("Uncategorized", 100.0)],
            &[grade(3.0, 4.0, None), grade(1.0, 1.0, Some(""))],
        );

        assert_eq!(summary.categories.len(), 1);
        assert!(summary.categories[0].id.is_some());
        assert_close(summary.overall_percent, 80.0);
    }

    #[test]
    fn no_graded_work_yields_null_overall() {
        let summary = compute_summary(
            &[category("Tests", 60.0), category("Homework", 40.0)],
            &[
                grade(0.0, 0.0, Some("Tests")),
                grade(0.0, 0.0, Some("Homework")),
            ],
        );

        assert_eq!(summary.overall_percent, None);
        assert!(summary.categories.iter().all(|row| row.percent.is_none()));
        assert_eq!(summary.categories.len(), 2);
    }

    #[test]
    fn empty_inputs_yield_empty_summary() {
        let summary = compute_summary(&[], &[]);
        assert_eq!(summary.overall_percent, None);
        assert!(summary.categories.is_empty());
        assert_eq!(summary.sum_weights, 0.0);
    }

    #[test]
    fn falls_back_to_flat_ratio_when_only_orphans_are_graded() {
        let summary = compute_summary(
            &[category("Tests", 100.0)],
            &[grade(3.0, 4.0, Some("Labs")), grade(0.0, 0.0, Some("Tests"))],
        );

        assert_close(summary.overall_percent, 75.0);
        assert_eq!(summary.categories[0].percent, None);
    }

    #[test]
    fn zero_weight_definitions_use_flat_ratio() {
        let summary = compute_summary(
            &[category("Tests", 0.0)],
            &[grade(1.0, 4.0, Some("Tests")), grade(3.0, 4.0, Some("Labs"))],
        );

        assert_eq!(summary.sum_weights, 0.0);
        assert_close(summary.overall_percent, 50.0);
    }

    #[test]
    fn sum_weights_is_not_clamped() {
        let summary = compute_summary(
            &[category("Tests", 80.0), category("Homework", 40.0)],
            &[grade(5.0, 10.0, Some("Tests")), grade(10.0, 10.0, Some("Homework"))],
        );

        assert_eq!(summary.sum_weights, 120.0);
        // (50 * 0.8 + 100 * 0.4) * (100 / 120)
        assert_close(summary.overall_percent, 200.0 / 3.0);
    }

    #[test]
    fn negative_and_non_finite_points_count_as_zero() {
        let summary = compute_summary(
            &[category("Tests", 100.0)],
            &[
                grade(-5.0, 10.0, Some("Tests")),
                grade(f64::NAN, 10.0, Some("Tests")),
                grade(10.0, f64::INFINITY, Some("Tests")),
                grade(6.0, -4.0, Some("Tests")),
            ],
        );

        let row = &summary.categories[0];
        assert_eq!(row.earned, 16.0);
        assert_eq!(row.possible, 20.0);
        assert_close(summary.overall_percent, 80.0);
    }

    #[test]
    fn non_finite_weight_contributes_nothing() {
        let summary = compute_summary(
            &[category("Tests", f64::NAN), category("Labs", -10.0)],
            &[grade(1.0, 2.0, Some("Tests"))],
        );

        assert_eq!(summary.sum_weights, 0.0);
        assert_eq!(summary.categories[0].weight_percent, 0.0);
        assert_close(summary.overall_percent, 50.0);
    }

    #[test]
    fn colliding_definitions_share_one_bucket() {
        let summary = compute_summary(
            &[category("Tests", 50.0), category(" tests", 50.0)],
            &[grade(9.0, 10.0, Some("TESTS"))],
        );

        assert_eq!(summary.categories.len(), 2);
        assert_eq!(summary.categories[0].earned, 9.0);
        assert_eq!(summary.categories[1].earned, 9.0);
        assert_close(summary.overall_percent, 90.0);
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let categories = vec![category("Tests", 70.0), category("Homework", 30.0)];
        let assignments = vec![
            grade(17.0, 20.0, Some("Tests")),
            grade(4.0, 5.0, Some("Homework")),
            grade(1.0, 1.0, Some("Bonus")),
        ];

        let first = compute_summary(&categories, &assignments);
        let second = compute_summary(&categories, &assignments);
        assert_eq!(first, second);
    }
}
