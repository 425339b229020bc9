use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{CategoryRow, ClassRecord, SummaryResult};

const ATTENTION_THRESHOLD: f64 = 70.0;

pub fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(value) => format!("{value:.2}%"),
        None => "—".to_string(),
    }
}

/// Weighted categories scoring below the threshold, lowest first.
pub fn needs_attention(summary: &SummaryResult) -> Vec<&CategoryRow> {
    let mut rows: Vec<&CategoryRow> = summary
        .categories
        .iter()
        .filter(|row| row.weight_percent > 0.0)
        .filter(|row| row.percent.is_some_and(|percent| percent < ATTENTION_THRESHOLD))
        .collect();

    rows.sort_by(|a, b| {
        a.percent
            .partial_cmp(&b.percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}

pub fn build_report(class: &ClassRecord, summary: &SummaryResult, generated_on: NaiveDate) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} Grade Summary", class.name);
    let mut details = Vec::new();
    if let Some(period) = class.period {
        details.push(format!("period {period}"));
    }
    if let Some(teacher) = class.teacher.as_deref() {
        details.push(teacher.to_string());
    }
    if details.is_empty() {
        let _ = writeln!(output, "Generated {generated_on}");
    } else {
        let _ = writeln!(output, "Generated {} ({})", generated_on, details.join(", "));
    }
    let _ = writeln!(output);

    match summary.overall_percent {
        Some(_) => {
            let _ = writeln!(
                output,
                "**Overall: {}**",
                format_percent(summary.overall_percent)
            );
        }
        None => {
            let _ = writeln!(output, "**Overall: —** No graded work yet.");
        }
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "Declared category weights total {:.1}%.", summary.sum_weights);
    if summary.sum_weights > 0.0 && (summary.sum_weights - 100.0).abs() > 1e-9 {
        let _ = writeln!(
            output,
            "> Weights do not add up to 100%; the overall grade is scaled to the graded categories."
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Categories");

    if summary.categories.is_empty() {
        let _ = writeln!(output, "No categories or grades recorded for this class.");
    } else {
        let _ = writeln!(output, "| Category | Weight | Earned | Possible | Percent |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for row in summary.categories.iter() {
            let weight = if row.is_orphan() {
                "unweighted".to_string()
            } else {
                format!("{:.1}%", row.weight_percent)
            };
            let _ = writeln!(
                output,
                "| {} | {} | {:.2} | {:.2} | {} |",
                row.name,
                weight,
                row.earned,
                row.possible,
                format_percent(row.percent)
            );
        }
    }

    let flagged = needs_attention(summary);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");

    if flagged.is_empty() {
        let _ = writeln!(
            output,
            "No weighted category is below {ATTENTION_THRESHOLD:.0}%."
        );
    } else {
        for row in flagged {
            let _ = writeln!(
                output,
                "- {}: {} ({:.1}% of the grade)",
                row.name,
                format_percent(row.percent),
                row.weight_percent
            );
        }
    }

    output
}
