use std::fmt::Write;

use super::{CheckResult, QualityReport, QualityStatus};

/// One-paragraph plain-language summary of a report.
pub fn summarize(report: &QualityReport) -> String {
    let verdict = match report.global_status {
        QualityStatus::Passed => "passes validation",
        QualityStatus::Warning => "passes with warnings",
        QualityStatus::Failed => "fails validation",
    };
    let mut text = format!(
        "The dataset of {} rows and {} columns scores {:.2} overall ({}) and {}.",
        report.row_count, report.column_count, report.global_score, report.global_grade, verdict
    );

    if let Some(weakest) = weakest(&report.checks) {
        if weakest.status != QualityStatus::Passed {
            let _ = write!(
                text,
                " The weakest dimension is {} at {:.2}.",
                weakest.category.title().to_lowercase(),
                weakest.score
            );
        }
    }

    let issues = report.issue_count();
    if issues == 0 {
        text.push_str(" No issues were detected.");
    } else {
        let failing = report
            .checks
            .iter()
            .flat_map(|c| &c.issues)
            .filter(|i| i.status() == QualityStatus::Failed)
            .count();
        let _ = write!(text, " {} issues were detected", issues);
        if failing > 0 {
            let _ = write!(text, ", {} of them severe", failing);
        }
        text.push('.');
    }
    text
}

fn weakest(checks: &[CheckResult]) -> Option<&CheckResult> {
    checks
        .iter()
        .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
}

/// Markdown rendering of the full report.
pub fn render_markdown(report: &QualityReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Data Quality Report\n");
    let _ = writeln!(
        md,
        "**Global score:** {:.3} ({}, {})  ",
        report.global_score, report.global_status, report.global_grade
    );
    let _ = writeln!(
        md,
        "**Rows:** {} | **Columns:** {} | **Generated:** {}\n",
        report.row_count,
        report.column_count,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(md, "{}\n", report.narrative);

    let _ = writeln!(md, "## Checks\n");
    let _ = writeln!(md, "| Check | Score | Status | Grade | Outcome | Issues |");
    let _ = writeln!(md, "|---|---:|---|---|---|---:|");
    for check in &report.checks {
        let _ = writeln!(
            md,
            "| {} | {:.3} | {} | {} | {:?} | {} |",
            check.category.title(),
            check.score,
            check.status,
            check.grade,
            check.outcome,
            check.issues.len()
        );
    }

    for check in report.checks.iter().filter(|c| !c.issues.is_empty()) {
        let _ = writeln!(md, "\n## {}\n", check.category.title());
        for issue in &check.issues {
            let field = issue
                .field
                .as_deref()
                .map(|f| format!("`{}` ", f))
                .unwrap_or_default();
            let _ = write!(md, "- **{}** {}{}", issue.severity, field, issue.description);
            if issue.affected_rows > 0 {
                let _ = write!(md, " ({} rows)", issue.affected_rows);
            }
            md.push('\n');
        }
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Severity;
    use crate::pipeline::processing::quality_gate::{
        CheckCategory, QualityGrade, QualityIssue, QualityIssueType, ValidationOutcome,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn report(score: f64, issues: Vec<QualityIssue>) -> QualityReport {
        QualityReport {
            generated_at: Utc::now(),
            row_count: 10,
            column_count: 4,
            checks: vec![CheckResult {
                category: CheckCategory::CrossField,
                score,
                status: if score >= 0.8 {
                    QualityStatus::Passed
                } else {
                    QualityStatus::Warning
                },
                grade: QualityGrade::Fair,
                outcome: ValidationOutcome::Valid,
                issues,
                details: BTreeMap::new(),
            }],
            global_score: score,
            global_status: QualityStatus::Warning,
            global_grade: QualityGrade::Fair,
            narrative: String::new(),
        }
    }

    #[test]
    fn test_summary_names_weakest_dimension() {
        let issue = QualityIssue::new(QualityIssueType::RatioAnomaly, Severity::Error, "odd")
            .on_field("price_final")
            .rows(2);
        let text = summarize(&report(0.7, vec![issue]));
        assert!(text.contains("passes with warnings"));
        assert!(text.contains("cross-field consistency"));
        assert!(text.contains("1 of them severe"));
    }

    #[test]
    fn test_markdown_lists_issues() {
        let issue = QualityIssue::new(QualityIssueType::RatioAnomaly, Severity::Warning, "odd ratio")
            .on_field("price_final")
            .rows(2);
        let md = render_markdown(&report(0.7, vec![issue]));
        assert!(md.starts_with("# Data Quality Report"));
        assert!(md.contains("| Cross-field consistency | 0.700 |"));
        assert!(md.contains("- **warning** `price_final` odd ratio (2 rows)"));
    }
}
