pub mod types;

pub use types::{OutcomeSummary, Report, RiskRow, Tone};

use crate::automation::{ApproveWithMergeOutcome, MergeStatus};
use crate::risk::RiskLevel;
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Count approvals and failures. A batch-level `error` yields a data-less
/// summary: the caller passes no outcomes in that case.
pub fn summarize(outcomes: &[ApproveWithMergeOutcome], error: Option<&str>) -> OutcomeSummary {
    let approved = outcomes.iter().filter(|o| o.approve_success).count();
    OutcomeSummary {
        approved,
        failed: outcomes.len() - approved,
        error: error.map(str::to_string),
    }
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(scope = %report.scope, rows = report.rows.len()))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

fn print_terminal_report(report: &Report) {
    println!();
    println!("═══ Risk annotations: {} ═══", report.scope);
    if report.rows.is_empty() {
        println!("  No open pull requests.");
    }
    for row in &report.rows {
        match &row.analysis {
            Some(analysis) => println!(
                "  #{:<5} {:<8} {:>3}  {}",
                row.pr_number,
                colorize_risk(analysis.level),
                analysis.score,
                row.title
            ),
            None => println!(
                "  #{:<5} {:<8} {:>3}  {}",
                row.pr_number,
                "n/a".dimmed(),
                "-",
                row.title
            ),
        }
    }
    println!();

    if !report.candidates.is_empty() {
        println!("═══ Auto-approve candidates ═══");
        for candidate in &report.candidates {
            println!(
                "  • #{} [{}] {}",
                candidate.pr_number,
                colorize_risk(candidate.risk_level),
                candidate.reason
            );
        }
        println!();
    }

    if !report.outcomes.is_empty() {
        println!("═══ Outcomes ═══");
        for outcome in &report.outcomes {
            let approval = if outcome.approve_success {
                "approved".green().to_string()
            } else {
                format!(
                    "approval failed ({})",
                    outcome.approve_error.as_deref().unwrap_or("unknown error")
                )
                .red()
                .to_string()
            };
            println!(
                "  • #{}: {}, {}",
                outcome.pr_number,
                approval,
                colorize_merge(&outcome.auto_merge_status)
            );
        }
        println!();
    }

    if let Some(summary) = &report.summary {
        let headline = match summary.tone() {
            Tone::Positive => summary.headline().green().bold(),
            Tone::Negative => summary.headline().red().bold(),
        };
        println!("═══ {} ═══", headline);
    } else if let Some(notice) = &report.notice {
        println!("═══ {} ═══", notice.yellow());
    }
    println!();
}

fn write_markdown_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    let mut md = String::new();
    md.push_str(&format!("# Auto-approve report: {}\n\n", report.scope));

    md.push_str("## Risk annotations\n\n");
    if report.rows.is_empty() {
        md.push_str("No open pull requests.\n\n");
    } else {
        md.push_str("| PR | Risk | Score | Title |\n|---|---|---|---|\n");
        for row in &report.rows {
            let (level, score) = match &row.analysis {
                Some(a) => (a.level.to_string(), a.score.to_string()),
                None => ("n/a".to_string(), "-".to_string()),
            };
            md.push_str(&format!(
                "| #{} | {} | {} | {} |\n",
                row.pr_number, level, score, row.title
            ));
        }
        md.push('\n');
    }

    if !report.candidates.is_empty() {
        md.push_str("## Auto-approve candidates\n\n");
        for candidate in &report.candidates {
            md.push_str(&format!(
                "- **#{}** [{}] {}\n",
                candidate.pr_number, candidate.risk_level, candidate.reason
            ));
        }
        md.push('\n');
    }

    if !report.outcomes.is_empty() {
        md.push_str("## Outcomes\n\n");
        for outcome in &report.outcomes {
            let approval = if outcome.approve_success {
                "approved".to_string()
            } else {
                format!(
                    "approval failed ({})",
                    outcome.approve_error.as_deref().unwrap_or("unknown error")
                )
            };
            md.push_str(&format!(
                "- **#{}**: {}, {}\n",
                outcome.pr_number, approval, outcome.auto_merge_status
            ));
        }
        md.push('\n');
    }

    if let Some(summary) = &report.summary {
        md.push_str(&format!("## Result: {}\n", summary.headline()));
    } else if let Some(notice) = &report.notice {
        md.push_str(&format!("## Result: {}\n", notice));
    }

    std::fs::write(path, md)?;
    Ok(())
}

fn colorize_risk(level: RiskLevel) -> colored::ColoredString {
    match level {
        RiskLevel::High => "HIGH".red().bold(),
        RiskLevel::Medium => "MEDIUM".yellow().bold(),
        RiskLevel::Low => "LOW".green().bold(),
    }
}

fn colorize_merge(status: &MergeStatus) -> colored::ColoredString {
    match status {
        MergeStatus::Enabled => status.to_string().green(),
        MergeStatus::Skipped => status.to_string().normal(),
        MergeStatus::SkippedDueToApproveFail => status.to_string().yellow(),
        MergeStatus::Failed(_) => status.to_string().red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::AutoApproveCandidate;
    use crate::risk::{AnalysisResult, ChangeCounts};

    fn sample_report() -> Report {
        let outcomes = vec![
            ApproveWithMergeOutcome::approved(1, MergeStatus::Enabled),
            ApproveWithMergeOutcome::approval_failed(2, "403"),
        ];
        Report {
            scope: "acme/widgets".to_string(),
            rows: vec![
                RiskRow {
                    pr_number: 1,
                    title: "Fix typo".to_string(),
                    analysis: Some(AnalysisResult {
                        score: 5,
                        level: RiskLevel::Low,
                        factors: vec![],
                        files: vec![],
                        counts: ChangeCounts::default(),
                    }),
                },
                RiskRow {
                    pr_number: 2,
                    title: "Flaky".to_string(),
                    analysis: None,
                },
            ],
            candidates: vec![AutoApproveCandidate {
                pr_number: 1,
                title: "Fix typo".to_string(),
                risk_level: RiskLevel::Low,
                reason: "risk score 5 (LOW)".to_string(),
            }],
            summary: Some(summarize(&outcomes, None)),
            outcomes,
            notice: None,
        }
    }

    #[test]
    fn test_summarize_counts_add_up() {
        let outcomes = vec![
            ApproveWithMergeOutcome::approved(1, MergeStatus::Enabled),
            ApproveWithMergeOutcome::approved(2, MergeStatus::Failed("conflict".to_string())),
            ApproveWithMergeOutcome::approval_failed(3, "403"),
        ];
        let summary = summarize(&outcomes, None);
        assert_eq!(summary.approved, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.approved + summary.failed, outcomes.len());
    }

    #[test]
    fn test_merge_failure_does_not_count_as_failed_approval() {
        let outcomes = vec![ApproveWithMergeOutcome::approved(
            1,
            MergeStatus::Failed("not mergeable".to_string()),
        )];
        let summary = summarize(&outcomes, None);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.tone(), Tone::Positive);
    }

    #[test]
    fn test_summarize_transport_error() {
        let summary = summarize(&[], Some("connection refused"));
        assert_eq!((summary.approved, summary.failed), (0, 0));
        assert_eq!(summary.tone(), Tone::Negative);
    }

    #[test]
    fn test_write_markdown_report() {
        let report = sample_report();
        let path = std::env::temp_dir().join("pr_autopilot_report.md");
        write_markdown_report(&report, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Auto-approve report: acme/widgets"));
        assert!(content.contains("| #1 | LOW | 5 | Fix typo |"));
        assert!(content.contains("| #2 | n/a | - | Flaky |"));
        assert!(
            content.contains("- **#2**: approval failed (403), merge skipped (approval failed)")
        );
        assert!(content.contains("## Result: 1 approved, 1 failed"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_markdown_notice_without_summary() {
        let mut report = sample_report();
        report.outcomes.clear();
        report.summary = None;
        report.notice = Some("Automation is disabled for this repository".to_string());
        let path = std::env::temp_dir().join("pr_autopilot_notice.md");
        output(&report, Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("## Result: Automation is disabled"));
        assert!(!content.contains("## Outcomes"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_output_to_terminal() {
        let report = sample_report();
        // Should not panic
        output(&report, None).unwrap();
    }
}
