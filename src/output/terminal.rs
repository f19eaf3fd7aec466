// Colored terminal output for analysis results.
//
// main.rs display functions delegate here.

use colored::Colorize;

use crate::models::{AnalysisReport, Effectiveness, Role};

/// Display the per-topic conclusions table.
pub fn display_conclusions(report: &AnalysisReport) {
    if report.conclusions.is_empty() {
        println!("No conclusions produced. Check that the opinions file has usable text.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Conclusions ({} topics) ===", report.conclusions.len()).bold()
    );
    println!();

    println!(
        "  {:<32} {:<12} {:>6}  {}",
        "Topic".dimmed(),
        "Verdict".dimmed(),
        "Count".dimmed(),
        "Summary".dimmed(),
    );
    println!("  {}", "-".repeat(90).dimmed());

    for conclusion in &report.conclusions {
        let members = report
            .comments
            .iter()
            .filter(|c| c.topic == conclusion.topic)
            .count();
        let summary = if conclusion.summary.is_empty() {
            "(no summary)".dimmed().to_string()
        } else {
            super::truncate_chars(&conclusion.summary, 60)
        };

        println!(
            "  {:<32} {:<12} {:>6}  {}",
            super::truncate_chars(&conclusion.topic, 30),
            colorize_effectiveness(conclusion.effectiveness),
            members,
            summary,
        );
    }

    println!();
    display_role_breakdown(report);

    if report.failed_batches > 0 {
        println!(
            "  {} {} classification batch(es) failed and were skipped",
            "!".bright_red(),
            report.failed_batches
        );
    }
    if report.failed_summary_batches > 0 {
        println!(
            "  {} {} summarization batch(es) failed and were skipped",
            "!".bright_red(),
            report.failed_summary_batches
        );
    }
}

/// One line with the count of each role across all comments.
fn display_role_breakdown(report: &AnalysisReport) {
    let parts: Vec<String> = Role::ALL
        .iter()
        .map(|role| {
            let count = report.comments.iter().filter(|c| c.role == *role).count();
            format!("{}: {}", role, count)
        })
        .collect();
    println!(
        "  {} comments classified ({})",
        report.comments.len(),
        parts.join(", ").dimmed()
    );
}

/// Colorize an effectiveness verdict.
fn colorize_effectiveness(effectiveness: Effectiveness) -> colored::ColoredString {
    let label = effectiveness.as_str();
    match effectiveness {
        Effectiveness::Effective => label.green().bold(),
        Effectiveness::Adequate => label.yellow(),
        Effectiveness::Ineffective => label.red(),
    }
}
