pub mod types;

pub use types::{PrResult, Report, Verdict};

use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Build a Report from per-PR results.
///
/// Results are grouped by verdict, best first; the changelog order is kept
/// within each group.
pub fn build(mut results: Vec<PrResult>, section: &str, repo: &str) -> Report {
    results.sort_by_key(|r| r.verdict);

    let count = |verdict: Verdict| results.iter().filter(|r| r.verdict == verdict).count();
    let good_matches = count(Verdict::GoodMatch);
    let potential_mismatches = count(Verdict::PotentialMismatch);
    let not_found = count(Verdict::NotFound);
    let worst = results.iter().map(|r| r.verdict).max();

    Report {
        repo: repo.to_string(),
        section: section.to_string(),
        results,
        good_matches,
        potential_mismatches,
        not_found,
        worst,
    }
}

/// Output the report to the terminal (default) or to a markdown file.
#[instrument(skip(report), fields(section = %report.section, checked = report.results.len()))]
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

/// Format and print the report to the terminal with colors.
///
/// Changelog check: org/repo [Unreleased]
///
/// ✅ #100: Fix bug
/// ⚠️ #101: Add new feature
///     PR title: "Refactor storage"
///
/// ═══ Summary ═══
/// Good matches: 1
/// ...
fn print_terminal_report(report: &Report) {
    println!();
    println!(
        "Changelog check: {} [{}]",
        report.repo.bold(),
        report.section
    );
    println!();

    for result in &report.results {
        println!(
            "{} {}: {}",
            result.verdict.symbol(),
            format!("#{}", result.number).bold(),
            colorize_verdict(result.verdict, display_desc(result))
        );
        if result.verdict != Verdict::GoodMatch && !result.pr_title.is_empty() {
            println!("    PR title: \"{}\"", result.pr_title);
        }
        if let Some(error) = &result.error {
            println!("    Error: {}", error.to_string().dimmed());
        }
    }

    println!();
    println!("═══ Summary ═══");
    println!("{} Good matches: {}", Verdict::GoodMatch.symbol(), report.good_matches);
    println!(
        "{} Potential mismatches: {}",
        Verdict::PotentialMismatch.symbol(),
        report.potential_mismatches
    );
    println!("{} Not found: {}", Verdict::NotFound.symbol(), report.not_found);
    println!();
}

/// Write the report as a markdown file, one heading per verdict group.
fn write_markdown_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    let mut md = String::new();
    md.push_str(&format!(
        "# Changelog check: {} [{}]\n\n",
        report.repo, report.section
    ));

    for verdict in Verdict::ALL {
        let group: Vec<&PrResult> = report
            .results
            .iter()
            .filter(|r| r.verdict == verdict)
            .collect();
        if group.is_empty() {
            continue;
        }

        md.push_str(&format!(
            "## {} {} ({})\n\n",
            verdict.symbol(),
            verdict,
            group.len()
        ));
        for result in group {
            md.push_str(&format!("- **#{}**: {}\n", result.number, display_desc(result)));
            if !result.pr_title.is_empty() {
                md.push_str(&format!("  - PR title: {}\n", result.pr_title));
            }
            if let Some(error) = &result.error {
                md.push_str(&format!("  - Error: {}\n", error));
            }
        }
        md.push('\n');
    }

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Good matches: {}\n", report.good_matches));
    md.push_str(&format!(
        "- Potential mismatches: {}\n",
        report.potential_mismatches
    ));
    md.push_str(&format!("- Not found: {}\n", report.not_found));

    std::fs::write(path, md)?;
    Ok(())
}

fn display_desc(result: &PrResult) -> &str {
    if result.changelog_desc.is_empty() {
        "(no changelog description)"
    } else {
        &result.changelog_desc
    }
}

/// Helper to colorize text by verdict for terminal output.
fn colorize_verdict(verdict: Verdict, text: &str) -> colored::ColoredString {
    match verdict {
        Verdict::GoodMatch => text.green(),
        Verdict::PotentialMismatch => text.yellow().bold(),
        Verdict::NotFound => text.red().bold(),
    }
}
