pub mod extract;
pub mod types;

pub use extract::description_for_pr;
pub use types::{EntryStats, Section};

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Label of the section holding changes that have not been released yet.
pub const UNRELEASED: &str = "Unreleased";

static PR_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\\#(\d+)\]").expect("PR reference pattern must compile"));

static VERSION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^## \[([^\]]+)\]").expect("version header pattern must compile"));

static SEMVER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v?\d+\.\d+\.\d+$").expect("semver label pattern must compile"));

#[derive(Debug, Error)]
pub enum ChangelogError {
    #[error("Failed to read changelog file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("no section found for {label} in changelog file")]
    SectionNotFound { label: String },
}

/// Read the full changelog text from disk.
pub fn read_changelog(path: &Path) -> Result<String, ChangelogError> {
    Ok(std::fs::read_to_string(path)?)
}

/// The literal marker a changelog line uses to reference a PR: `[\#N]`.
pub fn pr_marker(pr_number: u64) -> String {
    format!("[\\#{}]", pr_number)
}

/// Bring a version label into the form used for header comparison:
/// bare `X.Y.Z` labels get a `v` prefix, "Unreleased" is left alone.
fn normalize_label(label: &str) -> String {
    if label == UNRELEASED || label.starts_with('v') {
        label.to_string()
    } else {
        format!("v{}", label)
    }
}

fn header_label(line: &str) -> Option<&str> {
    VERSION_HEADER
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Pick the label to check when none was requested: "Unreleased" if such a
/// header exists, otherwise the first (most recent) semantic-version header.
fn default_label(full_text: &str) -> String {
    let labels: Vec<&str> = full_text.lines().filter_map(header_label).collect();

    if labels.iter().any(|l| *l == UNRELEASED) {
        return UNRELEASED.to_string();
    }

    labels
        .into_iter()
        .find(|l| SEMVER_LABEL.is_match(l))
        .map(str::to_string)
        .unwrap_or_else(|| UNRELEASED.to_string())
}

/// Locate the section for `version_label` in the changelog text.
///
/// An empty label resolves to "Unreleased", falling back to the most recent
/// version header. The section runs from its `## [<label>]` header up to the
/// next line starting with `## [` or the end of the text.
pub fn locate_section(full_text: &str, version_label: &str) -> Result<Section, ChangelogError> {
    let label = if version_label.is_empty() {
        let resolved = default_label(full_text);
        debug!(label = %resolved, "resolved default changelog section");
        resolved
    } else {
        version_label.to_string()
    };
    let wanted = normalize_label(&label);

    let mut lines: Vec<&str> = Vec::new();
    let mut in_section = false;
    for line in full_text.lines() {
        if in_section {
            if line.starts_with("## [") {
                break;
            }
            lines.push(line);
            continue;
        }
        if header_label(line).is_some_and(|found| normalize_label(found) == wanted) {
            in_section = true;
            lines.push(line);
        }
    }

    let has_body = lines.iter().skip(1).any(|l| !l.trim().is_empty());
    if !in_section || !has_body {
        return Err(ChangelogError::SectionNotFound { label });
    }

    Ok(Section {
        label,
        text: lines.join("\n"),
    })
}

/// Count entry lines and the ones without (or with several) PR references.
pub fn entry_stats(section: &str) -> EntryStats {
    let mut stats = EntryStats::default();
    for (index, line) in section.lines().enumerate() {
        if !line.starts_with('*') {
            continue;
        }
        stats.entries += 1;
        if !line.contains("[\\#") {
            stats.without_pr += 1;
            debug!(line = index + 1, entry = %line, "entry without PR number");
        }
        if PR_REFERENCE.find_iter(line).count() > 1 {
            stats.multi_pr += 1;
            debug!(line = index + 1, entry = %line, "entry with multiple PR numbers");
        }
    }
    stats
}

/// Collect every PR number referenced in the section, de-duplicated,
/// in first-seen order.
pub fn extract_pr_numbers(section: &str) -> Vec<u64> {
    let stats = entry_stats(section);
    info!(
        entries = stats.entries,
        without_pr = stats.without_pr,
        multi_pr = stats.multi_pr,
        "scanned changelog entries"
    );

    let mut seen = HashSet::new();
    PR_REFERENCE
        .captures_iter(section)
        .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .filter(|n| seen.insert(*n))
        .collect()
}

/// First line of the section that references `pr_number`, if any.
pub fn find_line_for_pr(section: &str, pr_number: u64) -> Option<&str> {
    let marker = pr_marker(pr_number);
    section.lines().find(|line| line.contains(&marker))
}
