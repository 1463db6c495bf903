use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use super::pr_marker;

/// One way of pulling the free-text description out of a changelog entry line.
struct Extractor {
    name: &'static str,
    pattern: Regex,
}

impl Extractor {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("description extractor pattern must compile"),
        }
    }

    fn apply(&self, line: &str) -> Option<String> {
        let captures = self.pattern.captures(line)?;
        let description = captures.get(1)?.as_str().trim();
        if description.is_empty() {
            return None;
        }
        trace!(extractor = self.name, "description extracted");
        Some(description.to_string())
    }
}

/// Strategies tried in order; the first one producing a non-empty description wins.
static EXTRACTORS: Lazy<Vec<Extractor>> = Lazy::new(|| {
    vec![
        // * (component) [\#N](url) Description
        Extractor::new(
            "component",
            r"^\* \([^)]*\) \[\\#\d+\]\([^)]+\) (.+)$",
        ),
        // * [\#N](url) Description
        Extractor::new("plain", r"^\* \[\\#\d+\]\([^)]+\) (.+)$"),
        // anything after the first link that is followed by text
        Extractor::new("trailing", r"\[\\#\d+\]\([^)]+\) (.+)$"),
    ]
});

/// Extract the description text of the entry line that references `pr_number`.
///
/// Returns an empty string when the line does not carry the PR's marker or
/// when no `[\#N](url)` link construct can be found.
pub fn description_for_pr(line: &str, pr_number: u64) -> String {
    if !line.contains(&pr_marker(pr_number)) {
        return String::new();
    }

    EXTRACTORS
        .iter()
        .find_map(|extractor| extractor.apply(line))
        .unwrap_or_default()
}
