use tracing::{debug, warn};

use crate::oracle::SimilarityOracle;
use crate::report::Verdict;

/// Lower-case the description, drop backticks and cut it at the first period.
///
/// Abbreviations such as "e.g." end the description early; callers rely on
/// that exact cut.
pub fn normalize_description(description: &str) -> String {
    let mut normalized = description.replace('`', "").to_lowercase();
    if let Some(idx) = normalized.find('.') {
        normalized.truncate(idx);
    }
    normalized
}

pub fn normalize_title(title: &str) -> String {
    title.to_lowercase()
}

/// Either string contains the other.
pub fn substring_match(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

/// Judge whether a changelog description matches the PR title.
///
/// A substring match on the normalized texts is accepted outright; otherwise
/// the oracle, when present, gets a say. Oracle failures count as no evidence.
/// Never yields `NotFound`.
pub async fn check_similarity(
    description: &str,
    pr_title: &str,
    oracle: Option<&dyn SimilarityOracle>,
) -> Verdict {
    if substring_match(&normalize_description(description), &normalize_title(pr_title)) {
        debug!("substring match");
        return Verdict::GoodMatch;
    }

    if let Some(oracle) = oracle {
        match oracle.same_change(pr_title, description).await {
            Ok(true) => {
                debug!("oracle judged texts equivalent");
                return Verdict::GoodMatch;
            }
            Ok(false) => debug!("oracle judged texts different"),
            Err(e) => warn!(error = %e, "similarity oracle failed"),
        }
    }

    Verdict::PotentialMismatch
}
