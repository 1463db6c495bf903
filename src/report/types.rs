use crate::checker::PrCheckError;

/// Reconciliation outcome for one PR, ordered best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    GoodMatch,
    PotentialMismatch,
    NotFound,
}

impl Verdict {
    /// All verdicts, best first.
    pub const ALL: [Verdict; 3] = [
        Verdict::GoodMatch,
        Verdict::PotentialMismatch,
        Verdict::NotFound,
    ];

    /// Stable integer code used by the verdict cache.
    pub fn code(self) -> i64 {
        match self {
            Verdict::GoodMatch => 0,
            Verdict::PotentialMismatch => 1,
            Verdict::NotFound => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Verdict> {
        match code {
            0 => Some(Verdict::GoodMatch),
            1 => Some(Verdict::PotentialMismatch),
            2 => Some(Verdict::NotFound),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Verdict::GoodMatch => "✅",
            Verdict::PotentialMismatch => "⚠️",
            Verdict::NotFound => "❌",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::GoodMatch => write!(f, "Good match"),
            Verdict::PotentialMismatch => write!(f, "Potential mismatch"),
            Verdict::NotFound => write!(f, "Not found"),
        }
    }
}

/// Outcome of checking a single PR against its changelog entry.
#[derive(Debug)]
pub struct PrResult {
    /// PR number
    pub number: u64,
    /// Description text taken from the changelog entry (empty if not found)
    pub changelog_desc: String,
    /// PR title from GitHub (empty if the lookup failed)
    pub pr_title: String,
    pub verdict: Verdict,
    /// Why the check failed, or a non-fatal problem met along the way
    pub error: Option<PrCheckError>,
}

impl PrResult {
    pub(crate) fn new(number: u64) -> Self {
        Self {
            number,
            changelog_desc: String::new(),
            pr_title: String::new(),
            verdict: Verdict::NotFound,
            error: None,
        }
    }
}

/// Complete report over one changelog section.
#[derive(Debug)]
pub struct Report {
    /// Repository the PRs belong to ("owner/name")
    pub repo: String,
    /// Changelog section that was checked
    pub section: String,
    /// Results grouped by verdict, best first
    pub results: Vec<PrResult>,
    pub good_matches: usize,
    pub potential_mismatches: usize,
    pub not_found: usize,
    /// Worst verdict across all results (None when nothing was checked)
    pub worst: Option<Verdict>,
}
