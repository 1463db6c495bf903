/// The text of one release section of a changelog, header line included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Effective label the section was resolved to (e.g. "Unreleased", "v1.2.0")
    pub label: String,
    /// Raw section text, from the header line up to the next version header
    pub text: String,
}

/// Diagnostic counts gathered while scanning a section for PR references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryStats {
    /// Lines starting with `*`
    pub entries: usize,
    /// Entry lines that carry no `[\#N]` marker
    pub without_pr: usize,
    /// Entry lines that reference more than one PR
    pub multi_pr: usize,
}
