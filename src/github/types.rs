use crate::cache::PrKey;

/// A GitHub repository, as parsed by `parse_repo()` in github/mod.rs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// Cache key for a PR in this repository.
    pub fn pr_key(&self, number: u64) -> PrKey {
        PrKey::new(&self.owner, &self.name, number)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The subset of the pulls API response we read.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct PullResponse {
    pub title: String,
}
