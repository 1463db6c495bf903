pub mod similarity;

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::cache::CacheStore;
use crate::changelog::{self, ChangelogError};
use crate::github::{GitHubError, PrTitleSource, RepoRef};
use crate::oracle::SimilarityOracle;
use crate::report::PrResult;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    #[error("no PR numbers found in the {section} changelog section")]
    NoPrNumbers { section: String },
}

/// Why a single PR could not be checked (or a non-fatal problem attached to
/// an otherwise valid result).
#[derive(Debug, Error)]
pub enum PrCheckError {
    #[error("PR #{0} not found in changelog section")]
    NotInSection(u64),

    #[error("couldn't extract description for PR #{0}")]
    DescriptionMissing(u64),

    #[error("failed to look up title for PR #{number}: {source}")]
    TitleLookup {
        number: u64,
        #[source]
        source: GitHubError,
    },
}

/// Outcome of checking one changelog section.
#[derive(Debug)]
pub struct ChangelogCheck {
    /// Label of the section that was checked
    pub section: String,
    /// Every PR number referenced in the section, before sampling
    pub pr_numbers: Vec<u64>,
    /// One result per checked PR, in changelog order
    pub results: Vec<PrResult>,
}

/// Pick which PRs to check. A `limit` of 0 (or one covering every PR) keeps
/// them all; a limit of exactly 3 takes the first, middle and last PR;
/// any other limit takes the first `limit` PRs.
pub fn select_sample(pr_numbers: &[u64], limit: usize) -> Vec<u64> {
    if limit == 0 || limit >= pr_numbers.len() {
        return pr_numbers.to_vec();
    }
    if limit == 3 {
        let middle = pr_numbers.len() / 2;
        return vec![
            pr_numbers[0],
            pr_numbers[middle],
            pr_numbers[pr_numbers.len() - 1],
        ];
    }
    pr_numbers[..limit].to_vec()
}

/// Reconciles changelog entries against the PRs that produced them.
pub struct Checker {
    repo: RepoRef,
    titles: Arc<dyn PrTitleSource>,
    oracle: Option<Arc<dyn SimilarityOracle>>,
    cache: Arc<CacheStore>,
}

impl Checker {
    pub fn new(repo: RepoRef, titles: Arc<dyn PrTitleSource>, cache: Arc<CacheStore>) -> Self {
        Self {
            repo,
            titles,
            oracle: None,
            cache,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn SimilarityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Check every PR referenced in the requested changelog section.
    ///
    /// An empty `version_label` selects "Unreleased" (or the latest version).
    /// Only a missing section or a section without PR references fails the
    /// whole run; per-PR problems are reported in the results.
    #[instrument(skip(self, changelog_text), fields(repo = %self.repo))]
    pub async fn check_changelog(
        &self,
        changelog_text: &str,
        version_label: &str,
        limit: usize,
    ) -> Result<ChangelogCheck, CheckError> {
        let section = changelog::locate_section(changelog_text, version_label)?;
        info!(section = %section.label, "checking changelog section");

        let pr_numbers = changelog::extract_pr_numbers(&section.text);
        if pr_numbers.is_empty() {
            return Err(CheckError::NoPrNumbers {
                section: section.label,
            });
        }
        info!(count = pr_numbers.len(), "found unique PR numbers");
        debug!(?pr_numbers, "PR numbers in section");

        let selected = select_sample(&pr_numbers, limit);
        if selected.len() < pr_numbers.len() {
            info!(limit, selected = ?selected, "limiting PRs to check");
        }

        let mut results = Vec::with_capacity(selected.len());
        for number in selected {
            let result = self
                .check_pr(number, &section.text)
                .instrument(info_span!("check_pr", pr = number))
                .await;
            debug!(verdict = %result.verdict, "PR checked");
            results.push(result);
        }

        Ok(ChangelogCheck {
            section: section.label,
            pr_numbers,
            results,
        })
    }

    /// Check one PR against its entry in `section`. Always yields a result.
    pub async fn check_pr(&self, number: u64, section: &str) -> PrResult {
        let mut result = PrResult::new(number);

        let Some(line) = changelog::find_line_for_pr(section, number) else {
            result.error = Some(PrCheckError::NotInSection(number));
            return result;
        };

        result.changelog_desc = changelog::description_for_pr(line, number);
        if result.changelog_desc.is_empty() {
            result.error = Some(PrCheckError::DescriptionMissing(number));
            return result;
        }

        let key = self.repo.pr_key(number);
        match self.cache.get_verdict(&key, &result.changelog_desc) {
            Ok(Some(verdict)) => {
                debug!("using cached validation result");
                result.verdict = verdict;
                // title is only needed for display here
                match self.titles.pr_title(&self.repo, number).await {
                    Ok(title) => result.pr_title = title,
                    Err(source) => {
                        result.error = Some(PrCheckError::TitleLookup { number, source })
                    }
                }
                return result;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read validation cache"),
        }

        match self.titles.pr_title(&self.repo, number).await {
            Ok(title) => result.pr_title = title,
            Err(source) => {
                result.error = Some(PrCheckError::TitleLookup { number, source });
                return result;
            }
        }

        result.verdict = similarity::check_similarity(
            &result.changelog_desc,
            &result.pr_title,
            self.oracle.as_deref(),
        )
        .await;

        if let Err(e) = self
            .cache
            .put_verdict(&key, &result.changelog_desc, result.verdict)
        {
            warn!(error = %e, "failed to cache validation result");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use crate::report::Verdict;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECTION: &str = "## [Unreleased]\n* (client) [\\#100](url) Fix bug\n";

    /// Title source backed by a map; missing PRs are `NotFound`.
    #[derive(Default)]
    struct FakeTitles {
        titles: HashMap<u64, String>,
        rate_limited: bool,
        calls: AtomicUsize,
    }

    impl FakeTitles {
        fn with(titles: &[(u64, &str)]) -> Self {
            Self {
                titles: titles.iter().map(|(n, t)| (*n, t.to_string())).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PrTitleSource for FakeTitles {
        async fn pr_title(&self, _repo: &RepoRef, number: u64) -> Result<String, GitHubError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.rate_limited {
                return Err(GitHubError::RateLimited { reset_at: None });
            }
            self.titles
                .get(&number)
                .cloned()
                .ok_or(GitHubError::NotFound { number })
        }
    }

    struct YesOracle;

    #[async_trait]
    impl SimilarityOracle for YesOracle {
        async fn same_change(&self, _: &str, _: &str) -> Result<bool, OracleError> {
            Ok(true)
        }
    }

    fn repo() -> RepoRef {
        RepoRef::new("org", "repo")
    }

    fn checker(titles: Arc<FakeTitles>, cache: Arc<CacheStore>) -> Checker {
        Checker::new(repo(), titles, cache)
    }

    fn changelog_with(count: u64) -> String {
        let mut text = String::from("# Changelog\n\n## [Unreleased]\n\n");
        for n in 1..=count {
            text.push_str(&format!("* [\\#{n}](https://github.com/org/repo/pull/{n}) Change {n}\n"));
        }
        text.push_str("\n## [v1.0.0]\n\n* [\\#999](u) Released\n");
        text
    }

    #[test]
    fn test_select_sample_three_picks_first_middle_last() {
        let prs: Vec<u64> = (0..10).map(|i| 100 + i).collect();
        assert_eq!(select_sample(&prs, 3), vec![100, 105, 109]);
    }

    #[test]
    fn test_select_sample_takes_prefix() {
        let prs = vec![5, 6, 7, 8, 9];
        assert_eq!(select_sample(&prs, 2), vec![5, 6]);
        assert_eq!(select_sample(&prs, 4), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_select_sample_no_limit() {
        let prs = vec![5, 6, 7];
        assert_eq!(select_sample(&prs, 0), prs);
        assert_eq!(select_sample(&prs, 3), prs);
        assert_eq!(select_sample(&prs, 10), prs);
    }

    #[tokio::test]
    async fn test_good_match_scenario() {
        let titles = Arc::new(FakeTitles::with(&[(100, "Fix bug in client")]));
        let checker = checker(titles, Arc::new(CacheStore::disabled()));

        let result = checker.check_pr(100, SECTION).await;
        assert_eq!(result.verdict, Verdict::GoodMatch);
        assert_eq!(result.changelog_desc, "Fix bug");
        assert_eq!(result.pr_title, "Fix bug in client");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_potential_mismatch_scenario() {
        let titles = Arc::new(FakeTitles::with(&[(100, "Add new feature")]));
        let checker = checker(titles, Arc::new(CacheStore::disabled()));

        let result = checker.check_pr(100, SECTION).await;
        assert_eq!(result.verdict, Verdict::PotentialMismatch);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_oracle_can_upgrade_mismatch() {
        let titles = Arc::new(FakeTitles::with(&[(100, "Add new feature")]));
        let checker =
            checker(titles, Arc::new(CacheStore::disabled())).with_oracle(Arc::new(YesOracle));

        let result = checker.check_pr(100, SECTION).await;
        assert_eq!(result.verdict, Verdict::GoodMatch);
    }

    #[tokio::test]
    async fn test_pr_missing_from_section() {
        let titles = Arc::new(FakeTitles::default());
        let checker = checker(titles.clone(), Arc::new(CacheStore::disabled()));

        let result = checker.check_pr(200, SECTION).await;
        assert_eq!(result.verdict, Verdict::NotFound);
        let error = result.error.unwrap().to_string();
        assert!(error.contains("not found in changelog section"));
        assert_eq!(titles.calls(), 0);
    }

    #[tokio::test]
    async fn test_description_missing() {
        let section = "## [Unreleased]\n* [\\#100] no link here\n";
        let checker = checker(Arc::new(FakeTitles::default()), Arc::new(CacheStore::disabled()));

        let result = checker.check_pr(100, section).await;
        assert_eq!(result.verdict, Verdict::NotFound);
        assert!(matches!(
            result.error,
            Some(PrCheckError::DescriptionMissing(100))
        ));
    }

    #[tokio::test]
    async fn test_title_lookup_failure_is_not_found() {
        let checker = checker(Arc::new(FakeTitles::default()), Arc::new(CacheStore::disabled()));

        let result = checker.check_pr(100, SECTION).await;
        assert_eq!(result.verdict, Verdict::NotFound);
        assert_eq!(result.changelog_desc, "Fix bug");
        assert!(matches!(
            result.error,
            Some(PrCheckError::TitleLookup {
                source: GitHubError::NotFound { number: 100 },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_verdict_is_cached() {
        let cache = Arc::new(CacheStore::in_memory().unwrap());
        let titles = Arc::new(FakeTitles::with(&[(100, "Add new feature")]));
        let checker = checker(titles, cache.clone());

        checker.check_pr(100, SECTION).await;
        assert_eq!(
            cache.get_verdict(&repo().pr_key(100), "Fix bug").unwrap(),
            Some(Verdict::PotentialMismatch)
        );
    }

    #[tokio::test]
    async fn test_cached_verdict_wins_over_recomputation() {
        let cache = Arc::new(CacheStore::in_memory().unwrap());
        cache
            .put_verdict(&repo().pr_key(100), "Fix bug", Verdict::GoodMatch)
            .unwrap();
        let titles = Arc::new(FakeTitles::with(&[(100, "Add new feature")]));
        let checker = checker(titles.clone(), cache);

        let result = checker.check_pr(100, SECTION).await;
        assert_eq!(result.verdict, Verdict::GoodMatch);
        assert_eq!(result.pr_title, "Add new feature");
        assert_eq!(titles.calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_verdict_survives_title_failure() {
        let cache = Arc::new(CacheStore::in_memory().unwrap());
        cache
            .put_verdict(&repo().pr_key(100), "Fix bug", Verdict::PotentialMismatch)
            .unwrap();
        let titles = Arc::new(FakeTitles {
            rate_limited: true,
            ..FakeTitles::default()
        });
        let checker = checker(titles, cache);

        let result = checker.check_pr(100, SECTION).await;
        assert_eq!(result.verdict, Verdict::PotentialMismatch);
        assert!(result.pr_title.is_empty());
        assert!(matches!(
            result.error,
            Some(PrCheckError::TitleLookup {
                source: GitHubError::RateLimited { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_description_change_invalidates_cached_verdict() {
        let cache = Arc::new(CacheStore::in_memory().unwrap());
        cache
            .put_verdict(&repo().pr_key(100), "Old wording", Verdict::GoodMatch)
            .unwrap();
        let titles = Arc::new(FakeTitles::with(&[(100, "Add new feature")]));
        let checker = checker(titles, cache.clone());

        let result = checker.check_pr(100, SECTION).await;
        assert_eq!(result.verdict, Verdict::PotentialMismatch);
        assert_eq!(
            cache.get_verdict(&repo().pr_key(100), "Fix bug").unwrap(),
            Some(Verdict::PotentialMismatch)
        );
    }

    #[tokio::test]
    async fn test_check_changelog_all_prs_in_order() {
        let titles = Arc::new(FakeTitles::with(&[
            (1, "Change 1"),
            (2, "Something else"),
        ]));
        let checker = checker(titles, Arc::new(CacheStore::disabled()));

        let check = checker
            .check_changelog(&changelog_with(3), "", 0)
            .await
            .unwrap();
        assert_eq!(check.section, "Unreleased");
        assert_eq!(check.pr_numbers, vec![1, 2, 3]);

        let verdicts: Vec<(u64, Verdict)> =
            check.results.iter().map(|r| (r.number, r.verdict)).collect();
        assert_eq!(
            verdicts,
            vec![
                (1, Verdict::GoodMatch),
                (2, Verdict::PotentialMismatch),
                (3, Verdict::NotFound),
            ]
        );
    }

    #[tokio::test]
    async fn test_check_changelog_sample_of_three() {
        let checker = checker(Arc::new(FakeTitles::default()), Arc::new(CacheStore::disabled()));

        let check = checker
            .check_changelog(&changelog_with(10), "", 3)
            .await
            .unwrap();
        let numbers: Vec<u64> = check.results.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 6, 10]);
        assert_eq!(check.pr_numbers.len(), 10);
    }

    #[tokio::test]
    async fn test_check_changelog_rate_limit_does_not_abort_batch() {
        let titles = Arc::new(FakeTitles {
            rate_limited: true,
            ..FakeTitles::default()
        });
        let checker = checker(titles.clone(), Arc::new(CacheStore::disabled()));

        let check = checker
            .check_changelog(&changelog_with(4), "", 0)
            .await
            .unwrap();
        assert_eq!(check.results.len(), 4);
        assert!(check.results.iter().all(|r| r.verdict == Verdict::NotFound));
        assert_eq!(titles.calls(), 4);
    }

    #[tokio::test]
    async fn test_check_changelog_empty_file() {
        let checker = checker(Arc::new(FakeTitles::default()), Arc::new(CacheStore::disabled()));
        let err = checker.check_changelog("", "v1.0.0", 0).await.unwrap_err();
        assert!(matches!(
            err,
            CheckError::Changelog(ChangelogError::SectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_check_changelog_without_pr_numbers() {
        let text = "## [Unreleased]\n\n* Entry without reference\n";
        let checker = checker(Arc::new(FakeTitles::default()), Arc::new(CacheStore::disabled()));
        let err = checker.check_changelog(text, "", 0).await.unwrap_err();
        assert!(matches!(err, CheckError::NoPrNumbers { .. }));
    }

    #[tokio::test]
    async fn test_check_changelog_explicit_version() {
        let titles = Arc::new(FakeTitles::with(&[(999, "Released")]));
        let checker = checker(titles, Arc::new(CacheStore::disabled()));

        let check = checker
            .check_changelog(&changelog_with(2), "1.0.0", 0)
            .await
            .unwrap();
        assert_eq!(check.pr_numbers, vec![999]);
        assert_eq!(check.results[0].verdict, Verdict::GoodMatch);
    }
}
