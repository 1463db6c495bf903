mod cache;
mod changelog;
mod checker;
mod config;
mod github;
mod oracle;
mod report;
#[cfg(test)]
mod test_http;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use cache::CacheStore;
use checker::Checker;
use github::{GitHubClient, RepoRef};
use oracle::OpenAiOracle;
use report::Verdict;

/// Changelog Checker: CLI tool that reconciles the entries of a changelog
/// section against the titles of the GitHub Pull Requests they reference.
#[derive(Parser, Debug)]
#[command(name = "changelog-checker", version, about)]
struct Cli {
    /// Path to the changelog file
    #[arg(default_value = "CHANGELOG.md")]
    changelog: PathBuf,

    /// GitHub repository as owner/name or https://github.com/owner/name
    #[arg(short, long)]
    repo: Option<String>,

    /// Version section to check (e.g. v1.2.0). Defaults to Unreleased,
    /// or the latest version when there is no Unreleased section.
    #[arg(short = 't', long)]
    version_tag: Option<String>,

    /// Check at most this many PRs (3 picks first, middle and last)
    #[arg(short, long, default_value_t = 0)]
    limit: usize,

    /// Optional output file path for markdown report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable the PR title and verdict cache
    #[arg(long)]
    no_cache: bool,

    /// Skip the OpenAI similarity check even when a key is configured
    #[arg(long)]
    no_llm: bool,

    /// Exit with status 1 if any PR is not a good match
    #[arg(long)]
    strict: bool,

    /// Check the GitHub token and OpenAI key, then exit
    #[arg(long)]
    verify_credentials: bool,

    /// Config file (default: .changelog-checker.toml in the current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("changelog_checker={}", default_level))),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;

    let repo_arg = cli.repo.clone().or_else(|| config.github.repo.clone()).ok_or(
        "GitHub repository is required. Pass --repo owner/name or set github.repo in .changelog-checker.toml",
    )?;
    let repo = github::parse_repo(&repo_arg)?;
    debug!(owner = %repo.owner, name = %repo.name, "parsed repository");

    let cache = Arc::new(open_cache(&cli, &config));
    debug!(enabled = cache.is_enabled(), "cache ready");

    let token = config.github_token();
    if token.is_none() {
        warn!("no GitHub token configured; using unauthenticated requests with a low rate limit");
    }
    let github = Arc::new(GitHubClient::new(
        token,
        config.github.api_url.clone(),
        cache.clone(),
    )?);

    let oracle = match config.openai_api_key() {
        Some(key) if !cli.no_llm => Some(Arc::new(OpenAiOracle::new(
            key,
            config.openai.model.clone(),
            config.openai.api_url.clone(),
        )?)),
        _ => {
            debug!("similarity oracle disabled");
            None
        }
    };

    if cli.verify_credentials {
        return verify_credentials(&github, oracle.as_deref(), &repo).await;
    }

    let _main_span = info_span!("changelog_check", repo = %repo).entered();

    info!(path = %cli.changelog.display(), "reading changelog");
    let changelog_text = changelog::read_changelog(&cli.changelog)?;

    let mut checker = Checker::new(repo.clone(), github.clone(), cache);
    if let Some(oracle) = oracle {
        checker = checker.with_oracle(oracle);
    }

    let version_tag = cli.version_tag.as_deref().unwrap_or("");
    let check = checker
        .check_changelog(&changelog_text, version_tag, cli.limit)
        .await?;
    info!(checked = check.results.len(), total = check.pr_numbers.len(), "check complete");
    if let Some(reset) = github.rate_limit().reset_at() {
        warn!(reset_at = %reset.to_rfc3339(), "GitHub rate limit was hit during the run");
    }

    info!("generating report");
    let built_report = report::build(check.results, &check.section, &repo.to_string());
    report::output(&built_report, cli.output.as_deref())?;

    if cli.strict && needs_attention(built_report.worst) {
        warn!(worst = ?built_report.worst, "changelog has entries that need attention");
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// Whether a run's worst verdict should fail `--strict`.
fn needs_attention(worst: Option<Verdict>) -> bool {
    worst.is_some_and(|worst| worst > Verdict::GoodMatch)
}

/// Open the cache selected by flags and config. Failing to open it is not
/// fatal: the run continues uncached.
fn open_cache(cli: &Cli, config: &config::Config) -> CacheStore {
    if cli.no_cache || !config.cache.enabled {
        info!("cache disabled");
        return CacheStore::disabled();
    }

    let Some(path) = config.cache.path.clone().or_else(CacheStore::default_path) else {
        warn!("no home directory found; running without cache");
        return CacheStore::disabled();
    };

    match CacheStore::open(&path) {
        Ok(store) => {
            debug!(path = %path.display(), "opened cache");
            store
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to open cache; running without it");
            CacheStore::disabled()
        }
    }
}

async fn verify_credentials(
    github: &GitHubClient,
    oracle: Option<&OpenAiOracle>,
    repo: &RepoRef,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let github_ok = github.verify_token(repo).await?;
    println!(
        "GitHub access to {}: {}",
        repo,
        if github_ok { "ok" } else { "FAILED" }
    );

    let oracle_ok = match oracle {
        Some(oracle) => {
            let ok = oracle.verify_key().await?;
            println!("OpenAI API key: {}", if ok { "ok" } else { "FAILED" });
            ok
        }
        None => {
            println!("OpenAI API key: not configured");
            true
        }
    };

    if github_ok && oracle_ok {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
