use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

pub mod config;
pub mod engine;
pub mod notify;
pub mod pool;
pub mod script;
pub mod validate;

pub use config::{Config, ConfigurationGate, FieldErrors, RepoSettings};
pub use engine::{NotificationEngine, SubprocessEngine};
pub use notify::{notify, Outcome, PushContext};
pub use pool::{NotifyHandle, NotifyPool};
pub use script::Scripts;

/// All-zero object id, marking the absent side of a created or deleted ref.
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// A single update to a named reference within one push.
/// Ordering across a push is the order refs were updated; the mail engine
/// groups its report by that order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RefChange {
    /// Object id the ref pointed at before the push; all-zero if created.
    pub from: String,
    /// Object id the ref points at after the push; all-zero if deleted.
    pub to: String,
    /// Full ref name, e.g. `refs/heads/main`.
    pub name: String,
}

impl RefChange {
    pub fn is_create(&self) -> bool {
        self.from == ZERO_SHA
    }

    pub fn is_delete(&self) -> bool {
        self.to == ZERO_SHA
    }

    /// Wire form fed to the mail engine: `<old-sha> <new-sha> <ref-name>`.
    pub fn stdin_line(&self) -> String {
        format!("{} {} {}", self.from, self.to, self.name)
    }
}

impl std::str::FromStr for RefChange {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.trim_end().splitn(3, ' ');
        let (Some(from), Some(to), Some(name)) = (fields.next(), fields.next(), fields.next())
        else {
            anyhow::bail!("malformed ref change line {line:?}: want `<old> <new> <ref>`");
        };
        Ok(RefChange {
            from: from.to_string(),
            to: to.to_string(),
            name: name.to_string(),
        })
    }
}

/// Everything the mail engine needs for one push, built fresh per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    /// Comma- or space-separated recipient list.
    pub recipients: String,
    /// Pushing user as `Display Name <email>`.
    pub submitter: String,
    /// Repository identifier, `<project-key>/<repo-slug>`.
    pub repository: String,
    /// Absolute path of the repository's git data directory.
    pub git_dir: PathBuf,
    pub filter: RefFilter,
    /// Ref changes in push order.
    pub changes: Vec<RefChange>,
}

/// Ref-name filter handed to the mail engine. Exactly one of the two modes
/// applies to an invocation; an empty pattern means no filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefFilter {
    pub pattern: String,
    pub mode: FilterMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Refs matching the pattern are not reported.
    Exclude,
    /// Only refs matching the pattern are reported.
    Include,
}

impl RefFilter {
    /// Engine flag selecting this filter mode.
    pub fn flag(&self) -> &'static str {
        match self.mode {
            FilterMode::Exclude => "--ref-filter-exclusion-regex",
            FilterMode::Include => "--ref-filter-inclusion-regex",
        }
    }
}

#[derive(clap::Parser, Debug)]
#[clap(about = "Post-receive hook which mails commit notifications for pushed ref updates.")]
pub struct Args {
    /// Path to the JSON configuration file.
    #[clap(short, long, env = "REFMAIL_CONFIG")]
    pub config: PathBuf,

    /// Repository being pushed to, as `<project-key>/<repo-slug>`.
    #[clap(long, required_unless_present = "validate_filter")]
    pub repo_name: Option<String>,

    /// Pushing user, as `Display Name <email>`.
    #[clap(long, default_value = "")]
    pub repo_user: String,

    /// Path of the repository's git data directory.
    #[clap(long, required_unless_present = "validate_filter")]
    pub git_dir: Option<PathBuf>,

    /// Maximum number of concurrently running mail engines.
    #[clap(long, default_value = "4")]
    pub pool_limit: usize,

    /// Validate the given ref-filter pattern against the configured runtime
    /// and exit, instead of processing a push.
    #[clap(long)]
    pub validate_filter: Option<String>,
}

pub async fn run(args: Args) -> anyhow::Result<i32> {
    let config = Config::parse_from_json_file(&args.config).context("reading configuration")?;

    if let Some(pattern) = &args.validate_filter {
        return run_validation(&config, pattern).await;
    }

    let repository = args
        .repo_name
        .expect("clap requires --repo-name outside of validation mode");
    let git_dir = args
        .git_dir
        .expect("clap requires --git-dir outside of validation mode");
    let git_dir = git_dir
        .canonicalize()
        .with_context(|| format!("resolving --git-dir {}", git_dir.display()))?;

    let changes = read_ref_changes(tokio::io::stdin())
        .await
        .context("reading ref changes from stdin")?;
    tracing::debug!(%repository, changes = changes.len(), "received push");

    let scripts = Scripts::materialize();
    let engine = SubprocessEngine::new(&config, &scripts);

    let pool = NotifyPool::new(args.pool_limit);
    let ctx = PushContext {
        repository,
        submitter: args.repo_user,
        git_dir,
    };
    let outcome = pool
        .submit(Arc::new(config), Arc::new(engine), ctx, changes)
        .join()
        .await;
    tracing::info!(?outcome, "notification finished");

    // The push is never failed on account of notification problems.
    Ok(0)
}

async fn run_validation(config: &Config, pattern: &str) -> anyhow::Result<i32> {
    let mut errors = FieldErrors::default();
    validate::validate_into(config.interpreter.as_ref(), pattern, &mut errors).await;

    if errors.is_empty() {
        println!("ok");
        return Ok(0);
    }
    for (field, message) in errors.iter() {
        println!("{field}: {message}");
    }
    Ok(1)
}

/// Parse `<old> <new> <ref>` lines from the hook's stdin, preserving order.
async fn read_ref_changes<R>(reader: R) -> anyhow::Result<Vec<RefChange>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = tokio::io::BufReader::new(reader).lines();
    let mut changes = Vec::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        changes.push(line.parse()?);
    }
    Ok(changes)
}
