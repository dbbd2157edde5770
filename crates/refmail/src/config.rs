//! Per-repository notification settings, with project-level defaults.

use crate::{FilterMode, RefFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Settings of one repository, as stored by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Comma- or space-separated recipient list. Notification is skipped
    /// entirely when absent or blank; that's not an error.
    #[serde(default)]
    pub email_addresses: Option<String>,

    /// Ref-name filter pattern; empty disables filtering.
    #[serde(default)]
    pub ref_filter_regex: String,

    /// false: the pattern excludes matching refs (the default).
    /// true: only matching refs are reported.
    #[serde(default)]
    pub reverse_regex: bool,
}

impl RepoSettings {
    /// The configured recipients, or None when notification is disabled.
    pub fn recipients(&self) -> Option<&str> {
        match self.email_addresses.as_deref().map(str::trim) {
            Some("") | None => None,
            some => some,
        }
    }

    pub fn filter(&self) -> RefFilter {
        RefFilter {
            pattern: self.ref_filter_regex.clone(),
            mode: if self.reverse_regex {
                FilterMode::Include
            } else {
                FilterMode::Exclude
            },
        }
    }
}

/// Project-level defaults, applied when a repository has no recipients of
/// its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default)]
    pub default_recipients: Option<String>,
}

/// ConfigurationGate supplies settings ahead of a notification run.
/// The host's settings store implements this; `Config` is the file-backed
/// implementation used by the standalone hook.
pub trait ConfigurationGate: Send + Sync {
    /// Settings for `<project-key>/<repo-slug>`, or None when the repository
    /// is entirely unconfigured.
    fn settings_for(&self, repository: &str) -> Option<RepoSettings>;
}

/// On-disk configuration of the hook binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// External runtime which executes the mail engine.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Path of the mail engine's module. Its internals are opaque to us;
    /// deployment decides which engine build to run.
    pub engine_script: PathBuf,

    /// Project defaults, keyed by project key.
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectSettings>,

    /// Repository settings, keyed by `<project-key>/<repo-slug>`.
    #[serde(default)]
    pub repositories: BTreeMap<String, RepoSettings>,
}

fn default_interpreter() -> String {
    "python2".to_string()
}

impl Config {
    pub fn parse_from_json_file(path: &Path) -> anyhow::Result<Self> {
        let out = serde_json::from_slice(&std::fs::read(path)?)?;
        Ok(out)
    }
}

impl ConfigurationGate for Config {
    fn settings_for(&self, repository: &str) -> Option<RepoSettings> {
        let repo = self.repositories.get(repository).cloned();
        let project_key = repository.split('/').next().unwrap_or(repository);
        let project = self.projects.get(project_key);

        let mut settings = match (repo, project) {
            (None, None) => return None,
            (repo, _) => repo.unwrap_or_default(),
        };

        // A repository without recipients of its own inherits the project
        // default.
        if settings.recipients().is_none() {
            if let Some(project) = project {
                settings.email_addresses = project.default_recipients.clone();
            }
        }
        Some(settings)
    }
}

/// Field-level errors surfaced to the host's settings form, as
/// `(field, message)` pairs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<(String, String)>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.push((field.to_string(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(f, m)| (f.as_str(), m.as_str()))
    }
}

/// Synchronous checks of a settings form submission. The filter pattern has
/// its own asynchronous check in `validate`.
pub fn validate_settings(settings: &RepoSettings, errors: &mut FieldErrors) {
    if settings.recipients().is_none() {
        errors.add(
            "email_addresses",
            "Email address field is blank, please supply one",
        );
    }
}
