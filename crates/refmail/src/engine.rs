//! The engine seam: orchestration talks to a `NotificationEngine`, so it can
//! be exercised in-process without spawning anything.

use crate::{Config, NotificationRequest, RefChange, Scripts};
use std::path::PathBuf;
use subprocess::{Invocation, RunError, RunOutput};

/// Ambient service-account identity; misleading to the engine, so removed.
const USER_VAR: &str = "USER";
/// Where the engine finds the repository's git data.
const GIT_DIR_VAR: &str = "GIT_DIR";

/// NotificationEngine renders and delivers the notification for one push.
pub trait NotificationEngine: Send + Sync + 'static {
    fn notify(
        &self,
        request: &NotificationRequest,
    ) -> impl std::future::Future<Output = Result<RunOutput, RunError>> + Send;
}

/// Engine which shells out to the external mail runtime: the bundled entry
/// wrapper runs the configured engine module, receiving the ref changes on
/// stdin.
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    pub interpreter: PathBuf,
    pub entry: PathBuf,
    pub engine_script: PathBuf,
}

impl SubprocessEngine {
    pub fn new(config: &Config, scripts: &Scripts) -> Self {
        SubprocessEngine {
            interpreter: PathBuf::from(&config.interpreter),
            entry: scripts.entry.clone(),
            engine_script: config.engine_script.clone(),
        }
    }

    /// Build the argv, environment, and stdin payload for one push.
    fn invocation(&self, request: &NotificationRequest) -> Invocation {
        let args = vec![
            self.entry.display().to_string(),
            self.engine_script.display().to_string(),
            "--recipients".to_string(),
            request.recipients.clone(),
            request.filter.flag().to_string(),
            request.filter.pattern.clone(),
            "--repo-user".to_string(),
            request.submitter.clone(),
            "--repo-name".to_string(),
            request.repository.clone(),
        ];

        let mut invocation = Invocation {
            program: self.interpreter.clone(),
            args,
            stdin_lines: request.changes.iter().map(RefChange::stdin_line).collect(),
            ..Default::default()
        };
        invocation.env_removals.insert(USER_VAR.to_string());
        invocation.env_overrides.insert(
            GIT_DIR_VAR.to_string(),
            request.git_dir.display().to_string(),
        );
        invocation
    }
}

impl NotificationEngine for SubprocessEngine {
    fn notify(
        &self,
        request: &NotificationRequest,
    ) -> impl std::future::Future<Output = Result<RunOutput, RunError>> + Send {
        let invocation = self.invocation(request);
        async move { subprocess::run(invocation).await }
    }
}
