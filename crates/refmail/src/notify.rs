//! Post-receive orchestration for one push.
//!
//! Notification is best-effort and side-channel: every failure here is
//! logged and contained, and the triggering push is never rejected or
//! reverted. There are no retries; a blind retry risks duplicate mail,
//! which is worse than a dropped notification.

use crate::{ConfigurationGate, NotificationEngine, NotificationRequest, RefChange};
use std::path::PathBuf;

/// Push metadata supplied by the host per invocation.
#[derive(Debug, Clone)]
pub struct PushContext {
    /// `<project-key>/<repo-slug>`.
    pub repository: String,
    /// Pushing user as `Display Name <email>`.
    pub submitter: String,
    /// Absolute path of the repository's git data directory.
    pub git_dir: PathBuf,
}

/// Terminal state of one notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No recipients are configured; nothing to do and not an error.
    NoRecipients,
    /// The engine ran and exited zero.
    Succeeded,
    /// The engine failed to launch, or exited non-zero. Diagnostics are
    /// logged; the push is unaffected.
    Failed,
    /// The attempt was abandoned before the engine completed.
    Interrupted,
}

/// Run the notification for one push.
///
/// Always returns normally: engine failures surface only as the `Failed`
/// outcome plus logged diagnostics.
pub async fn notify<G, E>(
    gate: &G,
    engine: &E,
    ctx: &PushContext,
    changes: Vec<RefChange>,
) -> Outcome
where
    G: ConfigurationGate + ?Sized,
    E: NotificationEngine,
{
    let Some(settings) = gate.settings_for(&ctx.repository) else {
        return Outcome::NoRecipients;
    };
    let Some(recipients) = settings.recipients() else {
        return Outcome::NoRecipients;
    };

    let request = NotificationRequest {
        recipients: recipients.to_string(),
        submitter: ctx.submitter.clone(),
        repository: ctx.repository.clone(),
        git_dir: ctx.git_dir.clone(),
        filter: settings.filter(),
        changes,
    };

    match engine.notify(&request).await {
        Ok(output) if output.success() => {
            tracing::debug!(repository = %ctx.repository, "mail engine exited cleanly");
            Outcome::Succeeded
        }
        Ok(output) => {
            tracing::error!(
                repository = %ctx.repository,
                code = ?output.code,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "mail engine failed"
            );
            Outcome::Failed
        }
        Err(error) => {
            tracing::error!(repository = %ctx.repository, %error, "failed to run mail engine");
            Outcome::Failed
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{notify, Outcome, PushContext};
    use crate::{
        ConfigurationGate, NotificationEngine, NotificationRequest, RefChange, RepoSettings,
        ZERO_SHA,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use subprocess::{RunError, RunOutput};

    /// What a StubEngine reports back for each notify call.
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum StubBehavior {
        ExitZero,
        ExitNonZero,
        FailLaunch,
    }

    /// In-process engine: counts launches and captures the last request.
    pub(crate) struct StubEngine {
        pub behavior: StubBehavior,
        pub launches: AtomicUsize,
        pub last_request: Mutex<Option<NotificationRequest>>,
    }

    impl StubEngine {
        pub fn new(behavior: StubBehavior) -> Self {
            StubEngine {
                behavior,
                launches: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    impl NotificationEngine for StubEngine {
        async fn notify(&self, request: &NotificationRequest) -> Result<RunOutput, RunError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());

            match self.behavior {
                StubBehavior::ExitZero => Ok(RunOutput {
                    code: Some(0),
                    stdout: String::new(),
                    stderr: String::new(),
                }),
                StubBehavior::ExitNonZero => Ok(RunOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "bad recipient".to_string(),
                }),
                StubBehavior::FailLaunch => Err(RunError::Launch {
                    program: "python2".to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
            }
        }
    }

    /// Gate returning a fixed answer for every repository.
    pub(crate) struct StubGate(pub Option<RepoSettings>);

    impl ConfigurationGate for StubGate {
        fn settings_for(&self, _repository: &str) -> Option<RepoSettings> {
            self.0.clone()
        }
    }

    pub(crate) fn ctx() -> PushContext {
        PushContext {
            repository: "PROJ/widgets".to_string(),
            submitter: "Ada Lovelace <ada@x.com>".to_string(),
            git_dir: "/repositories/data/1".into(),
        }
    }

    pub(crate) fn changes() -> Vec<RefChange> {
        vec![RefChange {
            from: ZERO_SHA.to_string(),
            to: "abc123abc123abc123abc123abc123abc123abc1".to_string(),
            name: "refs/heads/main".to_string(),
        }]
    }

    fn configured() -> StubGate {
        StubGate(Some(RepoSettings {
            email_addresses: Some("a@x.com".to_string()),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_no_recipients_launches_nothing() {
        let engine = StubEngine::new(StubBehavior::ExitZero);

        for gate in [StubGate(None), StubGate(Some(RepoSettings::default()))] {
            let outcome = notify(&gate, &engine, &ctx(), changes()).await;
            assert_eq!(outcome, Outcome::NoRecipients);
        }
        assert_eq!(engine.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clean_exit_succeeds() {
        let engine = StubEngine::new(StubBehavior::ExitZero);
        let outcome = notify(&configured(), &engine, &ctx(), changes()).await;

        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(engine.launches.load(Ordering::SeqCst), 1);

        let request = engine.last_request.lock().unwrap().take().unwrap();
        assert_eq!(request.recipients, "a@x.com");
        assert_eq!(request.repository, "PROJ/widgets");
        assert_eq!(request.changes, changes());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_nonzero_exit_is_contained() {
        let engine = StubEngine::new(StubBehavior::ExitNonZero);
        let outcome = notify(&configured(), &engine, &ctx(), changes()).await;

        // Returned normally with a diagnostic, rather than propagating.
        assert_eq!(outcome, Outcome::Failed);
        assert!(logs_contain("bad recipient"));
        assert!(logs_contain("mail engine failed"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_launch_error_is_contained() {
        let engine = StubEngine::new(StubBehavior::FailLaunch);
        let outcome = notify(&configured(), &engine, &ctx(), changes()).await;

        assert_eq!(outcome, Outcome::Failed);
        assert!(logs_contain("failed to run mail engine"));
    }
}
