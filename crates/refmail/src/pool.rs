//! Bounded pool running notifications off the host's request path.
//!
//! The subprocess wait is unbounded by design (a legitimate mailer may run
//! long), so the host's request thread must never hold it. Submissions are
//! tasks gated by a semaphore; the handle resolves to the outcome, and
//! aborting it abandons the attempt.

use crate::{notify, ConfigurationGate, NotificationEngine, Outcome, PushContext, RefChange};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct NotifyPool {
    semaphore: Arc<Semaphore>,
}

impl NotifyPool {
    /// A pool running at most `limit` mail engines concurrently.
    pub fn new(limit: usize) -> Self {
        NotifyPool {
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    /// Submit one push for notification. The call returns immediately;
    /// the work runs once a permit is available.
    pub fn submit<G, E>(
        &self,
        gate: Arc<G>,
        engine: Arc<E>,
        ctx: PushContext,
        changes: Vec<RefChange>,
    ) -> NotifyHandle
    where
        G: ConfigurationGate + 'static,
        E: NotificationEngine,
    {
        let semaphore = self.semaphore.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            notify(gate.as_ref(), engine.as_ref(), &ctx, changes).await
        });
        NotifyHandle { handle }
    }
}

/// Handle of one submitted notification.
#[derive(Debug)]
pub struct NotifyHandle {
    handle: tokio::task::JoinHandle<Outcome>,
}

impl NotifyHandle {
    /// Abandon the attempt. The running engine, if any, is killed; the
    /// joined outcome becomes `Interrupted`.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub async fn join(self) -> Outcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(error) if error.is_cancelled() => {
                tracing::warn!("notification abandoned before completion");
                Outcome::Interrupted
            }
            Err(error) => {
                tracing::error!(%error, "notification task panicked");
                Outcome::Failed
            }
        }
    }
}
