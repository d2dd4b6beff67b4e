//! Debounced username availability checks
//!
//! Each keystroke restarts a quiet-period timer; only when it elapses is the
//! directory asked. A keystroke aborts the pending timer but never an in-flight
//! lookup; that lookup's answer is dropped instead when a newer input exists.

use babybill_core::constants::USERNAME_CHECK_DEBOUNCE_MS;
use babybill_core::validation::username_issues;
use babybill_db::UsernameDirectory;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::sequence::Generation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "issues", rename_all = "snake_case")]
pub enum UsernameStatus {
    Idle,
    Invalid(Vec<String>),
    Checking,
    Available,
    Taken,
    CheckFailed,
}

/// Tracks one username field. Must be driven from inside a tokio runtime.
pub struct UsernameChecker {
    directory: Arc<dyn UsernameDirectory>,
    debounce: Duration,
    generation: Arc<Generation>,
    status: Arc<watch::Sender<UsernameStatus>>,
    timer: Option<JoinHandle<()>>,
}

impl UsernameChecker {
    pub fn new(directory: Arc<dyn UsernameDirectory>) -> Self {
        Self::with_debounce(directory, Duration::from_millis(USERNAME_CHECK_DEBOUNCE_MS))
    }

    pub fn with_debounce(directory: Arc<dyn UsernameDirectory>, debounce: Duration) -> Self {
        let (status, _) = watch::channel(UsernameStatus::Idle);
        Self {
            directory,
            debounce,
            generation: Arc::new(Generation::new()),
            status: Arc::new(status),
            timer: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<UsernameStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> UsernameStatus {
        self.status.borrow().clone()
    }

    /// Feed the current content of the username field.
    pub fn input(&mut self, candidate: &str) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let ticket = self.generation.next();

        if candidate.is_empty() {
            self.status.send_replace(UsernameStatus::Idle);
            return;
        }

        let issues = username_issues(candidate);
        if !issues.is_empty() {
            self.status.send_replace(UsernameStatus::Invalid(
                issues.into_iter().map(str::to_string).collect(),
            ));
            return;
        }

        self.status.send_replace(UsernameStatus::Checking);

        let candidate = candidate.to_string();
        let directory = self.directory.clone();
        let generation = self.generation.clone();
        let status = self.status.clone();
        let debounce = self.debounce;

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Detached so that aborting the timer cannot cancel a started lookup.
            tokio::spawn(async move {
                let result = directory.is_available(&candidate).await;
                if !generation.is_current(ticket) {
                    tracing::debug!(candidate = %candidate, "Dropping stale username check");
                    return;
                }
                let next = match result {
                    Ok(true) => UsernameStatus::Available,
                    Ok(false) => UsernameStatus::Taken,
                    Err(e) => {
                        tracing::warn!(error = %e, candidate = %candidate, "Username check failed");
                        UsernameStatus::CheckFailed
                    }
                };
                status.send_replace(next);
            });
        }));
    }

    /// Wait until the latest input has a final status.
    pub async fn settled(&self) -> UsernameStatus {
        let mut receiver = self.status.subscribe();
        let settled = match receiver
            .wait_for(|status| *status != UsernameStatus::Checking)
            .await
        {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        settled
    }
}

impl Drop for UsernameChecker {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
