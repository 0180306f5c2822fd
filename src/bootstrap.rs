//! Startup phase that makes the model service usable.
//!
//! Waits for the model service to answer, pulls the configured model when it
//! is missing, and publishes the outcome on a `watch` channel that `/health`
//! reads. A failed round is retried until it succeeds or the process shuts
//! down. Requests are served regardless; until bootstrap is `Ready` they may
//! fail with model errors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::llm::LlmClient;

/// Readiness of the model service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    Pending,
    Ready,
    Failed(String),
}

impl BootstrapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// How patiently bootstrap waits for the model service.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapOptions {
    pub attempts: u32,
    pub interval: Duration,
    pub pull_if_missing: bool,
}

impl From<&LlmConfig> for BootstrapOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            attempts: config.startup_attempts.max(1),
            interval: Duration::from_secs(config.startup_interval_secs),
            pull_if_missing: config.pull_on_startup,
        }
    }
}

/// Longest pause between bootstrap rounds.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Spawns bootstrap in the background and returns the readiness channel.
///
/// A failed round is published as `Failed` and retried with a doubling
/// delay until it succeeds or `cancel` fires.
pub fn spawn(
    llm: Arc<dyn LlmClient>,
    options: BootstrapOptions,
    cancel: CancellationToken,
) -> (watch::Receiver<BootstrapState>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(BootstrapState::Pending);
    let handle = tokio::spawn(async move {
        let mut delay = options.interval.max(Duration::from_millis(1));

        loop {
            match run(llm.as_ref(), options, &cancel).await {
                BootstrapState::Ready => {
                    info!(model = llm.model(), "Model service ready");
                    tx.send_replace(BootstrapState::Ready);
                    return;
                }
                BootstrapState::Pending => return,
                BootstrapState::Failed(reason) => {
                    warn!(%reason, retry_in = ?delay, "Model bootstrap failed");
                    tx.send_replace(BootstrapState::Failed(reason));
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }
    });
    (rx, handle)
}

/// Runs bootstrap to completion and returns the final state.
///
/// Returns `Pending` only if cancelled first.
pub async fn run(
    llm: &dyn LlmClient,
    options: BootstrapOptions,
    cancel: &CancellationToken,
) -> BootstrapState {
    if !wait_for_service(llm, options, cancel).await {
        if cancel.is_cancelled() {
            return BootstrapState::Pending;
        }
        return BootstrapState::Failed(format!(
            "model service did not answer after {} attempts",
            options.attempts
        ));
    }

    match llm.has_model().await {
        Ok(true) => BootstrapState::Ready,
        Ok(false) if options.pull_if_missing => {
            info!(model = llm.model(), "Model not installed, pulling");
            tokio::select! {
                _ = cancel.cancelled() => BootstrapState::Pending,
                pulled = llm.pull_model() => match pulled {
                    Ok(()) => BootstrapState::Ready,
                    Err(e) => BootstrapState::Failed(e.to_string()),
                },
            }
        }
        Ok(false) => BootstrapState::Failed(format!("model '{}' is not installed", llm.model())),
        Err(e) => BootstrapState::Failed(e.to_string()),
    }
}

async fn wait_for_service(
    llm: &dyn LlmClient,
    options: BootstrapOptions,
    cancel: &CancellationToken,
) -> bool {
    for attempt in 1..=options.attempts {
        if llm.is_available().await {
            return true;
        }
        if attempt % 10 == 1 {
            info!(attempt, attempts = options.attempts, "Waiting for model service");
        }
        if attempt < options.attempts {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(options.interval) => {}
            }
        }
    }
    false
}
