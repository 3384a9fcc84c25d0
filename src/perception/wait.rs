use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::errors::{AgentError, AgentResult};

pub const MAX_WAIT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(7000),
            poll_interval: Duration::from_millis(750),
        }
    }
}

impl WaitConfig {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.verification_timeout_ms),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms.max(1)),
        }
    }

    /// Model-requested waits are capped at [`MAX_WAIT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_WAIT);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Satisfied { polls: u32, elapsed: Duration },
    TimedOut { polls: u32 },
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied { .. })
    }
}

/// Poll `check` until it reports `true`, the deadline passes, or `cancel` fires.
///
/// The check always runs at least once. A check error counts as "not yet"
/// so that a single failed perception refresh cannot end the wait early.
pub async fn wait_for_condition<F, Fut>(
    mut check: F,
    cfg: &WaitConfig,
    cancel: &CancellationToken,
) -> AgentResult<WaitOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AgentResult<bool>>,
{
    let start = Instant::now();
    let deadline = start + cfg.timeout.min(MAX_WAIT);
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(AgentError::Aborted);
        }

        polls += 1;
        match check().await {
            Ok(true) => {
                let elapsed = start.elapsed();
                tracing::debug!(polls, elapsed_ms = elapsed.as_millis() as u64, "condition satisfied");
                return Ok(WaitOutcome::Satisfied { polls, elapsed });
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(polls, error = %e, "condition check failed"),
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(polls, timeout_ms = cfg.timeout.as_millis() as u64, "condition timed out");
            return Ok(WaitOutcome::TimedOut { polls });
        }
        let nap = cfg.poll_interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Aborted),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}
