//! Human-in-the-loop boundary: clarification questions and approval prompts.
//!
//! Requests block the calling task until the human answers or the task's
//! cancellation token fires, in which case they resolve to `Aborted`.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::errors::{AgentError, AgentResult};

#[async_trait]
pub trait HumanChannel: Send + Sync {
    async fn ask(&self, question: &str) -> AgentResult<String>;
    async fn confirm(&self, proposal: &str) -> AgentResult<bool>;
}

/// A pending request delivered to the foreground.
#[derive(Debug)]
pub enum HumanRequest {
    Ask {
        question: String,
        reply: oneshot::Sender<String>,
    },
    Confirm {
        proposal: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Forwards requests over an mpsc channel to whoever owns the receiver
/// (a UI, a test harness) and waits for the oneshot reply.
pub struct ChannelHuman {
    tx: mpsc::Sender<HumanRequest>,
    cancel: CancellationToken,
}

impl ChannelHuman {
    pub fn new(cancel: CancellationToken) -> (Self, mpsc::Receiver<HumanRequest>) {
        let (tx, rx) = mpsc::channel(8);
        (Self { tx, cancel }, rx)
    }

    async fn round_trip<T>(&self, request: HumanRequest, rx: oneshot::Receiver<T>) -> AgentResult<T> {
        self.tx
            .send(request)
            .await
            .map_err(|_| AgentError::Human("foreground is gone".into()))?;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AgentError::Aborted),
            reply = rx => reply.map_err(|_| AgentError::Aborted),
        }
    }
}

#[async_trait]
impl HumanChannel for ChannelHuman {
    async fn ask(&self, question: &str) -> AgentResult<String> {
        let (reply, rx) = oneshot::channel();
        tracing::info!(question = %question, "asking user");
        self.round_trip(
            HumanRequest::Ask {
                question: question.to_string(),
                reply,
            },
            rx,
        )
        .await
    }

    async fn confirm(&self, proposal: &str) -> AgentResult<bool> {
        let (reply, rx) = oneshot::channel();
        tracing::info!("requesting user approval");
        self.round_trip(
            HumanRequest::Confirm {
                proposal: proposal.to_string(),
                reply,
            },
            rx,
        )
        .await
    }
}

/// Terminal prompts via `dialoguer`, run on the blocking pool.
pub struct ConsoleHuman {
    cancel: CancellationToken,
}

impl ConsoleHuman {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl HumanChannel for ConsoleHuman {
    async fn ask(&self, question: &str) -> AgentResult<String> {
        let prompt = question.to_string();
        let task = tokio::task::spawn_blocking(move || {
            dialoguer::Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        });
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AgentError::Aborted),
            joined = task => joined
                .map_err(|e| AgentError::Human(format!("prompt task: {e}")))?
                .map_err(|e| AgentError::Human(e.to_string())),
        }
    }

    async fn confirm(&self, proposal: &str) -> AgentResult<bool> {
        println!("{proposal}");
        let task = tokio::task::spawn_blocking(|| {
            dialoguer::Confirm::new()
                .with_prompt("Approve?")
                .default(false)
                .interact()
        });
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AgentError::Aborted),
            joined = task => joined
                .map_err(|e| AgentError::Human(format!("prompt task: {e}")))?
                .map_err(|e| AgentError::Human(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_is_delivered() {
        let (human, mut rx) = ChannelHuman::new(CancellationToken::new());
        tokio::spawn(async move {
            if let Some(HumanRequest::Ask { reply, .. }) = rx.recv().await {
                let _ = reply.send("the blue one".into());
            }
        });
        assert_eq!(human.ask("which button?").await.unwrap(), "the blue one");
    }

    #[tokio::test]
    async fn cancellation_while_waiting_aborts() {
        let cancel = CancellationToken::new();
        let (human, mut rx) = ChannelHuman::new(cancel.clone());
        let holder = tokio::spawn(async move {
            // hold the request without answering
            let pending = rx.recv().await;
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(pending);
        });
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            c.cancel();
        });
        let err = human.confirm("register tool?").await.unwrap_err();
        assert!(matches!(err, AgentError::Aborted));
        holder.abort();
    }

    #[tokio::test]
    async fn dropped_reply_counts_as_abort() {
        let (human, mut rx) = ChannelHuman::new(CancellationToken::new());
        tokio::spawn(async move {
            let _ = rx.recv().await;
        });
        assert!(matches!(human.ask("?").await, Err(AgentError::Aborted)));
    }
}
