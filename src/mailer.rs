//! Outbound notifications.
//!
//! Actual email delivery lives outside this service; [`LogMailer`] records the
//! dispatch in the structured log so operators can relay it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, to: &str, user_id: Uuid, activation_token: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_welcome(&self, to: &str, user_id: Uuid, activation_token: &str) -> anyhow::Result<()> {
        tracing::info!(
            to,
            user_id = %user_id,
            activation_token,
            "welcome email dispatched"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentWelcome {
    pub to: String,
    pub user_id: Uuid,
    pub activation_token: String,
}

/// Keeps every message in memory instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentWelcome>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentWelcome> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_token_for(&self, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to)
            .map(|m| m.activation_token)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_welcome(&self, to: &str, user_id: Uuid, activation_token: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mailer state poisoned"))?
            .push(SentWelcome {
                to: to.to_string(),
                user_id,
                activation_token: activation_token.to_string(),
            });
        Ok(())
    }
}
