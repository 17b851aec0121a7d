//! Outgoing mail backends.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

/// Delivers email messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            from = %message.from,
            to = %message.to.join(", "),
            subject = %message.subject,
            "Outgoing email\n{}",
            message.body
        );
        Ok(())
    }
}

/// Collects messages in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<EmailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.outbox
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox mutex poisoned"))?
            .push(message.clone());
        Ok(())
    }
}
