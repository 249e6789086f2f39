//! Notification dispatch seam
//!
//! The core renders a message and hands it over with a recipient list.
//! Delivery, phone formatting and receipts belong to the dispatcher.

use std::sync::Mutex;

use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub phone: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn dispatch(&self, message: &str, recipients: &[Recipient]) -> Result<()>;
}

/// Writes every notification to the log instead of delivering it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn dispatch(&self, message: &str, recipients: &[Recipient]) -> Result<()> {
        for recipient in recipients {
            info!(
                name = %recipient.name,
                phone = recipient.phone.as_deref().unwrap_or("-"),
                message,
                "Notification"
            );
        }
        Ok(())
    }
}

/// A dispatched notification, as captured by [`MemoryNotifier`]
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub message: String,
    pub recipients: Vec<Recipient>,
}

/// Keeps dispatched notifications in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn dispatch(&self, message: &str, recipients: &[Recipient]) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentNotification {
                message: message.to_string(),
                recipients: recipients.to_vec(),
            });
        Ok(())
    }
}
