//! Operator-facing push notifications
//!
//! The handle feeds a bounded queue consumed by the notification sink job.
//! Enqueueing never blocks; when the queue is full the message is dropped and
//! logged. A disabled handle (no bot token configured) drops silently.

use crate::constants::NOTIFICATION_QUEUE_SIZE;
use log::warn;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One message towards the operator, optionally carrying image attachments
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub text: String,
    pub images: Vec<PathBuf>,
}

/// Cloneable handle used by all subsystems to emit notifications
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    /// Creates the queue; a disabled notifier discards everything
    pub fn channel(enabled: bool) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE_SIZE);
        let tx = if enabled { Some(tx) } else { None };
        (Self { tx }, rx)
    }

    /// Handle that discards every message
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn notify(&self, text: impl Into<String>) {
        self.push(Notification {
            text: text.into(),
            images: Vec::new(),
        });
    }

    pub fn notify_with_images(&self, text: impl Into<String>, images: Vec<PathBuf>) {
        self.push(Notification {
            text: text.into(),
            images,
        });
    }

    fn push(&self, notification: Notification) {
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return,
        };

        if let Err(TrySendError::Full(dropped)) = tx.try_send(notification) {
            warn!(
                "notification queue is full, can't send: {}",
                dropped.text
            );
        }
    }
}
