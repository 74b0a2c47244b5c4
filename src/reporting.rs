//! Reporting sink for recoverable per-item events
//!
//! Every download failure, skipped duplicate and failed commit is published on
//! a broadcast channel and passed to an optional message handler. Reporting
//! never influences control flow: a full channel or a missing subscriber is
//! ignored.

use crate::types::{DownloadItem, ImportMessage, ImportMessageKind};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Synchronous callback invoked for every reported message
pub type MessageHandler = Arc<dyn Fn(&ImportMessage) + Send + Sync>;

/// Fan-out point for [`ImportMessage`]s (cloneable, all clones share state)
#[derive(Clone)]
pub struct Reporter {
    event_tx: broadcast::Sender<ImportMessage>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
}

impl Reporter {
    /// Create a reporter whose channel buffers up to `capacity` messages per subscriber
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            event_tx,
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Subscribe to all messages reported from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ImportMessage> {
        self.event_tx.subscribe()
    }

    /// Install (or clear) the message handler
    pub fn set_handler(&self, handler: Option<MessageHandler>) {
        if let Ok(mut slot) = self.handler.write() {
            *slot = handler;
        }
    }

    /// Report an event about `item`
    pub fn report<S>(&self, kind: ImportMessageKind, item: &DownloadItem<S>, reason: Option<String>) {
        let message = ImportMessage {
            kind,
            owner: item.owner(),
            file_name: item.target_file_name().to_string(),
            source: item.source().to_string(),
            display_order: item.display_order(),
            reason,
            batch_id: item.batch_id().map(str::to_string),
        };

        match kind {
            ImportMessageKind::DuplicateSkipped => tracing::info!(
                batch = message.batch_id.as_deref().unwrap_or(""),
                owner = %message.owner,
                file = %message.file_name,
                source = %message.source,
                "Duplicate skipped"
            ),
            _ => tracing::warn!(
                kind = ?kind,
                batch = message.batch_id.as_deref().unwrap_or(""),
                owner = %message.owner,
                file = %message.file_name,
                source = %message.source,
                reason = message.reason.as_deref().unwrap_or(""),
                "Media import item failed"
            ),
        }

        let handler = self.handler.read().ok().and_then(|h| h.clone());
        if let Some(handler) = handler {
            handler(&message);
        }

        // No subscribers is fine
        let _ = self.event_tx.send(message);
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}
