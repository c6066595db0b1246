//! Controller error types

use vcqueue_common::Error;

use crate::types::{QueueAction, QueueEvent};

/// Failure of one reconciliation or command
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("sync queue {queue} failed for {source}, event is {event}, action is {action}")]
    SyncQueue {
        queue: String,
        event: QueueEvent,
        action: QueueAction,
        source: Error,
    },

    #[error("failed to delete command <{namespace}/{name}> for {source}")]
    DeleteCommand {
        namespace: String,
        name: String,
        source: Error,
    },

    #[error("caches for {0} did not sync before shutdown")]
    CacheSync(&'static str),
}

impl ControllerError {
    /// Whether the underlying failure is a missing object
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::SyncQueue { source, .. } | Self::DeleteCommand { source, .. } => {
                source.is_not_found()
            }
            Self::CacheSync(_) => false,
        }
    }
}
