//! Closing queue handler.
//!
//! A Closing queue waits for its PodGroups to leave. Every Close or Update
//! request re-checks the drain condition; the caller requeues the queue for
//! as long as it stays Closing.

use tracing::debug;

use vcqueue_common::crd::{Queue, QueueState};
use vcqueue_common::Error;

use super::{close_state, QueueOperations};
use crate::types::QueueAction;

pub(super) async fn execute(
    queue: &Queue,
    ops: &dyn QueueOperations,
    action: QueueAction,
) -> Result<QueueState, Error> {
    match action {
        QueueAction::Open => {
            debug!("queue is closing, ignoring open request");
            Ok(QueueState::Closing)
        }
        QueueAction::Close => ops.close_queue(queue, close_state).await,
        QueueAction::Update => ops.sync_queue(queue, close_state).await,
    }
}
