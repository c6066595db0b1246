//! Closed queue handler.

use tracing::debug;

use vcqueue_common::crd::{Queue, QueueState};
use vcqueue_common::Error;

use super::{keep_state, open_state, QueueOperations};
use crate::types::QueueAction;

pub(super) async fn execute(
    queue: &Queue,
    ops: &dyn QueueOperations,
    action: QueueAction,
) -> Result<QueueState, Error> {
    match action {
        QueueAction::Open => ops.open_queue(queue, open_state).await,
        QueueAction::Close => {
            debug!("queue is already closed");
            Ok(QueueState::Closed)
        }
        QueueAction::Update => ops.sync_queue(queue, keep_state).await,
    }
}
