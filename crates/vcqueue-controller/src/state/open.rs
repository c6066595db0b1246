//! Open queue handler.

use vcqueue_common::crd::{Queue, QueueState};
use vcqueue_common::Error;

use super::{close_state, keep_state, open_state, QueueOperations};
use crate::types::QueueAction;

/// Handle an action against an Open queue.
///
/// Open re-affirms the state, Close starts draining and Update only
/// refreshes the status counts.
pub(super) async fn execute(
    queue: &Queue,
    ops: &dyn QueueOperations,
    action: QueueAction,
) -> Result<QueueState, Error> {
    match action {
        QueueAction::Open => ops.open_queue(queue, open_state).await,
        QueueAction::Close => ops.close_queue(queue, close_state).await,
        QueueAction::Update => ops.sync_queue(queue, keep_state).await,
    }
}
