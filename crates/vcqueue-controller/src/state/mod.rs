//! Queue lifecycle state machine.
//!
//! Each observed [`QueueState`] has a dedicated module that maps a requested
//! [`QueueAction`] onto exactly one [`QueueOperations`] callback. The module
//! decides *which* operation runs and with which state rule; the operation
//! itself (status recomputation, persistence, events) lives with the caller.

mod closed;
mod closing;
mod open;

use async_trait::async_trait;
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;

use vcqueue_common::crd::{Queue, QueueState};
use vcqueue_common::Error;

use crate::types::QueueAction;

/// Rule producing the next state from the current state and the number of
/// PodGroups still assigned to the queue.
pub type UpdateStateFn = fn(QueueState, usize) -> QueueState;

/// Side-effecting queue operations the state machine dispatches to.
///
/// Each operation recomputes the queue's status, derives the next state
/// with `update_state`, persists the result and returns the state written.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueueOperations: Send + Sync {
    /// Recompute status, keeping or settling the state per `update_state`
    async fn sync_queue(&self, queue: &Queue, update_state: UpdateStateFn)
        -> Result<QueueState, Error>;

    /// Move the queue towards Open
    async fn open_queue(&self, queue: &Queue, update_state: UpdateStateFn)
        -> Result<QueueState, Error>;

    /// Move the queue towards Closed
    async fn close_queue(&self, queue: &Queue, update_state: UpdateStateFn)
        -> Result<QueueState, Error>;
}

/// Always Open
pub fn open_state(_current: QueueState, _pod_groups: usize) -> QueueState {
    QueueState::Open
}

/// Closed once drained, Closing while PodGroups remain
pub fn close_state(_current: QueueState, pod_groups: usize) -> QueueState {
    if pod_groups == 0 {
        QueueState::Closed
    } else {
        QueueState::Closing
    }
}

/// Leave the state untouched
pub fn keep_state(current: QueueState, _pod_groups: usize) -> QueueState {
    current
}

/// Outcome of executing one action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// State the queue was left in
    pub next: QueueState,
    /// Whether the queue needs another drain check later
    pub requeue: bool,
}

impl Transition {
    fn settled(next: QueueState) -> Self {
        Self {
            next,
            requeue: next == QueueState::Closing,
        }
    }
}

/// A queue bound to the handler for its current state
#[derive(Debug)]
pub struct StateHandler<'a> {
    queue: &'a Queue,
    state: QueueState,
}

/// Select the handler for the queue's current state.
///
/// A queue without a recorded state is treated as Open. Any state the
/// controller does not recognise is an error.
pub fn new_state(queue: &Queue) -> Result<StateHandler<'_>, Error> {
    match queue.observed_state() {
        QueueState::Unknown => Err(Error::invalid_state(
            queue.name_any(),
            QueueState::Unknown.as_str(),
        )),
        state => Ok(StateHandler { queue, state }),
    }
}

impl StateHandler<'_> {
    /// State this handler was selected for
    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Run `action` against the queue through `ops`
    pub async fn execute(
        &self,
        ops: &dyn QueueOperations,
        action: QueueAction,
    ) -> Result<Transition, Error> {
        let next = match self.state {
            QueueState::Open => open::execute(self.queue, ops, action).await?,
            QueueState::Closing => closing::execute(self.queue, ops, action).await?,
            QueueState::Closed => closed::execute(self.queue, ops, action).await?,
            QueueState::Unknown => {
                return Err(Error::invalid_state(
                    self.queue.name_any(),
                    self.state.as_str(),
                ))
            }
        };
        Ok(Transition::settled(next))
    }
}
