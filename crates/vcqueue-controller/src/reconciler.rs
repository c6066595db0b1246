//! Queue reconciliation worker
//!
//! Pops [`QueueRequest`]s, runs them through the state machine and applies
//! the retry policy. The [`QueueOperations`] the state machine dispatches to
//! are implemented here, on the shared [`Context`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use vcqueue_common::crd::{PodGroupPhase, Queue, QueueState, QueueStatus};
use vcqueue_common::events::{actions, reasons};
use vcqueue_common::Error;

use crate::controller::Context;
use crate::error::ControllerError;
use crate::state::{new_state, QueueOperations, UpdateStateFn};
use crate::types::QueueRequest;

impl Context {
    /// Process one queue request. Returns false once the queue shuts down.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(req) = self.queue_requests.get().await else {
            return false;
        };

        let result = self.handle_queue(&req).await;
        self.handle_queue_err(&req, result).await;
        self.queue_requests.done(&req);

        true
    }

    /// Run queue workers until shutdown
    pub async fn run_queue_worker(&self) {
        while self.process_next_work_item().await {}
    }

    /// Reconcile the queue named by `req`.
    ///
    /// A queue that is no longer cached has been deleted and counts as
    /// success. A Closing queue is scheduled for another drain check.
    #[instrument(skip(self, req), fields(queue = %req.name, event = %req.event, action = %req.action))]
    pub async fn handle_queue(&self, req: &QueueRequest) -> Result<(), ControllerError> {
        let start = Instant::now();
        let result = self.sync_request(req).await;
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "finished syncing queue"
        );
        result
    }

    async fn sync_request(&self, req: &QueueRequest) -> Result<(), ControllerError> {
        let Some(queue) = self.listers.queue(&req.name) else {
            debug!("queue has been deleted");
            return Ok(());
        };

        let outcome = match new_state(&queue) {
            Ok(state) => state.execute(self, req.action).await,
            Err(e) => Err(e),
        };

        let transition = match outcome {
            Ok(transition) => transition,
            Err(e) if e.is_not_found() => {
                debug!("queue was deleted during sync");
                return Ok(());
            }
            Err(source) => {
                return Err(ControllerError::SyncQueue {
                    queue: req.name.clone(),
                    event: req.event,
                    action: req.action,
                    source,
                })
            }
        };

        if transition.requeue {
            debug!(
                delay_secs = self.config.drain_recheck_interval.as_secs(),
                "queue still draining, scheduling re-check"
            );
            self.queue_requests.add_after(
                QueueRequest::sync(req.name.as_str()),
                self.config.drain_recheck_interval,
            );
        }
        Ok(())
    }

    /// Single retry decision for queue requests.
    ///
    /// Failures are retried with backoff until `max_retries`; after that a
    /// Warning event is recorded on the queue and the request is dropped.
    pub async fn handle_queue_err(&self, req: &QueueRequest, result: Result<(), ControllerError>) {
        let err = match result {
            Ok(()) => {
                self.queue_requests.forget(req);
                return;
            }
            Err(err) => err,
        };

        let requeues = self.queue_requests.num_requeues(req);
        if requeues < self.config.max_retries {
            debug!(request = %req, error = %err, requeues, "error syncing queue request, retrying");
            self.queue_requests.add_rate_limited(req.clone());
            return;
        }

        self.events
            .publish(
                &self.queue_reference(&req.name),
                EventType::Warning,
                req.action.as_str(),
                actions::DROP,
                Some(format!("{} queue failed for {}", req.action, err)),
            )
            .await;
        warn!(request = %req, error = %err, "dropping queue request out of the queue");
        self.queue_requests.forget(req);
    }

    /// Reference to a queue for event recording, usable after deletion
    fn queue_reference(&self, name: &str) -> ObjectReference {
        match self.listers.queue(name) {
            Some(queue) => queue.object_ref(&()),
            None => ObjectReference {
                api_version: Some(Queue::api_version(&()).into_owned()),
                kind: Some(Queue::kind(&()).into_owned()),
                name: Some(name.to_string()),
                ..Default::default()
            },
        }
    }

    /// Status of `queue` as derived from its current members
    fn member_status(&self, queue: &str) -> (QueueStatus, usize) {
        let keys = self.index.pod_groups(queue);
        let mut status = QueueStatus::default();
        for pg in keys.iter().filter_map(|key| self.listers.pod_group(key)) {
            match pg.phase() {
                PodGroupPhase::Pending => status.pending += 1,
                PodGroupPhase::Running => status.running += 1,
                PodGroupPhase::Inqueue => status.inqueue += 1,
                PodGroupPhase::Unknown => status.unknown += 1,
            }
        }
        (status, keys.len())
    }

    /// Recompute, persist and announce a queue's status.
    ///
    /// The status is written only when it differs from what is cached. A
    /// Normal event with `reason` is recorded when the state changes.
    async fn apply_queue_state(
        &self,
        queue: &Queue,
        update_state: UpdateStateFn,
        reason: Option<&str>,
    ) -> Result<QueueState, Error> {
        let name = queue.name_any();
        let current = queue.observed_state();
        let (mut status, members) = self.member_status(&name);
        let next = update_state(current, members);
        status.state = Some(next);

        // Guarded by the cached resourceVersion: a status computed from a stale
        // cache is rejected with a Conflict and retried, never written.
        if queue.status.as_ref() != Some(&status) {
            self.client
                .patch_queue_status(&name, queue.resource_version(), &status)
                .await?;
            debug!(
                state = %next,
                pending = status.pending,
                running = status.running,
                inqueue = status.inqueue,
                unknown = status.unknown,
                "updated queue status"
            );
        }

        if next != current {
            info!(from = %current, to = %next, "queue state changed");
            if let Some(reason) = reason {
                self.events
                    .publish(
                        &queue.object_ref(&()),
                        EventType::Normal,
                        reason,
                        actions::RECONCILE,
                        Some(format!("Queue state changed from {current} to {next}")),
                    )
                    .await;
            }
        }

        Ok(next)
    }
}

#[async_trait]
impl QueueOperations for Context {
    async fn sync_queue(
        &self,
        queue: &Queue,
        update_state: UpdateStateFn,
    ) -> Result<QueueState, Error> {
        self.apply_queue_state(queue, update_state, None).await
    }

    async fn open_queue(
        &self,
        queue: &Queue,
        update_state: UpdateStateFn,
    ) -> Result<QueueState, Error> {
        self.apply_queue_state(queue, update_state, Some(reasons::OPEN_QUEUE))
            .await
    }

    async fn close_queue(
        &self,
        queue: &Queue,
        update_state: UpdateStateFn,
    ) -> Result<QueueState, Error> {
        self.apply_queue_state(queue, update_state, Some(reasons::CLOSE_QUEUE))
            .await
    }
}
