//! Watch notification handlers
//!
//! Translates add/update/delete notifications into index updates and work
//! queue entries. Handlers run on the watch tasks, so they never block and
//! never fail; anything that can fail happens later on a worker.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, trace};

use vcqueue_common::crd::{Command, PodGroup, Queue};
use vcqueue_workqueue::WorkQueue;

use crate::index::ResourceIndex;
use crate::types::{CommandItem, QueueRequest};

/// Every resource kind the controller watches
#[derive(Clone, Debug)]
pub enum WatchedObject {
    /// A scheduling Queue
    Queue(Arc<Queue>),
    /// A PodGroup submitted to some queue
    PodGroup(Arc<PodGroup>),
    /// A command bus request
    Command(Arc<Command>),
}

impl WatchedObject {
    /// Kind name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Queue(_) => "Queue",
            Self::PodGroup(_) => "PodGroup",
            Self::Command(_) => "Command",
        }
    }
}

impl From<Arc<Queue>> for WatchedObject {
    fn from(queue: Arc<Queue>) -> Self {
        Self::Queue(queue)
    }
}

impl From<Arc<PodGroup>> for WatchedObject {
    fn from(pg: Arc<PodGroup>) -> Self {
        Self::PodGroup(pg)
    }
}

impl From<Arc<Command>> for WatchedObject {
    fn from(cmd: Arc<Command>) -> Self {
        Self::Command(cmd)
    }
}

/// Command filter: admits only Commands whose target is a Queue.
pub fn queue_command(obj: &WatchedObject) -> Option<&Arc<Command>> {
    match obj {
        WatchedObject::Command(cmd) if cmd.target_queue().is_some() => Some(cmd),
        _ => None,
    }
}

/// Notification handlers shared by all watch tasks
pub struct EventHandlers {
    index: Arc<ResourceIndex>,
    queue_requests: Arc<WorkQueue<QueueRequest>>,
    commands: Arc<WorkQueue<CommandItem>>,
}

impl EventHandlers {
    /// Create handlers feeding the given index and queues
    pub fn new(
        index: Arc<ResourceIndex>,
        queue_requests: Arc<WorkQueue<QueueRequest>>,
        commands: Arc<WorkQueue<CommandItem>>,
    ) -> Self {
        Self {
            index,
            queue_requests,
            commands,
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// An object appeared
    pub fn on_add(&self, obj: WatchedObject) {
        match &obj {
            WatchedObject::Queue(queue) => self.add_queue(queue),
            WatchedObject::PodGroup(pg) => self.add_pod_group(pg),
            WatchedObject::Command(_) => self.add_command(&obj),
        }
    }

    /// An object changed
    pub fn on_update(&self, old: WatchedObject, new: WatchedObject) {
        match (old, new) {
            (WatchedObject::Queue(_), WatchedObject::Queue(queue)) => self.update_queue(&queue),
            (WatchedObject::PodGroup(old), WatchedObject::PodGroup(new)) => {
                self.update_pod_group(&old, &new)
            }
            // Commands are consumed on add, later updates carry nothing new
            (WatchedObject::Command(_), WatchedObject::Command(_)) => {}
            (old, new) => debug!(
                old = old.kind(),
                new = new.kind(),
                "ignoring update across resource kinds"
            ),
        }
    }

    /// An object was removed
    pub fn on_delete(&self, obj: WatchedObject) {
        match obj {
            WatchedObject::Queue(queue) => self.delete_queue(&queue),
            WatchedObject::PodGroup(pg) => self.delete_pod_group(&pg),
            WatchedObject::Command(_) => {}
        }
    }

    // =========================================================================
    // Queues
    // =========================================================================

    fn add_queue(&self, queue: &Queue) {
        trace!(queue = %queue.name_any(), "queue added");
        self.queue_requests.add(QueueRequest::sync(queue.name_any()));
    }

    fn update_queue(&self, queue: &Queue) {
        trace!(queue = %queue.name_any(), "queue updated");
        self.queue_requests.add(QueueRequest::sync(queue.name_any()));
    }

    fn delete_queue(&self, queue: &Queue) {
        trace!(queue = %queue.name_any(), "queue deleted");
        self.queue_requests.add(QueueRequest::sync(queue.name_any()));
    }

    // =========================================================================
    // PodGroups
    // =========================================================================

    fn add_pod_group(&self, pg: &PodGroup) {
        let key = pg.key();
        let queue = pg.queue_name();
        if let Some(previous) = self.index.assign(&key, queue) {
            self.queue_requests.add(QueueRequest::sync(previous));
        }
        debug!(
            pod_group = %key,
            queue,
            members = self.index.count(queue),
            "pod group added"
        );
        self.queue_requests.add(QueueRequest::sync(queue));
    }

    fn update_pod_group(&self, old: &PodGroup, new: &PodGroup) {
        let key = new.key();
        let queue = new.queue_name();
        let moved_from = self.index.assign(&key, queue);
        if let Some(previous) = &moved_from {
            debug!(pod_group = %key, from = %previous, to = queue, "pod group changed queue");
            self.queue_requests.add(QueueRequest::sync(previous.as_str()));
        }
        if moved_from.is_some() || old.queue_name() != queue || old.phase() != new.phase() {
            self.queue_requests.add(QueueRequest::sync(queue));
        }
    }

    fn delete_pod_group(&self, pg: &PodGroup) {
        let key = pg.key();
        if let Some(queue) = self.index.remove(&key) {
            debug!(pod_group = %key, queue = %queue, "pod group deleted");
            self.queue_requests.add(QueueRequest::sync(queue));
        }
    }

    /// Drop index entries for PodGroups that no longer exist.
    ///
    /// Runs after a full re-list, when deletions during a watch gap were never
    /// delivered as notifications.
    pub fn prune_pod_groups(&self, exists: impl Fn(&str) -> bool) {
        let removed = self.index.retain(exists);
        let pruned = removed.len();
        for (key, queue) in removed {
            debug!(pod_group = %key, queue = %queue, "pruned stale pod group");
            self.queue_requests.add(QueueRequest::sync(queue));
        }
        debug!(pruned, indexed = self.index.len(), "pod group index resynced");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn add_command(&self, obj: &WatchedObject) {
        match queue_command(obj) {
            Some(cmd) => {
                debug!(
                    command = %cmd.name_any(),
                    namespace = cmd.namespace().as_deref().unwrap_or_default(),
                    "queue command received"
                );
                self.commands.add(CommandItem(cmd.clone()));
            }
            None => trace!(kind = obj.kind(), "ignoring command not targeting a queue"),
        }
    }
}
