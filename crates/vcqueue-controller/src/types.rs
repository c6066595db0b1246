//! Work items carried on the controller's queues

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use kube::ResourceExt;
use vcqueue_common::crd::Command;

/// Transition requested against a Queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueAction {
    /// Open the queue for new PodGroups
    Open,
    /// Close the queue once its PodGroups are gone
    Close,
    /// Recompute status without changing the requested state
    Update,
}

impl QueueAction {
    /// Wire string used by the command bus and as the Event reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OpenQueue",
            Self::Close => "CloseQueue",
            Self::Update => "SyncQueue",
        }
    }

    /// Parse the action carried by a Command.
    ///
    /// Anything that is not an open or close request degrades to a status
    /// resync, which is always safe to perform.
    pub fn from_command(action: Option<&str>) -> Self {
        match action {
            Some("OpenQueue") => Self::Open,
            Some("CloseQueue") => Self::Close,
            _ => Self::Update,
        }
    }
}

impl std::fmt::Display for QueueAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a reconciliation was triggered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueEvent {
    /// A watched Queue or PodGroup changed
    StateChange,
    /// A Command targeting the queue was consumed
    CommandIssued,
}

impl std::fmt::Display for QueueEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateChange => write!(f, "OutOfSync"),
            Self::CommandIssued => write!(f, "CommandIssued"),
        }
    }
}

/// Reconciliation intent for one queue
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueueRequest {
    /// Queue name
    pub name: String,
    /// Trigger
    pub event: QueueEvent,
    /// Requested transition
    pub action: QueueAction,
}

impl QueueRequest {
    /// Status resync triggered by a watch notification
    pub fn sync(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event: QueueEvent::StateChange,
            action: QueueAction::Update,
        }
    }

    /// Request produced from a consumed Command
    pub fn from_command(name: impl Into<String>, action: QueueAction) -> Self {
        Self {
            name: name.into(),
            event: QueueEvent::CommandIssued,
            action,
        }
    }
}

impl std::fmt::Display for QueueRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.event, self.action)
    }
}

/// A Command waiting on the command queue.
///
/// Equality and hashing use namespace, name and uid, so a re-delivered watch
/// notification for the same object collapses into the pending entry while a
/// recreated Command with the same name is processed separately.
#[derive(Clone, Debug)]
pub struct CommandItem(pub Arc<Command>);

impl CommandItem {
    fn identity(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        let meta = &self.0.metadata;
        (
            meta.namespace.as_deref(),
            meta.name.as_deref(),
            meta.uid.as_deref(),
        )
    }

    /// Namespace of the command (empty for malformed objects)
    pub fn namespace(&self) -> String {
        self.0.namespace().unwrap_or_default()
    }

    /// Name of the command
    pub fn name(&self) -> String {
        self.0.name_any()
    }
}

impl PartialEq for CommandItem {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for CommandItem {}

impl Hash for CommandItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}
