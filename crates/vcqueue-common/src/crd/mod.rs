//! Custom resource types the queue controller watches
//!
//! Queue and PodGroup come from the scheduling API group, Command from the
//! command bus group.

mod command;
mod pod_group;
mod queue;

pub use command::{is_queue_reference, Command, QUEUE_KIND};
pub use pod_group::{
    pod_group_key, split_pod_group_key, PodGroup, PodGroupPhase, PodGroupSpec, PodGroupStatus,
};
pub use queue::{Queue, QueueSpec, QueueState, QueueStatus};
