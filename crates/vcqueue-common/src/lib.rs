//! Common types for vcqueue: CRDs, errors, events and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of the scheduling resources (Queue, PodGroup)
pub const SCHEDULING_GROUP: &str = "scheduling.volcano.sh";

/// API group of the command bus resources (Command)
pub const BUS_GROUP: &str = "bus.volcano.sh";

/// Queue that PodGroups without an explicit queue belong to
pub const DEFAULT_QUEUE: &str = "default";

/// Field manager / reporting component name used for API writes and Events
pub const CONTROLLER_NAME: &str = "vc-queue-controller";
