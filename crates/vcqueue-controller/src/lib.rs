//! Queue controller for Volcano-style batch scheduling
//!
//! Keeps each Queue's status in line with the PodGroups submitted to it and
//! drives the Open/Closing/Closed lifecycle, either on watch notifications
//! or on Commands posted to the command bus.
//!
//! Data flow:
//! watch notification -> [`ingestion`] -> index / work queue -> worker ->
//! [`state`] machine -> [`state::QueueOperations`] -> status patch and events.

pub mod client;
mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod index;
pub mod ingestion;
mod reconciler;
pub mod runner;
pub mod state;
pub mod types;
pub mod watch;

#[cfg(test)]
mod test_fixtures;

pub use client::{ClusterClient, KubeClusterClient, Listers};
pub use config::ControllerConfig;
pub use controller::{Context, ContextBuilder};
pub use error::ControllerError;
pub use index::ResourceIndex;
pub use ingestion::{EventHandlers, WatchedObject};
pub use runner::{run, run_workers};
pub use state::{new_state, QueueOperations, Transition};
pub use types::{CommandItem, QueueAction, QueueEvent, QueueRequest};
