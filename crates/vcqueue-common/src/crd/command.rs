//! Command bus types
//!
//! A `Command` is a one-shot instruction dropped into a namespace by an
//! external actor. Unlike the other resources it has no spec/status split:
//! its payload sits at the top level, so the `kube::Resource` impl is written
//! by hand instead of derived.

use std::borrow::Cow;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::{Deserialize, Serialize};

use crate::{BUS_GROUP, SCHEDULING_GROUP};

/// Kind name a Command must target to concern the queue controller
pub const QUEUE_KIND: &str = "Queue";

/// External imperative instruction (`bus.volcano.sh/v1alpha1` Kind: Command)
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Requested action, e.g. `OpenQueue` or `CloseQueue`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Object the action applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_object: Option<OwnerReference>,

    /// Machine-readable reason for the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Resource for Command {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "Command".into()
    }

    fn group(_: &()) -> Cow<'_, str> {
        BUS_GROUP.into()
    }

    fn version(_: &()) -> Cow<'_, str> {
        "v1alpha1".into()
    }

    fn plural(_: &()) -> Cow<'_, str> {
        "commands".into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Command {
    /// Name of the targeted Queue, if the command targets one
    pub fn target_queue(&self) -> Option<&str> {
        self.target_object
            .as_ref()
            .filter(|r| is_queue_reference(r))
            .map(|r| r.name.as_str())
    }
}

/// Whether an owner reference points at a scheduling Queue.
///
/// The API group must match; the version is not checked so commands written
/// against an older scheduling API still apply.
pub fn is_queue_reference(reference: &OwnerReference) -> bool {
    let group = reference
        .api_version
        .split_once('/')
        .map(|(group, _)| group)
        .unwrap_or_default();
    reference.kind == QUEUE_KIND && group == SCHEDULING_GROUP
}
