//! PodGroup CRD types
//!
//! A `PodGroup` is the unit of gang scheduling. The controller only reads
//! which queue it belongs to and which phase it is in.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::DEFAULT_QUEUE;

/// Scheduling phase of a PodGroup
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum PodGroupPhase {
    /// Waiting to be admitted
    #[default]
    Pending,
    /// Enough pods are running
    Running,
    /// Admitted by the queue, pods not yet bound
    Inqueue,
    /// Anything else, including phases added by newer schedulers
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for PodGroupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Inqueue => write!(f, "Inqueue"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Group of pods scheduled together
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "scheduling.volcano.sh",
    version = "v1beta1",
    kind = "PodGroup",
    plural = "podgroups",
    shortname = "pg",
    namespaced,
    status = "PodGroupStatus",
    printcolumn = r#"{"name":"Queue","type":"string","jsonPath":".spec.queue"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupSpec {
    /// Minimum number of pods that must be schedulable together
    #[serde(default)]
    pub min_member: i32,

    /// Queue the group is submitted to; empty means the default queue
    #[serde(default)]
    pub queue: String,

    /// Priority class applied to the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
}

/// Observed state of a PodGroup
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupStatus {
    /// Current scheduling phase
    #[serde(default)]
    pub phase: PodGroupPhase,

    /// Pods currently running
    #[serde(default)]
    pub running: i32,

    /// Pods that completed successfully
    #[serde(default)]
    pub succeeded: i32,

    /// Pods that failed
    #[serde(default)]
    pub failed: i32,
}

impl PodGroup {
    /// Queue this group belongs to
    pub fn queue_name(&self) -> &str {
        if self.spec.queue.is_empty() {
            DEFAULT_QUEUE
        } else {
            &self.spec.queue
        }
    }

    /// `namespace/name` key used by the resource index
    pub fn key(&self) -> String {
        pod_group_key(self.namespace().as_deref().unwrap_or_default(), &self.name_any())
    }

    /// Current phase, Pending when the scheduler has not reported one
    pub fn phase(&self) -> PodGroupPhase {
        self.status
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(PodGroupPhase::Pending)
    }
}

/// Build the index key for a PodGroup
pub fn pod_group_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Split an index key back into `(namespace, name)`
pub fn split_pod_group_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pg(queue: &str) -> PodGroup {
        PodGroup {
            metadata: ObjectMeta {
                name: Some("train".to_string()),
                namespace: Some("ml".to_string()),
                ..Default::default()
            },
            spec: PodGroupSpec {
                queue: queue.to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn empty_queue_means_default() {
        assert_eq!(pg("").queue_name(), DEFAULT_QUEUE);
        assert_eq!(pg("research").queue_name(), "research");
    }

    #[test]
    fn key_is_namespace_slash_name() {
        assert_eq!(pg("a").key(), "ml/train");
        assert_eq!(split_pod_group_key("ml/train"), Some(("ml", "train")));
        assert_eq!(split_pod_group_key("nope"), None);
    }

    #[test]
    fn phase_defaults_to_pending() {
        assert_eq!(pg("a").phase(), PodGroupPhase::Pending);
    }

    #[test]
    fn unknown_phase_strings_map_to_unknown() {
        let status: PodGroupStatus =
            serde_json::from_value(serde_json::json!({ "phase": "Completed" })).unwrap();
        assert_eq!(status.phase, PodGroupPhase::Unknown);
    }
}
