//! Queue CRD types
//!
//! A `Queue` is a cluster-scoped capacity boundary that PodGroups are admitted
//! through. Its lifecycle state lives in `status.state` and is the only part
//! the controller writes.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a Queue
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum QueueState {
    /// Accepting new PodGroups
    Open,
    /// Closed for new PodGroups, waiting for existing ones to leave
    Closing,
    /// Closed and empty
    Closed,
    /// Anything the controller does not recognize
    #[serde(other)]
    Unknown,
}

impl QueueState {
    /// Wire string as stored in `status.state`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse a non-empty `status.state` string
    fn from_wire(raw: &str) -> Self {
        match raw {
            "Open" => Self::Open,
            "Closing" => Self::Closing,
            "Closed" => Self::Closed,
            _ => Self::Unknown,
        }
    }
}

/// `state: ""` is written by some clients for a queue that was never
/// reconciled; it reads the same as an absent state.
fn empty_state_as_none<'de, D>(deserializer: D) -> Result<Option<QueueState>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|raw| !raw.is_empty())
        .map(|raw| QueueState::from_wire(&raw)))
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CRD
// =============================================================================

/// Capacity queue for batch workloads
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "scheduling.volcano.sh",
    version = "v1beta1",
    kind = "Queue",
    plural = "queues",
    shortname = "q",
    status = "QueueStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Weight","type":"integer","jsonPath":".spec.weight"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct QueueSpec {
    /// Relative share of cluster capacity
    #[serde(default = "default_weight")]
    pub weight: i32,

    /// Upper bound of resources the queue may use, keyed by resource name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capability: BTreeMap<String, String>,

    /// Whether other queues may reclaim resources from this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaimable: Option<bool>,
}

fn default_weight() -> i32 {
    1
}

impl Default for QueueSpec {
    fn default() -> Self {
        Self {
            weight: default_weight(),
            capability: BTreeMap::new(),
            reclaimable: None,
        }
    }
}

/// Observed state of a Queue
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Lifecycle state; absent on freshly created queues
    #[serde(
        default,
        deserialize_with = "empty_state_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<QueueState>,

    /// PodGroups in the Pending phase
    #[serde(default)]
    pub pending: i32,

    /// PodGroups in the Running phase
    #[serde(default)]
    pub running: i32,

    /// PodGroups in the Unknown phase
    #[serde(default)]
    pub unknown: i32,

    /// PodGroups admitted but not yet running
    #[serde(default)]
    pub inqueue: i32,
}

impl Queue {
    /// State the controller should act on.
    ///
    /// A queue that has never been reconciled has no status yet and is
    /// treated as Open.
    pub fn observed_state(&self) -> QueueState {
        self.status
            .as_ref()
            .and_then(|s| s.state)
            .unwrap_or(QueueState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn queue_with_status(status: Option<QueueStatus>) -> Queue {
        Queue {
            metadata: ObjectMeta {
                name: Some("research".to_string()),
                ..Default::default()
            },
            spec: QueueSpec::default(),
            status,
        }
    }

    #[test]
    fn missing_status_is_open() {
        assert_eq!(queue_with_status(None).observed_state(), QueueState::Open);
        assert_eq!(
            queue_with_status(Some(QueueStatus::default())).observed_state(),
            QueueState::Open
        );
    }

    #[test]
    fn unrecognized_state_deserializes_as_unknown() {
        let status: QueueStatus =
            serde_json::from_value(serde_json::json!({ "state": "Draining" })).unwrap();
        assert_eq!(status.state, Some(QueueState::Unknown));
    }

    #[test]
    fn empty_state_reads_as_open() {
        for raw in [serde_json::json!({ "state": "" }), serde_json::json!({ "state": null })] {
            let status: QueueStatus = serde_json::from_value(raw).unwrap();
            assert_eq!(status.state, None);
            assert_eq!(
                queue_with_status(Some(status)).observed_state(),
                QueueState::Open
            );
        }
    }

    #[test]
    fn known_states_deserialize() {
        for (raw, expected) in [
            ("Open", QueueState::Open),
            ("Closing", QueueState::Closing),
            ("Closed", QueueState::Closed),
        ] {
            let status: QueueStatus =
                serde_json::from_value(serde_json::json!({ "state": raw })).unwrap();
            assert_eq!(status.state, Some(expected));
            assert_eq!(expected.to_string(), raw);
        }
    }

    #[test]
    fn spec_defaults_weight_to_one() {
        let spec: QueueSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec.weight, 1);
        assert!(spec.capability.is_empty());
    }

    #[test]
    fn status_counts_serialize_camel_case() {
        let status = QueueStatus {
            state: Some(QueueState::Closing),
            pending: 1,
            running: 2,
            unknown: 0,
            inqueue: 3,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "Closing");
        assert_eq!(json["inqueue"], 3);
    }
}
