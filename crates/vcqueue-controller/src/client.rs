//! Cluster API access and cached listers
//!
//! Writes go through [`ClusterClient`] so the reconciler can be tested
//! without an API server. Reads come from reflector stores fed by the watch
//! tasks.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tracing::debug;

use vcqueue_common::crd::{split_pod_group_key, Command, PodGroup, Queue, QueueStatus};
use vcqueue_common::{Error, CONTROLLER_NAME};

/// Trait abstracting the cluster writes the controller performs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Replace the status of a Queue
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the queue to update
    /// * `resource_version` - Version the status was computed from. When set,
    ///   the write fails with a 409 Conflict if the Queue has changed since.
    /// * `status` - New status to apply
    async fn patch_queue_status(
        &self,
        name: &str,
        resource_version: Option<String>,
        status: &QueueStatus,
    ) -> Result<(), Error>;

    /// Delete a Command. A missing Command surfaces as a not-found error.
    async fn delete_command(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn patch_queue_status(
        &self,
        name: &str,
        resource_version: Option<String>,
        status: &QueueStatus,
    ) -> Result<(), Error> {
        let api: Api<Queue> = Api::all(self.client.clone());
        let status_patch = status_patch(resource_version, status);

        api.patch_status(
            name,
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }

    async fn delete_command(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Command> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        debug!(namespace, name, "deleted command");
        Ok(())
    }
}

/// Read-only views over the reflector caches
#[derive(Clone)]
pub struct Listers {
    /// Cached Queues
    pub queues: Store<Queue>,
    /// Cached PodGroups
    pub pod_groups: Store<PodGroup>,
}

impl Listers {
    /// Cached Queue by name
    pub fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.get(&ObjectRef::new(name))
    }

    /// Cached PodGroup by `namespace/name` index key
    pub fn pod_group(&self, key: &str) -> Option<Arc<PodGroup>> {
        let (namespace, name) = split_pod_group_key(key)?;
        self.pod_groups
            .get(&ObjectRef::new(name).within(namespace))
    }

}

/// Merge patch body for a Queue status write.
///
/// A `metadata.resourceVersion` in a merge patch is a precondition: the API
/// server rejects the write with 409 Conflict unless it matches the stored
/// object.
fn status_patch(resource_version: Option<String>, status: &QueueStatus) -> serde_json::Value {
    let mut patch = serde_json::json!({
        "status": status
    });
    if let Some(resource_version) = resource_version {
        patch["metadata"] = serde_json::json!({ "resourceVersion": resource_version });
    }
    patch
}
