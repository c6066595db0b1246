//! Shared builders for unit tests

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::runtime::reflector::{self, store::Writer};
use kube::runtime::watcher::Event;

use vcqueue_common::crd::{
    Command, PodGroup, PodGroupPhase, PodGroupSpec, PodGroupStatus, Queue, QueueSpec, QueueStatus,
};
use vcqueue_common::events::RecordingEventPublisher;

use crate::client::{ClusterClient, Listers};
use crate::controller::Context;
use crate::watch::dispatch;

pub fn queue(name: &str, status: Option<QueueStatus>) -> Queue {
    let mut queue = Queue::new(name, QueueSpec::default());
    queue.metadata.uid = Some(format!("uid-{name}"));
    queue.metadata.resource_version = Some("1".to_string());
    queue.status = status;
    queue
}

pub fn pod_group(name: &str, queue: &str, phase: PodGroupPhase) -> PodGroup {
    PodGroup {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ml".to_string()),
            ..Default::default()
        },
        spec: PodGroupSpec {
            queue: queue.to_string(),
            min_member: 1,
            ..Default::default()
        },
        status: Some(PodGroupStatus {
            phase,
            ..Default::default()
        }),
    }
}

pub fn command(name: &str, target: &str, action: &str) -> Command {
    Command {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("uid-{name}")),
            ..Default::default()
        },
        action: Some(action.to_string()),
        target_object: Some(OwnerReference {
            api_version: "scheduling.volcano.sh/v1beta1".to_string(),
            kind: "Queue".to_string(),
            name: target.to_string(),
            uid: format!("uid-{target}"),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A context over in-memory caches with a recording event publisher
pub struct Harness {
    pub ctx: Arc<Context>,
    pub events: Arc<RecordingEventPublisher>,
    queues: Writer<Queue>,
    pod_groups: Writer<PodGroup>,
}

impl Harness {
    pub fn new(client: impl ClusterClient + 'static) -> Self {
        let (queue_cache, queues) = reflector::store::<Queue>();
        let (pg_cache, pod_groups) = reflector::store::<PodGroup>();
        let events = Arc::new(RecordingEventPublisher::new());
        let listers = Listers {
            queues: queue_cache,
            pod_groups: pg_cache,
        };
        let ctx = Context::builder(Arc::new(client), listers)
            .events(events.clone())
            .build();
        Self {
            ctx: Arc::new(ctx),
            events,
            queues,
            pod_groups,
        }
    }

    /// Cache a queue without going through the notification handlers
    pub fn add_queue(&mut self, queue: Queue) {
        self.queues.apply_watcher_event(&Event::Apply(queue));
    }

    /// Cache and index a PodGroup without enqueueing any request
    pub fn add_pod_group(&mut self, pg: PodGroup) {
        self.ctx.index.assign(&pg.key(), pg.queue_name());
        self.pod_groups.apply_watcher_event(&Event::Apply(pg));
    }

    /// Feed a PodGroup watch event through the notification handlers
    pub fn pod_group_event(&mut self, event: Event<PodGroup>) {
        let handlers = self.ctx.handlers();
        dispatch(&mut self.pod_groups, &handlers, event);
    }
}
