//! Watch streams feeding the reflector caches and notification handlers
//!
//! `kube::runtime::watcher` only reports the latest version of an object.
//! Each watch task keeps the reflector store for its kind and consults it
//! before applying an event, so handlers still receive `update(old, new)`.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::reflector::{store::Writer, ObjectRef, Store};
use kube::runtime::watcher::{self, Event};
use kube::Resource;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vcqueue_common::crd::{pod_group_key, Command, PodGroup, Queue};

use crate::ingestion::{EventHandlers, WatchedObject};

/// Pause before polling a watch stream again after an error
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A resource kind the controller watches
pub trait WatchedKind:
    Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static
{
    /// Kind name used in log lines
    const KIND: &'static str;

    /// Wrap a cached object for the notification handlers
    fn wrap(obj: Arc<Self>) -> WatchedObject;

    /// Called after a full re-list has replaced the cache contents
    fn resynced(_handlers: &EventHandlers, _cache: &Store<Self>) {}
}

impl WatchedKind for Queue {
    const KIND: &'static str = "Queue";

    fn wrap(obj: Arc<Self>) -> WatchedObject {
        obj.into()
    }
}

impl WatchedKind for PodGroup {
    const KIND: &'static str = "PodGroup";

    fn wrap(obj: Arc<Self>) -> WatchedObject {
        obj.into()
    }

    fn resynced(handlers: &EventHandlers, cache: &Store<Self>) {
        let live: std::collections::HashSet<String> = cache
            .state()
            .iter()
            .filter_map(|pg| {
                let namespace = pg.meta().namespace.as_deref()?;
                let name = pg.meta().name.as_deref()?;
                Some(pod_group_key(namespace, name))
            })
            .collect();
        handlers.prune_pod_groups(|key| live.contains(key));
    }
}

impl WatchedKind for Command {
    const KIND: &'static str = "Command";

    fn wrap(obj: Arc<Self>) -> WatchedObject {
        obj.into()
    }
}

/// Apply one watch event to the cache and notify the handlers.
///
/// `Apply` for an object already cached becomes an update carrying the
/// cached version as `old`; otherwise it is an add.
pub fn dispatch<K: WatchedKind>(writer: &mut Writer<K>, handlers: &EventHandlers, event: Event<K>) {
    let cache = writer.as_reader();
    match &event {
        Event::Apply(obj) | Event::InitApply(obj) => {
            // During a re-list the cache still serves the previous list
            let old = cache.get(&ObjectRef::from_obj(obj));
            writer.apply_watcher_event(&event);
            let obj = Arc::new(obj.clone());
            match old {
                Some(old) => handlers.on_update(K::wrap(old), K::wrap(obj)),
                None => handlers.on_add(K::wrap(obj)),
            }
        }
        Event::Delete(obj) => {
            writer.apply_watcher_event(&event);
            handlers.on_delete(K::wrap(Arc::new(obj.clone())));
        }
        Event::Init => {
            debug!(kind = K::KIND, "watch list started");
            writer.apply_watcher_event(&event);
        }
        Event::InitDone => {
            writer.apply_watcher_event(&event);
            debug!(kind = K::KIND, cached = cache.state().len(), "watch list complete");
            K::resynced(handlers, &cache);
        }
    }
}

/// Run a watch until `shutdown` fires, feeding `writer` and `handlers`.
pub async fn run_watch<K: WatchedKind>(
    api: Api<K>,
    config: watcher::Config,
    mut writer: Writer<K>,
    handlers: Arc<EventHandlers>,
    shutdown: CancellationToken,
) {
    let stream = watcher::watcher(api, config);
    let mut stream = std::pin::pin!(stream);

    info!(kind = K::KIND, "watch started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = stream.next() => match event {
                Some(Ok(event)) => dispatch(&mut writer, &handlers, event),
                Some(Err(e)) => {
                    warn!(error = %e, kind = K::KIND, "watch error, will retry");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(WATCH_RETRY_DELAY) => {}
                    }
                }
                None => break,
            }
        }
    }

    info!(kind = K::KIND, "watch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::reflector;
    use vcqueue_common::crd::{PodGroupPhase, PodGroupSpec, PodGroupStatus};
    use vcqueue_workqueue::{ItemExponentialFailureRateLimiter, WorkQueue};

    use crate::index::ResourceIndex;
    use crate::types::QueueRequest;

    fn pod_group(name: &str, queue: &str) -> PodGroup {
        PodGroup {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ml".to_string()),
                ..Default::default()
            },
            spec: PodGroupSpec {
                queue: queue.to_string(),
                ..Default::default()
            },
            status: Some(PodGroupStatus {
                phase: PodGroupPhase::Running,
                ..Default::default()
            }),
        }
    }

    fn handlers(index: Arc<ResourceIndex>) -> (EventHandlers, Arc<WorkQueue<QueueRequest>>) {
        let requests = Arc::new(WorkQueue::new(
            "queue",
            ItemExponentialFailureRateLimiter::default(),
        ));
        let commands = Arc::new(WorkQueue::new(
            "command",
            ItemExponentialFailureRateLimiter::default(),
        ));
        (
            EventHandlers::new(index, requests.clone(), commands),
            requests,
        )
    }

    #[tokio::test]
    async fn apply_of_cached_object_is_an_update() {
        let index = Arc::new(ResourceIndex::new());
        let (handlers, _) = handlers(index.clone());
        let (cache, mut writer) = reflector::store::<PodGroup>();

        dispatch(&mut writer, &handlers, Event::Apply(pod_group("train", "research")));
        dispatch(&mut writer, &handlers, Event::Apply(pod_group("train", "prod")));

        // The second apply moved the key instead of adding it twice
        assert_eq!(index.count("research"), 0);
        assert_eq!(index.pod_groups("prod"), vec!["ml/train"]);
        assert_eq!(cache.state().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_from_cache_and_index() {
        let index = Arc::new(ResourceIndex::new());
        let (handlers, _) = handlers(index.clone());
        let (cache, mut writer) = reflector::store::<PodGroup>();

        dispatch(&mut writer, &handlers, Event::Apply(pod_group("train", "research")));
        dispatch(&mut writer, &handlers, Event::Delete(pod_group("train", "research")));

        assert!(index.is_empty());
        assert!(cache.state().is_empty());
    }

    #[tokio::test]
    async fn relist_prunes_pod_groups_deleted_during_gap() {
        let index = Arc::new(ResourceIndex::new());
        let (handlers, _) = handlers(index.clone());
        let (cache, mut writer) = reflector::store::<PodGroup>();

        for event in [
            Event::Init,
            Event::InitApply(pod_group("kept", "research")),
            Event::InitApply(pod_group("gone", "research")),
            Event::InitDone,
        ] {
            dispatch(&mut writer, &handlers, event);
        }
        assert_eq!(index.count("research"), 2);

        // Re-list after a watch gap no longer contains "gone"
        for event in [
            Event::Init,
            Event::InitApply(pod_group("kept", "research")),
            Event::InitDone,
        ] {
            dispatch(&mut writer, &handlers, event);
        }

        assert_eq!(index.pod_groups("research"), vec!["ml/kept"]);
        assert_eq!(cache.state().len(), 1);
    }

    #[tokio::test]
    async fn queue_events_enqueue_sync_requests() {
        let index = Arc::new(ResourceIndex::new());
        let (handlers, requests) = handlers(index);
        let (_cache, mut writer) = reflector::store::<Queue>();

        dispatch(
            &mut writer,
            &handlers,
            Event::Apply(Queue::new("research", Default::default())),
        );
        assert_eq!(requests.get().await, Some(QueueRequest::sync("research")));
    }
}
