//! Shared controller context
//!
//! The [`Context`] owns everything the workers and notification handlers
//! share: the cluster client, the event publisher, the reflector caches, the
//! membership index and both work queues.

use std::sync::Arc;

use kube::Client;

use vcqueue_common::events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
use vcqueue_common::CONTROLLER_NAME;
use vcqueue_workqueue::{ItemExponentialFailureRateLimiter, WorkQueue};

use crate::client::{ClusterClient, KubeClusterClient, Listers};
use crate::config::ControllerConfig;
use crate::index::ResourceIndex;
use crate::ingestion::EventHandlers;
use crate::types::{CommandItem, QueueRequest};

/// Controller context shared by workers and watch handlers
pub struct Context {
    /// Cluster writes (trait object for testability)
    pub client: Arc<dyn ClusterClient>,
    /// Event publisher for queue transitions and dropped requests
    pub events: Arc<dyn EventPublisher>,
    /// Reflector-backed caches
    pub listers: Listers,
    /// Queue name to PodGroup membership
    pub index: Arc<ResourceIndex>,
    /// Pending queue reconciliations
    pub queue_requests: Arc<WorkQueue<QueueRequest>>,
    /// Pending commands
    pub commands: Arc<WorkQueue<CommandItem>>,
    /// Tuning knobs
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder around the given cluster client and caches
    pub fn builder(client: Arc<dyn ClusterClient>, listers: Listers) -> ContextBuilder {
        ContextBuilder::new(client, listers)
    }

    /// Create a context backed by a real Kubernetes client
    pub fn new(client: Client, listers: Listers, config: ControllerConfig) -> Self {
        Self::builder(Arc::new(KubeClusterClient::new(client.clone())), listers)
            .events(Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)))
            .config(config)
            .build()
    }

    /// Notification handlers feeding this context's index and queues
    pub fn handlers(&self) -> EventHandlers {
        EventHandlers::new(
            self.index.clone(),
            self.queue_requests.clone(),
            self.commands.clone(),
        )
    }

    /// Stop handing out work. Blocked workers wake up and exit.
    pub fn shut_down(&self) {
        self.queue_requests.shut_down();
        self.commands.shut_down();
    }
}

/// Builder for constructing [`Context`] instances
///
/// Must be built inside a tokio runtime, since the work queues spawn their
/// delay tasks on construction.
///
/// ```text
/// let ctx = Context::builder(client, listers)
///     .events(publisher)
///     .config(config)
///     .build();
/// ```
pub struct ContextBuilder {
    client: Arc<dyn ClusterClient>,
    listers: Listers,
    events: Option<Arc<dyn EventPublisher>>,
    config: ControllerConfig,
}

impl ContextBuilder {
    fn new(client: Arc<dyn ClusterClient>, listers: Listers) -> Self {
        Self {
            client,
            listers,
            events: None,
            config: ControllerConfig::default(),
        }
    }

    /// Set the event publisher (defaults to a no-op publisher)
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the default configuration
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let (base_delay, max_delay) = (self.config.base_delay, self.config.max_delay);
        Context {
            client: self.client,
            events: self
                .events
                .unwrap_or_else(|| Arc::new(NoopEventPublisher)),
            listers: self.listers,
            index: Arc::new(ResourceIndex::new()),
            queue_requests: Arc::new(WorkQueue::new(
                "queue",
                ItemExponentialFailureRateLimiter::new(base_delay, max_delay),
            )),
            commands: Arc::new(WorkQueue::new(
                "command",
                ItemExponentialFailureRateLimiter::new(base_delay, max_delay),
            )),
            config: self.config,
        }
    }
}
