//! Controller runner - wires watches, caches and workers together
//!
//! Startup order: watches start filling the caches, workers start only once
//! every cache has completed its initial list, then everything runs until
//! the shutdown token fires.

use std::future::Future;
use std::sync::Arc;

use kube::api::Api;
use kube::runtime::reflector;
use kube::runtime::watcher;
use kube::Client;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vcqueue_common::crd::{Command, PodGroup, Queue};

use crate::client::Listers;
use crate::config::ControllerConfig;
use crate::controller::Context;
use crate::error::ControllerError;
use crate::watch::run_watch;

/// Run the queue controller against a cluster until `shutdown` fires
pub async fn run(
    client: Client,
    config: ControllerConfig,
    shutdown: CancellationToken,
) -> Result<(), ControllerError> {
    let (queue_cache, queue_writer) = reflector::store::<Queue>();
    let (pg_cache, pg_writer) = reflector::store::<PodGroup>();
    let (command_cache, command_writer) = reflector::store::<Command>();

    let listers = Listers {
        queues: queue_cache.clone(),
        pod_groups: pg_cache.clone(),
    };
    let ctx = Arc::new(Context::new(client.clone(), listers, config.clone()));
    let handlers = Arc::new(ctx.handlers());
    // Watches stop with the controller, or on their own if startup fails
    let watch_shutdown = shutdown.child_token();

    let watcher_config = watcher::Config::default().timeout(config.watch_timeout_secs);
    let mut watches = JoinSet::new();
    watches.spawn(run_watch(
        Api::<Queue>::all(client.clone()),
        watcher_config.clone(),
        queue_writer,
        handlers.clone(),
        watch_shutdown.clone(),
    ));
    watches.spawn(run_watch(
        Api::<PodGroup>::all(client.clone()),
        watcher_config.clone(),
        pg_writer,
        handlers.clone(),
        watch_shutdown.clone(),
    ));
    watches.spawn(run_watch(
        Api::<Command>::all(client),
        watcher_config,
        command_writer,
        handlers,
        watch_shutdown.clone(),
    ));

    info!("starting queue controller, waiting for caches to sync");
    let synced = wait_for_cache_sync(
        async {
            tokio::try_join!(
                queue_cache.wait_until_ready(),
                pg_cache.wait_until_ready(),
                command_cache.wait_until_ready(),
            )
            .is_ok()
        },
        &shutdown,
    )
    .await;

    let result = match synced {
        Ok(()) => {
            run_workers(ctx.clone(), shutdown.clone()).await;
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "unable to sync caches for queue controller");
            ctx.shut_down();
            watch_shutdown.cancel();
            Err(e)
        }
    };

    while let Some(joined) = watches.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "watch task failed");
        }
    }
    info!("queue controller stopped");
    result
}

/// Wait for `ready` unless shutdown comes first.
pub async fn wait_for_cache_sync(
    ready: impl Future<Output = bool>,
    shutdown: &CancellationToken,
) -> Result<(), ControllerError> {
    tokio::select! {
        _ = shutdown.cancelled() => Err(ControllerError::CacheSync("queue controller")),
        ok = ready => {
            if ok {
                info!("caches synced");
                Ok(())
            } else {
                Err(ControllerError::CacheSync("queue controller"))
            }
        }
    }
}

/// Run the configured number of queue and command workers.
///
/// When `shutdown` fires both work queues stop accepting items; workers
/// finish what is already queued and exit.
pub async fn run_workers(ctx: Arc<Context>, shutdown: CancellationToken) {
    let mut workers = JoinSet::new();
    for _ in 0..ctx.config.queue_workers.max(1) {
        let ctx = ctx.clone();
        workers.spawn(async move { ctx.run_queue_worker().await });
    }
    for _ in 0..ctx.config.command_workers.max(1) {
        let ctx = ctx.clone();
        workers.spawn(async move { ctx.run_command_worker().await });
    }
    info!(
        queue_workers = ctx.config.queue_workers.max(1),
        command_workers = ctx.config.command_workers.max(1),
        "queue controller workers started"
    );

    shutdown.cancelled().await;
    info!("shutting down queue controller");
    ctx.shut_down();

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "worker task failed");
        }
    }
}
