//! Command consumption worker
//!
//! A Command is consumed by deleting it. Only after the delete succeeds is
//! the matching queue request enqueued, so a Command yields at most one
//! request no matter how often it is delivered.

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::Context;
use crate::error::ControllerError;
use crate::types::{CommandItem, QueueAction, QueueRequest};

impl Context {
    /// Process one command. Returns false once the queue shuts down.
    pub async fn process_next_command(&self) -> bool {
        let Some(item) = self.commands.get().await else {
            return false;
        };

        let result = self.handle_command(&item).await;
        self.handle_command_err(&item, result);
        self.commands.done(&item);

        true
    }

    /// Run command workers until shutdown
    pub async fn run_command_worker(&self) {
        while self.process_next_command().await {}
    }

    /// Delete the command, then enqueue the queue request it carries.
    #[instrument(skip(self, item), fields(command = %item.name(), namespace = %item.namespace()))]
    pub async fn handle_command(&self, item: &CommandItem) -> Result<(), ControllerError> {
        let start = Instant::now();
        let namespace = item.namespace();
        let name = item.name();

        match self.client.delete_command(&namespace, &name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("command already consumed");
                return Ok(());
            }
            Err(source) => {
                return Err(ControllerError::DeleteCommand {
                    namespace,
                    name,
                    source,
                })
            }
        }

        let cmd = &item.0;
        match cmd.target_queue() {
            Some(target) => {
                let action = QueueAction::from_command(cmd.action.as_deref());
                info!(queue = target, %action, "command issued");
                self.queue_requests
                    .add(QueueRequest::from_command(target, action));
            }
            None => warn!("consumed command has no queue target"),
        }

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "finished syncing command"
        );
        Ok(())
    }

    /// Retry decision for commands: backoff until `max_retries`, then drop.
    pub fn handle_command_err(&self, item: &CommandItem, result: Result<(), ControllerError>) {
        let err = match result {
            Ok(()) => {
                self.commands.forget(item);
                return;
            }
            Err(err) => err,
        };

        let requeues = self.commands.num_requeues(item);
        if requeues < self.config.max_retries {
            debug!(error = %err, requeues, "error syncing command, retrying");
            self.commands.add_rate_limited(item.clone());
            return;
        }

        error!(
            command = %item.name(),
            namespace = %item.namespace(),
            error = %err,
            "dropping command out of the queue"
        );
        self.commands.forget(item);
    }
}
