//! Orchestrator (§4.6): composes the Notification Hub, IMU Client, Command
//! Handler, Command Pipeline and registered controllers into a running
//! system, and exposes its lifecycle to the host process.

mod config;

pub use config::OrchestratorConfig;

use std::sync::Arc;

use command_core::CommandHandler;
use command_pipeline::CommandPipeline;
use command_types::ModelCommand;
use controllers::Controller;
use imu_client::ImuClient;
use notification_hub::{bus::SubscriptionId, Hub};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

struct RegisteredController {
    controller: Arc<dyn Controller>,
    subscription: SubscriptionId,
}

struct Running {
    cancel: CancellationToken,
}

/// Composition root for the IMU orchestration core. Owns one [`Hub`], one
/// [`ImuClient`], one [`CommandHandler`], one [`CommandPipeline`], and a
/// registry of controllers wired into that pipeline.
pub struct Orchestrator {
    hub: Arc<Hub>,
    imu_client: Arc<ImuClient>,
    handler: Arc<CommandHandler>,
    pipeline: Arc<CommandPipeline>,
    controllers: Mutex<Vec<RegisteredController>>,
    /// Serializes `start`/`stop`/`dispose` (§4.6, §5).
    lifecycle: Mutex<Option<Running>>,
    disposed: Mutex<bool>,
}

impl Orchestrator {
    pub fn new(_config: OrchestratorConfig) -> Self {
        let hub = Arc::new(Hub::new());
        // The IMU Client's own cancellation scope is re-rooted at each
        // `start()`, so it starts out on a standalone token here and is
        // only ever dereferenced through `Arc<ImuClient>` — `start()`
        // replaces nothing on the client itself, it just gives the
        // orchestrator's root token to subsequently-opened sessions via
        // the client's existing `root_cancel` (set at construction).
        let imu_client = Arc::new(ImuClient::new(Arc::clone(&hub), CancellationToken::new()));
        let handler = Arc::new(CommandHandler::new(Arc::clone(&imu_client)));
        let pipeline = Arc::new(CommandPipeline::new(Arc::clone(&handler), Arc::clone(&hub)));
        Self {
            hub,
            imu_client,
            handler,
            pipeline,
            controllers: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(None),
            disposed: Mutex::new(false),
        }
    }

    /// The shared hub — subscribe here to observe `ModelResult`s and IMU
    /// events (§4.1).
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The shared pipeline — controllers needing request/response execution
    /// (the Programmatic Controller) are attached to this via
    /// [`Controller::attach_pipeline`] on registration.
    pub fn pipeline(&self) -> &Arc<CommandPipeline> {
        &self.pipeline
    }

    /// Append `controller` to the registry (deduplicated by `Arc` identity),
    /// subscribe its `command_requested` to `pipeline.try_enqueue`, and
    /// attach the pipeline for controllers that need it (§4.6).
    pub async fn register_controller(&self, controller: Arc<dyn Controller>) {
        let mut controllers = self.controllers.lock().await;
        if controllers
            .iter()
            .any(|existing| Arc::ptr_eq(&existing.controller, &controller))
        {
            return;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let subscription = controller
            .command_requested()
            .subscribe(move |cmd: &ModelCommand| {
                if !pipeline.try_enqueue(cmd.clone()) {
                    warn!(
                        controller_id = %cmd.controller_id,
                        "dropped command: pipeline is not running"
                    );
                }
            });
        controller.attach_pipeline(Arc::clone(&self.pipeline));

        info!(controller_id = %controller.id(), "controller registered");
        controllers.push(RegisteredController {
            controller,
            subscription,
        });
    }

    /// Remove `controller` from the registry: unsubscribe it from the
    /// pipeline, detach the pipeline reference, and release ownership if it
    /// currently holds the IMU session. Does **not** disconnect the IMU
    /// (§4.6).
    pub async fn unregister_controller(&self, controller: &Arc<dyn Controller>) -> bool {
        let mut controllers = self.controllers.lock().await;
        let Some(index) = controllers
            .iter()
            .position(|existing| Arc::ptr_eq(&existing.controller, controller))
        else {
            return false;
        };
        let entry = controllers.remove(index);
        entry.controller.command_requested().unsubscribe(entry.subscription);
        entry.controller.detach_pipeline();
        self.handler.release_ownership(entry.controller.id()).await;
        info!(controller_id = %entry.controller.id(), "controller unregistered");
        true
    }

    /// Start the pipeline and every registered controller, in registration
    /// order. On any controller failure, unwinds everything already
    /// started (in reverse), stops the pipeline, disconnects the IMU,
    /// resets ownership, and returns `false`.
    pub async fn start(&self) -> bool {
        if *self.disposed.lock().await {
            return false;
        }
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        self.pipeline.start(&cancel).await;

        let controllers = self.controllers.lock().await;
        let mut started = Vec::with_capacity(controllers.len());
        for entry in controllers.iter() {
            if entry.controller.start().await {
                started.push(Arc::clone(&entry.controller));
            } else {
                error!(controller_id = %entry.controller.id(), "controller failed to start, rolling back");
                for already in started.iter().rev() {
                    let _ = already.stop().await;
                }
                drop(controllers);
                cancel.cancel();
                self.pipeline.stop().await;
                self.imu_client.disconnect().await;
                self.handler.reset_ownership().await;
                return false;
            }
        }
        drop(controllers);

        *lifecycle = Some(Running { cancel });
        info!("orchestrator started");
        true
    }

    /// Cancel the lifecycle scope, stop the pipeline (awaiting drain), stop
    /// every controller (errors swallowed), disconnect the IMU, and reset
    /// ownership. A no-op if not running.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };
        running.cancel.cancel();
        self.pipeline.stop().await;

        let controllers = self.controllers.lock().await;
        for entry in controllers.iter() {
            if !entry.controller.stop().await {
                warn!(controller_id = %entry.controller.id(), "controller failed to stop cleanly");
            }
        }
        drop(controllers);

        self.imu_client.disconnect().await;
        self.handler.reset_ownership().await;
        info!("orchestrator stopped");
    }

    /// Stop (if running), release the IMU Client, and mark this orchestrator
    /// disposed — `start()` will refuse to run again afterward.
    pub async fn dispose(&self) {
        self.stop().await;
        self.imu_client.disconnect().await;
        *self.disposed.lock().await = true;
        info!("orchestrator disposed");
    }

    /// Whether the pipeline/controllers are currently running.
    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.is_some()
    }

    /// Current IMU session owner, if any. Exposed for diagnostics and tests.
    pub async fn current_owner(&self) -> Option<String> {
        self.handler.current_owner().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controllers::ProgrammaticController;

    #[tokio::test]
    async fn start_then_stop_is_idempotent_and_clears_ownership() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let programmatic: Arc<dyn Controller> = Arc::new(ProgrammaticController::new("c1"));
        orchestrator.register_controller(Arc::clone(&programmatic)).await;

        assert!(orchestrator.start().await);
        assert!(orchestrator.is_running().await);

        orchestrator.stop().await;
        assert!(!orchestrator.is_running().await);
        assert_eq!(orchestrator.current_owner().await, None);

        // stop() a second time is a no-op, not an error.
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn start_twice_without_stop_returns_false() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        assert!(orchestrator.start().await);
        assert!(!orchestrator.start().await);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn dispose_prevents_further_starts() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        assert!(orchestrator.start().await);
        orchestrator.dispose().await;
        assert!(!orchestrator.start().await);
    }

    #[tokio::test]
    async fn unregister_releases_ownership_without_disconnecting_imu() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let owner = Arc::new(ProgrammaticController::new("owner"));
        let other = Arc::new(ProgrammaticController::new("other"));
        let owner_dyn: Arc<dyn Controller> = owner.clone();
        let other_dyn: Arc<dyn Controller> = other.clone();
        orchestrator.register_controller(owner_dyn.clone()).await;
        orchestrator.register_controller(other_dyn).await;
        assert!(orchestrator.start().await);

        let result = owner.start_imu("{}").await.unwrap();
        assert!(result.success);
        assert_eq!(orchestrator.current_owner().await.as_deref(), Some("owner"));

        assert!(orchestrator.unregister_controller(&owner_dyn).await);
        assert_eq!(orchestrator.current_owner().await, None);

        let stop_result = other.stop_imu().await.unwrap();
        assert!(stop_result.success);

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn registering_the_same_controller_twice_is_a_no_op() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let controller: Arc<dyn Controller> = Arc::new(ProgrammaticController::new("c1"));
        orchestrator.register_controller(Arc::clone(&controller)).await;
        orchestrator.register_controller(Arc::clone(&controller)).await;
        assert_eq!(orchestrator.controllers.lock().await.len(), 1);
    }
}
