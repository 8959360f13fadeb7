//! In-process "Programmatic" Controller (§4.5).
//!
//! Offers `start_imu`/`stop_imu` to in-process callers: each synthesizes a
//! `ModelCommand` with a fresh correlation id and awaits its `ModelResult`
//! via `CommandPipeline::execute`, projecting the payload back into an
//! [`ImuControlResult`]. Requires the orchestrator to attach a pipeline on
//! registration (§4.6, §9's installer-hook note) — calls made before that
//! fail with [`ProgrammaticControllerError::NotAttached`].

use std::sync::{Arc, Mutex};

use command_pipeline::{CommandPipeline, PipelineError};
use command_types::{CommandType, ImuControlStatus, ModelCommand};
use notification_hub::bus::EventBus;
use thiserror::Error;
use uuid::Uuid;

use crate::contract::Controller;

/// Errors raised by [`ProgrammaticController::start_imu`]/`stop_imu`.
#[derive(Debug, Error)]
pub enum ProgrammaticControllerError {
    /// No pipeline has been attached yet — the orchestrator attaches one on
    /// `register_controller` (§4.6).
    #[error("programmatic controller is not attached to a pipeline")]
    NotAttached,

    #[error("pipeline rejected the command: {0}")]
    Pipeline(#[from] PipelineError),
}

/// The in-process projection of a `ModelResult`'s IMU-control payload
/// (§4.5). Mirrors [`command_types::ImuCommandPayload`] one-to-one; kept as
/// a distinct type because it is this controller's own public surface, not
/// part of the shared command/result data model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuControlResult {
    pub status: ImuControlStatus,
    pub success: bool,
    pub is_connected: bool,
    pub message: String,
    pub error: Option<String>,
}

struct Inner {
    id: String,
    command_requested: EventBus<ModelCommand>,
    /// Set synchronously by `attach_pipeline`/`detach_pipeline` (both plain
    /// sync trait methods, §9's installer-hook note), so a plain mutex
    /// suffices — no need for an async lock here.
    pipeline: Mutex<Option<Arc<CommandPipeline>>>,
}

/// Reference in-process controller: no owned resources, so `start`/`stop`
/// are trivial no-ops; all the interesting behavior is in `start_imu` /
/// `stop_imu`.
pub struct ProgrammaticController {
    inner: Arc<Inner>,
}

impl ProgrammaticController {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                command_requested: EventBus::new(),
                pipeline: Mutex::new(None),
            }),
        }
    }

    /// Issue a `start` command with `raw_payload` and await its result
    /// (§6.3 for the payload shape).
    pub async fn start_imu(
        &self,
        raw_payload: impl Into<String>,
    ) -> Result<ImuControlResult, ProgrammaticControllerError> {
        self.execute(CommandType::Start, raw_payload.into()).await
    }

    /// Issue a `stop` command and await its result.
    pub async fn stop_imu(&self) -> Result<ImuControlResult, ProgrammaticControllerError> {
        self.execute(CommandType::End, "{}".to_string()).await
    }

    async fn execute(
        &self,
        command_type: CommandType,
        raw_payload: String,
    ) -> Result<ImuControlResult, ProgrammaticControllerError> {
        let pipeline = self
            .inner
            .pipeline
            .lock()
            .expect("programmatic controller pipeline lock poisoned")
            .clone()
            .ok_or(ProgrammaticControllerError::NotAttached)?;

        let correlation_id = Uuid::new_v4().to_string();
        let cmd = ModelCommand::with_correlation(
            self.inner.id.clone(),
            command_type,
            raw_payload,
            correlation_id,
        );
        let result = pipeline.execute(cmd).await?;
        Ok(ImuControlResult {
            status: result.payload.status,
            success: result.success,
            is_connected: result.payload.is_connected,
            message: result.payload.message,
            error: result.error,
        })
    }
}

#[async_trait::async_trait]
impl Controller for ProgrammaticController {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn command_requested(&self) -> &EventBus<ModelCommand> {
        &self.inner.command_requested
    }

    async fn start(&self) -> bool {
        true
    }

    async fn stop(&self) -> bool {
        true
    }

    fn attach_pipeline(&self, pipeline: Arc<CommandPipeline>) {
        *self
            .inner
            .pipeline
            .lock()
            .expect("programmatic controller pipeline lock poisoned") = Some(pipeline);
    }

    fn detach_pipeline(&self) {
        *self
            .inner
            .pipeline
            .lock()
            .expect("programmatic controller pipeline lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_core::CommandHandler;
    use command_pipeline::CommandPipeline;
    use imu_client::ImuClient;
    use notification_hub::Hub;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn start_imu_before_attach_fails_fast() {
        let controller = ProgrammaticController::new("c1");
        let err = controller.start_imu("{}").await.unwrap_err();
        assert!(matches!(err, ProgrammaticControllerError::NotAttached));
    }

    fn new_attached_pipeline() -> Arc<CommandPipeline> {
        let hub = Arc::new(Hub::new());
        let imu = Arc::new(ImuClient::new(Arc::clone(&hub), CancellationToken::new()));
        let handler = Arc::new(CommandHandler::new(imu));
        Arc::new(CommandPipeline::new(handler, hub))
    }

    /// Pipeline-backed round trip (mirrors S1/S3): `start_imu` resolves
    /// `Success`, a second `start_imu` from the same controller resolves
    /// `AlreadyRunning`, and `stop_imu` clears ownership.
    #[tokio::test]
    async fn start_then_stop_round_trips_through_the_pipeline() {
        let pipeline = new_attached_pipeline();
        pipeline.start(&CancellationToken::new()).await;

        let controller = ProgrammaticController::new("c1");
        controller.attach_pipeline(Arc::clone(&pipeline));

        let first = controller.start_imu("{}").await.unwrap();
        assert!(first.success);
        assert_eq!(first.status, ImuControlStatus::Success);

        let second = controller.start_imu("{}").await.unwrap();
        assert!(second.success);
        assert_eq!(second.status, ImuControlStatus::AlreadyRunning);

        let stop = controller.stop_imu().await.unwrap();
        assert!(stop.success);
        assert_eq!(stop.status, ImuControlStatus::Success);

        pipeline.stop().await;
    }

    /// Ownership interleaving across two programmatic controllers sharing
    /// one pipeline (mirrors S2).
    #[tokio::test]
    async fn ownership_is_exclusive_across_controllers() {
        let pipeline = new_attached_pipeline();
        pipeline.start(&CancellationToken::new()).await;

        let owner = ProgrammaticController::new("owner");
        let other = ProgrammaticController::new("other");
        owner.attach_pipeline(Arc::clone(&pipeline));
        other.attach_pipeline(Arc::clone(&pipeline));

        assert_eq!(owner.start_imu("{}").await.unwrap().status, ImuControlStatus::Success);
        assert_eq!(
            other.stop_imu().await.unwrap().status,
            ImuControlStatus::OwnershipError
        );
        assert_eq!(
            other.start_imu("{}").await.unwrap().status,
            ImuControlStatus::OwnershipError
        );
        assert_eq!(owner.stop_imu().await.unwrap().status, ImuControlStatus::Success);
        assert_eq!(other.start_imu("{}").await.unwrap().status, ImuControlStatus::Success);

        pipeline.stop().await;
    }
}
