//! Ownership-enforcing Command Handler (§4.3).

use std::sync::Arc;

use command_types::{CommandType, ImuControlStatus, ModelCommand, ModelResult};
use imu_client::ImuClient;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Best-effort parse of a `start` command's payload (§6.3). A parse
/// failure, or either field missing, yields `(None, None)` — per §4.3,
/// that is not a command error, only "no endpoint to connect to".
#[derive(Debug, Default, Deserialize)]
struct StartPayload {
    address: Option<String>,
    port: Option<u16>,
}

/// Executes `ModelCommand`s against the IMU Client under the ownership
/// rules in §4.3. `current_owner_id` is guarded by its own mutex, held only
/// across the admission decision for a single command (invariant 4 is
/// upheld one level up, by the pipeline's single processor).
pub struct CommandHandler {
    imu_client: Arc<ImuClient>,
    current_owner_id: Mutex<Option<String>>,
}

impl CommandHandler {
    pub fn new(imu_client: Arc<ImuClient>) -> Self {
        Self {
            imu_client,
            current_owner_id: Mutex::new(None),
        }
    }

    /// Dispatch on `cmd.command_type` and produce a `ModelResult`. Never
    /// panics or propagates an error to the caller — every failure mode is
    /// expressed as a `Failed`/`OwnershipError` result (§7).
    pub async fn handle(&self, cmd: &ModelCommand) -> ModelResult {
        match cmd.command_type {
            CommandType::Start => self.handle_start(cmd).await,
            CommandType::End => self.handle_stop(cmd).await,
        }
    }

    async fn handle_start(&self, cmd: &ModelCommand) -> ModelResult {
        let StartPayload { address, port } =
            serde_json::from_str(&cmd.raw_payload).unwrap_or_default();

        let mut owner = self.current_owner_id.lock().await;
        match owner.as_deref() {
            None => {
                if let (Some(address), Some(port)) = (address.as_deref(), port) {
                    if let Err(err) = self.imu_client.connect(address, port).await {
                        warn!(controller_id = %cmd.controller_id, %err, "IMU connect failed");
                        return ModelResult::from_command(
                            cmd,
                            ImuControlStatus::Failed,
                            self.imu_client.is_connected(),
                            format!("failed to connect to IMU: {err}"),
                            Some(err.to_string()),
                        );
                    }
                }
                *owner = Some(cmd.controller_id.clone());
                let message = match (address, port) {
                    (Some(address), Some(port)) => {
                        format!("{} started the IMU session at {address}:{port}", cmd.controller_id)
                    }
                    _ => format!("{} started the IMU session (no endpoint given)", cmd.controller_id),
                };
                info!(controller_id = %cmd.controller_id, "IMU session started");
                ModelResult::from_command(
                    cmd,
                    ImuControlStatus::Success,
                    self.imu_client.is_connected(),
                    message,
                    None,
                )
            }
            Some(current) if current == cmd.controller_id => ModelResult::from_command(
                cmd,
                ImuControlStatus::AlreadyRunning,
                self.imu_client.is_connected(),
                format!("{} already owns the IMU session", cmd.controller_id),
                None,
            ),
            Some(_) => ModelResult::from_command(
                cmd,
                ImuControlStatus::OwnershipError,
                self.imu_client.is_connected(),
                "IMU session is owned by another controller",
                Some("ownership error".to_string()),
            ),
        }
    }

    async fn handle_stop(&self, cmd: &ModelCommand) -> ModelResult {
        let mut owner = self.current_owner_id.lock().await;
        match owner.as_deref() {
            None => {
                self.imu_client.disconnect().await;
                ModelResult::from_command(
                    cmd,
                    ImuControlStatus::Success,
                    self.imu_client.is_connected(),
                    "no owner was assigned",
                    None,
                )
            }
            Some(current) if current == cmd.controller_id => {
                *owner = None;
                self.imu_client.disconnect().await;
                info!(controller_id = %cmd.controller_id, "IMU session stopped");
                ModelResult::from_command(
                    cmd,
                    ImuControlStatus::Success,
                    self.imu_client.is_connected(),
                    format!("{} stopped the IMU session", cmd.controller_id),
                    None,
                )
            }
            Some(_) => ModelResult::from_command(
                cmd,
                ImuControlStatus::OwnershipError,
                self.imu_client.is_connected(),
                "IMU session is owned by another controller",
                Some("ownership error".to_string()),
            ),
        }
    }

    /// Clears ownership if `controller_id` currently holds it. Does **not**
    /// disconnect the IMU (§4.3) — used on controller unregistration.
    pub async fn release_ownership(&self, controller_id: &str) {
        let mut owner = self.current_owner_id.lock().await;
        if owner.as_deref() == Some(controller_id) {
            *owner = None;
        }
    }

    /// Unconditionally clears ownership, regardless of who holds it. Used
    /// at orchestrator teardown, after the IMU is already disconnecting.
    pub async fn reset_ownership(&self) {
        *self.current_owner_id.lock().await = None;
    }

    /// Current owner, if any. Exposed for tests and diagnostics.
    pub async fn current_owner(&self) -> Option<String> {
        self.current_owner_id.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notification_hub::Hub;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn new_handler() -> CommandHandler {
        let hub = Arc::new(Hub::new());
        let imu = Arc::new(ImuClient::new(hub, CancellationToken::new()));
        CommandHandler::new(imu)
    }

    #[tokio::test]
    async fn start_with_no_prior_owner_claims_ownership() {
        let handler = new_handler();
        let cmd = ModelCommand::fire_and_forget("c1", CommandType::Start, "{}");
        let result = handler.handle(&cmd).await;
        assert!(result.success);
        assert_eq!(result.payload.status, ImuControlStatus::Success);
        assert_eq!(handler.current_owner().await.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn second_start_by_owner_is_already_running() {
        let handler = new_handler();
        let first = ModelCommand::fire_and_forget("c1", CommandType::Start, "{}");
        handler.handle(&first).await;
        let second = ModelCommand::fire_and_forget("c1", CommandType::Start, "{}");
        let result = handler.handle(&second).await;
        assert!(result.success);
        assert_eq!(result.payload.status, ImuControlStatus::AlreadyRunning);
    }

    #[tokio::test]
    async fn start_by_other_controller_is_ownership_error() {
        let handler = new_handler();
        let owner_start = ModelCommand::fire_and_forget("owner", CommandType::Start, "{}");
        handler.handle(&owner_start).await;

        let other_start = ModelCommand::fire_and_forget("other", CommandType::Start, "{}");
        let result = handler.handle(&other_start).await;
        assert!(!result.success);
        assert_eq!(result.payload.status, ImuControlStatus::OwnershipError);
        assert_eq!(handler.current_owner().await.as_deref(), Some("owner"));
    }

    #[tokio::test]
    async fn stop_by_non_owner_is_ownership_error_and_leaves_owner_intact() {
        let handler = new_handler();
        handler
            .handle(&ModelCommand::fire_and_forget("owner", CommandType::Start, "{}"))
            .await;

        let result = handler
            .handle(&ModelCommand::fire_and_forget("other", CommandType::End, "{}"))
            .await;
        assert!(!result.success);
        assert_eq!(result.payload.status, ImuControlStatus::OwnershipError);
        assert_eq!(handler.current_owner().await.as_deref(), Some("owner"));
    }

    #[tokio::test]
    async fn stop_with_no_owner_succeeds_and_is_idempotent() {
        let handler = new_handler();
        let result = handler
            .handle(&ModelCommand::fire_and_forget("anyone", CommandType::End, "{}"))
            .await;
        assert!(result.success);
        assert_eq!(result.payload.status, ImuControlStatus::Success);
    }

    #[tokio::test]
    async fn stop_by_owner_clears_ownership() {
        let handler = new_handler();
        handler
            .handle(&ModelCommand::fire_and_forget("owner", CommandType::Start, "{}"))
            .await;
        let result = handler
            .handle(&ModelCommand::fire_and_forget("owner", CommandType::End, "{}"))
            .await;
        assert!(result.success);
        assert_eq!(handler.current_owner().await, None);
    }

    #[tokio::test]
    async fn release_ownership_clears_only_matching_controller() {
        let handler = new_handler();
        handler
            .handle(&ModelCommand::fire_and_forget("owner", CommandType::Start, "{}"))
            .await;
        handler.release_ownership("someone-else").await;
        assert_eq!(handler.current_owner().await.as_deref(), Some("owner"));
        handler.release_ownership("owner").await;
        assert_eq!(handler.current_owner().await, None);
    }

    #[tokio::test]
    async fn start_with_unparseable_payload_still_claims_ownership() {
        let handler = new_handler();
        let cmd = ModelCommand::fire_and_forget("c1", CommandType::Start, "not json");
        let result = handler.handle(&cmd).await;
        assert!(result.success);
        assert_eq!(handler.current_owner().await.as_deref(), Some("c1"));
    }
}
