//! Command/result data model (§3).
//!
//! `ModelCommand` is emitted by a controller and carries no behavior; it is
//! handed to the pipeline exactly as constructed. `ModelResult` is the
//! handler's answer, optionally resolved back to a waiting caller via
//! `correlation_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two control verbs a controller may submit. `CommandType` is closed
/// to these two variants by construction, so "unknown command type" (§4.3)
/// can never reach a built [`ModelCommand`]: a controller that accepts a
/// raw type string must validate it before constructing one, and reject an
/// unrecognized value at that boundary instead (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Start,
    End,
}

impl CommandType {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::Start => "start",
            CommandType::End => "end",
        }
    }
}

/// A command submitted by a controller (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCommand {
    pub controller_id: String,
    pub command_type: CommandType,
    /// UTF-8 payload, conventionally JSON; see §6.3 for the `start` shape.
    pub raw_payload: String,
    /// When present, the emitter can await the matching `ModelResult` via
    /// the pipeline's `execute`.
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ModelCommand {
    /// Build a command with no correlation id — fire-and-forget submission,
    /// the shape used by the HTTP adapter.
    pub fn fire_and_forget(
        controller_id: impl Into<String>,
        command_type: CommandType,
        raw_payload: impl Into<String>,
    ) -> Self {
        Self {
            controller_id: controller_id.into(),
            command_type,
            raw_payload: raw_payload.into(),
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a command with a fresh correlation id — the shape used by the
    /// programmatic controller's request/response calls.
    pub fn with_correlation(
        controller_id: impl Into<String>,
        command_type: CommandType,
        raw_payload: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            controller_id: controller_id.into(),
            command_type,
            raw_payload: raw_payload.into(),
            correlation_id: Some(correlation_id.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome tag for an IMU control command (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImuControlStatus {
    Success,
    AlreadyRunning,
    OwnershipError,
    Failed,
}

impl ImuControlStatus {
    /// `success` is true iff status is `Success` or `AlreadyRunning` (§4.3).
    pub fn is_success(self) -> bool {
        matches!(self, ImuControlStatus::Success | ImuControlStatus::AlreadyRunning)
    }
}

/// Typed payload carried by every IMU-control `ModelResult` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImuCommandPayload {
    pub status: ImuControlStatus,
    /// Reflects `imu_client.is_connected` at the moment the result was
    /// produced — not a live liveness signal (see §9 Open Questions).
    pub is_connected: bool,
    pub message: String,
}

/// The handler's answer to a `ModelCommand` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub controller_id: String,
    pub command_type: CommandType,
    pub correlation_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub payload: ImuCommandPayload,
    pub completed_at: DateTime<Utc>,
}

impl ModelResult {
    pub fn from_command(
        cmd: &ModelCommand,
        status: ImuControlStatus,
        is_connected: bool,
        message: impl Into<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            controller_id: cmd.controller_id.clone(),
            command_type: cmd.command_type,
            correlation_id: cmd.correlation_id.clone(),
            success: status.is_success(),
            error,
            payload: ImuCommandPayload {
                status,
                is_connected,
                message: message.into(),
            },
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_map_to_success_true() {
        assert!(ImuControlStatus::Success.is_success());
        assert!(ImuControlStatus::AlreadyRunning.is_success());
        assert!(!ImuControlStatus::OwnershipError.is_success());
        assert!(!ImuControlStatus::Failed.is_success());
    }

    #[test]
    fn result_copies_correlation_and_controller_from_command() {
        let cmd = ModelCommand::with_correlation("c1", CommandType::Start, "{}", "corr-1");
        let result = ModelResult::from_command(&cmd, ImuControlStatus::Success, true, "ok", None);
        assert_eq!(result.controller_id, "c1");
        assert_eq!(result.correlation_id.as_deref(), Some("corr-1"));
        assert!(result.success);
    }
}
