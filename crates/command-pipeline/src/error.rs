//! Errors raised by [`crate::CommandPipeline::execute`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// `execute` requires a command carrying a `correlation_id` (§4.4).
    #[error("execute requires a command with a correlation_id")]
    MissingCorrelationId,

    /// The pipeline has not been started, or has been stopped.
    #[error("pipeline is not running")]
    NotRunning,

    /// Another pending request is already registered under this id.
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelationId(String),

    /// The command could not be pushed onto the command queue.
    #[error("failed to enqueue command")]
    EnqueueFailed,

    /// The pending slot was canceled before a result arrived, typically
    /// because the pipeline was stopped while the request was in flight.
    #[error("request was canceled before a result was produced")]
    Cancelled,
}
