//! The Controller Contract (§4.5): the interface any command source — HTTP,
//! in-process, CLI, message queue — must satisfy to inject commands.

use std::sync::Arc;

use command_pipeline::CommandPipeline;
use command_types::ModelCommand;
use notification_hub::bus::EventBus;

/// Any source of `ModelCommand`s. Implementors expose a stable `id` and a
/// synchronous subscription surface (`command_requested`) that the
/// orchestrator wires directly to `CommandPipeline::try_enqueue`.
#[async_trait::async_trait]
pub trait Controller: Send + Sync {
    /// Stable unique identifier (§4.5).
    fn id(&self) -> &str;

    /// Subscription surface: the orchestrator subscribes
    /// `pipeline.try_enqueue` here on registration. Implementations invoke
    /// subscribers synchronously on their own producing context.
    fn command_requested(&self) -> &EventBus<ModelCommand>;

    /// Lifecycle hook: start any resources this controller owns (e.g. an
    /// HTTP listener). Returns `false` on failure.
    async fn start(&self) -> bool;

    /// Lifecycle hook: stop owned resources. Returns `false` on failure.
    async fn stop(&self) -> bool;

    /// Installer hook (§9): controllers that need direct pipeline access
    /// for request/response execution (the Programmatic Controller)
    /// override this. The default is a no-op, appropriate for controllers
    /// that only ever go through `command_requested`.
    fn attach_pipeline(&self, _pipeline: Arc<CommandPipeline>) {}

    /// Counterpart to [`Controller::attach_pipeline`], called on
    /// unregistration. Default no-op.
    fn detach_pipeline(&self) {}
}
