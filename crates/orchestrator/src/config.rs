//! Orchestrator composition config (§4.6, SPEC_FULL §4.6 supplemental).
//!
//! Plain value object, reference-system style (`SchedulerConfig`,
//! `AlertConfig`): no file or environment reads happen inside this crate —
//! only the `api` binary's composition root touches the process
//! environment and hands the finished struct in.

/// Placeholder for future orchestrator-level tuning knobs. Empty today: the
/// core currently needs nothing beyond what each collaborator
/// (`CommandPipeline`, `ImuClient`) already takes, but the binary still
/// constructs and passes one through so adding a knob later doesn't change
/// `Orchestrator::new`'s signature.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {}
