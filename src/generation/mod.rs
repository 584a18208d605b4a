//! Per-slot problem generation.
//!
//! The [`Orchestrator`] walks a plan slot by slot: one model call per
//! attempt through the [`SlotGenerator`], reference judging, optional
//! guided scaffolding and an unconditional secret discard before a problem
//! is returned.

pub mod errors;
pub mod fallback;
pub mod hints;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod reference;
pub mod retry;
pub mod scaffolding;
pub mod slot_generator;

pub use errors::{
    FailureKind, GenerationContractError, GenerationSlotFailureError, ReferenceSolutionError,
    SlotError,
};
pub use fallback::{propose_generation_fallback, FallbackDecision, PatchOp, PatchOpKind};
pub use hints::HintGenerator;
pub use orchestrator::{GenerationOutcome, GenerationRun, Orchestrator, DOMAIN_POOL};
pub use progress::{HeartbeatMonitor, ProgressBus, ProgressCallback, ProgressEvent, Subscription};
pub use prompts::{PromptContext, RepairContext};
pub use reference::validate_reference;
pub use retry::max_attempts;
pub use scaffolding::apply_guided_scaffolding;
pub use slot_generator::{GeneratedDraft, GeneratorConfig, SlotGenerator};
