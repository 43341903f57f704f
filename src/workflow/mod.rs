pub mod application_flow;
pub mod form_step;
pub mod step_tracker;
pub mod target_ctx;

#[cfg(test)]
pub(crate) mod testing;

pub use application_flow::{
    ApplicationFlow, FailureReason, FlowReport, FlowSettings, HoldReason, TargetOutcome,
};
pub use form_step::{classify_action, ActionIntent, FormStepProcessor, StepOutcome, StepSettings};
pub use step_tracker::{step_signature, FieldState, Stagnation, StepTracker};
pub use target_ctx::TargetCtx;
