//! Step graph: declaration, validation, ordering and execution.
//!
//! A workflow is a set of named steps joined by dependency edges, declared
//! through [`PipelineBuilder`]. `build()` rejects duplicate or reserved
//! names, merge functions without dependencies, unknown dependencies and
//! cycles. Execution walks a depth-first topological order, evaluates each
//! step's [`Guard`], folds every prior object result into the step's input
//! and records the output into the [`ExecutionContext`](crate::ExecutionContext).
//!
//! Yield points sit beside the steps. They never influence ordering; in
//! suspendable runs the executor pauses after any step a yield point is
//! registered against and hands back a [`YieldResponse`].

pub mod builder;
pub mod executor;
pub mod name;
pub mod schedule;
pub mod step;
pub mod workflow;
pub mod yield_point;

pub use builder::PipelineBuilder;
pub use executor::{Advance, RunOutput, RunState, YieldRecord};
pub use name::validate_step_name;
pub use step::{Branch, BranchOptions, Guard, Stage, Step, StepKind, StepOptions};
pub use workflow::Workflow;
pub use yield_point::{YieldPoint, YieldResponse};

/// Start declaring a workflow.
pub fn pipeline() -> PipelineBuilder {
    PipelineBuilder::new()
}
