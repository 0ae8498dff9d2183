//! Step-scheduling engine.
//!
//! Declare named steps with [`pipeline`], run a built [`Workflow`] to
//! completion with [`Workflow::run`], or drive it one yield point at a time
//! through a [`SessionManager`].

pub mod context;
pub mod graph;
pub mod session;

pub use context::{assemble_input, is_truthy, yield_snapshot, ExecutionContext};
pub use graph::{
    pipeline, Advance, Branch, BranchOptions, Guard, PipelineBuilder, RunOutput, RunState, Stage,
    Step, StepKind, StepOptions, Workflow, YieldPoint, YieldRecord, YieldResponse,
};
pub use session::{InMemorySessionStore, SessionManager, SessionProgress, SessionState, SessionStore};
