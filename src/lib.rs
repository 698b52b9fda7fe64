//! strand-vm: a single-actor runtime for step-compiled sequential programs.
//!
//! An external compiler turns sequential code into numbered steps; this
//! crate executes them. Every transfer between steps is deferred through a
//! scheduler rather than called directly, structured exception handling is
//! an explicit unwind stack of tagged frames, and switch/case dispatch is
//! an explicit per-site jump table.
//!
//! # Architecture
//!
//! - **Scheduled resumption**: `go_to` defers a re-entry, `then_to` hands a
//!   one-shot continuation to an external operation, `callback` starts the
//!   unwind walk
//! - **Tagged unwind frames**: cleanup-action / cleanup-step / catch
//! - **Per-site jump tables**: built lazily, cached for the machine's life
//! - **Cooperative abort**: a control handle records a fault consumed by
//!   the next resumption, or forces completion when the machine is idle

pub mod continuation;
pub mod error;
pub mod frame;
pub mod handle;
pub mod ids;
pub mod jump;
pub mod machine;
pub mod scheduler;
pub mod state;
pub mod step;
pub mod value;


// Re-exports for convenience
pub use continuation::Continuation;
pub use error::MachineError;
pub use frame::{CleanupFn, UnwindFrame};
pub use handle::ControlHandle;
pub use ids::{ContId, StepId};
pub use jump::{CaseBlock, JumpTable};
pub use machine::Machine;
pub use scheduler::{Scheduler, Task, TaskQueue};
pub use state::MachineState;
pub use step::{CompletionFn, Fault, Resumption, SnapshotOps, StepFn};
pub use value::{CaseKey, Value};
