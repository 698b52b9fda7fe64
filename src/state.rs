//! The mutable record describing where execution currently is.

use std::collections::HashSet;

use crate::frame::UnwindFrame;
use crate::ids::StepId;
use crate::step::Fault;
use crate::value::Value;

/// Execution state of one machine.
///
/// Exclusively owned by one [`Machine`](crate::machine::Machine) and
/// mutated only through it; never shared across machine instances.
pub struct MachineState<C> {
    /// Current/next step id. Always an id known to the compiled step
    /// function.
    pub id: StepId,
    /// Values carried into the next normal resumption.
    pub args: Vec<Value>,
    /// Last pending fault, consumed or overwritten by callback resolution.
    pub fault: Option<Fault>,
    /// LIFO stack of pending cleanup/catch frames.
    pub unwind_stack: Vec<UnwindFrame<C>>,
    /// LIFO stack of branch convergence points.
    pub phi_stack: Vec<StepId>,
    /// Catch ids currently on the unwind stack, to refuse duplicate
    /// registration when control re-enters a region.
    pub installed_catches: HashSet<StepId>,
    /// Resumptions scheduled or promised to an external operation but not
    /// yet run.
    pub waiting: u32,
    /// Terminal flag, set exactly once.
    pub finished: bool,
    /// True once the unwind walk has begun.
    pub unwinding: bool,
    /// Pending cooperative cancellation, consumed by the next resumption.
    pub abort_fault: Option<Fault>,
    /// Diagnostic count of step-function invocations.
    pub resumptions: u64,
}

impl<C> MachineState<C> {
    pub fn new() -> Self {
        MachineState {
            id: StepId::ENTRY,
            args: Vec::new(),
            fault: None,
            unwind_stack: Vec::new(),
            phi_stack: Vec::new(),
            installed_catches: HashSet::new(),
            waiting: 0,
            finished: false,
            unwinding: false,
            abort_fault: None,
            resumptions: 0,
        }
    }

    /// Whether no resumption is scheduled or promised.
    pub fn is_idle(&self) -> bool {
        self.waiting == 0
    }
}

impl<C> Default for MachineState<C> {
    fn default() -> Self {
        Self::new()
    }
}
