//! One-shot continuations handed to external asynchronous operations.

use std::cell::Cell;

use crate::error::MachineError;
use crate::ids::{ContId, StepId};
use crate::machine::Machine;
use crate::step::Fault;
use crate::value::Value;

/// Resumes the machine at a fixed step when an external operation finishes.
///
/// The guard state is explicit: a consumed flag next to the target step id
/// and the owning machine reference. An operation that calls back twice is
/// reported and ignored; the second invocation never re-enters compiled
/// code and never touches machine state.
///
/// The continuation holds a strong machine reference so the machine stays
/// alive while an external operation still owes it a completion.
pub struct Continuation<C: 'static> {
    cont_id: ContId,
    target: StepId,
    machine: Machine<C>,
    consumed: Cell<bool>,
}

impl<C: 'static> Continuation<C> {
    pub(crate) fn new(machine: Machine<C>, target: StepId) -> Self {
        Continuation {
            cont_id: ContId::fresh(),
            target,
            machine,
            consumed: Cell::new(false),
        }
    }

    pub fn id(&self) -> ContId {
        self.cont_id
    }

    pub fn target(&self) -> StepId {
        self.target
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.get()
    }

    pub(crate) fn mark_consumed(&self) {
        self.consumed.set(true);
    }

    /// Deliver the operation's outcome.
    ///
    /// The first invocation resumes the machine at the target step, or
    /// routes a pending abort fault instead. A second invocation returns
    /// [`MachineError::OneShotViolation`] and does nothing else.
    pub fn complete(&self, result: Result<Vec<Value>, Fault>) -> Result<(), MachineError> {
        self.machine.complete_continuation(self, result)
    }

    /// Complete with result values.
    pub fn resolve(&self, values: Vec<Value>) -> Result<(), MachineError> {
        self.complete(Ok(values))
    }

    /// Complete with a failure.
    pub fn reject(&self, fault: Fault) -> Result<(), MachineError> {
        self.complete(Err(fault))
    }
}

impl<C: 'static> Drop for Continuation<C> {
    fn drop(&mut self) {
        // An unconsumed drop leaves the waiting count elevated; the trace
        // is the breadcrumb for diagnosing a machine that never finishes.
        if !self.consumed.get() {
            tracing::trace!(
                cont_id = self.cont_id.raw(),
                target_step = self.target.raw(),
                "continuation dropped unconsumed"
            );
        }
    }
}
