//! External control capability over a running machine.

use std::rc::Weak;

use crate::machine::MachineInner;
use crate::step::Fault;

/// Thin façade allowing cooperative abort and status observation without
/// exposing machine state.
///
/// Safe to invoke at any point relative to the machine's own scheduling:
/// it only records the abort fault or forces the terminal callback, both of
/// which tolerate an in-flight resumption.
pub struct ControlHandle<C: 'static> {
    inner: Weak<MachineInner<C>>,
}

impl<C: 'static> ControlHandle<C> {
    pub(crate) fn new(inner: Weak<MachineInner<C>>) -> Self {
        ControlHandle { inner }
    }

    /// Request cooperative cancellation.
    ///
    /// With resumptions outstanding, the fault is delivered to the next one
    /// in place of its normal arguments. With an idle machine, completion
    /// is forced immediately through the unwind walk.
    pub fn abort(&self, fault: Fault) {
        if let Some(inner) = self.inner.upgrade() {
            inner.abort(fault);
        }
    }

    /// Whether resumptions are scheduled or promised but not yet run.
    pub fn is_waiting(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.is_waiting())
            .unwrap_or(false)
    }

    /// Whether the machine reached terminal completion. A dropped machine
    /// reports finished.
    pub fn is_finished(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.is_finished())
            .unwrap_or(true)
    }
}

impl<C: 'static> Clone for ControlHandle<C> {
    fn clone(&self) -> Self {
        ControlHandle {
            inner: Weak::clone(&self.inner),
        }
    }
}
