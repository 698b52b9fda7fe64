//! Frame types for the unwind stack.

use std::fmt;

use crate::ids::StepId;

/// Inert side effect run unconditionally during unwinding.
pub type CleanupFn<C> = Box<dyn FnOnce(&mut C)>;

/// A frame on the unwind stack.
///
/// The stack is the explicit record of nested try/catch/finally regions.
/// Cleanup frames run regardless of error state; catch frames take control
/// only while a fault is pending and are skipped silently otherwise.
pub enum UnwindFrame<C> {
    /// Unconditional side effect; never transfers control.
    CleanupAction { action: CleanupFn<C> },
    /// Finally-block re-entry point plus the locals snapshot captured at
    /// registration time.
    CleanupStep { step: StepId, snapshot: C },
    /// Catch handler entry point.
    Catch { step: StepId },
}

impl<C> UnwindFrame<C> {
    pub fn is_catch(&self) -> bool {
        matches!(self, UnwindFrame::Catch { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            UnwindFrame::CleanupAction { .. } => "cleanup-action",
            UnwindFrame::CleanupStep { .. } => "cleanup-step",
            UnwindFrame::Catch { .. } => "catch",
        }
    }
}

impl<C> fmt::Debug for UnwindFrame<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnwindFrame::CleanupAction { .. } => f.write_str("CleanupAction"),
            UnwindFrame::CleanupStep { step, .. } => {
                f.debug_struct("CleanupStep").field("step", step).finish()
            }
            UnwindFrame::Catch { step } => f.debug_struct("Catch").field("step", step).finish(),
        }
    }
}
