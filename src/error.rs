//! Error types for the machine.

use crate::ids::{ContId, StepId};
use crate::value::CaseKey;

/// Contract-level failures surfaced by the machine.
///
/// Application errors travel as [`Fault`](crate::step::Fault) values through
/// the unwind stack; MachineError is reserved for violations of the contract
/// between the machine, the step compiler and external operations.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineError {
    /// A one-shot continuation was invoked more than once.
    OneShotViolation { cont_id: ContId },
    /// A case value with no block in the branch site's jump table.
    UnhandledCase { site: StepId, value: CaseKey },
    /// The step function was resumed at an id it does not know.
    UnknownStep { id: StepId },
    /// A phi transfer with no convergence point on the stack.
    EmptyPhiStack,
    /// A cleanup step was registered on a machine built without snapshot
    /// operations.
    MissingSnapshotOps { step: StepId },
    InternalError { message: String },
}

impl std::fmt::Display for MachineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineError::OneShotViolation { cont_id } => {
                write!(
                    f,
                    "one-shot violation: continuation {} already consumed",
                    cont_id.raw()
                )
            }
            MachineError::UnhandledCase { site, value } => {
                write!(
                    f,
                    "unhandled case at branch site {}: no block for value {}",
                    site.raw(),
                    value
                )
            }
            MachineError::UnknownStep { id } => {
                write!(f, "unknown step id {}", id.raw())
            }
            MachineError::EmptyPhiStack => {
                write!(f, "phi transfer with empty phi stack")
            }
            MachineError::MissingSnapshotOps { step } => {
                write!(
                    f,
                    "cleanup step {} registered without snapshot operations",
                    step.raw()
                )
            }
            MachineError::InternalError { message } => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for MachineError {}

impl MachineError {
    pub fn one_shot_violation(cont_id: ContId) -> Self {
        MachineError::OneShotViolation { cont_id }
    }

    pub fn unhandled_case(site: StepId, value: CaseKey) -> Self {
        MachineError::UnhandledCase { site, value }
    }

    pub fn unknown_step(id: StepId) -> Self {
        MachineError::UnknownStep { id }
    }

    pub fn missing_snapshot_ops(step: StepId) -> Self {
        MachineError::MissingSnapshotOps { step }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        MachineError::InternalError {
            message: message.into(),
        }
    }
}
