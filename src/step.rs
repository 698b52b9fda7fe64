//! Resumption protocol types shared between the machine and compiled code.

use std::fmt;
use std::rc::Rc;

use crate::error::MachineError;
use crate::ids::StepId;
use crate::machine::Machine;
use crate::value::Value;

/// The error value that flows through callbacks, aborts and the unwind
/// walk.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// A plain message, used for machine-synthesized faults.
    Message(String),
    /// An application-supplied error payload.
    Payload(Value),
}

impl Fault {
    pub fn msg(message: impl Into<String>) -> Self {
        Fault::Message(message.into())
    }

    pub fn payload(value: impl Into<Value>) -> Self {
        Fault::Payload(value.into())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Message(m) => write!(f, "{}", m),
            Fault::Payload(v) => write!(f, "{:?}", v),
        }
    }
}

/// One re-entry into the compiled step function.
#[derive(Debug, Clone, PartialEq)]
pub enum Resumption {
    /// Normal resumption carrying the previous operation's result values.
    Normal(Vec<Value>),
    /// Error delivery: a failed operation or a pending abort.
    Faulted(Fault),
}

impl Resumption {
    pub fn is_faulted(&self) -> bool {
        matches!(self, Resumption::Faulted(_))
    }

    /// The carried values of a normal resumption, empty when faulted.
    pub fn into_args(self) -> Vec<Value> {
        match self {
            Resumption::Normal(args) => args,
            Resumption::Faulted(_) => Vec::new(),
        }
    }
}

/// Signature of the compiled step function.
///
/// Invoked once per resumption with the step id to dispatch on. Returning
/// `Err` reports a compiler-contract violation and force-finishes the
/// machine.
pub type StepFn<C> =
    Rc<dyn Fn(&Machine<C>, &mut C, StepId, Resumption) -> Result<(), MachineError>>;

/// Terminal completion callback, error first, invoked exactly once.
pub type CompletionFn = Box<dyn FnOnce(Option<Fault>, Vec<Value>)>;

/// Paired capture/restore operations over the locals context.
///
/// Supplied by the step compiler only when the program contains
/// finally-style regions; a machine built without them refuses cleanup-step
/// registration.
pub struct SnapshotOps<C> {
    pub capture: Box<dyn Fn(&C) -> C>,
    pub restore: Box<dyn Fn(&mut C, C)>,
}

impl<C: Clone> SnapshotOps<C> {
    /// Snapshot by cloning the whole locals record.
    pub fn cloning() -> Self {
        SnapshotOps {
            capture: Box::new(|ctx: &C| ctx.clone()),
            restore: Box::new(|ctx: &mut C, snapshot: C| *ctx = snapshot),
        }
    }
}
