//! Core identifier types for the machine.
//!
//! All ids are lightweight Copy types using the newtype pattern for type
//! safety.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a compiled step.
///
/// Step numbering is produced by the external step compiler; the machine
/// only stores, compares and transfers to these. Branch-site ids live in
/// the same space: a jump table packs its blocks immediately after the
/// site's own id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StepId(pub u32);

/// Unique identifier for one-shot continuations.
///
/// Each continuation handed to an external operation gets a fresh ContId
/// so idempotence violations can be reported against a stable identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ContId(pub u64);

static CONT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl StepId {
    /// The canonical entry step scheduled by `start`.
    pub const ENTRY: StepId = StepId(1);

    /// Create a StepId from a raw step number.
    pub fn from_raw(value: u32) -> Self {
        StepId(value)
    }

    /// Get the raw step number.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl ContId {
    /// Create a fresh unique ContId.
    pub fn fresh() -> Self {
        ContId(CONT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn from_raw(value: u64) -> Self {
        ContId(value)
    }
}
