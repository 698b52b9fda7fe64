//! The machine: owns one state record, drives step scheduling and runs the
//! unwind protocol.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::continuation::Continuation;
use crate::error::MachineError;
use crate::frame::{CleanupFn, UnwindFrame};
use crate::handle::ControlHandle;
use crate::ids::StepId;
use crate::jump::{CaseBlock, JumpTable};
use crate::scheduler::Scheduler;
use crate::state::MachineState;
use crate::step::{CompletionFn, Fault, Resumption, SnapshotOps, StepFn};
use crate::value::Value;

/// The state-machine engine driving one compiled program.
///
/// Cheap to clone; clones share the same underlying state. All mutation
/// happens on one logical actor: transfers are deferred through the
/// scheduler, so there is never more than one resumption active at a time.
pub struct Machine<C: 'static> {
    pub(crate) inner: Rc<MachineInner<C>>,
}

impl<C: 'static> Clone for Machine<C> {
    fn clone(&self) -> Self {
        Machine {
            inner: Rc::clone(&self.inner),
        }
    }
}

pub(crate) struct MachineInner<C: 'static> {
    state: RefCell<MachineState<C>>,
    ctx: RefCell<C>,
    program: StepFn<C>,
    completion: RefCell<Option<CompletionFn>>,
    snapshot_ops: Option<SnapshotOps<C>>,
    scheduler: Rc<dyn Scheduler>,
    tables: RefCell<HashMap<StepId, Rc<JumpTable<C>>>>,
    /// True while compiled code or a cleanup action holds the locals
    /// context; a continuation completed during that window defers instead
    /// of re-entering.
    in_step: Cell<bool>,
}

impl<C: 'static> Machine<C> {
    /// Build a machine around a compiled step function and its locals
    /// context.
    pub fn new(
        scheduler: impl Scheduler + 'static,
        ctx: C,
        program: impl Fn(&Machine<C>, &mut C, StepId, Resumption) -> Result<(), MachineError>
            + 'static,
    ) -> Self {
        Self::build(Rc::new(scheduler), ctx, Rc::new(program), None)
    }

    /// Build a machine whose program contains finally-style regions and
    /// therefore needs locals capture/restore.
    pub fn with_snapshot_ops(
        scheduler: impl Scheduler + 'static,
        ctx: C,
        program: impl Fn(&Machine<C>, &mut C, StepId, Resumption) -> Result<(), MachineError>
            + 'static,
        ops: SnapshotOps<C>,
    ) -> Self {
        Self::build(Rc::new(scheduler), ctx, Rc::new(program), Some(ops))
    }

    fn build(
        scheduler: Rc<dyn Scheduler>,
        ctx: C,
        program: StepFn<C>,
        snapshot_ops: Option<SnapshotOps<C>>,
    ) -> Self {
        Machine {
            inner: Rc::new(MachineInner {
                state: RefCell::new(MachineState::new()),
                ctx: RefCell::new(ctx),
                program,
                completion: RefCell::new(None),
                snapshot_ops,
                scheduler,
                tables: RefCell::new(HashMap::new()),
                in_step: Cell::new(false),
            }),
        }
    }

    /// Install the terminal completion callback, invoked exactly once with
    /// the stored fault and values when the unwind stack empties.
    pub fn on_complete(&self, completion: impl FnOnce(Option<Fault>, Vec<Value>) + 'static) {
        *self.inner.completion.borrow_mut() = Some(Box::new(completion));
    }

    /// Schedule the canonical entry step.
    pub fn start(&self) {
        self.inner.go_to(StepId::ENTRY);
    }

    /// Record `id` as the next step and defer a resumption.
    pub fn go_to(&self, id: StepId) {
        self.inner.go_to(id);
    }

    /// Produce a one-shot continuation resuming at `id`, for hand-off to an
    /// external asynchronous operation.
    ///
    /// The wait is counted immediately: the operation may in principle
    /// complete before this call even returns to compiled code.
    pub fn then_to(&self, id: StepId) -> Continuation<C> {
        self.inner.then_to(id)
    }

    /// Terminal entry point for compiled code: the enclosing computation
    /// produced its final outcome. Starts (or resumes) the unwind walk.
    pub fn callback(&self, fault: Option<Fault>, values: Vec<Value>) {
        self.inner.callback(fault, values);
    }

    /// Register an unconditional cleanup side effect.
    pub fn push_cleanup_action(&self, action: impl FnOnce(&mut C) + 'static) {
        self.inner.push_cleanup_action(Box::new(action));
    }

    /// Register a finally-block re-entry step, capturing a locals snapshot
    /// now.
    pub fn push_cleanup_step(&self, step: StepId, ctx: &C) -> Result<(), MachineError> {
        self.inner.push_cleanup_step(step, ctx)
    }

    /// Register a catch-handler step unless one is already installed for
    /// the same id.
    pub fn push_catch_step(&self, step: StepId) {
        self.inner.push_catch_step(step);
    }

    /// Push a branch convergence point.
    pub fn push_phi(&self, id: StepId) {
        self.inner.push_phi(id);
    }

    /// Pop the innermost convergence point and transfer there.
    pub fn phi(&self) -> Result<(), MachineError> {
        self.inner.phi()
    }

    /// The jump table for a branch site, built from `blocks` on first
    /// reference and cached for the machine's lifetime afterwards.
    pub fn jump_table(&self, site: StepId, blocks: &[CaseBlock]) -> Rc<JumpTable<C>> {
        self.inner.jump_table(site, blocks)
    }

    /// The pending fault, for catch-handler steps deciding whether to
    /// resolve or re-raise.
    pub fn fault(&self) -> Option<Fault> {
        self.inner.state.borrow().fault.clone()
    }

    pub fn current_step(&self) -> StepId {
        self.inner.state.borrow().id
    }

    pub fn is_waiting(&self) -> bool {
        self.inner.is_waiting()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Count of step-function invocations so far.
    pub fn resumptions(&self) -> u64 {
        self.inner.state.borrow().resumptions
    }

    /// Control capability for an external owner: abort plus status, nothing
    /// else.
    pub fn handle(&self) -> ControlHandle<C> {
        ControlHandle::new(Rc::downgrade(&self.inner))
    }

    pub(crate) fn complete_continuation(
        &self,
        continuation: &Continuation<C>,
        result: Result<Vec<Value>, Fault>,
    ) -> Result<(), MachineError> {
        self.inner.complete_continuation(continuation, result)
    }
}

impl<C: 'static> MachineInner<C> {
    fn defer(self: &Rc<Self>, f: impl FnOnce(Rc<Self>) + 'static) {
        let machine = Rc::clone(self);
        self.scheduler.defer(Box::new(move || f(machine)));
    }

    pub(crate) fn go_to(self: &Rc<Self>, id: StepId) {
        {
            let mut st = self.state.borrow_mut();
            if st.finished {
                trace!(step = id.raw(), "transfer after completion ignored");
                return;
            }
            st.id = id;
            st.waiting += 1;
        }
        trace!(step = id.raw(), "transfer scheduled");
        self.defer(|machine| machine.resume());
    }

    fn resume(self: &Rc<Self>) {
        let (id, resumption) = {
            let mut st = self.state.borrow_mut();
            st.waiting = st.waiting.saturating_sub(1);
            if st.finished {
                return;
            }
            st.resumptions += 1;
            let resumption = match st.abort_fault.take() {
                Some(fault) => Resumption::Faulted(fault),
                None => Resumption::Normal(std::mem::take(&mut st.args)),
            };
            (st.id, resumption)
        };
        self.invoke(id, resumption);
    }

    fn invoke(self: &Rc<Self>, id: StepId, resumption: Resumption) {
        if self.state.borrow().finished {
            return;
        }
        trace!(
            step = id.raw(),
            faulted = resumption.is_faulted(),
            "resuming"
        );
        let machine = Machine {
            inner: Rc::clone(self),
        };
        self.in_step.set(true);
        let result = {
            let mut ctx = self.ctx.borrow_mut();
            (self.program)(&machine, &mut *ctx, id, resumption)
        };
        self.in_step.set(false);
        if let Err(err) = result {
            self.fail_fast(err);
        }
    }

    /// Fatal compiler-contract violation: complete immediately, bypassing
    /// the unwind walk.
    fn fail_fast(self: &Rc<Self>, err: MachineError) {
        warn!(%err, "fatal contract violation");
        {
            let mut st = self.state.borrow_mut();
            if st.finished {
                return;
            }
            st.waiting = 0;
            st.finished = true;
        }
        if let Some(completion) = self.completion.borrow_mut().take() {
            completion(Some(Fault::msg(err.to_string())), Vec::new());
        }
    }

    pub(crate) fn then_to(self: &Rc<Self>, id: StepId) -> Continuation<C> {
        self.state.borrow_mut().waiting += 1;
        trace!(target_step = id.raw(), "continuation issued");
        Continuation::new(
            Machine {
                inner: Rc::clone(self),
            },
            id,
        )
    }

    pub(crate) fn complete_continuation(
        self: &Rc<Self>,
        continuation: &Continuation<C>,
        result: Result<Vec<Value>, Fault>,
    ) -> Result<(), MachineError> {
        if continuation.is_consumed() {
            warn!(
                cont_id = continuation.id().raw(),
                "one-shot continuation invoked twice"
            );
            return Err(MachineError::one_shot_violation(continuation.id()));
        }
        let (id, resumption) = {
            let mut st = self.state.borrow_mut();
            st.waiting = st.waiting.saturating_sub(1);
            if st.finished {
                continuation.mark_consumed();
                trace!(
                    cont_id = continuation.id().raw(),
                    "continuation completed after machine finished"
                );
                return Ok(());
            }
            st.resumptions += 1;
            continuation.mark_consumed();
            match st.abort_fault.take() {
                // The abort path does not record the target id; the fault
                // is delivered at whatever step the machine is on.
                Some(fault) => (st.id, Resumption::Faulted(fault)),
                None => {
                    st.id = continuation.target();
                    let resumption = match result {
                        Ok(values) => Resumption::Normal(values),
                        Err(fault) => Resumption::Faulted(fault),
                    };
                    (continuation.target(), resumption)
                }
            }
        };
        if self.in_step.get() {
            // Completed synchronously from inside a running step: defer so
            // the locals context is never re-entered mutably.
            self.defer(move |machine| machine.invoke(id, resumption));
        } else {
            self.invoke(id, resumption);
        }
        Ok(())
    }

    pub(crate) fn callback(self: &Rc<Self>, fault: Option<Fault>, values: Vec<Value>) {
        {
            let mut st = self.state.borrow_mut();
            if st.finished {
                trace!("terminal callback after completion ignored");
                return;
            }
            st.fault = fault;
            st.args = values;
            if st.unwinding {
                trace!("unwind walk resumed by compiled code");
            } else {
                st.unwinding = true;
                trace!("unwind walk started");
            }
        }
        self.schedule_unwind();
    }

    fn schedule_unwind(self: &Rc<Self>) {
        self.defer(|machine| machine.unwind_tick());
    }

    fn unwind_tick(self: &Rc<Self>) {
        let mut st = self.state.borrow_mut();
        if st.finished {
            return;
        }
        match st.unwind_stack.pop() {
            Some(UnwindFrame::Catch { step }) => {
                st.installed_catches.remove(&step);
                let pending = st.fault.is_some();
                drop(st);
                if pending {
                    trace!(step = step.raw(), "catch frame taking pending fault");
                    self.go_to(step);
                } else {
                    trace!(step = step.raw(), "catch frame skipped, no pending fault");
                    self.schedule_unwind();
                }
            }
            Some(UnwindFrame::CleanupAction { action }) => {
                drop(st);
                trace!("running cleanup action");
                self.in_step.set(true);
                action(&mut *self.ctx.borrow_mut());
                self.in_step.set(false);
                self.schedule_unwind();
            }
            Some(UnwindFrame::CleanupStep { step, snapshot }) => {
                drop(st);
                if let Some(ops) = &self.snapshot_ops {
                    (ops.restore)(&mut *self.ctx.borrow_mut(), snapshot);
                }
                trace!(step = step.raw(), "re-entering cleanup step");
                self.go_to(step);
            }
            None => {
                st.waiting = 0;
                st.finished = true;
                let fault = st.fault.take();
                let values = std::mem::take(&mut st.args);
                drop(st);
                trace!(faulted = fault.is_some(), "machine finished");
                if let Some(completion) = self.completion.borrow_mut().take() {
                    completion(fault, values);
                }
            }
        }
    }

    fn push_cleanup_action(&self, action: CleanupFn<C>) {
        self.state
            .borrow_mut()
            .unwind_stack
            .push(UnwindFrame::CleanupAction { action });
    }

    fn push_cleanup_step(&self, step: StepId, ctx: &C) -> Result<(), MachineError> {
        let ops = self
            .snapshot_ops
            .as_ref()
            .ok_or_else(|| MachineError::missing_snapshot_ops(step))?;
        let snapshot = (ops.capture)(ctx);
        self.state
            .borrow_mut()
            .unwind_stack
            .push(UnwindFrame::CleanupStep { step, snapshot });
        Ok(())
    }

    fn push_catch_step(&self, step: StepId) {
        let mut st = self.state.borrow_mut();
        if st.installed_catches.insert(step) {
            st.unwind_stack.push(UnwindFrame::Catch { step });
        } else {
            trace!(step = step.raw(), "catch already installed, skipped");
        }
    }

    pub(crate) fn push_phi(&self, id: StepId) {
        self.state.borrow_mut().phi_stack.push(id);
    }

    fn phi(self: &Rc<Self>) -> Result<(), MachineError> {
        let id = self
            .state
            .borrow_mut()
            .phi_stack
            .pop()
            .ok_or(MachineError::EmptyPhiStack)?;
        self.go_to(id);
        Ok(())
    }

    fn jump_table(self: &Rc<Self>, site: StepId, blocks: &[CaseBlock]) -> Rc<JumpTable<C>> {
        if let Some(table) = self.tables.borrow().get(&site) {
            return Rc::clone(table);
        }
        let table = Rc::new(JumpTable::build(Rc::downgrade(self), site, blocks));
        self.tables.borrow_mut().insert(site, Rc::clone(&table));
        table
    }

    pub(crate) fn abort(self: &Rc<Self>, fault: Fault) {
        {
            let mut st = self.state.borrow_mut();
            if st.finished {
                return;
            }
            if st.waiting > 0 {
                trace!(waiting = st.waiting, "abort recorded for next resumption");
                st.abort_fault = Some(fault);
                return;
            }
        }
        // Nothing outstanding can observe the flag, so completion is forced
        // directly; the fault still flows through the unwind stack.
        trace!("abort on idle machine, forcing completion");
        self.callback(Some(fault), Vec::new());
    }

    pub(crate) fn is_waiting(&self) -> bool {
        self.state.borrow().waiting > 0
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }
}
