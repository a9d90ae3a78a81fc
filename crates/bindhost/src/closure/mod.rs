//! Module closures exposed to the host as callable values.
//!
//! A closure's environment lives in module memory as the pair `(a, b)`.
//! While it is being invoked, `a` is cleared so a recursive or concurrent
//! invocation cannot observe the environment mid-call, and the live count is
//! raised so a release during the call defers destruction until the call
//! returns. Whoever brings the live count to zero destroys the environment:
//! the host (through the destructor in the module's table) if it happens on
//! the host side, the module itself if it happens in `__wbindgen_cb_drop`.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace};
use wasmtime::Val;

use crate::cx::Cx;
use crate::error::Fault;
use crate::slab;
use crate::value::{HostFunction, HostValue};

/// Shared lifetime state of one module closure.
#[derive(Debug)]
pub struct ClosureState {
    env_a: Cell<u32>,
    env_b: u32,
    live: Cell<u32>,
    dtor: u32,
}

impl ClosureState {
    pub fn new(a: u32, b: u32, dtor: u32) -> Rc<Self> {
        Rc::new(ClosureState {
            env_a: Cell::new(a),
            env_b: b,
            live: Cell::new(1),
            dtor,
        })
    }

    pub fn live_count(&self) -> u32 {
        self.live.get()
    }

    /// Whether the environment has been handed back for destruction.
    pub fn is_destroyed(&self) -> bool {
        self.live.get() == 0
    }

    /// Enters an invocation, returning the environment pointer, or `None`
    /// if the closure is destroyed or already mid-invocation.
    fn enter(&self) -> Option<u32> {
        let a = self.env_a.replace(0);
        if a == 0 {
            return None;
        }
        self.live.set(self.live.get() + 1);
        Some(a)
    }

    /// Leaves an invocation. Returns `true` when the caller must destroy.
    fn exit(&self, a: u32) -> bool {
        let live = self.live.get().saturating_sub(1);
        self.live.set(live);
        if live == 0 {
            true
        } else {
            self.env_a.set(a);
            false
        }
    }

    fn retain(&self) -> bool {
        let live = self.live.get();
        if live == 0 {
            return false;
        }
        self.live.set(live + 1);
        true
    }

    /// Drops one reference. Returns the environment when this was the last
    /// one and no invocation is in progress.
    ///
    /// The count held by an invocation in progress is not a reference: once
    /// every reference is gone, further releases are ignored until the call
    /// returns and destroys the environment.
    pub(crate) fn release(&self) -> Option<(u32, u32)> {
        let live = self.live.get();
        let mid_call = self.env_a.get() == 0;
        if live == 0 || (live == 1 && mid_call) {
            return None;
        }
        self.live.set(live - 1);
        if live == 1 {
            Some((self.env_a.replace(0), self.env_b))
        } else {
            None
        }
    }
}

/// A module closure plus the export that invokes it.
pub(crate) struct ModuleClosure {
    state: Rc<ClosureState>,
    invoke: Rc<str>,
}

impl ModuleClosure {
    pub(crate) fn new(state: Rc<ClosureState>, invoke: &str) -> Self {
        ModuleClosure {
            state,
            invoke: invoke.into(),
        }
    }

    pub(crate) fn state(&self) -> &Rc<ClosureState> {
        &self.state
    }

    pub(crate) fn share(&self) -> Option<ModuleClosure> {
        self.state.retain().then(|| ModuleClosure {
            state: self.state.clone(),
            invoke: self.invoke.clone(),
        })
    }

    pub(crate) fn invoke(&self, cx: &mut Cx<'_>, args: &[HostValue]) -> Result<HostValue, Fault> {
        let state = &self.state;
        let Some(a) = state.enter() else {
            if state.is_destroyed() {
                debug!(export = %self.invoke, "closure invoked after being dropped; ignored");
                return Ok(HostValue::Undefined);
            }
            return Err(Fault::Thrown(HostValue::error(
                "Error",
                "closure invoked recursively or after being dropped",
            )));
        };

        let result = call_invoke(cx, &self.invoke, a, state.env_b, args);

        if state.exit(a) {
            trace!(dtor = state.dtor, "closure released during its own call; destroying");
            let destroyed = cx.call_destructor(state.dtor, a, state.env_b);
            return result.and_then(|value| destroyed.map(|()| value));
        }
        result
    }
}

fn call_invoke(
    cx: &mut Cx<'_>,
    export: &str,
    a: u32,
    b: u32,
    args: &[HostValue],
) -> Result<HostValue, Fault> {
    let arity = cx.export_arity(export)?;
    let mut params = vec![Val::I32(a as i32), Val::I32(b as i32)];
    for index in 0..arity.saturating_sub(2) {
        let handle = match args.get(index) {
            Some(arg) => cx.add_object(arg.clone()),
            None => slab::UNDEFINED,
        };
        params.push(Val::I32(handle as i32));
    }
    let results = cx.call_export(export, &params)?;
    match results.first() {
        Some(Val::I32(handle)) => Ok(cx.take_object(*handle as u32)?),
        _ => Ok(HostValue::Undefined),
    }
}

/// Releases a host-side closure reference, destroying the environment if it
/// was the last one. Returns whether `func` wrapped a module closure.
pub fn dispose(cx: &mut Cx<'_>, func: &HostFunction) -> Result<bool, Fault> {
    let Some(state) = func.closure_state() else {
        return Ok(false);
    };
    if let Some((a, b)) = state.release() {
        if a != 0 {
            cx.call_destructor(state.dtor, a, b)?;
        }
    }
    Ok(true)
}

/// Handles `__wbindgen_cb_drop`. Returns whether the module must now free
/// the environment itself.
pub(crate) fn module_drop(value: &HostValue) -> bool {
    value
        .as_function()
        .and_then(HostFunction::closure_state)
        .is_some_and(|state| state.release().is_some())
}

/// Shape of a closure-wrapper import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureShape {
    /// Module export called as `(a, b, args...) -> result handle`.
    pub invoke: String,
    /// Index of the destructor in the module's function table.
    pub dtor: u32,
}

impl ClosureShape {
    pub fn new(invoke: &str, dtor: u32) -> Self {
        ClosureShape {
            invoke: invoke.to_string(),
            dtor,
        }
    }

    pub(crate) fn wrap(&self, a: u32, b: u32) -> HostFunction {
        HostFunction::closure(ModuleClosure::new(ClosureState::new(a, b, self.dtor), &self.invoke))
    }
}
