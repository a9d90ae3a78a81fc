//! Named operation table for module instantiation.
//!
//! The [`Linker`] collects host operations under import names and resolves
//! them against a module's declared imports during instantiation. Every
//! operation is registered either as *direct* (a thrown host exception
//! unwinds into the module) or *fallible* (a thrown host exception is parked
//! in the pending error slot and the operation returns zeros).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use wasmtime::{AsContextMut, Caller, FuncType, Val, ValType};

use crate::closure::ClosureShape;
use crate::config::Config;
use crate::cx::Cx;
use crate::error::{BoundaryError, Fault, InstantiationError};
use crate::exn;
use crate::instance::Instance;
use crate::module::Module;
use crate::ops;
use crate::store::{Exports, HostState, Store};

/// Wasm value types an operation's signature is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abi {
    I32,
    I64,
    F32,
    F64,
}

impl Abi {
    fn val_type(self) -> ValType {
        match self {
            Abi::I32 => ValType::I32,
            Abi::I64 => ValType::I64,
            Abi::F32 => ValType::F32,
            Abi::F64 => ValType::F64,
        }
    }

    fn zero(self) -> Val {
        match self {
            Abi::I32 => Val::I32(0),
            Abi::I64 => Val::I64(0),
            Abi::F32 => Val::F32(0),
            Abi::F64 => Val::F64(0),
        }
    }
}

/// How thrown host exceptions leave an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Direct,
    Fallible,
}

type OpFn = dyn Fn(&mut Cx<'_>, &Args<'_>) -> Result<Option<Val>, Fault> + Send + Sync;

/// Entry in the linker registry.
struct OpEntry {
    kind: OpKind,
    params: Vec<Abi>,
    results: Vec<Abi>,
    body: Arc<OpFn>,
}

/// Raw arguments of one operation call, with typed accessors.
pub struct Args<'a> {
    op: &'a str,
    vals: &'a [Val],
}

impl<'a> Args<'a> {
    pub fn new(op: &'a str, vals: &'a [Val]) -> Self {
        Args { op, vals }
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    fn get(&self, index: usize) -> Result<&Val, BoundaryError> {
        self.vals.get(index).ok_or_else(|| self.bad(format!("missing argument {index}")))
    }

    fn bad(&self, message: String) -> BoundaryError {
        BoundaryError::BadArgument {
            op: self.op.to_string(),
            message,
        }
    }

    pub fn i32(&self, index: usize) -> Result<i32, BoundaryError> {
        match self.get(index)? {
            Val::I32(v) => Ok(*v),
            other => Err(self.bad(format!("argument {index}: expected i32, got {other:?}"))),
        }
    }

    /// Pointers, lengths and handles: `i32` on the wire, unsigned in meaning.
    pub fn u32(&self, index: usize) -> Result<u32, BoundaryError> {
        self.i32(index).map(|v| v as u32)
    }

    pub fn handle(&self, index: usize) -> Result<u32, BoundaryError> {
        self.u32(index)
    }

    pub fn i64(&self, index: usize) -> Result<i64, BoundaryError> {
        match self.get(index)? {
            Val::I64(v) => Ok(*v),
            other => Err(self.bad(format!("argument {index}: expected i64, got {other:?}"))),
        }
    }

    pub fn f64(&self, index: usize) -> Result<f64, BoundaryError> {
        match self.get(index)? {
            Val::F64(bits) => Ok(f64::from_bits(*bits)),
            Val::F32(bits) => Ok(f64::from(f32::from_bits(*bits))),
            other => Err(self.bad(format!("argument {index}: expected f64, got {other:?}"))),
        }
    }
}

/// A named registry of host operations exposed to a module.
///
/// Register operations, then call [`Linker::instantiate`] to resolve a
/// module's imports and produce a live [`Instance`].
///
/// # Examples
///
/// ```ignore
/// let mut linker = Linker::new(&config).with_std_ops();
/// linker.direct("answer", &[], &[Abi::I32], |_, _| Ok(Some(Val::I32(42))));
/// let instance = linker.instantiate(&mut store, &module)?;
/// ```
pub struct Linker {
    namespace: String,
    trap_unknown_imports: bool,
    entries: HashMap<String, OpEntry>,
}

impl Linker {
    pub fn new(config: &Config) -> Self {
        Linker {
            namespace: config.namespace.clone(),
            trap_unknown_imports: config.trap_unknown_imports,
            entries: HashMap::new(),
        }
    }

    /// Registers every standard operation.
    pub fn with_std_ops(mut self) -> Self {
        ops::register(&mut self);
        self
    }

    /// Register an operation whose host exceptions propagate into the module.
    pub fn direct<F>(&mut self, name: &str, params: &[Abi], results: &[Abi], body: F) -> &mut Self
    where
        F: Fn(&mut Cx<'_>, &Args<'_>) -> Result<Option<Val>, Fault> + Send + Sync + 'static,
    {
        self.insert(name, OpKind::Direct, params, results, Arc::new(body))
    }

    /// Register an operation whose host exceptions become an error code.
    pub fn fallible<F>(&mut self, name: &str, params: &[Abi], results: &[Abi], body: F) -> &mut Self
    where
        F: Fn(&mut Cx<'_>, &Args<'_>) -> Result<Option<Val>, Fault> + Send + Sync + 'static,
    {
        self.insert(name, OpKind::Fallible, params, results, Arc::new(body))
    }

    /// Register a closure-wrapper import `(a, b, unused) -> handle`.
    pub fn closure(&mut self, name: &str, shape: ClosureShape) -> &mut Self {
        self.direct(name, &[Abi::I32, Abi::I32, Abi::I32], &[Abi::I32], move |cx, args| {
            let func = shape.wrap(args.u32(0)?, args.u32(1)?);
            Ok(Some(Val::I32(cx.add_object(func.into()) as i32)))
        })
    }

    fn insert(
        &mut self,
        name: &str,
        kind: OpKind,
        params: &[Abi],
        results: &[Abi],
        body: Arc<OpFn>,
    ) -> &mut Self {
        let previous = self.entries.insert(
            name.to_string(),
            OpEntry {
                kind,
                params: params.to_vec(),
                results: results.to_vec(),
                body,
            },
        );
        if previous.is_some() {
            debug!(op = name, "operation re-registered");
        }
        self
    }

    /// Check whether an operation name is already registered.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// How the operation registered as `name` reports host exceptions.
    pub fn kind(&self, name: &str) -> Option<OpKind> {
        self.entries.get(name).map(|entry| entry.kind)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolve a module's imports and instantiate it into `store`.
    ///
    /// Instantiation fails if an import from the operation namespace is not
    /// registered, unless unknown imports were configured to trap when called.
    /// On success the store's export bindings and memory views are reset for
    /// the new instance. The start hook is not run.
    pub fn instantiate(&self, store: &mut Store, module: &Module) -> Result<Instance, InstantiationError> {
        let linker = self.link(store.engine(), module)?;
        let instance = linker
            .instantiate(&mut *store, module.wasmtime())
            .map_err(InstantiationError::Link)?;
        let exports = Exports::resolve(&mut *store, instance)?;
        let state = store.data_mut();
        state.exports = Some(exports);
        state.views.invalidate();
        Ok(Instance::new(instance))
    }

    fn link(
        &self,
        engine: &wasmtime::Engine,
        module: &Module,
    ) -> Result<wasmtime::Linker<HostState>, InstantiationError> {
        let mut linker = wasmtime::Linker::new(engine);
        for (name, entry) in &self.entries {
            let ty = FuncType::new(
                engine,
                entry.params.iter().map(|abi| abi.val_type()),
                entry.results.iter().map(|abi| abi.val_type()),
            );
            linker
                .func_new(&self.namespace, name, ty, host_func(name, entry))
                .map_err(InstantiationError::Link)?;
        }

        let missing = module.abi().missing_imports(self);
        for import in &missing {
            warn!(module = %import.module, name = %import.name, "import not provided by the operation table");
        }
        if self.trap_unknown_imports {
            linker
                .define_unknown_imports_as_traps(module.wasmtime())
                .map_err(InstantiationError::Link)?;
        } else if let Some(import) = missing.first() {
            return Err(InstantiationError::Link(anyhow::anyhow!(
                "import '{}::{}' was not found",
                import.module,
                import.name
            )));
        }
        Ok(linker)
    }
}

/// Adapts a registry entry to wasmtime's dynamic host function signature.
fn host_func(
    name: &str,
    entry: &OpEntry,
) -> impl Fn(Caller<'_, HostState>, &[Val], &mut [Val]) -> anyhow::Result<()> + Send + Sync + 'static {
    let name: Arc<str> = name.into();
    let kind = entry.kind;
    let results = entry.results.clone();
    let body = entry.body.clone();
    move |mut caller: Caller<'_, HostState>, params: &[Val], out: &mut [Val]| {
        let mut cx = Cx::new(caller.as_context_mut());
        let args = Args::new(&name, params);
        let outcome = match kind {
            OpKind::Direct => body(&mut cx, &args),
            OpKind::Fallible => exn::handle_error(&mut cx, |cx| body(cx, &args)).map(Option::flatten),
        };
        match outcome {
            Ok(value) => {
                for (slot, abi) in out.iter_mut().zip(&results) {
                    *slot = abi.zero();
                }
                if let (Some(value), Some(slot)) = (value, out.first_mut()) {
                    *slot = value;
                }
                Ok(())
            }
            Err(fault) => Err(cx.raise(fault)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_ops_register_direct_and_fallible_entries() {
        let linker = Linker::new(&Config::new()).with_std_ops();
        assert_eq!(linker.namespace(), "wbg");
        assert_eq!(linker.kind("__wbindgen_is_falsy"), Some(OpKind::Direct));
        assert_eq!(linker.kind("__wbg_get"), Some(OpKind::Fallible));
        assert_eq!(linker.kind("__wbindgen_memory"), Some(OpKind::Direct));
        assert_eq!(linker.kind("__wbg_not_an_op"), None);
    }
}
