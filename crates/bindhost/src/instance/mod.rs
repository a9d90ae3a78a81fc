use tracing::debug;
use wasmtime::Val;

use crate::error::{BoundaryError, Fault, InstantiationError};
use crate::exn;
use crate::store::Store;
use crate::value::{WasmArgs, WasmResults};

/// An instantiated module.
#[derive(Debug, Clone, Copy)]
pub struct Instance {
    inner: wasmtime::Instance,
}

impl Instance {
    pub(crate) fn new(inner: wasmtime::Instance) -> Self {
        Instance { inner }
    }

    /// Call an exported function by name (typed API).
    pub fn call<A: WasmArgs, R: WasmResults>(
        &self,
        store: &mut Store,
        name: &str,
        args: A,
    ) -> Result<R, Fault> {
        let vals = self.call_dynamic(store, name, &args.to_vals())?;
        R::from_vals(&vals).map_err(Fault::Trap)
    }

    /// Call an exported function by name (dynamic API).
    pub fn call_dynamic(&self, store: &mut Store, name: &str, args: &[Val]) -> Result<Vec<Val>, Fault> {
        let func = self
            .inner
            .get_func(&mut *store, name)
            .ok_or_else(|| BoundaryError::MissingExport(name.to_string()))?;
        let mut results = vec![Val::I32(0); func.ty(&*store).results().len()];
        func.call(&mut *store, args, &mut results)
            .map_err(|err| exn::recover(store.data_mut(), err))?;
        Ok(results)
    }

    /// Get an exported global's value by name.
    pub fn get_global(&self, store: &mut Store, name: &str) -> Option<Val> {
        let global = self.inner.get_global(&mut *store, name)?;
        Some(global.get(&mut *store))
    }

    /// Runs the start hook, if the module exports one.
    pub(crate) fn start(&self, store: &mut Store) -> Result<(), InstantiationError> {
        let name = store.data().config.abi.start.clone();
        if self.inner.get_func(&mut *store, &name).is_none() {
            debug!(export = %name, "module has no start hook");
            return Ok(());
        }
        self.call_dynamic(store, &name, &[])
            .map(drop)
            .map_err(|fault| InstantiationError::Start(fault.to_string()))
    }
}
