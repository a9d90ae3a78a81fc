//! The context every host operation runs in.
//!
//! [`Cx`] wraps the store borrowed from the calling module, giving
//! operations slab access, bounds-checked memory access, string transfer
//! and re-entrant calls back into module exports.

use wasmtime::{Func, StoreContextMut, Val};

use tracing::{trace, warn};

use crate::codec::{self, Guest};
use crate::config::Config;
use crate::error::{BoundaryError, Fault};
use crate::exn;
use crate::memory::{self, Floats64, Words32};
use crate::store::{Exports, HostState};
use crate::value::{HostFunction, HostValue, Job};

pub struct Cx<'a> {
    store: StoreContextMut<'a, HostState>,
}

impl<'a> Cx<'a> {
    pub fn new(store: StoreContextMut<'a, HostState>) -> Self {
        Cx { store }
    }

    pub fn state(&self) -> &HostState {
        self.store.data()
    }

    pub fn state_mut(&mut self) -> &mut HostState {
        self.store.data_mut()
    }

    pub fn config(&self) -> &Config {
        &self.state().config
    }

    pub(crate) fn exports(&self) -> Result<Exports, BoundaryError> {
        self.state().exports.clone().ok_or(BoundaryError::NotReady)
    }

    /// Applies the boundary policy: strict mode propagates, lenient mode
    /// logs and substitutes `fallback`.
    fn degrade<T>(&self, err: BoundaryError, fallback: T) -> Result<T, BoundaryError> {
        if self.config().strict_boundary {
            Err(err)
        } else {
            warn!(error = %err, "boundary violation tolerated");
            Ok(fallback)
        }
    }

    pub fn add_object(&mut self, value: HostValue) -> u32 {
        self.state_mut().slab.allocate(value)
    }

    pub fn get_object(&mut self, handle: u32) -> Result<HostValue, BoundaryError> {
        match self.state().slab.resolve(handle) {
            Ok(value) => Ok(value.clone()),
            Err(err) => self.degrade(err, HostValue::Undefined),
        }
    }

    pub fn take_object(&mut self, handle: u32) -> Result<HostValue, BoundaryError> {
        match self.state_mut().slab.take(handle) {
            Ok(value) => Ok(value),
            Err(err) => self.degrade(err, HostValue::Undefined),
        }
    }

    pub fn drop_object(&mut self, handle: u32) -> Result<(), BoundaryError> {
        match self.state_mut().slab.release(handle) {
            Ok(_) => Ok(()),
            Err(err) => self.degrade(err, ()),
        }
    }

    pub fn clone_object(&mut self, handle: u32) -> Result<u32, BoundaryError> {
        match self.state_mut().slab.clone_handle(handle) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                let fallback = self.add_object(HostValue::Undefined);
                self.degrade(err, fallback)
            }
        }
    }

    /// Current linear memory, revalidating the view cache first.
    pub fn bytes(&mut self) -> Result<&mut [u8], BoundaryError> {
        let memory = self.exports()?.memory;
        let size = memory.data_size(&self.store);
        self.state_mut().views.refresh(size);
        Ok(memory.data_mut(&mut self.store))
    }

    pub fn words32(&mut self) -> Result<Words32<'_>, BoundaryError> {
        Ok(Words32::new(self.bytes()?))
    }

    pub fn floats64(&mut self) -> Result<Floats64<'_>, BoundaryError> {
        Ok(Floats64::new(self.bytes()?))
    }

    pub fn read_bytes(&mut self, ptr: u32, len: u32) -> Result<Vec<u8>, BoundaryError> {
        Ok(memory::slice(self.bytes()?, ptr, len)?.to_vec())
    }

    pub fn write_bytes(&mut self, ptr: u32, data: &[u8]) -> Result<(), BoundaryError> {
        memory::slice_mut(self.bytes()?, ptr, data.len() as u32)?.copy_from_slice(data);
        Ok(())
    }

    /// Decodes a module string. Lenient mode maps malformed input to "".
    pub fn get_string(&mut self, ptr: u32, len: u32) -> Result<String, BoundaryError> {
        let decoded = codec::decode_str(self.bytes()?, ptr, len).map(str::to_owned);
        match decoded {
            Ok(text) => Ok(text),
            Err(err) => self.degrade(err, String::new()),
        }
    }

    /// Like [`Cx::get_string`], except a null `ptr` means `len` is a slab
    /// handle to an already materialized host string.
    pub fn cached_string(&mut self, ptr: u32, len: u32) -> Result<String, BoundaryError> {
        if ptr != 0 {
            return self.get_string(ptr, len);
        }
        let value = self.get_object(len)?;
        match value.as_str() {
            Some(text) => Ok(text.to_string()),
            None => self.degrade(BoundaryError::InvalidHandle(len), String::new()),
        }
    }

    pub fn pass_string(&mut self, text: &str) -> Result<(u32, u32), Fault> {
        codec::encode_str(self, text)
    }

    pub fn pass_bytes(&mut self, data: &[u8]) -> Result<(u32, u32), Fault> {
        codec::pass_bytes(self, data, 1)
    }

    /// Returns a module allocation through `__wbindgen_free`, when exported.
    pub fn free(&mut self, ptr: u32, len: u32, align: u32) -> Result<(), Fault> {
        let Some(free) = self.exports()?.free else {
            trace!(ptr, len, "module exports no free; leaking");
            return Ok(());
        };
        free.call(&mut self.store, (ptr, len, align))
            .map_err(|err| self.recover(err))
    }

    /// Writes `(ptr, len)` of a fresh module copy of `text`, or `(0, 0)`.
    pub fn write_string_out(&mut self, out: u32, text: Option<&str>) -> Result<(), Fault> {
        let pair = text.map(|text| self.pass_string(text)).transpose()?;
        codec::write_pair(&mut self.words32()?, out, pair)?;
        Ok(())
    }

    pub fn write_bytes_out(&mut self, out: u32, data: Option<&[u8]>) -> Result<(), Fault> {
        let pair = data.map(|data| self.pass_bytes(data)).transpose()?;
        codec::write_pair(&mut self.words32()?, out, pair)?;
        Ok(())
    }

    /// Optional number out-parameter: presence flag in the word at `out`,
    /// value in the following 8-byte slot.
    pub fn write_f64_out(&mut self, out: u32, value: Option<f64>) -> Result<(), BoundaryError> {
        let index = out as usize;
        self.floats64()?
            .set(index / 8 + 1, value.unwrap_or(0.0))?;
        self.words32()?.set(index / 4, i32::from(value.is_some()))
    }

    fn export_func(&mut self, name: &str) -> Result<Func, BoundaryError> {
        self.exports()?
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| BoundaryError::MissingExport(name.to_string()))
    }

    /// Number of parameters the export `name` takes.
    pub fn export_arity(&mut self, name: &str) -> Result<usize, BoundaryError> {
        let func = self.export_func(name)?;
        Ok(func.ty(&self.store).params().len())
    }

    /// Calls a module export by name with raw values.
    pub fn call_export(&mut self, name: &str, params: &[Val]) -> Result<Vec<Val>, Fault> {
        let func = self.export_func(name)?;
        let arity = func.ty(&self.store).results().len();
        let mut results = vec![Val::I32(0); arity];
        func.call(&mut self.store, params, &mut results)
            .map_err(|err| self.recover(err))?;
        Ok(results)
    }

    /// Calls the closure destructor stored at `index` in the module's table.
    pub(crate) fn call_destructor(&mut self, index: u32, a: u32, b: u32) -> Result<(), Fault> {
        let table_name = &self.config().abi.table;
        let table = self
            .exports()?
            .table
            .ok_or_else(|| BoundaryError::MissingExport(table_name.clone()))?;
        let func = table
            .get(&mut self.store, index.into())
            .and_then(|entry| entry.as_func().flatten().cloned())
            .ok_or_else(|| BoundaryError::BadArgument {
                op: "closure destructor".into(),
                message: format!("no function at table index {index}"),
            })?;
        func.call(
            &mut self.store,
            &[Val::I32(a as i32), Val::I32(b as i32)],
            &mut [],
        )
        .map_err(|err| self.recover(err))
    }

    /// Invokes a host value as a function, throwing a `TypeError` otherwise.
    pub fn call_function(
        &mut self,
        callee: &HostValue,
        this: &HostValue,
        args: &[HostValue],
    ) -> Result<HostValue, Fault> {
        match callee {
            HostValue::Function(func) => func.clone().call(self, this, args),
            other => Err(Fault::type_error(format!(
                "{} is not a function",
                other.debug_string()
            ))),
        }
    }

    /// Parks a host exception in the pending error slot.
    pub fn store_error(&mut self, exception: HostValue) -> u32 {
        let handle = self.add_object(exception);
        if let Some(previous) = self.state_mut().errors.store(handle) {
            warn!(previous, handle, "pending error overwritten before the module consumed it");
        }
        handle
    }

    pub fn take_error(&mut self) -> u32 {
        self.state_mut().errors.consume()
    }

    pub fn queue_microtask(&mut self, func: HostFunction, args: Vec<HostValue>) {
        self.state_mut().jobs.push_back(Job::Call { func, args });
    }

    pub fn global(&self) -> HostValue {
        self.state().global.clone()
    }

    pub(crate) fn recover(&mut self, err: anyhow::Error) -> Fault {
        exn::recover(self.state_mut(), err)
    }

    pub(crate) fn raise(&mut self, fault: Fault) -> anyhow::Error {
        exn::raise(self.state_mut(), fault)
    }
}

impl Guest for Cx<'_> {
    fn memory(&mut self) -> Result<&mut [u8], BoundaryError> {
        self.bytes()
    }

    fn malloc(&mut self, len: u32, align: u32) -> Result<u32, Fault> {
        let malloc = self.exports()?.malloc;
        malloc
            .call(&mut self.store, (len, align))
            .map_err(|err| self.recover(err))
    }

    fn realloc(&mut self, ptr: u32, old_len: u32, new_len: u32, align: u32) -> Result<u32, Fault> {
        let realloc = self
            .exports()?
            .realloc
            .ok_or_else(|| BoundaryError::MissingExport(self.config().abi.realloc.clone()))?;
        realloc
            .call(&mut self.store, (ptr, old_len, new_len, align))
            .map_err(|err| self.recover(err))
    }

    fn can_realloc(&self) -> bool {
        self.state()
            .exports
            .as_ref()
            .is_some_and(|exports| exports.realloc.is_some())
    }
}
