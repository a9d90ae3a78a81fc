use std::collections::VecDeque;

use wasmtime::{AsContextMut, Memory, Table, TypedFunc};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::InstantiationError;
use crate::exn::ErrorSlot;
use crate::memory::ViewCache;
use crate::slab::Slab;
use crate::value::{HostValue, Job};

/// The wasmtime store every bridge runs in.
pub type Store = wasmtime::Store<HostState>;

pub fn new_store(engine: &Engine, config: Config) -> Store {
    wasmtime::Store::new(engine.wasmtime(), HostState::new(config))
}

/// Everything the host keeps per module instance.
pub struct HostState {
    pub(crate) config: Config,
    pub(crate) slab: Slab,
    pub(crate) errors: ErrorSlot,
    pub(crate) views: ViewCache,
    pub(crate) exports: Option<Exports>,
    /// A host exception currently unwinding through module frames.
    pub(crate) unwinding: Option<HostValue>,
    pub(crate) jobs: VecDeque<Job>,
    pub(crate) global: HostValue,
}

impl HostState {
    pub fn new(config: Config) -> Self {
        HostState {
            slab: Slab::with_capacity(config.slab_capacity),
            config,
            errors: ErrorSlot::default(),
            views: ViewCache::new(),
            exports: None,
            unwinding: None,
            jobs: VecDeque::new(),
            global: HostValue::object(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn slab(&self) -> &Slab {
        &self.slab
    }

    pub fn views(&self) -> &ViewCache {
        &self.views
    }

    /// Handle parked in the pending error slot, if any.
    pub fn pending_error(&self) -> Option<u32> {
        self.errors.peek()
    }

    pub fn global(&self) -> &HostValue {
        &self.global
    }

    pub fn pending_microtasks(&self) -> usize {
        self.jobs.len()
    }
}

/// Module exports the bridge calls back into, resolved once per instance.
#[derive(Clone)]
pub(crate) struct Exports {
    pub(crate) instance: wasmtime::Instance,
    pub(crate) memory: Memory,
    pub(crate) malloc: TypedFunc<(u32, u32), u32>,
    pub(crate) realloc: Option<TypedFunc<(u32, u32, u32, u32), u32>>,
    pub(crate) free: Option<TypedFunc<(u32, u32, u32), ()>>,
    pub(crate) table: Option<Table>,
}

impl Exports {
    pub(crate) fn resolve(
        mut store: impl AsContextMut<Data = HostState>,
        instance: wasmtime::Instance,
    ) -> Result<Self, InstantiationError> {
        let names = store.as_context().data().config.abi.clone();
        let mut store = store.as_context_mut();

        let memory = instance
            .get_memory(&mut store, &names.memory)
            .ok_or_else(|| InstantiationError::MissingExport(names.memory.clone()))?;
        let malloc = instance
            .get_func(&mut store, &names.malloc)
            .ok_or_else(|| InstantiationError::MissingExport(names.malloc.clone()))?
            .typed(&store)
            .map_err(InstantiationError::Link)?;
        let realloc = match instance.get_func(&mut store, &names.realloc) {
            Some(func) => Some(func.typed(&store).map_err(InstantiationError::Link)?),
            None => None,
        };
        let free = match instance.get_func(&mut store, &names.free) {
            Some(func) => Some(func.typed(&store).map_err(InstantiationError::Link)?),
            None => None,
        };
        let table = instance.get_table(&mut store, &names.table);

        Ok(Exports {
            instance,
            memory,
            malloc,
            realloc,
            free,
            table,
        })
    }
}
