use std::sync::Arc;

use crate::Engine;
use crate::parse::{self, AbiSummary, StreamingScan};

/// A validated and compiled module (immutable).
#[derive(Clone)]
pub struct Module {
    inner: wasmtime::Module,
    abi: Arc<AbiSummary>,
}

impl Module {
    /// Parse a WAT string into a module.
    pub fn new(engine: &Engine, wat: &str) -> Result<Self, anyhow::Error> {
        let bytes = wat::parse_str(wat)?;
        Self::from_bytes(engine, &bytes)
    }

    /// Create a module from raw wasm bytes.
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, anyhow::Error> {
        let abi = parse::scan(engine, bytes)?;
        Self::compile(engine, bytes, abi)
    }

    /// Compile a module whose bytes were validated while streaming in.
    pub fn from_scan(engine: &Engine, scan: StreamingScan) -> Result<Self, anyhow::Error> {
        let (bytes, abi) = scan.finish()?;
        Self::compile(engine, &bytes, abi)
    }

    fn compile(engine: &Engine, bytes: &[u8], abi: AbiSummary) -> Result<Self, anyhow::Error> {
        let inner = wasmtime::Module::from_binary(engine.wasmtime(), bytes)?;
        Ok(Module {
            inner,
            abi: Arc::new(abi),
        })
    }

    pub fn abi(&self) -> &AbiSummary {
        &self.abi
    }

    pub(crate) fn wasmtime(&self) -> &wasmtime::Module {
        &self.inner
    }
}
