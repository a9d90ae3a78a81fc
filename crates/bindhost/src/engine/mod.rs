use wasmparser::{Validator, WasmFeatures};

/// Shared compilation configuration.
///
/// Pairs the wasmtime engine that compiles and runs modules with the
/// feature set the up-front validator enforces.
#[derive(Clone)]
pub struct Engine {
    inner: wasmtime::Engine,
    features: WasmFeatures,
}

impl Engine {
    pub fn new(config: &wasmtime::Config) -> Result<Self, anyhow::Error> {
        Ok(Self {
            inner: wasmtime::Engine::new(config)?,
            features: Self::features(),
        })
    }

    fn features() -> WasmFeatures {
        let mut features = WasmFeatures::default();
        features.set(WasmFeatures::COMPONENT_MODEL, false);
        features
    }

    /// Create a new validator with the engine's features.
    pub fn new_validator(&self) -> Validator {
        Validator::new_with_features(self.features)
    }

    pub fn wasmtime(&self) -> &wasmtime::Engine {
        &self.inner
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            inner: wasmtime::Engine::default(),
            features: Self::features(),
        }
    }
}
