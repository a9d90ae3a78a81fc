//! Bridge configuration.
//!
//! Built with the `&mut self` builder style of `wasmtime::Config`, with a
//! handful of switches overridable from the environment.

use std::env;

/// Environment variable toggling strict boundary checks.
pub const STRICT_BOUNDARY_ENV: &str = "BINDHOST_STRICT_BOUNDARY";
/// Environment variable making unlinked imports trap instead of failing instantiation.
pub const TRAP_UNKNOWN_IMPORTS_ENV: &str = "BINDHOST_TRAP_UNKNOWN_IMPORTS";

/// Export names the bridge relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiNames {
    pub memory: String,
    pub malloc: String,
    pub realloc: String,
    pub free: String,
    pub start: String,
    /// Function table holding closure destructors.
    pub table: String,
}

impl Default for AbiNames {
    fn default() -> Self {
        Self {
            memory: "memory".into(),
            malloc: "__wbindgen_malloc".into(),
            realloc: "__wbindgen_realloc".into(),
            free: "__wbindgen_free".into(),
            start: "__wbindgen_start".into(),
            table: "__wbindgen_export_2".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) namespace: String,
    pub(crate) abi: AbiNames,
    pub(crate) strict_boundary: bool,
    pub(crate) module_mime: String,
    pub(crate) slab_capacity: usize,
    pub(crate) trap_unknown_imports: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "wbg".into(),
            abi: AbiNames::default(),
            strict_boundary: cfg!(debug_assertions),
            module_mime: "application/wasm".into(),
            slab_capacity: 0,
            trap_unknown_imports: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(
            env::var(STRICT_BOUNDARY_ENV).ok().as_deref(),
            env::var(TRAP_UNKNOWN_IMPORTS_ENV).ok().as_deref(),
        );
        config
    }

    fn apply_env(&mut self, strict: Option<&str>, trap_unknown: Option<&str>) {
        if let Some(flag) = strict.and_then(parse_flag) {
            self.strict_boundary = flag;
        }
        if let Some(flag) = trap_unknown.and_then(parse_flag) {
            self.trap_unknown_imports = flag;
        }
    }

    /// Import module name the operation table is registered under.
    pub fn namespace(&mut self, namespace: &str) -> &mut Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn abi_names(&mut self, names: AbiNames) -> &mut Self {
        self.abi = names;
        self
    }

    /// Trap on invalid handles and malformed strings instead of degrading
    /// to `undefined` and the empty string.
    pub fn strict_boundary(&mut self, strict: bool) -> &mut Self {
        self.strict_boundary = strict;
        self
    }

    /// Content type that selects streaming instantiation.
    pub fn module_mime(&mut self, mime: &str) -> &mut Self {
        self.module_mime = mime.to_string();
        self
    }

    /// Extra slab slots to reserve up front.
    pub fn slab_capacity(&mut self, capacity: usize) -> &mut Self {
        self.slab_capacity = capacity;
        self
    }

    pub fn trap_unknown_imports(&mut self, enable: bool) -> &mut Self {
        self.trap_unknown_imports = enable;
        self
    }

    pub fn get_namespace(&self) -> &str {
        &self.namespace
    }

    pub fn abi(&self) -> &AbiNames {
        &self.abi
    }

    pub fn is_strict(&self) -> bool {
        self.strict_boundary
    }

    pub fn get_module_mime(&self) -> &str {
        &self.module_mime
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_bindgen_abi() {
        let config = Config::new();
        assert_eq!(config.get_namespace(), "wbg");
        assert_eq!(config.abi().malloc, "__wbindgen_malloc");
        assert_eq!(config.get_module_mime(), "application/wasm");
        assert_eq!(config.is_strict(), cfg!(debug_assertions));
    }

    #[test]
    fn env_overrides_parse_common_spellings() {
        let mut config = Config::new();
        config.apply_env(Some("off"), Some("YES"));
        assert!(!config.is_strict());
        assert!(config.trap_unknown_imports);

        config.apply_env(Some("1"), Some("maybe"));
        assert!(config.is_strict());
        assert!(config.trap_unknown_imports);
    }

    #[test]
    fn builder_chains() {
        let mut config = Config::new();
        config.namespace("env").strict_boundary(true).slab_capacity(64);
        assert_eq!(config.get_namespace(), "env");
        assert!(config.is_strict());
        assert_eq!(config.slab_capacity, 64);
    }
}
