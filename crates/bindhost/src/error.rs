//! Error taxonomy for the bridge.

use thiserror::Error;

use crate::value::HostValue;

/// The module violated the boundary contract: bad handle, bad pointer,
/// malformed string, or a missing required export.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("invalid handle {0}")]
    InvalidHandle(u32),
    #[error("invalid UTF-8 in string at {ptr:#x} (len {len})")]
    InvalidUtf8 { ptr: u32, len: u32 },
    #[error("memory access {ptr:#x}+{len} out of bounds (memory is {size:#x} bytes)")]
    OutOfBounds { ptr: u32, len: u32, size: usize },
    #[error("module does not export `{0}`")]
    MissingExport(String),
    #[error("`{op}`: {message}")]
    BadArgument { op: String, message: String },
    #[error("bridge is not ready")]
    NotReady,
}

/// Failure to bring the bridge to the ready state.
#[derive(Debug, Error)]
pub enum InstantiationError {
    #[error("failed to compile module: {0:#}")]
    Compile(anyhow::Error),
    #[error("failed to link module: {0:#}")]
    Link(anyhow::Error),
    #[error("module does not export required `{0}`")]
    MissingExport(String),
    #[error("start hook failed: {0}")]
    Start(String),
    #[error("failed to read module stream: {0}")]
    Fetch(#[from] std::io::Error),
    #[error("bridge initialization previously failed")]
    Failed,
}

/// How a call across the boundary ended abnormally.
#[derive(Debug, Error)]
pub enum Fault {
    /// A host exception, as it would surface to host-side callers.
    #[error("uncaught {}", .0.debug_string())]
    Thrown(HostValue),
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    /// The module trapped, or the engine failed underneath it.
    #[error("module trapped: {0:#}")]
    Trap(anyhow::Error),
}

impl Fault {
    pub fn type_error(message: impl Into<String>) -> Self {
        Fault::Thrown(HostValue::type_error(message))
    }

    pub fn thrown(&self) -> Option<&HostValue> {
        match self {
            Fault::Thrown(value) => Some(value),
            _ => None,
        }
    }
}
