//! A host-side bridge for wasm modules built against the bindgen ABI.
//!
//! Host values reach the module as small integer handles into a reference
//! slab, strings and bytes cross through the module's allocator, module
//! closures come back as callable host functions, and host exceptions turn
//! into error codes the module can inspect.

pub mod closure;
pub mod codec;
mod config;
mod cx;
mod engine;
mod error;
pub mod exn;
mod instance;
mod lifecycle;
mod linker;
pub mod memory;
mod module;
mod ops;
pub mod parse;
pub mod slab;
mod store;
pub mod value;

pub use closure::{ClosureShape, ClosureState};
pub use config::{AbiNames, Config, STRICT_BOUNDARY_ENV, TRAP_UNKNOWN_IMPORTS_ENV};
pub use cx::Cx;
pub use engine::Engine;
pub use error::{BoundaryError, Fault, InstantiationError};
pub use instance::Instance;
pub use lifecycle::{Bridge, LoadPath, ModuleSource, Resource, Response, Status};
pub use linker::{Abi, Args, Linker, OpKind};
pub use module::Module;
pub use store::{HostState, Store, new_store};
pub use value::{HostError, HostFunction, HostValue, Promise, Settled};
