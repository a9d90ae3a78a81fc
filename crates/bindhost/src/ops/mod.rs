//! The standard operation table.
//!
//! Each submodule registers one family of imports under the configured
//! namespace. Handles, pointers and lengths are `i32` on the wire; boolean
//! results are `0`/`1`.

mod buffers;
mod closures;
mod console;
mod errors;
mod objects;
mod primitives;
mod refs;
mod tasks;

use wasmtime::Val;

use crate::cx::Cx;
use crate::linker::Linker;
use crate::value::HostValue;

pub(crate) fn register(linker: &mut Linker) {
    refs::register(linker);
    primitives::register(linker);
    buffers::register(linker);
    objects::register(linker);
    errors::register(linker);
    closures::register(linker);
    tasks::register(linker);
    console::register(linker);
}

fn handle(handle: u32) -> Option<Val> {
    Some(Val::I32(handle as i32))
}

fn flag(value: bool) -> Option<Val> {
    Some(Val::I32(i32::from(value)))
}

/// Allocates a handle for `value` and returns it as the operation result.
fn ret(cx: &mut Cx<'_>, value: HostValue) -> Option<Val> {
    handle(cx.add_object(value))
}
