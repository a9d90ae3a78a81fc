use wasmtime::Val;

use crate::error::Fault;
use crate::linker::Abi::I32;
use crate::linker::Linker;
use crate::value::{Bytes, HostValue};

use super::ret;

fn expect_bytes(value: &HostValue) -> Result<&Bytes, Fault> {
    match value {
        HostValue::Bytes(bytes) => Ok(bytes),
        other => Err(Fault::type_error(format!(
            "expected a byte buffer, got {}",
            other.debug_string()
        ))),
    }
}

pub(super) fn register(linker: &mut Linker) {
    linker
        .direct("__wbindgen_bytes_new", &[I32, I32], &[I32], |cx, args| {
            let data = cx.read_bytes(args.u32(0)?, args.u32(1)?)?;
            Ok(ret(cx, HostValue::bytes(data)))
        })
        .direct("__wbindgen_bytes_length", &[I32], &[I32], |cx, args| {
            let value = cx.get_object(args.handle(0)?)?;
            let len = expect_bytes(&value)?.borrow().len();
            Ok(Some(Val::I32(len as i32)))
        })
        .direct("__wbindgen_bytes_copy_to", &[I32, I32], &[], |cx, args| {
            let value = cx.get_object(args.handle(0)?)?;
            let data = expect_bytes(&value)?.borrow().clone();
            cx.write_bytes(args.u32(1)?, &data)?;
            Ok(None)
        })
        .direct("__wbindgen_bytes_get", &[I32, I32], &[], |cx, args| {
            let value = cx.get_object(args.handle(1)?)?;
            let data = match &value {
                HostValue::Bytes(bytes) => Some(bytes.borrow().clone()),
                _ => None,
            };
            cx.write_bytes_out(args.u32(0)?, data.as_deref())?;
            Ok(None)
        })
        .direct("__wbindgen_memory", &[], &[I32], |cx, _| {
            let memory = cx.exports()?.memory;
            Ok(ret(cx, HostValue::opaque(memory)))
        });
}
