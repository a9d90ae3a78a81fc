use crate::linker::Abi::{F64, I32};
use crate::linker::Linker;
use crate::value::HostValue;

use super::ret;

/// `__wbindgen_boolean_get` result for non-boolean values.
const NOT_A_BOOLEAN: i32 = 2;

pub(super) fn register(linker: &mut Linker) {
    linker
        .direct("__wbindgen_string_new", &[I32, I32], &[I32], |cx, args| {
            let text = cx.get_string(args.u32(0)?, args.u32(1)?)?;
            Ok(ret(cx, HostValue::from(text)))
        })
        .direct("__wbindgen_string_get", &[I32, I32], &[], |cx, args| {
            let value = cx.get_object(args.handle(1)?)?;
            cx.write_string_out(args.u32(0)?, value.as_str())?;
            Ok(None)
        })
        .direct("__wbindgen_number_new", &[F64], &[I32], |cx, args| {
            Ok(ret(cx, HostValue::Number(args.f64(0)?)))
        })
        .direct("__wbindgen_number_get", &[I32, I32], &[], |cx, args| {
            let value = cx.get_object(args.handle(1)?)?;
            cx.write_f64_out(args.u32(0)?, value.as_f64())?;
            Ok(None)
        })
        .direct("__wbindgen_boolean_get", &[I32], &[I32], |cx, args| {
            let code = match cx.get_object(args.handle(0)?)?.as_bool() {
                Some(b) => i32::from(b),
                None => NOT_A_BOOLEAN,
            };
            Ok(Some(wasmtime::Val::I32(code)))
        });
}
