use crate::error::Fault;
use crate::linker::Abi::I32;
use crate::linker::Linker;
use crate::value::HostValue;

use super::{handle, ret};

fn error_field(value: &HostValue, field: &str) -> Option<String> {
    match value {
        HostValue::Error(err) => match field {
            "message" => Some(err.message.clone()),
            _ => err.stack.clone(),
        },
        _ => None,
    }
}

pub(super) fn register(linker: &mut Linker) {
    linker
        .direct("__wbg_new_error", &[], &[I32], |cx, _| Ok(ret(cx, HostValue::error("Error", ""))))
        .direct("__wbindgen_error_new", &[I32, I32], &[I32], |cx, args| {
            let message = cx.get_string(args.u32(0)?, args.u32(1)?)?;
            Ok(ret(cx, HostValue::error("Error", message)))
        })
        .direct("__wbg_error_message", &[I32, I32], &[], |cx, args| {
            let value = cx.get_object(args.handle(1)?)?;
            cx.write_string_out(args.u32(0)?, error_field(&value, "message").as_deref())?;
            Ok(None)
        })
        .direct("__wbg_stack", &[I32, I32], &[], |cx, args| {
            let value = cx.get_object(args.handle(1)?)?;
            cx.write_string_out(args.u32(0)?, error_field(&value, "stack").as_deref())?;
            Ok(None)
        })
        .direct("__wbindgen_throw", &[I32, I32], &[], |cx, args| {
            let message = cx.get_string(args.u32(0)?, args.u32(1)?)?;
            Err(Fault::Thrown(HostValue::error("Error", message)))
        })
        .direct("__wbindgen_rethrow", &[I32], &[], |cx, args| {
            Err(Fault::Thrown(cx.take_object(args.handle(0)?)?))
        })
        .direct("__wbindgen_exn_take", &[], &[I32], |cx, _| Ok(handle(cx.take_error())));
}
