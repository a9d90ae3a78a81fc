use crate::linker::Abi::I32;
use crate::linker::Linker;

use super::{flag, handle};

pub(super) fn register(linker: &mut Linker) {
    linker
        .direct("__wbindgen_object_drop_ref", &[I32], &[], |cx, args| {
            cx.drop_object(args.handle(0)?)?;
            Ok(None)
        })
        .direct("__wbindgen_object_clone_ref", &[I32], &[I32], |cx, args| {
            Ok(handle(cx.clone_object(args.handle(0)?)?))
        })
        .direct("__wbindgen_is_undefined", &[I32], &[I32], |cx, args| {
            Ok(flag(cx.get_object(args.handle(0)?)?.is_undefined()))
        })
        .direct("__wbindgen_is_null", &[I32], &[I32], |cx, args| {
            Ok(flag(cx.get_object(args.handle(0)?)?.is_null()))
        })
        .direct("__wbindgen_is_object", &[I32], &[I32], |cx, args| {
            Ok(flag(cx.get_object(args.handle(0)?)?.is_object()))
        })
        .direct("__wbindgen_is_function", &[I32], &[I32], |cx, args| {
            Ok(flag(cx.get_object(args.handle(0)?)?.is_function()))
        })
        .direct("__wbindgen_is_string", &[I32], &[I32], |cx, args| {
            Ok(flag(cx.get_object(args.handle(0)?)?.is_string()))
        })
        .direct("__wbindgen_is_falsy", &[I32], &[I32], |cx, args| {
            Ok(flag(!cx.get_object(args.handle(0)?)?.truthy()))
        })
        .direct("__wbindgen_jsval_eq", &[I32, I32], &[I32], |cx, args| {
            let a = cx.get_object(args.handle(0)?)?;
            let b = cx.get_object(args.handle(1)?)?;
            Ok(flag(a.strict_eq(&b)))
        })
        .direct("__wbg_is", &[I32, I32], &[I32], |cx, args| {
            let a = cx.get_object(args.handle(0)?)?;
            let b = cx.get_object(args.handle(1)?)?;
            Ok(flag(a.same_value(&b)))
        })
        .direct("__wbindgen_debug_string", &[I32, I32], &[], |cx, args| {
            let text = cx.get_object(args.handle(1)?)?.debug_string();
            cx.write_string_out(args.u32(0)?, Some(&text))?;
            Ok(None)
        });
}
