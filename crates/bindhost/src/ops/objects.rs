use wasmtime::Val;

use crate::error::Fault;
use crate::linker::Abi::I32;
use crate::linker::Linker;
use crate::value::HostValue;

use super::{flag, ret};

pub(super) fn register(linker: &mut Linker) {
    linker
        .direct("__wbg_new_object", &[], &[I32], |cx, _| Ok(ret(cx, HostValue::object())))
        .direct("__wbg_new_array", &[], &[I32], |cx, _| Ok(ret(cx, HostValue::array(vec![]))))
        .direct("__wbg_push", &[I32, I32], &[I32], |cx, args| {
            let target = cx.get_object(args.handle(0)?)?;
            let item = cx.get_object(args.handle(1)?)?;
            let HostValue::Array(items) = &target else {
                return Err(Fault::type_error("push target is not an array"));
            };
            let mut items = items.borrow_mut();
            items.push(item);
            Ok(Some(Val::I32(items.len() as i32)))
        })
        .direct("__wbg_get_index", &[I32, I32], &[I32], |cx, args| {
            let target = cx.get_object(args.handle(0)?)?;
            let index = HostValue::Number(f64::from(args.u32(1)?));
            let item = target.get_property(&index)?;
            Ok(ret(cx, item))
        })
        .direct("__wbg_length", &[I32], &[I32], |cx, args| {
            let target = cx.get_object(args.handle(0)?)?;
            let len = target.get_property(&HostValue::from("length"))?;
            Ok(Some(Val::I32(len.as_f64().unwrap_or(0.0) as i32)))
        })
        .direct("__wbg_is_array", &[I32], &[I32], |cx, args| {
            Ok(flag(matches!(cx.get_object(args.handle(0)?)?, HostValue::Array(_))))
        })
        .fallible("__wbg_get", &[I32, I32], &[I32], |cx, args| {
            let target = cx.get_object(args.handle(0)?)?;
            let key = cx.get_object(args.handle(1)?)?;
            let value = target.get_property(&key)?;
            Ok(ret(cx, value))
        })
        .fallible("__wbg_set", &[I32, I32, I32], &[I32], |cx, args| {
            let target = cx.get_object(args.handle(0)?)?;
            let key = cx.get_object(args.handle(1)?)?;
            let value = cx.get_object(args.handle(2)?)?;
            Ok(flag(target.set_property(&key, value)?))
        })
        .fallible("__wbg_global", &[], &[I32], |cx, _| {
            let global = cx.global();
            Ok(ret(cx, global))
        })
        .fallible("__wbg_call0", &[I32, I32], &[I32], |cx, args| {
            let func = cx.get_object(args.handle(0)?)?;
            let this = cx.get_object(args.handle(1)?)?;
            let result = cx.call_function(&func, &this, &[])?;
            Ok(ret(cx, result))
        })
        .fallible("__wbg_call1", &[I32, I32, I32], &[I32], |cx, args| {
            let func = cx.get_object(args.handle(0)?)?;
            let this = cx.get_object(args.handle(1)?)?;
            let arg = cx.get_object(args.handle(2)?)?;
            let result = cx.call_function(&func, &this, &[arg])?;
            Ok(ret(cx, result))
        })
        .fallible("__wbg_call2", &[I32, I32, I32, I32], &[I32], |cx, args| {
            let func = cx.get_object(args.handle(0)?)?;
            let this = cx.get_object(args.handle(1)?)?;
            let a = cx.get_object(args.handle(2)?)?;
            let b = cx.get_object(args.handle(3)?)?;
            let result = cx.call_function(&func, &this, &[a, b])?;
            Ok(ret(cx, result))
        });
}
