use crate::error::Fault;
use crate::linker::Abi::I32;
use crate::linker::Linker;
use crate::value::{HostFunction, HostValue, Promise};

use super::ret;

fn expect_function(value: HostValue) -> Result<HostFunction, Fault> {
    match value {
        HostValue::Function(func) => Ok(func),
        other => Err(Fault::type_error(format!(
            "{} is not a function",
            other.debug_string()
        ))),
    }
}

pub(super) fn register(linker: &mut Linker) {
    linker
        .direct("__wbg_queue_microtask", &[I32], &[], |cx, args| {
            let func = expect_function(cx.get_object(args.handle(0)?)?)?;
            cx.queue_microtask(func, Vec::new());
            Ok(None)
        })
        .direct("__wbg_promise_resolve", &[I32], &[I32], |cx, args| {
            let value = cx.get_object(args.handle(0)?)?;
            let promise = match value {
                HostValue::Promise(promise) => promise,
                value => {
                    let promise = Promise::pending();
                    promise.resolve(value, &mut cx.state_mut().jobs);
                    promise
                }
            };
            Ok(ret(cx, promise.into()))
        })
        .direct("__wbg_then", &[I32, I32], &[I32], |cx, args| {
            let promise = cx.get_object(args.handle(0)?)?;
            let handler = expect_function(cx.get_object(args.handle(1)?)?)?;
            let Some(promise) = promise.as_promise().cloned() else {
                return Err(Fault::type_error("then target is not a promise"));
            };
            let derived = promise.then(Some(handler), &mut cx.state_mut().jobs);
            Ok(ret(cx, derived.into()))
        });
}
