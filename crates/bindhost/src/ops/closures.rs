use wasmtime::Val;

use crate::closure;
use crate::linker::Abi::I32;
use crate::linker::Linker;

pub(super) fn register(linker: &mut Linker) {
    linker.direct("__wbindgen_cb_drop", &[I32], &[I32], |cx, args| {
        let value = cx.take_object(args.handle(0)?)?;
        Ok(Some(Val::I32(i32::from(closure::module_drop(&value)))))
    });
}
