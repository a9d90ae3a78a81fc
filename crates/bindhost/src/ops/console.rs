use tracing::{error, info, warn};

use crate::linker::Abi::I32;
use crate::linker::Linker;

/// Decodes the message, hands its buffer back to the module and logs it.
macro_rules! console_op {
    ($linker:expr, $name:literal, $level:ident) => {
        $linker.direct($name, &[I32, I32], &[], |cx, args| {
            let (ptr, len) = (args.u32(0)?, args.u32(1)?);
            let text = cx.cached_string(ptr, len)?;
            if ptr != 0 {
                cx.free(ptr, len, 1)?;
            }
            $level!(target: "bindhost::console", "{text}");
            Ok(None)
        })
    };
}

pub(super) fn register(linker: &mut Linker) {
    console_op!(linker, "__wbg_log", info);
    console_op!(linker, "__wbg_warn", warn);
    console_op!(linker, "__wbg_error", error);
}
