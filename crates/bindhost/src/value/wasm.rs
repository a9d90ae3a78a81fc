use wasmtime::Val;

/// A scalar that crosses the boundary as one `Val`.
pub trait WasmVal: Sized {
    fn to_val(&self) -> Val;
    fn from_val(val: &Val) -> Result<Self, anyhow::Error>;
}

impl WasmVal for i32 {
    fn to_val(&self) -> Val {
        Val::I32(*self)
    }
    fn from_val(val: &Val) -> Result<Self, anyhow::Error> {
        match val {
            Val::I32(v) => Ok(*v),
            _ => anyhow::bail!("expected i32, got {val:?}"),
        }
    }
}

/// Handles, pointers and lengths travel as `i32` but are unsigned on both sides.
impl WasmVal for u32 {
    fn to_val(&self) -> Val {
        Val::I32(*self as i32)
    }
    fn from_val(val: &Val) -> Result<Self, anyhow::Error> {
        match val {
            Val::I32(v) => Ok(*v as u32),
            _ => anyhow::bail!("expected i32, got {val:?}"),
        }
    }
}

impl WasmVal for f32 {
    fn to_val(&self) -> Val {
        Val::F32(self.to_bits())
    }
    fn from_val(val: &Val) -> Result<Self, anyhow::Error> {
        match val {
            Val::F32(bits) => Ok(f32::from_bits(*bits)),
            _ => anyhow::bail!("expected f32, got {val:?}"),
        }
    }
}

impl WasmVal for f64 {
    fn to_val(&self) -> Val {
        Val::F64(self.to_bits())
    }
    fn from_val(val: &Val) -> Result<Self, anyhow::Error> {
        match val {
            Val::F64(bits) => Ok(f64::from_bits(*bits)),
            _ => anyhow::bail!("expected f64, got {val:?}"),
        }
    }
}

pub trait WasmArgs {
    fn to_vals(&self) -> Vec<Val>;
}

pub trait WasmResults: Sized {
    fn from_vals(vals: &[Val]) -> Result<Self, anyhow::Error>;
}

impl WasmArgs for () {
    fn to_vals(&self) -> Vec<Val> {
        vec![]
    }
}

impl WasmResults for () {
    fn from_vals(vals: &[Val]) -> Result<Self, anyhow::Error> {
        anyhow::ensure!(vals.is_empty(), "expected no results, got {}", vals.len());
        Ok(())
    }
}

macro_rules! impl_wasm_tuples {
    ($(($($T:ident),+)),* $(,)?) => {
        $(
            impl<$($T: WasmVal),+> WasmArgs for ($($T,)+) {
                #[allow(non_snake_case)]
                fn to_vals(&self) -> Vec<Val> {
                    let ($($T,)+) = self;
                    vec![$($T.to_val()),+]
                }
            }

            impl<$($T: WasmVal),+> WasmResults for ($($T,)+) {
                #[allow(non_snake_case)]
                fn from_vals(vals: &[Val]) -> Result<Self, anyhow::Error> {
                    impl_wasm_tuples!(@destructure vals, $($T),+)
                }
            }
        )*
    };

    (@destructure $vals:ident, $($T:ident),+) => {{
        let expected = impl_wasm_tuples!(@count $($T),+);
        anyhow::ensure!(
            $vals.len() == expected,
            "expected {} results, got {}",
            expected,
            $vals.len()
        );
        let mut _i = 0;
        Ok(($({
            let v = $T::from_val(&$vals[_i])?;
            _i += 1;
            v
        },)+))
    }};

    (@count $($T:ident),+) => {
        <[()]>::len(&[$(impl_wasm_tuples!(@unit $T)),+])
    };

    (@unit $T:ident) => { () };
}

impl_wasm_tuples!((A), (A, B), (A, B, C));
