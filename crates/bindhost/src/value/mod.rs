//! Host-side values the module can refer to through slab handles.
//!
//! [`HostValue`] models the managed side of the bridge: primitives are
//! compared by value, everything else (objects, arrays, byte buffers,
//! functions, errors, promises) has reference identity through an `Rc`.

mod function;
mod promise;
mod wasm;

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::Fault;

pub use function::HostFunction;
pub(crate) use promise::Job;
pub use promise::{Promise, Settled};
pub use wasm::{WasmArgs, WasmResults, WasmVal};

/// Nesting depth after which `debug_string` stops descending.
const DEBUG_DEPTH_LIMIT: usize = 16;
/// Array indices are integers below `2^32 - 1`; larger keys are plain properties.
const MAX_ARRAY_INDEX: u32 = u32::MAX;
/// Furthest past the end an array write may grow it with `undefined` holes.
const MAX_ARRAY_GAP: usize = 1 << 16;

/// A shared, growable byte buffer (the typed-array analogue).
pub type Bytes = Rc<RefCell<Vec<u8>>>;
/// A shared array of host values.
pub type Array = Rc<RefCell<Vec<HostValue>>>;
/// A shared string-keyed property map.
pub type Object = Rc<RefCell<BTreeMap<String, HostValue>>>;

/// A dynamically typed value owned by the host.
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Bytes(Bytes),
    Array(Array),
    Object(Object),
    Function(HostFunction),
    Error(Rc<HostError>),
    Promise(Rc<Promise>),
    /// Embedding-specific object the bridge only passes around.
    Opaque(Rc<dyn Any>),
}

/// A host error object: what a failing host operation throws.
#[derive(Debug, Clone, PartialEq)]
pub struct HostError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl HostValue {
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        HostValue::String(text.into())
    }

    pub fn error(name: &str, message: impl Into<String>) -> Self {
        HostValue::Error(Rc::new(HostError {
            name: name.to_string(),
            message: message.into(),
            stack: None,
        }))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error("TypeError", message)
    }

    pub fn object() -> Self {
        HostValue::Object(Rc::new(RefCell::new(BTreeMap::new())))
    }

    pub fn array(items: Vec<HostValue>) -> Self {
        HostValue::Array(Rc::new(RefCell::new(items)))
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        HostValue::Bytes(Rc::new(RefCell::new(data)))
    }

    pub fn opaque<T: Any>(value: T) -> Self {
        HostValue::Opaque(Rc::new(value))
    }

    /// The `typeof` classification of this value.
    pub fn type_of(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Function(_) => "function",
            _ => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, HostValue::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Non-null and of `typeof` "object".
    pub fn is_object(&self) -> bool {
        self.type_of() == "object" && !self.is_null()
    }

    pub fn is_function(&self) -> bool {
        matches!(self, HostValue::Function(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, HostValue::String(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            HostValue::Undefined | HostValue::Null => false,
            HostValue::Bool(b) => *b,
            HostValue::Number(n) => *n != 0.0 && !n.is_nan(),
            HostValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            HostValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Rc<Promise>> {
        match self {
            HostValue::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn downcast_opaque<T: Any>(&self) -> Option<&T> {
        match self {
            HostValue::Opaque(value) => value.downcast_ref(),
            _ => None,
        }
    }

    /// Identity for reference kinds, `Object.is` for primitives.
    pub fn same_value(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::Number(a), HostValue::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            _ => self.same_primitive_or_ref(other),
        }
    }

    /// Strict equality: like `same_value` except `NaN != NaN` and `0 == -0`.
    pub fn strict_eq(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            _ => self.same_primitive_or_ref(other),
        }
    }

    fn same_primitive_or_ref(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined) => true,
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Bytes(a), HostValue::Bytes(b)) => Rc::ptr_eq(a, b),
            (HostValue::Array(a), HostValue::Array(b)) => Rc::ptr_eq(a, b),
            (HostValue::Object(a), HostValue::Object(b)) => Rc::ptr_eq(a, b),
            (HostValue::Function(a), HostValue::Function(b)) => HostFunction::ptr_eq(a, b),
            (HostValue::Error(a), HostValue::Error(b)) => Rc::ptr_eq(a, b),
            (HostValue::Promise(a), HostValue::Promise(b)) => Rc::ptr_eq(a, b),
            (HostValue::Opaque(a), HostValue::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Reads a property, throwing a `TypeError` on `undefined` and `null`.
    pub fn get_property(&self, key: &HostValue) -> Result<HostValue, Fault> {
        let value = match self {
            HostValue::Undefined | HostValue::Null => {
                return Err(Fault::Thrown(HostValue::type_error(format!(
                    "cannot read properties of {self} (reading '{key}')"
                ))));
            }
            HostValue::Object(map) => map.borrow().get(&key.to_string()).cloned(),
            HostValue::Array(items) => {
                let items = items.borrow();
                if is_length_key(key) {
                    Some(HostValue::Number(items.len() as f64))
                } else {
                    key.as_index().and_then(|i| items.get(i).cloned())
                }
            }
            HostValue::Bytes(bytes) => {
                let bytes = bytes.borrow();
                if is_length_key(key) {
                    Some(HostValue::Number(bytes.len() as f64))
                } else {
                    key.as_index()
                        .and_then(|i| bytes.get(i))
                        .map(|b| HostValue::Number(f64::from(*b)))
                }
            }
            HostValue::String(s) if is_length_key(key) => {
                Some(HostValue::Number(utf16_len(s) as f64))
            }
            HostValue::Function(f) if key.as_str() == Some("name") => {
                Some(HostValue::string(f.name()))
            }
            HostValue::Error(err) => match key.as_str() {
                Some("name") => Some(HostValue::string(err.name.as_str())),
                Some("message") => Some(HostValue::string(err.message.as_str())),
                Some("stack") => err.stack.as_deref().map(HostValue::string),
                _ => None,
            },
            _ => None,
        };
        Ok(value.unwrap_or_default())
    }

    /// Writes a property. Returns `false` when the target silently ignores it.
    pub fn set_property(&self, key: &HostValue, value: HostValue) -> Result<bool, Fault> {
        match self {
            HostValue::Undefined | HostValue::Null => Err(Fault::Thrown(HostValue::type_error(
                format!("cannot set properties of {self} (setting '{key}')"),
            ))),
            HostValue::Object(map) => {
                map.borrow_mut().insert(key.to_string(), value);
                Ok(true)
            }
            HostValue::Array(items) => {
                let Some(index) = key.as_index() else {
                    return Ok(false);
                };
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    let Some(len) = index
                        .checked_add(1)
                        .filter(|len| len - items.len() <= MAX_ARRAY_GAP)
                    else {
                        return Ok(false);
                    };
                    items.resize(len, HostValue::Undefined);
                }
                items[index] = value;
                Ok(true)
            }
            HostValue::Bytes(bytes) => {
                let mut bytes = bytes.borrow_mut();
                match (key.as_index(), value.as_f64()) {
                    (Some(index), Some(n)) if index < bytes.len() => {
                        bytes[index] = (n as i64 & 0xFF) as u8;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    /// The canonical array index this key names, if any.
    fn as_index(&self) -> Option<usize> {
        let index = match self {
            HostValue::Number(n) if n.fract() == 0.0 && (0.0..f64::from(MAX_ARRAY_INDEX)).contains(n) => {
                *n as u32
            }
            HostValue::String(s) => s
                .parse::<u32>()
                .ok()
                .filter(|i| *i < MAX_ARRAY_INDEX && i.to_string() == **s)?,
            _ => return None,
        };
        Some(index as usize)
    }

    /// Diagnostic rendering, used by `__wbindgen_debug_string`.
    pub fn debug_string(&self) -> String {
        self.debug_string_at(0, &mut Vec::new())
    }

    /// `path` holds the containers currently being rendered; meeting one of
    /// them again is a cycle.
    fn debug_string_at(&self, depth: usize, path: &mut Vec<*const ()>) -> String {
        if depth > DEBUG_DEPTH_LIMIT {
            return "...".to_string();
        }
        match self {
            HostValue::Undefined
            | HostValue::Null
            | HostValue::Bool(_)
            | HostValue::Number(_) => self.to_string(),
            HostValue::String(s) => format!("\"{s}\""),
            HostValue::Function(f) if f.name().is_empty() => "Function".to_string(),
            HostValue::Function(f) => format!("Function({})", f.name()),
            HostValue::Array(items) => {
                let ptr = Rc::as_ptr(items).cast::<()>();
                if path.contains(&ptr) {
                    return "[...]".to_string();
                }
                path.push(ptr);
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|item| item.debug_string_at(depth + 1, path))
                    .collect();
                path.pop();
                format!("[{}]", parts.join(", "))
            }
            HostValue::Object(map) => {
                let ptr = Rc::as_ptr(map).cast::<()>();
                if path.contains(&ptr) {
                    return "Object({...})".to_string();
                }
                path.push(ptr);
                let parts: Vec<String> = map
                    .borrow()
                    .iter()
                    .filter(|(_, v)| !v.is_undefined() && !v.is_function())
                    .map(|(k, v)| format!("\"{k}\":{}", v.debug_string_at(depth + 1, path)))
                    .collect();
                path.pop();
                format!("Object({{{}}})", parts.join(","))
            }
            HostValue::Error(err) => format!(
                "{}: {}\n{}",
                err.name,
                err.message,
                err.stack.as_deref().unwrap_or_default()
            ),
            HostValue::Bytes(_) => "Uint8Array".to_string(),
            HostValue::Promise(_) => "Promise".to_string(),
            HostValue::Opaque(_) => "Opaque".to_string(),
        }
    }
}

/// Comma-joins array elements the way the host stringifies arrays. An array
/// already on `path` contributes an empty string.
fn join(items: &Array, path: &mut Vec<*const ()>) -> String {
    let ptr = Rc::as_ptr(items).cast::<()>();
    if path.contains(&ptr) {
        return String::new();
    }
    path.push(ptr);
    let parts: Vec<String> = items
        .borrow()
        .iter()
        .map(|item| match item {
            HostValue::Undefined | HostValue::Null => String::new(),
            HostValue::Array(inner) => join(inner, path),
            other => other.to_string(),
        })
        .collect();
    path.pop();
    parts.join(",")
}

fn is_length_key(key: &HostValue) -> bool {
    key.as_str() == Some("length")
}

/// Length in UTF-16 code units, the host's notion of string length.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => f.write_str("undefined"),
            HostValue::Null => f.write_str("null"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Number(n) => f.write_str(&format_number(*n)),
            HostValue::String(s) => f.write_str(s),
            HostValue::Bytes(bytes) => {
                let parts: Vec<String> = bytes.borrow().iter().map(u8::to_string).collect();
                f.write_str(&parts.join(","))
            }
            HostValue::Array(items) => f.write_str(&join(items, &mut Vec::new())),
            HostValue::Object(_) => f.write_str("[object Object]"),
            HostValue::Function(func) => {
                write!(f, "function {}() {{ [native code] }}", func.name())
            }
            HostValue::Error(err) if err.message.is_empty() => f.write_str(&err.name),
            HostValue::Error(err) => write!(f, "{}: {}", err.name, err.message),
            HostValue::Promise(_) => f.write_str("[object Promise]"),
            HostValue::Opaque(_) => f.write_str("[object Opaque]"),
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Number(f64::from(value))
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::string(value)
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::string(value)
    }
}

impl From<HostFunction> for HostValue {
    fn from(value: HostFunction) -> Self {
        HostValue::Function(value)
    }
}

impl From<HostError> for HostValue {
    fn from(value: HostError) -> Self {
        HostValue::Error(Rc::new(value))
    }
}

impl From<Rc<Promise>> for HostValue {
    fn from(value: Rc<Promise>) -> Self {
        HostValue::Promise(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_distinguishes_signed_zero_and_equates_nan() {
        assert!(HostValue::Number(f64::NAN).same_value(&HostValue::Number(f64::NAN)));
        assert!(!HostValue::Number(0.0).same_value(&HostValue::Number(-0.0)));
        assert!(HostValue::Number(0.0).strict_eq(&HostValue::Number(-0.0)));
        assert!(!HostValue::Number(f64::NAN).strict_eq(&HostValue::Number(f64::NAN)));
    }

    #[test]
    fn truthiness() {
        assert!(!HostValue::Number(f64::NAN).truthy());
        assert!(!HostValue::from("").truthy());
        assert!(HostValue::from("0").truthy());
        assert!(HostValue::array(vec![]).truthy());
        assert!(!HostValue::Null.truthy());
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = HostValue::object();
        let b = HostValue::object();
        assert!(a.strict_eq(&a.clone()));
        assert!(!a.strict_eq(&b));
        assert!(HostValue::from("x").strict_eq(&HostValue::from("x")));
    }

    #[test]
    fn reading_from_undefined_throws_type_error() {
        let err = HostValue::Undefined
            .get_property(&HostValue::from("foo"))
            .unwrap_err();
        let Fault::Thrown(HostValue::Error(err)) = err else {
            panic!("expected a thrown error");
        };
        assert_eq!(err.name, "TypeError");
        assert!(err.message.contains("reading 'foo'"));
    }

    #[test]
    fn array_set_extends_with_undefined() {
        let arr = HostValue::array(vec![]);
        assert!(arr.set_property(&HostValue::from(2), HostValue::from(7)).unwrap());
        assert_eq!(arr.get_property(&HostValue::from("length")).unwrap().as_f64(), Some(3.0));
        assert!(arr.get_property(&HostValue::from(0)).unwrap().is_undefined());
        assert_eq!(arr.get_property(&HostValue::from(2)).unwrap().as_f64(), Some(7.0));
    }

    #[test]
    fn string_length_counts_utf16_units() {
        let s = HostValue::from("a😀");
        let len = s.get_property(&HostValue::from("length")).unwrap();
        assert_eq!(len.as_f64(), Some(3.0));
    }

    #[test]
    fn debug_string_renders_nested_values() {
        let arr = HostValue::array(vec![
            HostValue::from(1),
            HostValue::from("two"),
            HostValue::Null,
        ]);
        assert_eq!(arr.debug_string(), "[1, \"two\", null]");

        let obj = HostValue::object();
        obj.set_property(&HostValue::from("k"), HostValue::from(true)).unwrap();
        assert_eq!(obj.debug_string(), "Object({\"k\":true})");

        let err = HostValue::error("RangeError", "bad");
        assert_eq!(err.debug_string(), "RangeError: bad\n");
        assert_eq!(HostValue::Number(1.5).to_string(), "1.5");
        assert_eq!(HostValue::Number(-0.0).to_string(), "0");
    }

    #[test]
    fn huge_numeric_keys_do_not_grow_arrays() {
        let arr = HostValue::array(vec![]);
        for key in [1e300, 4e9, f64::from(u32::MAX), 1e6] {
            assert!(!arr.set_property(&HostValue::from(key), HostValue::from(1)).unwrap());
        }
        assert!(!arr.set_property(&HostValue::from("01"), HostValue::from(1)).unwrap());
        assert_eq!(arr.get_property(&HostValue::from("length")).unwrap().as_f64(), Some(0.0));
        assert!(arr.get_property(&HostValue::from(1e300)).unwrap().is_undefined());
    }

    #[test]
    fn cyclic_arrays_render_without_recursing_forever() {
        let arr = HostValue::array(vec![HostValue::from(1)]);
        let HostValue::Array(items) = &arr else { unreachable!() };
        for _ in 0..8 {
            items.borrow_mut().push(arr.clone());
        }
        assert_eq!(arr.to_string(), "1,,,,,,,,");
        assert_eq!(
            arr.debug_string(),
            format!("[1{}]", ", [...]".repeat(8))
        );
        assert!(HostValue::object().get_property(&arr).unwrap().is_undefined());
        items.borrow_mut().clear();
    }

    #[test]
    fn cyclic_objects_render_without_recursing_forever() {
        let obj = HostValue::object();
        obj.set_property(&HostValue::from("me"), obj.clone()).unwrap();
        assert_eq!(obj.debug_string(), "Object({\"me\":Object({...})})");
        obj.set_property(&HostValue::from("me"), HostValue::Null).unwrap();
    }

    #[test]
    fn shared_non_cyclic_arrays_render_each_time() {
        let inner = HostValue::array(vec![HostValue::from(2)]);
        let outer = HostValue::array(vec![inner.clone(), inner]);
        assert_eq!(outer.to_string(), "2,2");
        assert_eq!(outer.debug_string(), "[[2], [2]]");
    }

    #[test]
    fn type_of_matches_host_conventions() {
        assert_eq!(HostValue::Null.type_of(), "object");
        assert!(!HostValue::Null.is_object());
        assert!(HostValue::bytes(vec![1]).is_object());
        assert_eq!(HostValue::Undefined.type_of(), "undefined");
    }
}
