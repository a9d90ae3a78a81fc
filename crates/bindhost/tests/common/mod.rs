#![allow(dead_code)]

use bindhost::{Bridge, ClosureShape, Config, Engine, Linker, Module};

/// Fault carries host values, which are not `Send`, so tests box errors
/// instead of going through `anyhow`.
pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const CLOSURE_WRAPPER: &str = "__wbindgen_closure_wrapper1";

/// A module shaped like bindgen output: bump allocator with growth,
/// realloc, a destructor table, a closure invoke export, a start hook, and
/// thin exports forwarding to individual bridge operations.
pub const FIXTURE: &str = r#"
(module
  (import "wbg" "__wbindgen_string_new" (func $string_new (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_string_get" (func $string_get (param i32 i32)))
  (import "wbg" "__wbindgen_number_new" (func $number_new (param f64) (result i32)))
  (import "wbg" "__wbindgen_number_get" (func $number_get (param i32 i32)))
  (import "wbg" "__wbindgen_boolean_get" (func $boolean_get (param i32) (result i32)))
  (import "wbg" "__wbindgen_object_drop_ref" (func $drop_ref (param i32)))
  (import "wbg" "__wbindgen_throw" (func $throw (param i32 i32)))
  (import "wbg" "__wbindgen_exn_take" (func $exn_take (result i32)))
  (import "wbg" "__wbg_get" (func $get (param i32 i32) (result i32)))
  (import "wbg" "__wbg_set" (func $set (param i32 i32 i32) (result i32)))
  (import "wbg" "__wbg_push" (func $push (param i32 i32) (result i32)))
  (import "wbg" "__wbg_call1" (func $call1 (param i32 i32 i32) (result i32)))
  (import "wbg" "__wbindgen_cb_drop" (func $cb_drop (param i32) (result i32)))
  (import "wbg" "__wbg_log" (func $log (param i32 i32)))
  (import "wbg" "__wbg_then" (func $then (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_is_falsy" (func $is_falsy (param i32) (result i32)))
  (import "wbg" "__wbindgen_memory" (func $memory (result i32)))
  (import "wbg" "__wbindgen_closure_wrapper1" (func $closure_wrapper (param i32 i32 i32) (result i32)))

  (memory (export "memory") 1)
  (table (export "__wbindgen_export_2") 2 funcref)
  (elem (i32.const 1) $dtor)

  (global $heap (mut i32) (i32.const 1024))
  (global $frees (export "frees") (mut i32) (i32.const 0))
  (global $dtor_calls (export "dtor_calls") (mut i32) (i32.const 0))
  (global $last_dtor_a (export "last_dtor_a") (mut i32) (i32.const 0))
  (global $invokes (export "invokes") (mut i32) (i32.const 0))
  (global $drop_self (mut i32) (i32.const 0))
  (global $reenter (mut i32) (i32.const 0))
  (global $started (export "started") (mut i32) (i32.const 0))

  (func $malloc (export "__wbindgen_malloc") (param $size i32) (param $align i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    global.get $heap
    local.set $ptr
    local.get $ptr
    local.get $size
    i32.add
    local.set $end
    (block $fits
      local.get $end
      memory.size
      i32.const 16
      i32.shl
      i32.le_u
      br_if $fits
      local.get $end
      memory.size
      i32.const 16
      i32.shl
      i32.sub
      i32.const 65535
      i32.add
      i32.const 16
      i32.shr_u
      memory.grow
      drop)
    local.get $end
    global.set $heap
    local.get $ptr)

  (func (export "__wbindgen_realloc") (param $ptr i32) (param $old i32) (param $new i32) (param $align i32) (result i32)
    (local $dst i32)
    local.get $new
    local.get $align
    call $malloc
    local.set $dst
    local.get $dst
    local.get $ptr
    local.get $old
    memory.copy
    local.get $dst)

  (func (export "__wbindgen_free") (param i32 i32 i32)
    global.get $frees
    i32.const 1
    i32.add
    global.set $frees)

  (func $dtor (param $a i32) (param $b i32)
    global.get $dtor_calls
    i32.const 1
    i32.add
    global.set $dtor_calls
    local.get $a
    global.set $last_dtor_a)

  (func (export "closure_invoke") (param $a i32) (param $b i32) (param $arg i32) (result i32)
    global.get $invokes
    i32.const 1
    i32.add
    global.set $invokes
    (if (global.get $drop_self)
      (then
        global.get $drop_self
        call $cb_drop
        drop
        i32.const 0
        global.set $drop_self))
    (if (global.get $reenter)
      (then
        global.get $reenter
        i32.const 128
        local.get $arg
        call $call1
        drop))
    local.get $arg)

  (func (export "__wbindgen_start")
    global.get $started
    i32.const 1
    i32.add
    global.set $started)

  (func (export "make_closure") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    i32.const 0
    call $closure_wrapper)
  (func (export "set_drop_self") (param i32)
    local.get 0
    global.set $drop_self)
  (func (export "set_reenter") (param i32)
    local.get 0
    global.set $reenter)
  (func (export "grow") (param i32) (result i32)
    local.get 0
    memory.grow)
  (func (export "boom")
    unreachable)

  (func (export "string_new") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    call $string_new)
  (func (export "string_get") (param i32 i32)
    local.get 0
    local.get 1
    call $string_get)
  (func (export "number_new") (param f64) (result i32)
    local.get 0
    call $number_new)
  (func (export "number_get") (param i32 i32)
    local.get 0
    local.get 1
    call $number_get)
  (func (export "boolean_get") (param i32) (result i32)
    local.get 0
    call $boolean_get)
  (func (export "drop_ref") (param i32)
    local.get 0
    call $drop_ref)
  (func (export "throw") (param i32 i32)
    local.get 0
    local.get 1
    call $throw)
  (func (export "exn_take") (result i32)
    call $exn_take)
  (func (export "get") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    call $get)
  (func (export "set") (param i32 i32 i32) (result i32)
    local.get 0
    local.get 1
    local.get 2
    call $set)
  (func (export "push") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    call $push)
  (func (export "call1") (param i32 i32 i32) (result i32)
    local.get 0
    local.get 1
    local.get 2
    call $call1)
  (func (export "cb_drop") (param i32) (result i32)
    local.get 0
    call $cb_drop)
  (func (export "log") (param i32 i32)
    local.get 0
    local.get 1
    call $log)
  (func (export "then") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    call $then)
  (func (export "is_falsy") (param i32) (result i32)
    local.get 0
    call $is_falsy)
  (func (export "memory_ref") (result i32)
    call $memory))
"#;

pub fn config(strict: bool) -> Config {
    let mut config = Config::new();
    config.strict_boundary(strict);
    config
}

pub fn linker(config: &Config) -> Linker {
    let mut linker = Linker::new(config).with_std_ops();
    linker.closure(CLOSURE_WRAPPER, ClosureShape::new("closure_invoke", 1));
    linker
}

pub fn unloaded(config: Config) -> Bridge {
    let engine = Engine::default();
    let linker = linker(&config);
    Bridge::new(&engine, linker, config)
}

/// A ready bridge over the fixture module.
pub fn bridge(strict: bool) -> Bridge {
    let engine = Engine::default();
    let config = config(strict);
    let module = Module::new(&engine, FIXTURE).expect("fixture compiles");
    let mut bridge = Bridge::new(&engine, linker(&config), config);
    bridge.init_sync(module).expect("fixture instantiates");
    bridge
}

pub fn global_i32(bridge: &mut Bridge, name: &str) -> i32 {
    bridge
        .get_global(name)
        .and_then(|val| val.i32())
        .expect("exported i32 global")
}

/// Copies `text` into module memory, returning `(ptr, len)`.
pub fn pass_string(bridge: &mut Bridge, text: &str) -> (u32, u32) {
    bridge.cx().pass_string(text).expect("string fits in memory")
}
