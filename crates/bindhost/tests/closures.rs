mod common;

use bindhost::HostValue;
use common::{TestResult, bridge, global_i32};

fn make_closure(bridge: &mut bindhost::Bridge) -> Result<(u32, HostValue), bindhost::Fault> {
    let (handle,): (u32,) = bridge.call("make_closure", (8u32, 9u32))?;
    let func = bridge.get_object(handle)?;
    Ok((handle, func))
}

#[test]
fn invoking_a_closure_calls_the_module() -> TestResult {
    let mut bridge = bridge(true);
    let (_, func) = make_closure(&mut bridge)?;
    assert!(func.is_function());

    let live = bridge.store().data().slab().live();
    let result = bridge.invoke(&func, &[HostValue::from("ping")])?;
    assert_eq!(result.as_str(), Some("ping"));
    assert_eq!(global_i32(&mut bridge, "invokes"), 1);
    assert_eq!(bridge.store().data().slab().live(), live);
    Ok(())
}

#[test]
fn missing_arguments_arrive_as_undefined() -> TestResult {
    let mut bridge = bridge(true);
    let (_, func) = make_closure(&mut bridge)?;
    let result = bridge.invoke(&func, &[])?;
    assert!(result.is_undefined());
    assert_eq!(global_i32(&mut bridge, "invokes"), 1);
    Ok(())
}

#[test]
fn host_release_runs_the_destructor_once() -> TestResult {
    let mut bridge = bridge(true);
    let (handle, func) = make_closure(&mut bridge)?;
    bridge.take_object(handle)?;

    assert!(bridge.release(&func)?);
    assert_eq!(global_i32(&mut bridge, "dtor_calls"), 1);
    assert_eq!(global_i32(&mut bridge, "last_dtor_a"), 8);

    bridge.release(&func)?;
    assert_eq!(global_i32(&mut bridge, "dtor_calls"), 1);
    Ok(())
}

#[test]
fn module_drop_leaves_destruction_to_the_module() -> TestResult {
    let mut bridge = bridge(true);
    let (handle, func) = make_closure(&mut bridge)?;

    let (must_free,): (i32,) = bridge.call("cb_drop", (handle,))?;
    assert_eq!(must_free, 1);
    assert_eq!(global_i32(&mut bridge, "dtor_calls"), 0);

    let result = bridge.invoke(&func, &[HostValue::from(1)])?;
    assert!(result.is_undefined());
    assert_eq!(global_i32(&mut bridge, "invokes"), 0);
    Ok(())
}

#[test]
fn release_during_invocation_defers_destruction() -> TestResult {
    let mut bridge = bridge(true);
    let (handle, func) = make_closure(&mut bridge)?;
    bridge.call::<_, ()>("set_drop_self", (handle,))?;

    let result = bridge.invoke(&func, &[HostValue::from(5)])?;
    assert_eq!(result.as_f64(), Some(5.0));
    assert_eq!(global_i32(&mut bridge, "dtor_calls"), 1);

    let state = func
        .as_function()
        .and_then(|f| f.closure_state())
        .expect("closure wrapper");
    assert!(state.is_destroyed());

    let again = bridge.invoke(&func, &[HostValue::from(6)])?;
    assert!(again.is_undefined());
    assert_eq!(global_i32(&mut bridge, "invokes"), 1);
    Ok(())
}

#[test]
fn shared_wrappers_destroy_on_last_release() -> TestResult {
    let mut bridge = bridge(true);
    let (handle, func) = make_closure(&mut bridge)?;
    bridge.take_object(handle)?;
    let shared: HostValue = func
        .as_function()
        .and_then(|f| f.share())
        .expect("live closure can be shared")
        .into();

    bridge.release(&func)?;
    assert_eq!(global_i32(&mut bridge, "dtor_calls"), 0);
    assert_eq!(
        bridge.invoke(&shared, &[HostValue::from("still here")])?.as_str(),
        Some("still here")
    );

    bridge.release(&shared)?;
    assert_eq!(global_i32(&mut bridge, "dtor_calls"), 1);
    Ok(())
}

#[test]
fn releasing_a_native_function_is_a_no_op() -> TestResult {
    let mut bridge = bridge(true);
    let native: HostValue =
        bindhost::HostFunction::native("noop", |_, _, _| Ok(HostValue::Undefined)).into();
    assert!(!bridge.release(&native)?);
    assert!(!bridge.release(&HostValue::from(3))?);
    Ok(())
}

#[test]
fn recursive_invocation_raises_in_the_module() -> TestResult {
    let mut bridge = bridge(true);
    let (handle, func) = make_closure(&mut bridge)?;
    bridge.call::<_, ()>("set_reenter", (handle,))?;

    let result = bridge.invoke(&func, &[HostValue::from("outer")])?;
    assert_eq!(result.as_str(), Some("outer"));
    assert_eq!(global_i32(&mut bridge, "invokes"), 1);

    let (error,): (u32,) = bridge.call("exn_take", ())?;
    let HostValue::Error(err) = bridge.take_object(error)? else {
        panic!("expected the recursion error");
    };
    assert_eq!(err.message, "closure invoked recursively or after being dropped");

    let state = func
        .as_function()
        .and_then(|f| f.closure_state())
        .expect("closure wrapper");
    assert_eq!(state.live_count(), 1);
    assert!(!state.is_destroyed());
    Ok(())
}

#[test]
fn releases_beyond_the_last_reference_during_a_call_are_ignored() -> TestResult {
    let mut bridge = bridge(true);
    let (handle, func) = make_closure(&mut bridge)?;
    bridge.take_object(handle)?;
    let releaser = {
        let func = func.clone();
        bindhost::HostFunction::native("release twice", move |cx, _, _| {
            let wrapper = func.as_function().expect("closure wrapper");
            bindhost::closure::dispose(cx, wrapper)?;
            bindhost::closure::dispose(cx, wrapper)?;
            Ok(HostValue::Undefined)
        })
    };
    let releaser = bridge.add_object(releaser.into());
    bridge.call::<_, ()>("set_reenter", (releaser,))?;

    bridge.invoke(&func, &[HostValue::from(1)])?;
    assert_eq!(global_i32(&mut bridge, "dtor_calls"), 1);
    assert!(bridge.store().data().pending_error().is_none());

    bridge.release(&func)?;
    assert_eq!(global_i32(&mut bridge, "dtor_calls"), 1);
    Ok(())
}
