//! Converting host exceptions into module-visible error codes and back.
//!
//! A fallible operation never lets a host exception unwind through module
//! frames: the exception is parked in the pending error slot and the
//! operation returns zeros, leaving the module to call
//! `__wbindgen_exn_take`. Exceptions thrown from direct operations do unwind.
//! They travel through the engine as an [`Unwind`] trap marker while the
//! value itself waits in `HostState::unwinding`, and are turned back into
//! [`Fault::Thrown`] where the call re-enters host code.

use thiserror::Error;
use tracing::{debug, warn};

use crate::cx::Cx;
use crate::error::{BoundaryError, Fault};
use crate::store::HostState;

/// Value `__wbindgen_exn_take` returns when no error is pending.
pub const NO_ERROR: u32 = 0;

/// Marker trap carrying a host exception through module frames.
#[derive(Debug, Error)]
#[error("host exception unwinding through module")]
pub(crate) struct Unwind;

/// The single pending error slot.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    pending: Option<u32>,
}

impl ErrorSlot {
    /// Parks `handle`, returning a previous handle that was never consumed.
    pub fn store(&mut self, handle: u32) -> Option<u32> {
        self.pending.replace(handle)
    }

    /// Takes the pending handle, or [`NO_ERROR`].
    pub fn consume(&mut self) -> u32 {
        self.pending.take().unwrap_or(NO_ERROR)
    }

    pub fn peek(&self) -> Option<u32> {
        self.pending
    }
}

/// Runs a fallible operation body.
///
/// A thrown host exception is stored in the pending error slot and `Ok(None)`
/// is returned; boundary violations and traps still propagate.
pub fn handle_error<T>(
    cx: &mut Cx<'_>,
    body: impl FnOnce(&mut Cx<'_>) -> Result<T, Fault>,
) -> Result<Option<T>, Fault> {
    match body(cx) {
        Ok(value) => Ok(Some(value)),
        Err(Fault::Thrown(exception)) => {
            debug!(exception = %exception, "host exception captured for module");
            cx.store_error(exception);
            Ok(None)
        }
        Err(fault) => Err(fault),
    }
}

/// Turns a fault into the error a host function hands back to the engine.
pub(crate) fn raise(state: &mut HostState, fault: Fault) -> anyhow::Error {
    match fault {
        Fault::Thrown(exception) => {
            if let Some(previous) = state.unwinding.replace(exception) {
                warn!(previous = %previous, "unwinding exception replaced before it was observed");
            }
            anyhow::Error::new(Unwind)
        }
        Fault::Boundary(err) => anyhow::Error::new(err),
        Fault::Trap(err) => err,
    }
}

/// Classifies an error coming back out of the engine.
pub(crate) fn recover(state: &mut HostState, err: anyhow::Error) -> Fault {
    if err.is::<Unwind>() {
        if let Some(exception) = state.unwinding.take() {
            return Fault::Thrown(exception);
        }
    }
    match err.downcast::<BoundaryError>() {
        Ok(boundary) => Fault::Boundary(boundary),
        Err(err) => Fault::Trap(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::value::HostValue;

    #[test]
    fn slot_overwrites_and_reports_previous() {
        let mut slot = ErrorSlot::default();
        assert_eq!(slot.consume(), NO_ERROR);
        assert_eq!(slot.store(140), None);
        assert_eq!(slot.store(141), Some(140));
        assert_eq!(slot.consume(), 141);
        assert_eq!(slot.consume(), NO_ERROR);
    }

    #[test]
    fn thrown_values_survive_the_engine_round_trip() {
        let mut state = HostState::new(Config::new());
        let err = raise(&mut state, Fault::Thrown(HostValue::from("boom")));
        assert!(err.is::<Unwind>());
        let fault = recover(&mut state, err);
        assert_eq!(fault.thrown().and_then(HostValue::as_str), Some("boom"));
        assert!(state.unwinding.is_none());
    }

    #[test]
    fn boundary_errors_keep_their_type() {
        let mut state = HostState::new(Config::new());
        let err = raise(&mut state, Fault::Boundary(BoundaryError::InvalidHandle(7)));
        assert!(matches!(
            recover(&mut state, err),
            Fault::Boundary(BoundaryError::InvalidHandle(7))
        ));
        let trap = recover(&mut state, anyhow::anyhow!("unreachable"));
        assert!(matches!(trap, Fault::Trap(_)));
    }
}
