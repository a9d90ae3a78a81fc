use std::fmt;
use std::rc::Rc;

use crate::closure::{ClosureState, ModuleClosure};
use crate::cx::Cx;
use crate::error::Fault;
use crate::value::HostValue;

type NativeFn = dyn Fn(&mut Cx<'_>, &HostValue, &[HostValue]) -> Result<HostValue, Fault>;

/// A callable host value.
///
/// Either a native host function, or a wrapper around a module-side closure
/// whose environment lives in linear memory.
#[derive(Clone)]
pub struct HostFunction(Rc<Inner>);

struct Inner {
    name: Rc<str>,
    kind: Kind,
}

enum Kind {
    Native(Box<NativeFn>),
    Closure(ModuleClosure),
}

impl HostFunction {
    pub fn native<F>(name: &str, body: F) -> Self
    where
        F: Fn(&mut Cx<'_>, &HostValue, &[HostValue]) -> Result<HostValue, Fault> + 'static,
    {
        HostFunction(Rc::new(Inner {
            name: name.into(),
            kind: Kind::Native(Box::new(body)),
        }))
    }

    pub(crate) fn closure(closure: ModuleClosure) -> Self {
        HostFunction(Rc::new(Inner {
            name: "".into(),
            kind: Kind::Closure(closure),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn call(
        &self,
        cx: &mut Cx<'_>,
        this: &HostValue,
        args: &[HostValue],
    ) -> Result<HostValue, Fault> {
        match &self.0.kind {
            Kind::Native(body) => body(cx, this, args),
            Kind::Closure(closure) => closure.invoke(cx, args),
        }
    }

    /// Lifetime state of the module closure behind this wrapper, if any.
    pub fn closure_state(&self) -> Option<&Rc<ClosureState>> {
        match &self.0.kind {
            Kind::Closure(closure) => Some(closure.state()),
            Kind::Native(_) => None,
        }
    }

    /// A second wrapper sharing this closure's environment.
    ///
    /// Returns `None` for native functions and for closures that were
    /// already destroyed.
    pub fn share(&self) -> Option<HostFunction> {
        match &self.0.kind {
            Kind::Closure(closure) => closure.share().map(HostFunction::closure),
            Kind::Native(_) => None,
        }
    }

    pub fn ptr_eq(a: &HostFunction, b: &HostFunction) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name())
            .field("closure", &self.closure_state().is_some())
            .finish()
    }
}
