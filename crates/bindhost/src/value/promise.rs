use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::debug;

use crate::cx::Cx;
use crate::error::Fault;
use crate::value::{HostFunction, HostValue};

/// Outcome of a settled promise.
#[derive(Debug, Clone)]
pub enum Settled {
    Fulfilled(HostValue),
    Rejected(HostValue),
}

/// A deferred host result the module can subscribe to with `then`.
///
/// Reactions never run synchronously: settling a promise queues a microtask
/// per reaction, drained by `Bridge::run_microtasks`.
pub struct Promise {
    state: RefCell<State>,
    /// Set once the promise has adopted another one. Its outcome then
    /// follows the adopted promise and outside settlement is ignored.
    locked: Cell<bool>,
}

enum State {
    Pending(Vec<Reaction>),
    Settled(Settled),
}

struct Reaction {
    on_fulfilled: Option<HostFunction>,
    derived: Rc<Promise>,
}

/// A unit of deferred work queued on the host's microtask queue.
pub(crate) enum Job {
    Call {
        func: HostFunction,
        args: Vec<HostValue>,
    },
    React {
        on_fulfilled: Option<HostFunction>,
        outcome: Settled,
        derived: Rc<Promise>,
    },
}

impl Promise {
    pub fn pending() -> Rc<Self> {
        Rc::new(Promise {
            state: RefCell::new(State::Pending(Vec::new())),
            locked: Cell::new(false),
        })
    }

    pub fn fulfilled(value: HostValue) -> Rc<Self> {
        Rc::new(Promise {
            state: RefCell::new(State::Settled(Settled::Fulfilled(value))),
            locked: Cell::new(false),
        })
    }

    pub fn outcome(&self) -> Option<Settled> {
        match &*self.state.borrow() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.state.borrow(), State::Pending(_))
    }

    /// Resolves with `value`, adopting its state when it is itself a promise.
    pub(crate) fn resolve(self: &Rc<Self>, value: HostValue, jobs: &mut VecDeque<Job>) -> bool {
        !self.locked.get() && self.resolve_unlocked(value, jobs)
    }

    pub(crate) fn reject(&self, reason: HostValue, jobs: &mut VecDeque<Job>) -> bool {
        !self.locked.get() && self.settle(Settled::Rejected(reason), jobs)
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    fn resolve_unlocked(self: &Rc<Self>, value: HostValue, jobs: &mut VecDeque<Job>) -> bool {
        if !self.is_pending() {
            return false;
        }
        match value {
            HostValue::Promise(inner) if Rc::ptr_eq(&inner, self) => self.settle(
                Settled::Rejected(HostValue::type_error("promise resolved with itself")),
                jobs,
            ),
            HostValue::Promise(inner) => {
                self.locked.set(true);
                inner.subscribe(
                    Reaction {
                        on_fulfilled: None,
                        derived: self.clone(),
                    },
                    jobs,
                );
                true
            }
            value => self.settle(Settled::Fulfilled(value), jobs),
        }
    }

    fn settle(&self, outcome: Settled, jobs: &mut VecDeque<Job>) -> bool {
        let previous = {
            let mut state = self.state.borrow_mut();
            if matches!(&*state, State::Settled(_)) {
                return false;
            }
            std::mem::replace(&mut *state, State::Settled(outcome.clone()))
        };
        if let State::Pending(reactions) = previous {
            for reaction in reactions {
                jobs.push_back(reaction.into_job(outcome.clone()));
            }
        }
        true
    }

    /// Registers a fulfillment handler, returning the derived promise.
    pub(crate) fn then(
        self: &Rc<Self>,
        on_fulfilled: Option<HostFunction>,
        jobs: &mut VecDeque<Job>,
    ) -> Rc<Promise> {
        let derived = Promise::pending();
        self.subscribe(
            Reaction {
                on_fulfilled,
                derived: derived.clone(),
            },
            jobs,
        );
        derived
    }

    fn subscribe(&self, reaction: Reaction, jobs: &mut VecDeque<Job>) {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            State::Pending(reactions) => reactions.push(reaction),
            State::Settled(outcome) => jobs.push_back(reaction.into_job(outcome.clone())),
        }
    }
}

impl Reaction {
    fn into_job(self, outcome: Settled) -> Job {
        Job::React {
            on_fulfilled: self.on_fulfilled,
            outcome,
            derived: self.derived,
        }
    }
}

impl Job {
    pub(crate) fn run(self, cx: &mut Cx<'_>) -> Result<(), Fault> {
        match self {
            Job::Call { func, args } => func.call(cx, &HostValue::Undefined, &args).map(drop),
            Job::React {
                on_fulfilled,
                outcome,
                derived,
            } => {
                let next = match (outcome, on_fulfilled) {
                    (Settled::Fulfilled(value), Some(handler)) => {
                        match handler.call(cx, &HostValue::Undefined, &[value]) {
                            Ok(result) => Ok(result),
                            Err(Fault::Thrown(reason)) => Err(reason),
                            Err(fault) => return Err(fault),
                        }
                    }
                    (Settled::Fulfilled(value), None) => Ok(value),
                    (Settled::Rejected(reason), _) => Err(reason),
                };
                let jobs = &mut cx.state_mut().jobs;
                match next {
                    Ok(value) => derived.resolve_unlocked(value, jobs),
                    Err(reason) => {
                        debug!(reason = %reason, "promise rejected");
                        derived.settle(Settled::Rejected(reason), jobs)
                    }
                };
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settling_twice_is_ignored() {
        let mut jobs = VecDeque::new();
        let p = Promise::pending();
        assert!(p.settle(Settled::Fulfilled(HostValue::from(1)), &mut jobs));
        assert!(!p.settle(Settled::Fulfilled(HostValue::from(2)), &mut jobs));
        let Some(Settled::Fulfilled(v)) = p.outcome() else {
            panic!("expected fulfilled");
        };
        assert_eq!(v.as_f64(), Some(1.0));
    }

    #[test]
    fn adopting_a_promise_locks_out_other_settlement() {
        let mut jobs = VecDeque::new();
        let outer = Promise::pending();
        let inner = Promise::pending();
        assert!(outer.resolve(HostValue::Promise(inner.clone()), &mut jobs));
        assert!(outer.is_locked());
        assert!(outer.is_pending());
        assert!(!outer.resolve(HostValue::from(1), &mut jobs));
        assert!(!outer.reject(HostValue::from("no"), &mut jobs));
        assert!(outer.is_pending());

        assert!(inner.resolve(HostValue::from(2), &mut jobs));
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn reactions_queue_on_settle_not_on_subscribe() {
        let mut jobs = VecDeque::new();
        let p = Promise::pending();
        let derived = p.then(None, &mut jobs);
        assert!(jobs.is_empty());
        p.settle(Settled::Fulfilled(HostValue::Null), &mut jobs);
        assert_eq!(jobs.len(), 1);
        assert!(derived.is_pending());
    }

    #[test]
    fn subscribing_to_settled_promise_queues_immediately() {
        let mut jobs = VecDeque::new();
        let p = Promise::fulfilled(HostValue::from("done"));
        p.then(None, &mut jobs);
        assert_eq!(jobs.len(), 1);
    }
}
