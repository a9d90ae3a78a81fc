//! Reference slab: maps small integer handles to host values.
//!
//! Handles below [`RESERVED_BASE`] belong to the module's borrowed-reference
//! stack and are never allocated; in particular handle 0 is never valid and
//! serves as the "none" sentinel. The four constants `undefined`, `null`,
//! `true` and `false` sit at fixed handles just above that range and are
//! never freed. Released slots form an intrusive LIFO free list threaded
//! through the slot vector itself.

use crate::error::BoundaryError;
use crate::value::HostValue;

/// First handle past the module's borrowed-reference stack.
pub const RESERVED_BASE: u32 = 128;
pub const UNDEFINED: u32 = RESERVED_BASE;
pub const NULL: u32 = RESERVED_BASE + 1;
pub const TRUE: u32 = RESERVED_BASE + 2;
pub const FALSE: u32 = RESERVED_BASE + 3;
/// First handle `allocate` can return.
pub const FIRST_DYNAMIC: u32 = RESERVED_BASE + 4;

enum Slot {
    Reserved,
    Used(HostValue),
    Free { next: u32 },
}

pub struct Slab {
    slots: Vec<Slot>,
    /// Head of the free list. Equal to `slots.len()` when the list is empty.
    next: u32,
    live: usize,
}

impl Default for Slab {
    fn default() -> Self {
        Self::new()
    }
}

impl Slab {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// A slab with room for `extra` dynamic handles before reallocating.
    pub fn with_capacity(extra: usize) -> Self {
        let mut slots = Vec::with_capacity(FIRST_DYNAMIC as usize + extra);
        slots.resize_with(RESERVED_BASE as usize, || Slot::Reserved);
        slots.extend([
            Slot::Used(HostValue::Undefined),
            Slot::Used(HostValue::Null),
            Slot::Used(HostValue::Bool(true)),
            Slot::Used(HostValue::Bool(false)),
        ]);
        Slab {
            slots,
            next: FIRST_DYNAMIC,
            live: 0,
        }
    }

    /// Stores `value` and returns its handle, reusing the most recently
    /// released slot first.
    pub fn allocate(&mut self, value: HostValue) -> u32 {
        let handle = self.next;
        if handle as usize == self.slots.len() {
            self.slots.push(Slot::Free { next: handle + 1 });
        }
        let slot = &mut self.slots[handle as usize];
        let Slot::Free { next } = *slot else {
            unreachable!("free list head {handle} is not a free slot");
        };
        *slot = Slot::Used(value);
        self.next = next;
        self.live += 1;
        handle
    }

    pub fn resolve(&self, handle: u32) -> Result<&HostValue, BoundaryError> {
        match self.slots.get(handle as usize) {
            Some(Slot::Used(value)) => Ok(value),
            _ => Err(BoundaryError::InvalidHandle(handle)),
        }
    }

    /// Frees `handle`. Releasing one of the constants is a no-op.
    pub fn release(&mut self, handle: u32) -> Result<Option<HostValue>, BoundaryError> {
        if Self::is_constant(handle) {
            return Ok(None);
        }
        let slot = self
            .slots
            .get_mut(handle as usize)
            .ok_or(BoundaryError::InvalidHandle(handle))?;
        if !matches!(slot, Slot::Used(_)) {
            return Err(BoundaryError::InvalidHandle(handle));
        }
        let Slot::Used(value) = std::mem::replace(slot, Slot::Free { next: self.next }) else {
            unreachable!();
        };
        self.next = handle;
        self.live -= 1;
        Ok(Some(value))
    }

    /// Resolves and releases in one step.
    pub fn take(&mut self, handle: u32) -> Result<HostValue, BoundaryError> {
        let value = self.resolve(handle)?.clone();
        self.release(handle)?;
        Ok(value)
    }

    /// Allocates a fresh handle referring to the same value.
    pub fn clone_handle(&mut self, handle: u32) -> Result<u32, BoundaryError> {
        let value = self.resolve(handle)?.clone();
        Ok(self.allocate(value))
    }

    pub fn is_constant(handle: u32) -> bool {
        (UNDEFINED..FIRST_DYNAMIC).contains(&handle)
    }

    /// Number of dynamically allocated, unreleased handles.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Total slots, including the reserved range and free slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_resolve_and_survive_release() {
        let mut slab = Slab::new();
        assert!(slab.resolve(UNDEFINED).unwrap().is_undefined());
        assert!(slab.resolve(NULL).unwrap().is_null());
        assert_eq!(slab.resolve(TRUE).unwrap().as_bool(), Some(true));
        assert_eq!(slab.resolve(FALSE).unwrap().as_bool(), Some(false));

        assert!(slab.release(NULL).unwrap().is_none());
        assert!(slab.resolve(NULL).unwrap().is_null());
    }

    #[test]
    fn reserved_stack_range_is_never_valid() {
        let slab = Slab::new();
        assert!(matches!(slab.resolve(0), Err(BoundaryError::InvalidHandle(0))));
        assert!(slab.resolve(RESERVED_BASE - 1).is_err());
    }

    #[test]
    fn released_slots_are_reused_lifo() {
        let mut slab = Slab::new();
        let a = slab.allocate(HostValue::from(1));
        let b = slab.allocate(HostValue::from(2));
        let c = slab.allocate(HostValue::from(3));
        assert_eq!((a, b, c), (FIRST_DYNAMIC, FIRST_DYNAMIC + 1, FIRST_DYNAMIC + 2));

        slab.release(b).unwrap();
        slab.release(a).unwrap();
        assert_eq!(slab.allocate(HostValue::Null), a);
        assert_eq!(slab.allocate(HostValue::Null), b);
        assert_eq!(slab.allocate(HostValue::Null), c + 1);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut slab = Slab::new();
        let h = slab.allocate(HostValue::from("x"));
        assert!(slab.release(h).unwrap().is_some());
        assert!(matches!(slab.release(h), Err(BoundaryError::InvalidHandle(_))));
        assert!(slab.resolve(h).is_err());
        assert_eq!(slab.live(), 0);
    }

    #[test]
    fn take_and_clone() {
        let mut slab = Slab::new();
        let h = slab.allocate(HostValue::from("v"));
        let h2 = slab.clone_handle(h).unwrap();
        assert_ne!(h, h2);
        assert_eq!(slab.take(h).unwrap().as_str(), Some("v"));
        assert_eq!(slab.resolve(h2).unwrap().as_str(), Some("v"));
        assert_eq!(slab.live(), 1);
    }
}
