//! Cycle guard for the encoder.
//!
//! Tracks the identities of composites that are open on the current
//! recursion path. An identity is released as soon as its subtree has been
//! written, so a composite shared by two parents (a DAG) is not a cycle.

use std::cell::RefCell;
use std::collections::HashSet;

use tracing::debug;

use crate::error::EjsonEncodeError;

/// Identity of a shared composite: the address of its allocation.
pub(crate) type Identity = usize;

/// Open-set for a single top-level encode call.
#[derive(Debug, Default)]
pub(crate) struct CycleGuard {
    open: RefCell<HashSet<Identity>>,
}

impl CycleGuard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks `id` open until the returned marker is dropped.
    pub(crate) fn enter(&self, id: Identity) -> Result<OpenMarker<'_>, EjsonEncodeError> {
        if !self.open.borrow_mut().insert(id) {
            debug!(identity = id, "circular reference detected");
            return Err(EjsonEncodeError::CircularReference);
        }
        Ok(OpenMarker { guard: self, id })
    }

    #[cfg(test)]
    fn is_open(&self, id: Identity) -> bool {
        self.open.borrow().contains(&id)
    }
}

/// Releases its identity on drop, including on early `?` returns.
#[derive(Debug)]
pub(crate) struct OpenMarker<'a> {
    guard: &'a CycleGuard,
    id: Identity,
}

impl Drop for OpenMarker<'_> {
    fn drop(&mut self) {
        self.guard.open.borrow_mut().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentering_an_open_identity_fails() {
        let guard = CycleGuard::new();
        let _outer = guard.enter(1).unwrap();
        assert!(matches!(
            guard.enter(1),
            Err(EjsonEncodeError::CircularReference)
        ));
    }

    #[test]
    fn closed_identities_can_be_entered_again() {
        let guard = CycleGuard::new();
        {
            let _first = guard.enter(7).unwrap();
            assert!(guard.is_open(7));
        }
        assert!(!guard.is_open(7));
        let _second = guard.enter(7).unwrap();
    }

    #[test]
    fn siblings_do_not_conflict() {
        let guard = CycleGuard::new();
        let _root = guard.enter(1).unwrap();
        {
            let _left = guard.enter(2).unwrap();
        }
        let _right = guard.enter(2).unwrap();
        assert!(guard.is_open(1));
        assert!(guard.is_open(2));
    }

    #[test]
    fn marker_releases_on_error_path() {
        fn descend(guard: &CycleGuard) -> Result<(), EjsonEncodeError> {
            let _open = guard.enter(3)?;
            Err(EjsonEncodeError::NonFiniteFloat(f64::NAN))
        }
        let guard = CycleGuard::new();
        assert!(descend(&guard).is_err());
        assert!(!guard.is_open(3));
    }
}
