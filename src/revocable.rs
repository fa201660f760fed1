//! Cascading revocation for secret-bearing objects.
//!
//! A [`Revoker`] holds a queue of cleanup callbacks. Revoking runs every
//! queued callback exactly once, isolating panics so one misbehaving
//! callback cannot block the rest. Callbacks added after revocation run
//! immediately. Dependent revokers are linked weakly and pruned once
//! dropped, so a long-lived parent does not grow with every child.
//!
//! [`Revocable<T>`] is a shared reference to a value that becomes
//! permanently unusable once revoked: every accessor returns
//! [`VaultError::Revoked`] and the value itself is dropped (and zeroized,
//! if its type does that on drop).

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::warn;

use crate::errors::{Result, VaultError};

type Callback = Box<dyn FnOnce() + Send>;
type Link = Weak<Mutex<RevokerState>>;

#[derive(Default)]
struct RevokerState {
    revoked: bool,
    callbacks: Vec<Callback>,
    children: Vec<Link>,
}

/// Idempotent "invalidate and release" trigger.
///
/// Cloning a `Revoker` yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct Revoker {
    state: Arc<Mutex<RevokerState>>,
}

impl Revoker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RevokerState> {
        // Revocation must still work after a callback panicked elsewhere.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` once [`revoke`](Self::revoke) has been called.
    pub fn is_revoked(&self) -> bool {
        self.lock().revoked
    }

    /// Fail with [`VaultError::Revoked`] if this revoker has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_revoked() {
            Err(VaultError::Revoked)
        } else {
            Ok(())
        }
    }

    /// Queue a cleanup callback, or run it now if already revoked.
    pub fn add_revoker<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock();
        if state.revoked {
            drop(state);
            run_isolated(Box::new(callback));
        } else {
            state.callbacks.push(Box::new(callback));
        }
    }

    /// Run and clear every queued callback, then revoke every live child.
    /// Later calls are no-ops.
    pub fn revoke(&self) {
        let (callbacks, children) = {
            let mut state = self.lock();
            if state.revoked {
                return;
            }
            state.revoked = true;
            (
                std::mem::take(&mut state.callbacks),
                std::mem::take(&mut state.children),
            )
        };

        for callback in callbacks {
            run_isolated(callback);
        }
        for state in children.iter().filter_map(Weak::upgrade) {
            Revoker { state }.revoke();
        }
    }

    /// Revoke `child` whenever this revoker fires.
    ///
    /// Only a weak link is kept; links to dropped revokers are pruned on
    /// the next adoption.
    pub fn adopt(&self, child: &Revoker) {
        let mut state = self.lock();
        if state.revoked {
            drop(state);
            child.revoke();
            return;
        }
        state.children.retain(|link| link.strong_count() > 0);
        state.children.push(Arc::downgrade(&child.state));
    }

    /// Create a revoker that fires whenever this one does.
    pub fn child(&self) -> Revoker {
        let child = Revoker::new();
        self.adopt(&child);
        child
    }

    /// Queued callbacks plus children that are still alive.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        let live = state
            .children
            .iter()
            .filter(|link| link.strong_count() > 0)
            .count();
        state.callbacks.len() + live
    }
}

impl std::fmt::Debug for Revoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revoker")
            .field("revoked", &self.is_revoked())
            .field("pending", &self.pending())
            .finish()
    }
}

fn run_isolated(callback: Callback) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        warn!("revocation callback panicked; continuing with remaining callbacks");
    }
}

/// Anything that owns a [`Revoker`] and can be torn down through it.
pub trait Revoke {
    fn revoker(&self) -> &Revoker;

    fn revoke(&self) {
        self.revoker().revoke();
    }

    fn add_revoker<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
        Self: Sized,
    {
        self.revoker().add_revoker(callback);
    }

    fn is_revoked(&self) -> bool {
        self.revoker().is_revoked()
    }
}

/// A reference that stops working once revoked, even though the caller
/// still holds it.
pub struct Revocable<T> {
    slot: Arc<Mutex<Option<T>>>,
    revoker: Revoker,
}

impl<T: Send + 'static> Revocable<T> {
    /// Wrap `value` with its own, independent revoker.
    pub fn new(value: T) -> Self {
        let slot = Arc::new(Mutex::new(Some(value)));
        let revoker = Revoker::new();
        let weak = Arc::downgrade(&slot);
        revoker.add_revoker(move || {
            if let Some(slot) = weak.upgrade() {
                let released = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                drop(released);
            }
        });
        Self { slot, revoker }
    }

    /// Wrap `value` so that revoking `parent` also revokes it.
    pub fn attach(value: T, parent: &Revoker) -> Self {
        let revocable = Self::new(value);
        parent.adopt(&revocable.revoker);
        revocable
    }
}

impl<T> Revocable<T> {
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the value, unless it has been revoked.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let guard = self.lock();
        guard.as_ref().map(f).ok_or(VaultError::Revoked)
    }

    /// Run `f` against the value mutably, unless it has been revoked.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.lock();
        guard.as_mut().map(f).ok_or(VaultError::Revoked)
    }

    /// Clone the value out, unless it has been revoked.
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with(T::clone)
    }
}

impl<T> Revoke for Revocable<T> {
    fn revoker(&self) -> &Revoker {
        &self.revoker
    }
}

impl<T> Clone for Revocable<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            revoker: self.revoker.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Revocable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revocable")
            .field("revoked", &self.revoker.is_revoked())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn revoke_runs_callbacks_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let revoker = Revoker::new();
        for _ in 0..3 {
            let count = Arc::clone(&count);
            revoker.add_revoker(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        revoker.revoke();
        revoker.revoke();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(revoker.is_revoked());
    }

    #[test]
    fn late_callback_runs_immediately() {
        let revoker = Revoker::new();
        revoker.revoke();

        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        revoker.add_revoker(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_does_not_block_others() {
        let revoker = Revoker::new();
        let ran = Arc::new(AtomicUsize::new(0));
        revoker.add_revoker(|| panic!("bad cleanup"));
        let flag = Arc::clone(&ran);
        revoker.add_revoker(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        revoker.revoke();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn child_follows_parent() {
        let parent = Revoker::new();
        let child = parent.child();
        assert!(!child.is_revoked());

        parent.revoke();
        assert!(child.is_revoked());
    }

    #[test]
    fn revoking_child_leaves_parent_alone() {
        let parent = Revoker::new();
        let child = parent.child();
        child.revoke();
        assert!(!parent.is_revoked());
    }

    #[test]
    fn revocable_fails_after_revoke() {
        let value = Revocable::new(String::from("secret"));
        let alias = value.clone();
        assert_eq!(value.get().unwrap(), "secret");

        value.revoke();
        assert!(matches!(alias.get(), Err(VaultError::Revoked)));
        assert!(matches!(alias.with(|s| s.len()), Err(VaultError::Revoked)));
    }

    #[test]
    fn attached_revocable_cascades_from_parent() {
        let parent = Revoker::new();
        let value = Revocable::attach(vec![1u8, 2, 3], &parent);
        assert_eq!(value.with(|v| v.len()).unwrap(), 3);

        parent.revoke();
        assert!(value.is_revoked());
        assert!(value.get().is_err());
    }

    #[test]
    fn dropped_children_do_not_accumulate() {
        let parent = Revoker::new();
        for _ in 0..1000 {
            let value = Revocable::attach(String::from("secret"), &parent);
            drop(value);
        }
        let kept = parent.child();
        assert_eq!(parent.pending(), 1);

        parent.revoke();
        assert!(kept.is_revoked());
        assert_eq!(parent.pending(), 0);
    }

    #[test]
    fn one_revoker_can_follow_two_parents() {
        let entry = Revoker::new();
        let session = Revoker::new();
        let value = Revocable::attach(7u32, &entry);
        session.adopt(value.revoker());

        session.revoke();
        assert!(value.is_revoked());
        assert!(!entry.is_revoked());
    }
}
