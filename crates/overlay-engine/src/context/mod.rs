//! GPU context identification and per-context resource storage.
//!
//! A host may drive several GPU contexts at once (one per window or device).
//! GPU objects are not shareable across contexts, so every entity keeps one
//! resource slot per context, indexed by [`ContextId`].

mod per_context;

use std::fmt;

pub use per_context::{PerContext, Slot};

/// Maximum number of GPU contexts driven concurrently.
pub const MAX_CONTEXTS: usize = 64;

/// Index of a GPU context, always `< MAX_CONTEXTS`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ContextId(u8);

impl ContextId {
    /// The first context; single-window hosts only ever use this one.
    pub const PRIMARY: ContextId = ContextId(0);

    /// Returns `None` when `index` is outside `0..MAX_CONTEXTS`.
    #[inline]
    pub fn new(index: usize) -> Option<Self> {
        (index < MAX_CONTEXTS).then(|| ContextId(index as u8))
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out context ids, lowest free index first.
///
/// Released ids are reused; whoever held per-context state for a released id
/// must drop it before the id is handed out again.
#[derive(Debug, Clone)]
pub struct ContextPool {
    in_use: [bool; MAX_CONTEXTS],
}

impl Default for ContextPool {
    fn default() -> Self {
        Self {
            in_use: [false; MAX_CONTEXTS],
        }
    }
}

impl ContextPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` once all `MAX_CONTEXTS` ids are taken.
    pub fn acquire(&mut self) -> Option<ContextId> {
        let index = self.in_use.iter().position(|used| !used)?;
        self.in_use[index] = true;
        ContextId::new(index)
    }

    /// Returns whether `id` was in use.
    pub fn release(&mut self, id: ContextId) -> bool {
        std::mem::replace(&mut self.in_use[id.index()], false)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.iter().filter(|used| **used).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_indices_below_max() {
        assert_eq!(ContextId::new(0), Some(ContextId::PRIMARY));
        assert_eq!(ContextId::new(MAX_CONTEXTS - 1).map(ContextId::index), Some(MAX_CONTEXTS - 1));
    }

    #[test]
    fn new_rejects_out_of_range() {
        assert!(ContextId::new(MAX_CONTEXTS).is_none());
        assert!(ContextId::new(usize::MAX).is_none());
    }

    #[test]
    fn display_uses_index() {
        assert_eq!(ContextId::new(3).unwrap().to_string(), "#3");
    }

    #[test]
    fn pool_reuses_lowest_released_id() {
        let mut pool = ContextPool::new();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));

        assert!(pool.release(a));
        assert!(!pool.release(a));
        assert_eq!(pool.acquire(), Some(a));
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn pool_is_bounded() {
        let mut pool = ContextPool::new();
        for _ in 0..MAX_CONTEXTS {
            assert!(pool.acquire().is_some());
        }
        assert!(pool.acquire().is_none());
    }
}
