use super::{ContextId, MAX_CONTEXTS};

/// Resource slot for one GPU context.
///
/// An empty slot means the resource has not been created on that context yet.
/// The stamp records when the resource was last updated (host frame time, seconds).
#[derive(Debug)]
pub struct Slot<T> {
    resource: Option<T>,
    stamp: f64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self { resource: None, stamp: 0.0 }
    }
}

impl<T> Slot<T> {
    #[inline]
    pub fn is_created(&self) -> bool {
        self.resource.is_some()
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.resource.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.resource.as_mut()
    }

    /// Stores `resource`, replacing any previous one.
    pub fn insert(&mut self, resource: T) -> &mut T {
        self.resource.insert(resource)
    }

    /// Returns the resource, creating it with `create` if the slot is empty.
    pub fn get_or_insert_with(&mut self, create: impl FnOnce() -> T) -> &mut T {
        self.resource.get_or_insert_with(create)
    }

    /// Empties the slot and resets the stamp.
    pub fn take(&mut self) -> Option<T> {
        self.stamp = 0.0;
        self.resource.take()
    }

    #[inline]
    pub fn stamp(&self) -> f64 {
        self.stamp
    }

    #[inline]
    pub fn set_stamp(&mut self, stamp: f64) {
        self.stamp = stamp;
    }
}

/// Fixed table of [`Slot`]s, one per possible [`ContextId`].
///
/// No synchronization: a context is only ever driven by its owning thread.
#[derive(Debug)]
pub struct PerContext<T> {
    slots: Box<[Slot<T>]>,
}

impl<T> Default for PerContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PerContext<T> {
    pub fn new() -> Self {
        let slots: Vec<Slot<T>> = (0..MAX_CONTEXTS).map(|_| Slot::default()).collect();
        Self { slots: slots.into_boxed_slice() }
    }

    #[inline]
    pub fn slot(&self, id: ContextId) -> &Slot<T> {
        // ContextId is bounded by construction.
        &self.slots[id.index()]
    }

    #[inline]
    pub fn slot_mut(&mut self, id: ContextId) -> &mut Slot<T> {
        &mut self.slots[id.index()]
    }

    #[inline]
    pub fn get(&self, id: ContextId) -> Option<&T> {
        self.slot(id).get()
    }

    #[inline]
    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut T> {
        self.slot_mut(id).get_mut()
    }

    /// Drops the resource held for `id`, if any.
    pub fn release(&mut self, id: ContextId) -> Option<T> {
        self.slot_mut(id).take()
    }

    /// Iterates contexts that currently hold a resource.
    pub fn iter_created(&self) -> impl Iterator<Item = (ContextId, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let id = ContextId::new(i)?;
            slot.get().map(|r| (id, r))
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(i: usize) -> ContextId {
        ContextId::new(i).unwrap()
    }

    #[test]
    fn table_covers_every_context() {
        let table: PerContext<u32> = PerContext::new();
        assert_eq!(table.len(), MAX_CONTEXTS);
        assert!(!table.slot(ctx(MAX_CONTEXTS - 1)).is_created());
    }

    #[test]
    fn slots_are_independent() {
        let mut table = PerContext::new();
        table.slot_mut(ctx(1)).insert("one");
        table.slot_mut(ctx(1)).set_stamp(2.5);

        assert_eq!(table.get(ctx(1)), Some(&"one"));
        assert_eq!(table.slot(ctx(1)).stamp(), 2.5);
        assert!(table.get(ctx(0)).is_none());
        assert_eq!(table.slot(ctx(0)).stamp(), 0.0);
    }

    #[test]
    fn get_or_insert_with_creates_once() {
        let mut table = PerContext::new();
        let mut calls = 0;
        for _ in 0..3 {
            table.slot_mut(ctx(0)).get_or_insert_with(|| {
                calls += 1;
                7
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(table.get(ctx(0)), Some(&7));
    }

    #[test]
    fn release_empties_slot_and_resets_stamp() {
        let mut table = PerContext::new();
        table.slot_mut(ctx(4)).insert(1u8);
        table.slot_mut(ctx(4)).set_stamp(9.0);

        assert_eq!(table.release(ctx(4)), Some(1));
        assert!(!table.slot(ctx(4)).is_created());
        assert_eq!(table.slot(ctx(4)).stamp(), 0.0);
    }

    #[test]
    fn iter_created_lists_only_filled_slots() {
        let mut table = PerContext::new();
        table.slot_mut(ctx(2)).insert('a');
        table.slot_mut(ctx(5)).insert('b');

        let ids: Vec<usize> = table.iter_created().map(|(id, _)| id.index()).collect();
        assert_eq!(ids, vec![2, 5]);
    }
}
