//! Generational handles.
//!
//! Every resource that crosses the numeric call boundary is referred to by a
//! [`Handle`]: a slot index plus the generation the slot had when the handle
//! was issued. Freeing a slot bumps its generation, so a handle copied before
//! the free can never resolve again, even after the slot is reused.
//!
//! # Example
//!
//! ```
//! use gpubridge_core::{HandleError, HandleTable};
//!
//! let table = HandleTable::new();
//! let old = table.allocate("first");
//! table.free(old).unwrap();
//!
//! let new = table.allocate("second");
//! assert_eq!(new.index(), old.index()); // same slot
//! assert_ne!(new.generation(), old.generation());
//! assert_eq!(table.resolve(old), Err(HandleError::InvalidHandle(old)));
//! ```

use std::fmt;

use parking_lot::RwLock;

use crate::profile_scope;

/// Generation given to a slot the first time it is used.
///
/// Generation `0` is never issued, so the raw value `0` is the null handle.
const FIRST_GENERATION: u32 = 1;

/// Opaque `(slot index, generation)` reference into a [`HandleTable`].
///
/// Two handles are equal only if both the index and the generation match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// The null handle. Never resolves.
    pub const NULL: Handle = Handle {
        index: 0,
        generation: 0,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index of this handle.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the generation the slot had when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Returns `true` for the null handle.
    pub fn is_null(&self) -> bool {
        self.generation == 0
    }

    /// Packs the handle into a single integer: `(generation << 32) | index`.
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Unpacks a handle produced by [`to_raw`](Self::to_raw).
    ///
    /// Any integer decodes; unknown values simply fail to resolve.
    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}@{})", self.index, self.generation)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.generation)
    }
}

/// Errors returned by [`HandleTable`] lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// The handle is stale, was never issued, or is null.
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),
}

struct Slot<T> {
    generation: u32,
    payload: Option<T>,
}

struct Slots<T> {
    slots: Vec<Slot<T>>,
    /// Recyclable indices (LIFO stack).
    free_list: Vec<u32>,
    live: usize,
}

/// Slot table mapping [`Handle`]s to payloads.
///
/// The table is shared by all workers. `allocate` and `free` take the write
/// lock, so two concurrent allocations can never observe the same free slot;
/// `resolve` takes the read lock and clones the payload out (payloads are
/// expected to be cheap to clone, typically `Arc`s).
pub struct HandleTable<T> {
    inner: RwLock<Slots<T>>,
}

impl<T: Clone> HandleTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty table with room for `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Slots {
                slots: Vec::with_capacity(capacity),
                free_list: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Stores `payload` in a free slot and returns its handle.
    pub fn allocate(&self, payload: T) -> Handle {
        profile_scope!("handle_table_allocate");
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.live += 1;

        if let Some(index) = inner.free_list.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.payload = Some(payload);
            Handle::new(index, slot.generation)
        } else {
            let index = inner.slots.len() as u32;
            inner.slots.push(Slot {
                generation: FIRST_GENERATION,
                payload: Some(payload),
            });
            Handle::new(index, FIRST_GENERATION)
        }
    }

    /// Returns a clone of the payload behind `handle`.
    pub fn resolve(&self, handle: Handle) -> Result<T, HandleError> {
        let inner = self.inner.read();
        inner
            .slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.payload.clone())
            .ok_or(HandleError::InvalidHandle(handle))
    }

    /// Returns `true` if `handle` currently resolves.
    pub fn contains(&self, handle: Handle) -> bool {
        let inner = self.inner.read();
        inner
            .slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.payload.is_some())
    }

    /// Empties the slot behind `handle` and returns its payload.
    ///
    /// The slot's generation is bumped before the index is recycled.
    pub fn free(&self, handle: Handle) -> Result<T, HandleError> {
        profile_scope!("handle_table_free");
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let slot = inner
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(HandleError::InvalidHandle(handle))?;
        let payload = slot
            .payload
            .take()
            .ok_or(HandleError::InvalidHandle(handle))?;
        slot.generation = next_generation(slot.generation);

        inner.free_list.push(handle.index);
        inner.live -= 1;
        Ok(payload)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().live
    }

    /// Returns `true` if no entry is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of every live entry, in slot order.
    pub fn live_handles(&self) -> Vec<Handle> {
        let inner = self.inner.read();
        inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.payload.is_some())
            .map(|(index, slot)| Handle::new(index as u32, slot.generation))
            .collect()
    }

    /// Frees every live entry and returns the payloads.
    ///
    /// Outstanding handles are invalidated exactly as if each had been freed
    /// individually.
    pub fn clear(&self) -> Vec<T> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut drained = Vec::with_capacity(inner.live);

        for (index, slot) in inner.slots.iter_mut().enumerate() {
            if let Some(payload) = slot.payload.take() {
                slot.generation = next_generation(slot.generation);
                inner.free_list.push(index as u32);
                drained.push(payload);
            }
        }
        inner.live = 0;
        drained
    }
}

impl<T: Clone> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("HandleTable")
            .field("slots", &inner.slots.len())
            .field("live", &inner.live)
            .finish()
    }
}

fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => FIRST_GENERATION,
        next => next,
    }
}

static_assertions::assert_impl_all!(HandleTable<std::sync::Arc<u32>>: Send, Sync);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn allocate_sequential() {
        let table = HandleTable::new();
        let h0 = table.allocate(10);
        let h1 = table.allocate(11);
        let h2 = table.allocate(12);

        assert_eq!(h0.index(), 0);
        assert_eq!(h1.index(), 1);
        assert_eq!(h2.index(), 2);
        assert_eq!(h0.generation(), FIRST_GENERATION);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn resolve_returns_payload() {
        let table = HandleTable::new();
        let h = table.allocate("payload");
        assert_eq!(table.resolve(h), Ok("payload"));
        assert!(table.contains(h));
    }

    #[test]
    fn resolve_unknown_handle_fails() {
        let table: HandleTable<u32> = HandleTable::new();
        let bogus = Handle::new(7, 1);
        assert_eq!(table.resolve(bogus), Err(HandleError::InvalidHandle(bogus)));
        assert_eq!(
            table.resolve(Handle::NULL),
            Err(HandleError::InvalidHandle(Handle::NULL))
        );
    }

    #[test]
    fn null_handle_never_resolves() {
        let table = HandleTable::new();
        let first = table.allocate(1u8);
        assert_eq!(first.index(), Handle::NULL.index());
        assert!(!table.contains(Handle::NULL));
        assert!(Handle::NULL.is_null());
        assert!(!first.is_null());
    }

    #[test]
    fn free_then_reuse_bumps_generation() {
        let table = HandleTable::new();
        let old = table.allocate(1);
        assert_eq!(table.free(old), Ok(1));

        let new = table.allocate(2);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert_eq!(table.resolve(old), Err(HandleError::InvalidHandle(old)));
        assert_eq!(table.resolve(new), Ok(2));
    }

    #[test]
    fn double_free_fails() {
        let table = HandleTable::new();
        let h = table.allocate(1);
        assert!(table.free(h).is_ok());
        assert_eq!(table.free(h), Err(HandleError::InvalidHandle(h)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn stale_free_does_not_touch_new_owner() {
        let table = HandleTable::new();
        let old = table.allocate(1);
        table.free(old).unwrap();
        let new = table.allocate(2);

        assert!(table.free(old).is_err());
        assert_eq!(table.resolve(new), Ok(2));
    }

    #[test]
    fn raw_roundtrip() {
        let h = Handle::new(42, 7);
        assert_eq!(h.to_raw(), (7u64 << 32) | 42);
        assert_eq!(Handle::from_raw(h.to_raw()), h);
        assert_eq!(Handle::from_raw(0), Handle::NULL);
    }

    #[test]
    fn generation_wraps_past_zero() {
        assert_eq!(next_generation(u32::MAX), FIRST_GENERATION);
        assert_eq!(next_generation(1), 2);
    }

    #[test]
    fn clear_invalidates_everything() {
        let table = HandleTable::new();
        let handles: Vec<_> = (0..4).map(|i| table.allocate(i)).collect();
        let drained = table.clear();

        assert_eq!(drained.len(), 4);
        assert!(table.is_empty());
        for h in handles {
            assert!(!table.contains(h));
        }
    }

    #[test]
    fn live_handles_skips_freed() {
        let table = HandleTable::new();
        let handles: Vec<_> = (0..5).map(|i| table.allocate(i)).collect();
        table.free(handles[1]).unwrap();
        table.free(handles[3]).unwrap();

        let live = table.live_handles();
        assert_eq!(live, vec![handles[0], handles[2], handles[4]]);
    }

    #[test]
    fn debug_format() {
        let h = Handle::new(3, 2);
        assert_eq!(format!("{:?}", h), "Handle(3@2)");
        assert_eq!(format!("{}", h), "3@2");
    }

    #[test]
    fn concurrent_allocations_are_unique() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let table = HandleTable::new();
        let mut per_thread: Vec<Vec<Handle>> = vec![Vec::new(); THREADS];

        std::thread::scope(|s| {
            for (t, out) in per_thread.iter_mut().enumerate() {
                let table = &table;
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        out.push(table.allocate(t * PER_THREAD + i));
                        // Interleave frees so slots get recycled under contention.
                        if i % 3 == 0 {
                            let h = table.allocate(usize::MAX);
                            table.free(h).unwrap();
                        }
                    }
                });
            }
        });

        let unique: HashSet<Handle> = per_thread.iter().flatten().copied().collect();
        assert_eq!(unique.len(), THREADS * PER_THREAD);
        assert_eq!(table.len(), THREADS * PER_THREAD);
    }
}
