use std::collections::{BTreeMap, BTreeSet, HashMap};

use slotmap::SparseSecondaryMap;

use crate::error::IdError;
use crate::mesh::SetHandle;
use crate::set::Category;

/// Per-category ID bookkeeping: the sorted ID index, its reverse, and the
/// sorted set of free IDs below the maximum.
///
/// `free` covers every positive integer below the category max that is not
/// assigned, whether it was released or simply skipped over by an explicit
/// assignment. That keeps the smallest-unused query a single min-lookup.
#[derive(Debug, Default)]
struct CategoryIds {
    by_id: BTreeMap<i64, SetHandle>,
    by_handle: SparseSecondaryMap<SetHandle, i64>,
    free: BTreeSet<i64>,
}

impl CategoryIds {
    fn next_after_max(&self) -> i64 {
        self.by_id.last_key_value().map_or(1, |(max, _)| max + 1)
    }
}

/// Tracks ID assignment and group aliasing for one model.
///
/// Within a category no two live entities share an ID. Released and
/// skipped-over IDs land in a free set consumed by
/// [`allocate`](IdRegistry::allocate), which always returns the smallest
/// unused positive integer; the unset-ID path
/// ([`assign`](IdRegistry::assign) with `None`) instead always takes
/// max-used + 1 and never reuses a gap. The two policies are intentionally
/// different and both part of the observable contract.
#[derive(Debug, Default)]
pub struct IdRegistry {
    categories: [CategoryIds; 3],
    aliases: HashMap<SetHandle, SetHandle>,
}

impl IdRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cat(&self, category: Category) -> &CategoryIds {
        &self.categories[category.index()]
    }

    fn cat_mut(&mut self, category: Category) -> &mut CategoryIds {
        &mut self.categories[category.index()]
    }

    /// Number of live entities in a category.
    #[must_use]
    pub fn count(&self, category: Category) -> usize {
        self.cat(category).by_id.len()
    }

    /// Iterates a category's (ID, handle) pairs in ascending ID order.
    pub fn iter(&self, category: Category) -> impl Iterator<Item = (i64, SetHandle)> + '_ {
        self.cat(category).by_id.iter().map(|(id, h)| (*id, *h))
    }

    /// Returns the handle registered under an ID, if any.
    #[must_use]
    pub fn lookup(&self, category: Category, id: i64) -> Option<SetHandle> {
        self.cat(category).by_id.get(&id).copied()
    }

    /// Returns the ID registered for a handle, if any.
    #[must_use]
    pub fn id_of(&self, category: Category, handle: SetHandle) -> Option<i64> {
        self.cat(category).by_handle.get(handle).copied()
    }

    /// Reserves and returns the smallest positive ID not currently in use:
    /// the smallest free gap when one exists, max-used + 1 otherwise.
    pub fn allocate(&mut self, category: Category, handle: SetHandle) -> i64 {
        let cat = self.cat_mut(category);
        let next = cat.next_after_max();
        let id = match cat.free.first() {
            Some(&freed) if freed < next => freed,
            _ => next,
        };
        cat.free.remove(&id);
        cat.by_id.insert(id, handle);
        cat.by_handle.insert(handle, id);
        id
    }

    /// Registers `handle` under `id`, or under max-used + 1 when `id` is
    /// `None`. Re-assigning a handle its own current ID is a no-op success;
    /// any previous ID of the handle is released for reuse.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Duplicate`] if the ID is held by a different live
    /// entity of the category, or [`IdError::NonPositive`] for IDs < 1.
    pub fn assign(
        &mut self,
        category: Category,
        handle: SetHandle,
        id: Option<i64>,
    ) -> Result<i64, IdError> {
        let cat = self.cat_mut(category);
        let id = match id {
            Some(id) if id < 1 => return Err(IdError::NonPositive { id }),
            Some(id) => match cat.by_id.get(&id) {
                Some(current) if *current == handle => return Ok(id),
                Some(_) => return Err(IdError::Duplicate { category, id }),
                None => id,
            },
            None => cat.next_after_max(),
        };
        if let Some(old) = cat.by_handle.remove(handle) {
            cat.by_id.remove(&old);
            cat.free.insert(old);
        }
        // Claiming an ID past the max leaves a run of never-used IDs behind;
        // record them so `allocate` keeps seeing every gap.
        let next = cat.next_after_max();
        if id > next {
            cat.free.extend(next..id);
        }
        cat.free.remove(&id);
        cat.by_id.insert(id, handle);
        cat.by_handle.insert(handle, id);
        Ok(id)
    }

    /// Drops a handle's registration and frees its ID for reuse.
    pub fn release(&mut self, category: Category, handle: SetHandle) {
        let cat = self.cat_mut(category);
        if let Some(id) = cat.by_handle.remove(handle) {
            cat.by_id.remove(&id);
            cat.free.insert(id);
        }
    }

    /// Resolves a handle through the merge alias table to its canonical
    /// storage. Unmerged handles resolve to themselves.
    #[must_use]
    pub fn canonical(&self, handle: SetHandle) -> SetHandle {
        let mut current = handle;
        while let Some(next) = self.aliases.get(&current) {
            current = *next;
        }
        current
    }

    /// Records that `merged` is now an alias of `canonical`.
    pub fn record_alias(&mut self, merged: SetHandle, canonical: SetHandle) {
        if merged != canonical {
            self.aliases.insert(merged, canonical);
        }
    }
}
