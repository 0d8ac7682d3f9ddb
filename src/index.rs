//! Thread-safe spatial index over user payloads.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{SpatialError, SpatialResult};
use crate::rectangle::{Point, Rectangle};
use crate::rtree::constants::DEFAULT_LOCK_TIMEOUT;
use crate::rtree::RTree;

/// A thread-safe R-tree index mapping payload items to bounding
/// rectangles.
///
/// Each indexed item is assigned an internal integer id; the index keeps
/// the item-to-id mapping bijective, so an item can be indexed only once
/// and can be deleted by value. All operations are guarded by a
/// readers-writer lock with a bounded wait: `add` and `delete` take the
/// write lock, queries take the read lock. An operation that cannot
/// acquire the lock within the timeout fails with
/// [`SpatialError::LockTimeout`] and leaves the index unchanged.
///
/// # Examples
///
/// ```rust
/// use rtree2d::{Rectangle, SpatialIndex};
///
/// let index = SpatialIndex::new();
/// index.add(&Rectangle::new(0, 0, 10, 10), "a")?;
/// index.add(&Rectangle::new(20, 20, 30, 30), "b")?;
///
/// let mut hits = index.intersects(&Rectangle::new(5, 5, 25, 25))?;
/// hits.sort_unstable();
/// assert_eq!(hits, vec!["a", "b"]);
/// # Ok::<(), rtree2d::SpatialError>(())
/// ```
pub struct SpatialIndex<T> {
    inner: RwLock<IndexInner<T>>,
    lock_timeout: Duration,
}

struct IndexInner<T> {
    tree: RTree,
    ids_to_items: HashMap<i64, T>,
    items_to_ids: HashMap<T, i64>,
    next_id: i64,
}

impl<T: Clone + Eq + Hash> SpatialIndex<T> {
    /// Creates an index with the default node capacity (10 entries per
    /// node, minimum fill 5).
    pub fn new() -> Self {
        Self::from_tree(RTree::new())
    }

    /// Creates an index with the given node capacity.
    ///
    /// Fails with [`SpatialError::InvalidArgument`] if `max_entries < 2`,
    /// or if `min_entries` is zero or larger than `max_entries / 2`.
    pub fn with_capacity(max_entries: usize, min_entries: usize) -> SpatialResult<Self> {
        Ok(Self::from_tree(RTree::with_capacity(
            max_entries,
            min_entries,
        )?))
    }

    /// Replaces the bounded wait used for lock acquisition (default 10
    /// seconds).
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn from_tree(tree: RTree) -> Self {
        SpatialIndex {
            inner: RwLock::new(IndexInner {
                tree,
                ids_to_items: HashMap::new(),
                items_to_ids: HashMap::new(),
                next_id: i64::MIN,
            }),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    fn read_lock(&self) -> SpatialResult<RwLockReadGuard<'_, IndexInner<T>>> {
        self.inner
            .try_read_for(self.lock_timeout)
            .ok_or(SpatialError::LockTimeout(self.lock_timeout))
    }

    fn write_lock(&self) -> SpatialResult<RwLockWriteGuard<'_, IndexInner<T>>> {
        self.inner
            .try_write_for(self.lock_timeout)
            .ok_or(SpatialError::LockTimeout(self.lock_timeout))
    }

    /// Adds an item with its bounding rectangle to the index.
    ///
    /// Fails with [`SpatialError::DuplicateItem`] if the item is already
    /// indexed; the item-to-id mapping stays bijective.
    pub fn add(&self, rect: &Rectangle, item: T) -> SpatialResult<()> {
        let mut inner = self.write_lock()?;
        if inner.items_to_ids.contains_key(&item) {
            return Err(SpatialError::DuplicateItem);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.tree.add(*rect, id);
        inner.ids_to_items.insert(id, item.clone());
        inner.items_to_ids.insert(item, id);
        Ok(())
    }

    /// Removes an item from the index. Returns `true` if the pair was
    /// present and removed; `false` if the item is indexed under a
    /// different rectangle.
    ///
    /// Fails with [`SpatialError::ItemNotFound`] if the item is not in the
    /// index at all.
    pub fn delete(&self, rect: &Rectangle, item: &T) -> SpatialResult<bool> {
        let mut inner = self.write_lock()?;
        let id = *inner
            .items_to_ids
            .get(item)
            .ok_or(SpatialError::ItemNotFound)?;

        let removed = inner.tree.delete(rect, id);
        if removed {
            inner.ids_to_items.remove(&id);
            inner.items_to_ids.remove(item);
        }
        Ok(removed)
    }

    /// All items whose indexed rectangle intersects the query rectangle.
    /// Touching edges count as intersection.
    ///
    /// Result order follows tree traversal and is not specified.
    pub fn intersects(&self, rect: &Rectangle) -> SpatialResult<Vec<T>> {
        let inner = self.read_lock()?;
        Ok(inner.resolve(inner.tree.intersects(rect)))
    }

    /// All items whose indexed rectangle is fully contained by the query
    /// rectangle. Coincident edges count as containment.
    pub fn contains(&self, rect: &Rectangle) -> SpatialResult<Vec<T>> {
        let inner = self.read_lock()?;
        Ok(inner.resolve(inner.tree.contains(rect)))
    }

    /// The items nearest to `point`, considering only items whose
    /// rectangle lies within `furthest_distance`. All items tied at the
    /// minimum distance are returned; the result is empty when nothing is
    /// in range.
    pub fn nearest(&self, point: &Point, furthest_distance: f64) -> SpatialResult<Vec<T>> {
        let inner = self.read_lock()?;
        Ok(inner.resolve(inner.tree.nearest(point, furthest_distance)))
    }

    /// Number of items currently indexed.
    pub fn count(&self) -> SpatialResult<usize> {
        Ok(self.read_lock()?.tree.size())
    }

    /// Whether the index holds no items.
    pub fn is_empty(&self) -> SpatialResult<bool> {
        Ok(self.read_lock()?.tree.size() == 0)
    }

    /// The minimum bounding rectangle of everything indexed, or `None`
    /// when the index is empty.
    pub fn bounds(&self) -> SpatialResult<Option<Rectangle>> {
        Ok(self.read_lock()?.tree.bounds())
    }

    /// Removes every item from the index.
    pub fn clear(&self) -> SpatialResult<()> {
        let mut inner = self.write_lock()?;
        inner.tree.clear();
        inner.ids_to_items.clear();
        inner.items_to_ids.clear();
        Ok(())
    }
}

impl<T: Clone + Eq + Hash> IndexInner<T> {
    fn resolve(&self, ids: Vec<i64>) -> Vec<T> {
        ids.into_iter()
            .map(|id| {
                self.ids_to_items
                    .get(&id)
                    .unwrap_or_else(|| panic!("id {} has no mapped item", id))
                    .clone()
            })
            .collect()
    }
}

impl<T: Clone + Eq + Hash> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}
