//! RTree core implementation.

use std::collections::HashMap;

use crate::error::{SpatialError, SpatialResult};
use crate::rectangle::{Point, Rectangle};

use super::constants::{
    DEFAULT_MAX_ENTRIES, DEFAULT_MIN_ENTRIES, ENTRY_STATUS_ASSIGNED, ENTRY_STATUS_UNASSIGNED,
    ENTRY_UNUSED,
};
use super::node::{Entry, Node};

/// An in-memory R-tree over integer rectangles, following Guttman's
/// original algorithms with the quadratic split heuristic.
///
/// Nodes reference their children by id through a single id-to-node map
/// owned by the tree, so the descent paths can be recorded as plain
/// integer stacks and node ids stay stable across delete and reinsert.
/// Leaf entries carry item ids assigned by the caller; the tree itself
/// knows nothing about payloads.
pub(crate) struct RTree {
    max_entries: usize,
    min_entries: usize,

    nodes: HashMap<i64, Node>,
    root_id: i64,
    /// Level of the root; leaves are at level 1.
    height: u32,
    next_node_id: i64,
    /// Ids of nodes removed from the map, reused before fresh ids.
    recycled_ids: Vec<i64>,
    /// Number of leaf entries currently indexed.
    size: usize,

    // Scratch state reused across writer operations. `choose_node` and the
    // delete descent record the path here; `adjust_tree` and
    // `condense_tree` consume it on the way back up. Reader operations
    // must never touch these.
    parents: Vec<i64>,
    parents_entry: Vec<usize>,
    entry_status: Vec<u8>,
}

impl RTree {
    /// Creates a tree with the default node capacity.
    pub fn new() -> RTree {
        Self::build(DEFAULT_MAX_ENTRIES, DEFAULT_MIN_ENTRIES)
    }

    /// Creates a tree with the given node capacity.
    ///
    /// Fails if `max_entries < 2`, or if `min_entries` is zero or larger
    /// than half of `max_entries`.
    pub fn with_capacity(max_entries: usize, min_entries: usize) -> SpatialResult<RTree> {
        if max_entries < 2 {
            return Err(SpatialError::InvalidArgument(format!(
                "max_entries must be at least 2, got {}",
                max_entries
            )));
        }
        if min_entries < 1 || min_entries > max_entries / 2 {
            return Err(SpatialError::InvalidArgument(format!(
                "min_entries must be between 1 and {}, got {}",
                max_entries / 2,
                min_entries
            )));
        }
        Ok(Self::build(max_entries, min_entries))
    }

    fn build(max_entries: usize, min_entries: usize) -> RTree {
        let mut tree = RTree {
            max_entries,
            min_entries,
            nodes: HashMap::new(),
            root_id: 0,
            height: 1,
            next_node_id: 0,
            recycled_ids: Vec::new(),
            size: 0,
            parents: Vec::new(),
            parents_entry: Vec::new(),
            entry_status: vec![ENTRY_STATUS_UNASSIGNED; max_entries],
        };
        let root_id = tree.allocate_node_id();
        tree.nodes.insert(root_id, Node::new(root_id, 1, max_entries));
        tree.root_id = root_id;
        tree
    }

    /// Number of indexed entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// A copy of the root MBR, or `None` while the tree is empty.
    pub fn bounds(&self) -> Option<Rectangle> {
        self.node(self.root_id).mbr
    }

    /// Removes every entry, resetting the tree to its initial state.
    pub fn clear(&mut self) {
        *self = Self::build(self.max_entries, self.min_entries);
    }

    fn node(&self, node_id: i64) -> &Node {
        self.nodes
            .get(&node_id)
            .unwrap_or_else(|| panic!("node {} is not in the node map", node_id))
    }

    fn node_mut(&mut self, node_id: i64) -> &mut Node {
        self.nodes
            .get_mut(&node_id)
            .unwrap_or_else(|| panic!("node {} is not in the node map", node_id))
    }

    fn allocate_node_id(&mut self) -> i64 {
        if let Some(id) = self.recycled_ids.pop() {
            id
        } else {
            let id = self.next_node_id;
            self.next_node_id += 1;
            id
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Adds an item rectangle to the tree.
    pub fn add(&mut self, rect: Rectangle, item_id: i64) {
        log::trace!("adding item {} with {}", item_id, rect);
        self.add_at_level(rect, item_id, 1);
        self.size += 1;
    }

    /// Inserts an entry at the given level: 1 for item entries, higher for
    /// subtree roots reinserted during tree condensation.
    fn add_at_level(&mut self, rect: Rectangle, id: i64, level: u32) {
        // I1 find the node to hold the new entry, recording the descent path
        let n_id = self.choose_node(&rect, level);

        // I2 install the entry, splitting the node if it is full
        let split = if self.node(n_id).entry_count < self.max_entries {
            self.node_mut(n_id).add_entry(rect, id);
            None
        } else {
            Some(self.split_node(n_id, rect, id))
        };

        // I3 walk back up refreshing MBRs and propagating the split
        let root_split = self.adjust_tree(n_id, split);

        // I4 a split that reached the root grows the tree by one level
        if let Some(sibling_id) = root_split {
            let old_root_id = self.root_id;
            let new_root_id = self.allocate_node_id();
            self.height += 1;
            let mut root = Node::new(new_root_id, self.height, self.max_entries);

            let sibling_mbr = self.node(sibling_id).mbr.expect("split node has entries");
            let old_root_mbr = self.node(old_root_id).mbr.expect("split node has entries");
            root.add_entry(sibling_mbr, sibling_id);
            root.add_entry(old_root_mbr, old_root_id);

            self.nodes.insert(new_root_id, root);
            self.root_id = new_root_id;
            log::debug!("root split, tree height is now {}", self.height);
        }
    }

    /// Descends from the root to the node at `level` whose MBR needs the
    /// least enlargement to take `rect`, breaking ties by smaller area.
    /// Every step of the descent is pushed onto the parent stacks.
    fn choose_node(&mut self, rect: &Rectangle, level: u32) -> i64 {
        self.parents.clear();
        self.parents_entry.clear();

        let mut n_id = self.root_id;
        loop {
            let n = self.nodes.get(&n_id).expect("descent reached unknown node");
            if n.level == level {
                return n_id;
            }

            let mut index = 0;
            let mut least_enlargement = n.entries[0].rect.enlargement(rect);
            for i in 1..n.entry_count {
                let enlargement = n.entries[i].rect.enlargement(rect);
                if enlargement < least_enlargement
                    || (enlargement == least_enlargement
                        && n.entries[i].rect.area() < n.entries[index].rect.area())
                {
                    index = i;
                    least_enlargement = enlargement;
                }
            }

            self.parents.push(n_id);
            self.parents_entry.push(index);
            n_id = n.entries[index].id;
        }
    }

    /// Ascends the recorded descent path. At each parent the entry for the
    /// child is refreshed to the child's MBR, and a pending split sibling
    /// is installed, splitting the parent in turn when it is full.
    ///
    /// Returns the sibling of the root if the split propagated all the way
    /// up.
    fn adjust_tree(&mut self, mut n_id: i64, mut sibling_id: Option<i64>) -> Option<i64> {
        while self.node(n_id).level != self.height {
            let parent_id = self.parents.pop().expect("descent path exhausted");
            let entry = self.parents_entry.pop().expect("descent path exhausted");

            let n_mbr = self.node(n_id).mbr.expect("child node has entries");
            let parent = self.node_mut(parent_id);
            debug_assert_eq!(
                parent.entries[entry].id, n_id,
                "descent path does not match the tree"
            );
            if parent.entries[entry].rect != n_mbr {
                parent.entries[entry].rect = n_mbr;
                parent.recompute_mbr();
            }

            let mut new_sibling = None;
            if let Some(s_id) = sibling_id {
                let s_mbr = self.node(s_id).mbr.expect("split node has entries");
                if self.node(parent_id).entry_count < self.max_entries {
                    self.node_mut(parent_id).add_entry(s_mbr, s_id);
                } else {
                    new_sibling = Some(self.split_node(parent_id, s_mbr, s_id));
                }
            }

            n_id = parent_id;
            sibling_id = new_sibling;
        }
        sibling_id
    }

    // ========================================================================
    // Quadratic split
    // ========================================================================

    /// Splits a full node under the pressure of one more entry, using
    /// Guttman's quadratic PickSeeds/PickNext heuristic. Returns the id of
    /// the new sibling, created at the same level.
    fn split_node(&mut self, n_id: i64, new_rect: Rectangle, new_id: i64) -> i64 {
        let mut n = self
            .nodes
            .remove(&n_id)
            .unwrap_or_else(|| panic!("node {} is not in the node map", n_id));
        self.entry_status.fill(ENTRY_STATUS_UNASSIGNED);

        let sibling_id = self.allocate_node_id();
        let mut sibling = Node::new(sibling_id, n.level, self.max_entries);
        log::debug!(
            "splitting node {} at level {}, sibling is {}",
            n_id,
            n.level,
            sibling_id
        );

        self.pick_seeds(&mut n, new_rect, new_id, &mut sibling);

        // Distribute the remaining entries until both groups are settled,
        // short-circuiting once one group must take everything left to
        // reach the minimum fill.
        while n.entry_count + sibling.entry_count < self.max_entries + 1 {
            if self.max_entries + 1 - sibling.entry_count == self.min_entries {
                // the rest stay in the original node
                for i in 0..self.max_entries {
                    if self.entry_status[i] == ENTRY_STATUS_UNASSIGNED {
                        self.entry_status[i] = ENTRY_STATUS_ASSIGNED;
                        let rect = n.entries[i].rect;
                        n.expand_mbr(&rect);
                        n.entry_count += 1;
                    }
                }
                break;
            }
            if self.max_entries + 1 - n.entry_count == self.min_entries {
                // the rest move to the sibling
                for i in 0..self.max_entries {
                    if self.entry_status[i] == ENTRY_STATUS_UNASSIGNED {
                        self.entry_status[i] = ENTRY_STATUS_ASSIGNED;
                        sibling.add_entry(n.entries[i].rect, n.entries[i].id);
                        n.entries[i].id = ENTRY_UNUSED;
                    }
                }
                break;
            }
            self.pick_next(&mut n, &mut sibling);
        }

        n.reorganize();

        self.nodes.insert(n_id, n);
        self.nodes.insert(sibling_id, sibling);
        sibling_id
    }

    /// Chooses the two split seeds: along each axis, find the entry with
    /// the highest low side and the entry with the lowest high side, and
    /// keep the pair with the greatest separation normalized by the MBR
    /// extent of that axis. The incoming rectangle takes part in the scan
    /// and may itself become a seed.
    fn pick_seeds(&mut self, n: &mut Node, new_rect: Rectangle, new_id: i64, sibling: &mut Node) {
        // `None` stands for the incoming rectangle throughout.
        let mut highest_low_index: Option<usize> = None;
        let mut lowest_high_index: Option<usize> = None;
        let mut max_normalized_separation = -1.0_f64;

        // For seed picking the node MBR is taken to cover the incoming
        // rectangle as well.
        n.expand_mbr(&new_rect);
        let mbr = n.mbr.expect("full node has an mbr");
        let mbr_len_x = (mbr.max_x as i64 - mbr.min_x as i64) as f64;
        let mbr_len_y = (mbr.max_y as i64 - mbr.min_y as i64) as f64;

        // X axis
        let mut temp_highest_low = new_rect.min_x;
        let mut temp_highest_low_index: Option<usize> = None;
        let mut temp_lowest_high = new_rect.max_x;
        let mut temp_lowest_high_index: Option<usize> = None;
        for i in 0..n.entry_count {
            let low = n.entries[i].rect.min_x;
            if low >= temp_highest_low {
                temp_highest_low = low;
                temp_highest_low_index = Some(i);
            } else {
                // the same entry must not be both the highest low and the
                // lowest high
                let high = n.entries[i].rect.max_x;
                if high <= temp_lowest_high {
                    temp_lowest_high = high;
                    temp_lowest_high_index = Some(i);
                }
            }

            let separation = (temp_highest_low as i64 - temp_lowest_high as i64) as f64;
            let normalized = if mbr_len_x == 0.0 {
                1.0
            } else {
                separation / mbr_len_x
            };
            if normalized >= max_normalized_separation {
                highest_low_index = temp_highest_low_index;
                lowest_high_index = temp_lowest_high_index;
                max_normalized_separation = normalized;
            }
        }

        // Y axis
        let mut temp_highest_low = new_rect.min_y;
        let mut temp_highest_low_index: Option<usize> = None;
        let mut temp_lowest_high = new_rect.max_y;
        let mut temp_lowest_high_index: Option<usize> = None;
        for i in 0..n.entry_count {
            let low = n.entries[i].rect.min_y;
            if low >= temp_highest_low {
                temp_highest_low = low;
                temp_highest_low_index = Some(i);
            } else {
                let high = n.entries[i].rect.max_y;
                if high <= temp_lowest_high {
                    temp_lowest_high = high;
                    temp_lowest_high_index = Some(i);
                }
            }

            let separation = (temp_highest_low as i64 - temp_lowest_high as i64) as f64;
            let normalized = if mbr_len_y == 0.0 {
                1.0
            } else {
                separation / mbr_len_y
            };
            if normalized >= max_normalized_separation {
                highest_low_index = temp_highest_low_index;
                lowest_high_index = temp_lowest_high_index;
                max_normalized_separation = normalized;
            }
        }

        // When every entry overlaps the incoming rectangle, both extremes
        // resolve to it. Fall back to the lowest min-y versus the largest
        // max-x so the two seeds always differ.
        if highest_low_index == lowest_high_index {
            highest_low_index = None;
            let mut temp_min_y = new_rect.min_y;
            lowest_high_index = Some(0);
            let mut temp_max_x = n.entries[0].rect.max_x;
            for i in 1..n.entry_count {
                if n.entries[i].rect.min_y < temp_min_y {
                    temp_min_y = n.entries[i].rect.min_y;
                    highest_low_index = Some(i);
                } else if n.entries[i].rect.max_x > temp_max_x {
                    temp_max_x = n.entries[i].rect.max_x;
                    lowest_high_index = Some(i);
                }
            }
        }

        // The highest-low seed starts the sibling; when it is an existing
        // entry, the incoming rectangle takes over its slot.
        match highest_low_index {
            None => sibling.add_entry(new_rect, new_id),
            Some(i) => {
                sibling.add_entry(n.entries[i].rect, n.entries[i].id);
                n.entries[i] = Entry {
                    rect: new_rect,
                    id: new_id,
                };
            }
        }

        // The lowest-high seed restarts the original node.
        let seed = match lowest_high_index {
            Some(i) => i,
            None => highest_low_index.expect("seeds cannot both be the incoming rectangle"),
        };
        self.entry_status[seed] = ENTRY_STATUS_ASSIGNED;
        n.entry_count = 1;
        n.mbr = Some(n.entries[seed].rect);
    }

    /// Assigns one more entry during a split: the unassigned entry whose
    /// enlargement cost differs most between the two groups goes to the
    /// group it enlarges less, with ties broken by smaller area, fewer
    /// entries, then the original node.
    fn pick_next(&mut self, n: &mut Node, sibling: &mut Node) {
        let n_mbr = n.mbr.expect("seeded node has an mbr");
        let sibling_mbr = sibling.mbr.expect("seeded node has an mbr");

        let mut next: Option<usize> = None;
        let mut next_goes_to_sibling = false;
        let mut max_difference = 0u64;

        for i in 0..self.max_entries {
            if self.entry_status[i] != ENTRY_STATUS_UNASSIGNED {
                continue;
            }
            debug_assert!(
                n.entries[i].id != ENTRY_UNUSED,
                "unassigned slot {} of node {} is not in use",
                i,
                n.node_id
            );

            let rect = n.entries[i].rect;
            let n_increase = n_mbr.enlargement(&rect);
            let sibling_increase = sibling_mbr.enlargement(&rect);
            let difference = n_increase.abs_diff(sibling_increase);

            if next.is_none() || difference > max_difference {
                next = Some(i);
                max_difference = difference;
                next_goes_to_sibling = if n_increase < sibling_increase {
                    false
                } else if sibling_increase < n_increase {
                    true
                } else if n_mbr.area() < sibling_mbr.area() {
                    false
                } else if sibling_mbr.area() < n_mbr.area() {
                    true
                } else if sibling.entry_count < n.entry_count {
                    true
                } else {
                    // fewer entries wins; a full tie stays in the original
                    false
                };
            }
        }

        let next = next.expect("pick_next called with no unassigned entries");
        self.entry_status[next] = ENTRY_STATUS_ASSIGNED;
        if next_goes_to_sibling {
            sibling.add_entry(n.entries[next].rect, n.entries[next].id);
            n.entries[next].id = ENTRY_UNUSED;
        } else {
            let rect = n.entries[next].rect;
            n.expand_mbr(&rect);
            n.entry_count += 1;
        }
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Removes the entry matching both the rectangle and the item id.
    /// Returns whether it was found.
    pub fn delete(&mut self, rect: &Rectangle, item_id: i64) -> bool {
        // Locate the leaf without recursion. Only children whose entry
        // contains the rectangle can hold it, which prunes harder than the
        // intersection test the queries use. The entry stack doubles as a
        // scan cursor so backtracking resumes where a node left off.
        self.parents.clear();
        self.parents.push(self.root_id);
        self.parents_entry.clear();
        self.parents_entry.push(0);

        let mut found: Option<(i64, usize)> = None;
        while let Some(&n_id) = self.parents.last() {
            let n = self.nodes.get(&n_id).expect("descent reached unknown node");
            let start = *self.parents_entry.last().expect("cursor stack in sync");

            if n.is_leaf() {
                if let Some(index) = n.find_entry(rect, item_id) {
                    found = Some((n_id, index));
                    self.parents.pop();
                    self.parents_entry.pop();
                    break;
                }
            } else if let Some(i) =
                (start..n.entry_count).find(|&i| n.entries[i].rect.contains(rect))
            {
                *self.parents_entry.last_mut().expect("cursor stack in sync") = i;
                self.parents.push(n.entries[i].id);
                self.parents_entry.push(0);
                continue;
            }

            // nothing (more) to scan here, back out to the parent
            self.parents.pop();
            self.parents_entry.pop();
            if let Some(cursor) = self.parents_entry.last_mut() {
                *cursor += 1;
            }
        }

        let Some((leaf_id, index)) = found else {
            return false;
        };

        let min_entries = self.min_entries;
        self.node_mut(leaf_id).delete_entry(index, min_entries);
        self.condense_tree(leaf_id);
        self.size -= 1;

        // shrink the tree while the root holds a single child
        while self.node(self.root_id).entry_count == 1 && self.height > 1 {
            let old_root_id = self.root_id;
            let new_root_id = self.node(old_root_id).entries[0].id;
            self.nodes.remove(&old_root_id);
            self.recycled_ids.push(old_root_id);
            self.root_id = new_root_id;
            self.height -= 1;
            log::debug!("root collapsed, tree height is now {}", self.height);
        }

        // an empty tree keeps its root leaf, with no bounds
        if self.size == 0 {
            self.node_mut(self.root_id).mbr = None;
        }

        true
    }

    /// Ascends from a leaf that lost an entry. Under-full nodes are cut
    /// out of their parents and collected; surviving nodes get their entry
    /// in the parent refreshed. The entries of every eliminated node are
    /// then reinserted at their original level, and the node ids recycled.
    fn condense_tree(&mut self, leaf_id: i64) {
        let mut n_id = leaf_id;
        let mut eliminated: Vec<i64> = Vec::new();

        while self.node(n_id).level != self.height {
            let parent_id = self.parents.pop().expect("descent path exhausted");
            let entry = self.parents_entry.pop().expect("descent path exhausted");
            debug_assert_eq!(
                self.node(parent_id).entries[entry].id,
                n_id,
                "descent path does not match the tree"
            );

            let (entry_count, n_mbr) = {
                let n = self.node(n_id);
                (n.entry_count, n.mbr)
            };

            if entry_count < self.min_entries {
                let min_entries = self.min_entries;
                self.node_mut(parent_id).delete_entry(entry, min_entries);
                eliminated.push(n_id);
            } else {
                let n_mbr = n_mbr.expect("surviving node has entries");
                let parent = self.node_mut(parent_id);
                if parent.entries[entry].rect != n_mbr {
                    let old_rect = parent.entries[entry].rect;
                    parent.entries[entry].rect = n_mbr;
                    parent.recalculate_mbr(&old_rect);
                }
            }

            n_id = parent_id;
        }

        while let Some(e_id) = eliminated.pop() {
            let e = self
                .nodes
                .remove(&e_id)
                .unwrap_or_else(|| panic!("node {} is not in the node map", e_id));
            log::debug!(
                "reinserting {} entries of eliminated node {} at level {}",
                e.entry_count,
                e_id,
                e.level
            );
            for i in 0..e.entry_count {
                self.add_at_level(e.entries[i].rect, e.entries[i].id, e.level);
            }
            self.recycled_ids.push(e_id);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Item ids of all entries whose rectangle intersects the query.
    pub fn intersects(&self, rect: &Rectangle) -> Vec<i64> {
        let mut results = Vec::new();
        self.intersects_recursive(self.root_id, rect, &mut results);
        results
    }

    fn intersects_recursive(&self, node_id: i64, rect: &Rectangle, results: &mut Vec<i64>) {
        let n = self.node(node_id);
        for i in 0..n.entry_count {
            if n.entries[i].rect.intersects(rect) {
                if n.is_leaf() {
                    results.push(n.entries[i].id);
                } else {
                    self.intersects_recursive(n.entries[i].id, rect, results);
                }
            }
        }
    }

    /// Item ids of all entries whose rectangle is fully contained by the
    /// query.
    ///
    /// Iterative with its own stacks: the tree's scratch stacks belong to
    /// the writer operations. The descent still uses the intersection
    /// test, because a child that merely intersects the query can hold
    /// leaves fully contained by it.
    pub fn contains(&self, rect: &Rectangle) -> Vec<i64> {
        let mut results = Vec::new();
        let mut path: Vec<i64> = vec![self.root_id];
        let mut cursors: Vec<usize> = vec![0];

        while let Some(&n_id) = path.last() {
            let n = self.node(n_id);
            let start = *cursors.last().expect("cursor stack in sync");

            if n.is_leaf() {
                for i in 0..n.entry_count {
                    if rect.contains(&n.entries[i].rect) {
                        results.push(n.entries[i].id);
                    }
                }
            } else if let Some(i) =
                (start..n.entry_count).find(|&i| n.entries[i].rect.intersects(rect))
            {
                *cursors.last_mut().expect("cursor stack in sync") = i;
                path.push(n.entries[i].id);
                cursors.push(0);
                continue;
            }

            path.pop();
            cursors.pop();
            if let Some(cursor) = cursors.last_mut() {
                *cursor += 1;
            }
        }

        results
    }

    /// Item ids of the entries closest to `point`, considering only
    /// entries within `furthest_distance`. All entries tied at the
    /// minimum distance are returned; the result is empty when nothing is
    /// in range.
    pub fn nearest(&self, point: &Point, furthest_distance: f64) -> Vec<i64> {
        let mut results = Vec::new();
        if furthest_distance < 0.0 {
            return results;
        }
        let mut nearest_distance_sq = furthest_distance * furthest_distance;
        self.nearest_recursive(self.root_id, point, &mut nearest_distance_sq, &mut results);
        results
    }

    fn nearest_recursive(
        &self,
        node_id: i64,
        point: &Point,
        nearest_distance_sq: &mut f64,
        results: &mut Vec<i64>,
    ) {
        let n = self.node(node_id);
        for i in 0..n.entry_count {
            let distance_sq = n.entries[i].rect.distance_sq(point);
            if n.is_leaf() {
                // a strictly nearer entry obsoletes everything found so far
                if distance_sq < *nearest_distance_sq {
                    *nearest_distance_sq = distance_sq;
                    results.clear();
                }
                if distance_sq <= *nearest_distance_sq {
                    results.push(n.entries[i].id);
                }
            } else if distance_sq <= *nearest_distance_sq {
                self.nearest_recursive(n.entries[i].id, point, nearest_distance_sq, results);
            }
        }
    }
}
