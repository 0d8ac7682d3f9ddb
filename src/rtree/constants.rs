//! Constants for the R-tree implementation.

use std::time::Duration;

/// Default maximum number of entries per node
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Default minimum number of entries per non-root node (half the maximum)
pub const DEFAULT_MIN_ENTRIES: usize = 5;

/// Default bounded wait for acquiring the index reader/writer lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Entry id marking a node slot that is not in use
pub(crate) const ENTRY_UNUSED: i64 = -1;

/// Split scratch state: entry not yet assigned to either group
pub(crate) const ENTRY_STATUS_UNASSIGNED: u8 = 0;

/// Split scratch state: entry assigned to one of the two groups
pub(crate) const ENTRY_STATUS_ASSIGNED: u8 = 1;
