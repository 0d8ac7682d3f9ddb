//! # rtree2d - In-Memory R-Tree Spatial Index
//!
//! This crate provides an in-memory R-tree spatial index over axis-aligned
//! bounding rectangles in 2D integer space, parameterized by an opaque
//! payload type.
//!
//! ## Features
//!
//! - **Guttman R-Tree**: classic insertion with the quadratic
//!   PickSeeds/PickNext split heuristic and deletion with tree condensation
//! - **Payload Mapping**: index any `Clone + Eq + Hash` payload; delete by
//!   value, query results come back as payloads
//! - **Spatial Queries**: intersection, containment and radius-limited
//!   nearest-neighbor search
//! - **Thread Safe**: readers-writer locking with a bounded wait, so
//!   concurrent readers never block each other
//! - **Integer Coordinates**: exact geometry with no floating-point
//!   surprises; only distances are floating-point
//!
//! ## Quick Start
//!
//! ```rust
//! use rtree2d::{Point, Rectangle, SpatialIndex};
//!
//! # fn main() -> rtree2d::SpatialResult<()> {
//! let index = SpatialIndex::new();
//!
//! // Index a couple of labeled rectangles
//! index.add(&Rectangle::new(0, 0, 10, 10), "home")?;
//! index.add(&Rectangle::new(20, 20, 30, 30), "office")?;
//!
//! // Rectangle queries
//! let hits = index.intersects(&Rectangle::new(5, 5, 25, 25))?;
//! assert_eq!(hits.len(), 2);
//!
//! // Nearest within a radius
//! let near = index.nearest(&Point::new(12, 12), 5.0)?;
//! assert_eq!(near, vec!["home"]);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index;
pub mod rectangle;

mod rtree;

pub use error::{SpatialError, SpatialResult};
pub use index::SpatialIndex;
pub use rectangle::{Point, Rectangle};
pub use rtree::constants::{DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_ENTRIES, DEFAULT_MIN_ENTRIES};
