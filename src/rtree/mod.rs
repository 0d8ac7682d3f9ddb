//! In-memory R-tree implementation.
//!
//! This module provides the tree core used by the public
//! [`SpatialIndex`](crate::SpatialIndex) façade:
//! - Guttman's insertion with quadratic PickSeeds/PickNext node splitting
//! - deletion with tree condensation and orphan reinsertion
//! - intersection, containment and radius-limited nearest queries
//!
//! The tree works on raw `i64` item ids; payload mapping and locking live
//! in the façade.

pub mod constants;
mod node;
mod rtree_impl;

pub(crate) use rtree_impl::RTree;
