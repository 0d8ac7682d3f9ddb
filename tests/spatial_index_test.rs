//! End-to-end tests for the spatial index public API.
//!
//! These tests exercise the full stack through `SpatialIndex`: payload
//! mapping, locking, and the tree operations underneath. Node capacity is
//! kept small (max 4, min 2) so splits and condensation happen early.

use std::sync::Arc;
use std::thread;

use rtree2d::{Point, Rectangle, SpatialError, SpatialIndex};

fn small_index() -> SpatialIndex<&'static str> {
    SpatialIndex::with_capacity(4, 2).expect("valid capacity")
}

fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
    items.sort();
    items
}

#[test]
fn test_two_items_queries_and_bounds() {
    let index = small_index();
    index.add(&Rectangle::new(0, 0, 10, 10), "A").unwrap();
    index.add(&Rectangle::new(20, 20, 30, 30), "B").unwrap();

    assert_eq!(index.count().unwrap(), 2);
    assert_eq!(
        sorted(index.intersects(&Rectangle::new(5, 5, 25, 25)).unwrap()),
        vec!["A", "B"]
    );
    assert_eq!(
        sorted(index.contains(&Rectangle::new(0, 0, 30, 30)).unwrap()),
        vec!["A", "B"]
    );
    assert_eq!(index.bounds().unwrap(), Some(Rectangle::new(0, 0, 30, 30)));
}

fn diagonal_index() -> SpatialIndex<&'static str> {
    // five unit squares along the diagonal; forces a split at capacity 4
    let index = small_index();
    index.add(&Rectangle::new(0, 0, 1, 1), "A").unwrap();
    index.add(&Rectangle::new(2, 2, 3, 3), "B").unwrap();
    index.add(&Rectangle::new(4, 4, 5, 5), "C").unwrap();
    index.add(&Rectangle::new(6, 6, 7, 7), "D").unwrap();
    index.add(&Rectangle::new(8, 8, 9, 9), "E").unwrap();
    index
}

#[test]
fn test_queries_after_split() {
    let index = diagonal_index();

    assert_eq!(index.count().unwrap(), 5);
    assert_eq!(
        sorted(index.intersects(&Rectangle::new(3, 3, 7, 7)).unwrap()),
        vec!["B", "C", "D"]
    );
    assert_eq!(
        sorted(index.contains(&Rectangle::new(1, 1, 6, 6)).unwrap()),
        vec!["B", "C"]
    );
}

#[test]
fn test_nearest_is_radius_limited() {
    let index = diagonal_index();

    // E's corner (9,9) is sqrt(2) away from (10,10)
    assert_eq!(index.nearest(&Point::new(10, 10), 3.0).unwrap(), vec!["E"]);
    assert!(index.nearest(&Point::new(10, 10), 1.0).unwrap().is_empty());
}

#[test]
fn test_delete_from_split_tree() {
    let index = diagonal_index();

    assert!(index.delete(&Rectangle::new(2, 2, 3, 3), &"B").unwrap());
    assert!(index.intersects(&Rectangle::new(2, 2, 3, 3)).unwrap().is_empty());
    assert_eq!(index.count().unwrap(), 4);

    // the other items are untouched
    assert_eq!(
        sorted(index.intersects(&Rectangle::new(0, 0, 9, 9)).unwrap()),
        vec!["A", "C", "D", "E"]
    );
}

#[test]
fn test_duplicate_item_error_leaves_index_unchanged() {
    let index = small_index();
    index.add(&Rectangle::new(0, 0, 1, 1), "A").unwrap();

    let err = index.add(&Rectangle::new(4, 4, 5, 5), "A").unwrap_err();
    assert!(matches!(err, SpatialError::DuplicateItem));
    assert_eq!(index.count().unwrap(), 1);
    assert!(index.intersects(&Rectangle::new(4, 4, 5, 5)).unwrap().is_empty());
}

#[test]
fn test_delete_unknown_item_error() {
    let index = small_index();
    index.add(&Rectangle::new(0, 0, 1, 1), "A").unwrap();

    let err = index.delete(&Rectangle::new(0, 0, 1, 1), &"Z").unwrap_err();
    assert!(matches!(err, SpatialError::ItemNotFound));
    assert_eq!(index.count().unwrap(), 1);
}

#[test]
fn test_edge_touching_rectangles() {
    let index = small_index();
    index.add(&Rectangle::new(0, 0, 10, 10), "A").unwrap();

    // a query sharing only an edge still intersects
    assert_eq!(
        index.intersects(&Rectangle::new(10, 0, 20, 10)).unwrap(),
        vec!["A"]
    );
    // and a query with coincident edges still contains
    assert_eq!(
        index.contains(&Rectangle::new(0, 0, 10, 10)).unwrap(),
        vec!["A"]
    );
    // a point exactly on the edge has distance zero
    assert_eq!(index.nearest(&Point::new(10, 5), 0.1).unwrap(), vec!["A"]);
}

#[test]
fn test_bounds_lifecycle() {
    let index = small_index();
    assert_eq!(index.bounds().unwrap(), None);

    index.add(&Rectangle::new(3, 4, 5, 6), "A").unwrap();
    assert_eq!(index.bounds().unwrap(), Some(Rectangle::new(3, 4, 5, 6)));

    assert!(index.delete(&Rectangle::new(3, 4, 5, 6), &"A").unwrap());
    assert_eq!(index.bounds().unwrap(), None);
    assert!(index.is_empty().unwrap());
}

#[test]
fn test_add_delete_round_trip_restores_queries() {
    let index = diagonal_index();
    let before = sorted(index.intersects(&Rectangle::new(0, 0, 9, 9)).unwrap());

    index.add(&Rectangle::new(1, 1, 2, 2), "X").unwrap();
    assert!(index.delete(&Rectangle::new(1, 1, 2, 2), &"X").unwrap());

    let after = sorted(index.intersects(&Rectangle::new(0, 0, 9, 9)).unwrap());
    assert_eq!(before, after);
    assert_eq!(index.count().unwrap(), 5);
}

#[test]
fn test_contains_bounds_returns_everything() {
    let index = SpatialIndex::with_capacity(4, 2).unwrap();
    for i in 0..60u32 {
        let x = ((i % 8) * 5) as i32;
        let y = ((i / 8) * 5) as i32;
        index.add(&Rectangle::new(x, y, x + 3, y + 3), i).unwrap();
    }

    let bounds = index.bounds().unwrap().expect("non-empty index");
    let all = index.contains(&bounds).unwrap();
    assert_eq!(all.len(), 60);
}

#[test]
fn test_grid_deletion_down_to_empty() {
    let index = SpatialIndex::with_capacity(4, 2).unwrap();
    for i in 0..60u32 {
        let x = ((i % 8) * 5) as i32;
        let y = ((i / 8) * 5) as i32;
        index.add(&Rectangle::new(x, y, x + 3, y + 3), i).unwrap();
    }

    // remove in an order unrelated to insertion
    for i in (0..60u32).rev() {
        let x = ((i % 8) * 5) as i32;
        let y = ((i / 8) * 5) as i32;
        assert!(index.delete(&Rectangle::new(x, y, x + 3, y + 3), &i).unwrap());

        // the remaining items are all still reachable
        assert_eq!(index.count().unwrap(), i as usize);
        if let Some(bounds) = index.bounds().unwrap() {
            assert_eq!(index.contains(&bounds).unwrap().len(), i as usize);
        }
    }
    assert_eq!(index.bounds().unwrap(), None);
}

#[test]
fn test_concurrent_readers_and_writer() {
    let index = Arc::new(SpatialIndex::with_capacity(4, 2).unwrap());
    for i in 0..100u32 {
        let x = ((i % 10) * 4) as i32;
        let y = ((i / 10) * 4) as i32;
        index.add(&Rectangle::new(x, y, x + 2, y + 2), i).unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let hits = index.intersects(&Rectangle::new(0, 0, 40, 40)).unwrap();
                assert!(!hits.is_empty());
                let _ = index.nearest(&Point::new(20, 20), 50.0).unwrap();
                let _ = index.bounds().unwrap();
            }
        }));
    }

    {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for i in 100..200u32 {
                let x = ((i % 10) * 4) as i32;
                let y = ((i / 10) * 4) as i32;
                index.add(&Rectangle::new(x, y, x + 2, y + 2), i).unwrap();
            }
            for i in 100..200u32 {
                let x = ((i % 10) * 4) as i32;
                let y = ((i / 10) * 4) as i32;
                assert!(index.delete(&Rectangle::new(x, y, x + 2, y + 2), &i).unwrap());
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(index.count().unwrap(), 100);
}

#[test]
fn test_owned_string_payloads() {
    let index: SpatialIndex<String> = SpatialIndex::new();
    index
        .add(&Rectangle::new(0, 0, 5, 5), "first".to_string())
        .unwrap();
    index
        .add(&Rectangle::new(10, 10, 15, 15), "second".to_string())
        .unwrap();

    let hits = index.intersects(&Rectangle::new(0, 0, 20, 20)).unwrap();
    assert_eq!(sorted(hits), vec!["first".to_string(), "second".to_string()]);

    assert!(index
        .delete(&Rectangle::new(0, 0, 5, 5), &"first".to_string())
        .unwrap());
    assert_eq!(index.count().unwrap(), 1);
}
