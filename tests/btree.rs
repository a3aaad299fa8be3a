//! End-to-end scenarios over the public API, plus a handful of invariant and
//! boundary checks. Configurations are derived from `node::node_size` rather
//! than hardcoded page sizes — see `DESIGN.md` for why the historical
//! `(page_size, ORDER)` pairs from the original test suite don't actually
//! satisfy this crate's byte-exact node layout and aren't reused verbatim.

use std::cell::RefCell;
use std::rc::Rc;

use bptree_index::node::{node_size, Node};
use bptree_index::{BPlusTree, PageManager, Payload};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
}

fn open_tree<T: Payload>(path: &std::path::Path, order: usize) -> (Rc<RefCell<PageManager>>, BPlusTree<T>) {
    init_logging();
    let page_size = node_size(order, T::SIZE);
    let pm = Rc::new(RefCell::new(PageManager::open(path, page_size, false).unwrap()));
    let tree = BPlusTree::open(pm.clone(), order).unwrap();
    (pm, tree)
}

fn collect_u8(tree: &BPlusTree<u8>) -> String {
    let cursor = tree.begin().unwrap();
    let bytes: Vec<u8> = cursor.into_iter::<u8>().map(|r| r.unwrap()).collect();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn s1_sorts_inserted_keys() {
    let dir = tempfile::tempdir().unwrap();
    let (_pm, mut tree) = open_tree::<u8>(&dir.path().join("s1.bin"), 2);

    for c in "zxcnmvfjdaqpirue".bytes() {
        tree.insert(c, c as i64).unwrap();
    }

    assert_eq!(collect_u8(&tree), "acdefijmnpqruvxz");
}

#[test]
fn s2_finds_present_key() {
    let dir = tempfile::tempdir().unwrap();
    let (_pm, mut tree) = open_tree::<u8>(&dir.path().join("s2.bin"), 2);
    for c in "zxcnmvfjdaqpirue".bytes() {
        tree.insert(c, c as i64).unwrap();
    }

    let (found, cursor) = tree.find(b'e' as i64).unwrap();
    assert!(found);
    assert_eq!(cursor.get::<u8>().unwrap(), b'e');
}

#[test]
fn s3_missing_key_lands_on_next_greater() {
    let dir = tempfile::tempdir().unwrap();
    let (_pm, mut tree) = open_tree::<u8>(&dir.path().join("s3.bin"), 2);
    for c in "zxcnmvfjdaqpirue".bytes() {
        tree.insert(c, c as i64).unwrap();
    }

    let (found, cursor) = tree.find(b'b' as i64).unwrap();
    assert!(!found);
    assert_eq!(cursor.get::<u8>().unwrap(), b'c');
}

#[test]
fn s4_range_scan_is_half_open() {
    let dir = tempfile::tempdir().unwrap();
    let (_pm, mut tree) = open_tree::<u8>(&dir.path().join("s4.bin"), 2);
    for c in "zxcnmvfjdaqpirue".bytes() {
        tree.insert(c, c as i64).unwrap();
    }

    let cursor = tree.range_search(b'd' as i64, b's' as i64).unwrap();
    let bytes: Vec<u8> = cursor.into_iter::<u8>().map(|r| r.unwrap()).collect();
    assert_eq!(String::from_utf8(bytes).unwrap(), "defijmnpqr");
}

#[test]
fn s5_bulk_shuffled_insert_iterates_sorted() {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    // The original scenario shuffles and inserts 1,000,000 integers read from
    // a fixture file we don't have; 5,000 generated values exercise the same
    // code path (many splits across many levels) without the runtime cost.
    const N: i64 = 5_000;

    let dir = tempfile::tempdir().unwrap();
    let (_pm, mut tree) = open_tree::<i64>(&dir.path().join("s5.bin"), 16);

    let mut values: Vec<i64> = (0..N).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    values.shuffle(&mut rng);

    for v in &values {
        tree.insert(*v, *v).unwrap();
    }

    let cursor = tree.begin().unwrap();
    let collected: Vec<i64> = cursor.into_iter::<i64>().map(|r| r.unwrap()).collect();
    let expected: Vec<i64> = (0..N).collect();
    assert_eq!(collected, expected);
}

#[test]
fn s6_reopen_preserves_and_extends_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s6.bin");
    let order = 2;
    let page_size = node_size(order, 1);

    {
        let pm = PageManager::open(&path, page_size, false).unwrap();
        let mut tree: BPlusTree<u8> = BPlusTree::open(Rc::new(RefCell::new(pm)), order).unwrap();
        for c in "zxcnmvfjdaqpirue".bytes() {
            tree.insert(c, c as i64).unwrap();
        }
    }

    let pm = PageManager::open(&path, page_size, false).unwrap();
    let mut tree: BPlusTree<u8> = BPlusTree::open(Rc::new(RefCell::new(pm)), order).unwrap();
    for c in "123456".bytes() {
        tree.insert(c, c as i64).unwrap();
    }

    assert_eq!(collect_u8(&tree), "123456acdefijmnpqruvxz");
}

#[test]
fn find_past_rightmost_key_reaches_end() {
    let dir = tempfile::tempdir().unwrap();
    let (_pm, mut tree) = open_tree::<u8>(&dir.path().join("end.bin"), 2);
    for c in "ace".bytes() {
        tree.insert(c, c as i64).unwrap();
    }

    let (found, cursor) = tree.find(b'z' as i64).unwrap();
    assert!(!found);
    assert_eq!(cursor, tree.end());
}

/// ORDER=2 forces a split on nearly every insert; inserting in strictly
/// decreasing order lands every new key at position 0, so once the tree
/// grows past two levels this exercises the full ancestor-walk relink (the
/// corrected version of the source's grandparent-only relink).
#[test]
fn cascading_leftmost_splits_preserve_leaf_chain_order() {
    let dir = tempfile::tempdir().unwrap();
    let (_pm, mut tree) = open_tree::<i64>(&dir.path().join("leftmost.bin"), 2);

    for key in (0..60i64).rev() {
        tree.insert(key, key).unwrap();
    }

    let cursor = tree.begin().unwrap();
    let collected: Vec<i64> = cursor.into_iter::<i64>().map(|r| r.unwrap()).collect();
    let expected: Vec<i64> = (0..60).collect();
    assert_eq!(collected, expected);
}

#[test]
fn every_node_respects_order_capacity_invariant() {
    let dir = tempfile::tempdir().unwrap();
    let order = 2;
    let page_size = node_size(order, 1);
    let pm = Rc::new(RefCell::new(
        PageManager::open(dir.path().join("invariant.bin"), page_size, false).unwrap(),
    ));
    let mut tree: BPlusTree<u8> = BPlusTree::open(pm.clone(), order).unwrap();

    for c in "zxcnmvfjdaqpirue".bytes() {
        tree.insert(c, c as i64).unwrap();
    }

    for page_id in 1..=tree.page_count() {
        let mut buf = vec![0u8; page_size];
        pm.borrow_mut().recover(page_id, &mut buf).unwrap();
        let node = Node::from_bytes(buf, order, 1).unwrap();
        assert!(node.count() <= order as i64, "page {} overflowed", page_id);
    }
}

#[test]
fn every_inserted_key_appears_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let (_pm, mut tree) = open_tree::<u8>(&dir.path().join("uniq.bin"), 2);

    let input = "zxcnmvfjdaqpirue";
    for c in input.bytes() {
        tree.insert(c, c as i64).unwrap();
    }

    let mut expected: Vec<u8> = input.bytes().collect();
    expected.sort();

    assert_eq!(collect_u8(&tree).into_bytes(), expected);
}

#[test]
fn open_rejects_a_node_that_does_not_fit_the_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("toosmall.bin");
    let pm = Rc::new(RefCell::new(PageManager::open(&path, 8, false).unwrap()));
    let result: Result<BPlusTree<i64>, _> = BPlusTree::open(pm, 82);
    assert!(result.is_err());
}
