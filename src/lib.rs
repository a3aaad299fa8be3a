//! A disk-backed B+-tree index.
//!
//! A [`BPlusTree`] maps `i64` keys to fixed-size payloads ([`Payload`]),
//! persisting every node as one fixed-size page of a [`PageManager`]-backed
//! file. Point lookups and half-open range scans are exposed through a
//! [`Cursor`] that walks the leaf chain lazily, one page at a time.
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use bptree_index::node::node_size;
//! use bptree_index::{BPlusTree, PageManager, Payload};
//!
//! # fn run() -> Result<(), bptree_index::Error> {
//! let order = 82;
//! let page_size = node_size(order, i64::SIZE);
//! let pm = PageManager::open("index.bin", page_size, false)?;
//! let mut tree: BPlusTree<i64> = BPlusTree::open(Rc::new(RefCell::new(pm)), order)?;
//!
//! tree.insert(100, 1)?;
//! tree.insert(200, 2)?;
//!
//! let (found, cursor) = tree.find(1)?;
//! assert!(found);
//! assert_eq!(cursor.get::<i64>()?, 100);
//! # Ok(())
//! # }
//! ```
//!
//! Concurrent mutation, crash recovery, variable-length keys/payloads, and
//! deletion are out of scope: a single in-process handle is expected to
//! drive the tree, shared as `Rc<RefCell<PageManager>>` rather than behind a
//! lock, since there is nothing here that needs one.

#[macro_use]
pub mod error;
pub mod cursor;
pub mod node;
pub mod pager;
pub mod payload;
pub mod tree;

pub use cursor::{Cursor, Iter};
pub use error::Error;
pub use pager::PageManager;
pub use payload::Payload;
pub use tree::{classic_order, BPlusTree};
