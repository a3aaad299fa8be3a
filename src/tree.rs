//! The B+-tree engine: insertion, splitting, and search.
//!
//! Grounded directly on `examples/original_source/src/utec/disk/btree.h::btree`,
//! which is the ground truth for every algorithm here, with the Rust idiom
//! (explicit `Result`, `tracing` around split points, doc comments on the
//! trickier shifts) taken from
//! `examples/mermoldy-mysqlite/src/storage/table.rs`'s
//! `leaf_node_split_and_insert` / `internal_node_split_and_insert` /
//! `create_new_root`.
//!
//! Two corrections from the source are load-bearing here, not incidental:
//! insertion descent compares against the key, never the payload, and leaf
//! relinking after a position-0 split walks the full ancestor stack instead
//! of stopping at the grandparent. See the doc comments on `insert_rec` and
//! `relink_via_ancestors`.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::cursor::Cursor;
use crate::err;
use crate::error::Error;
use crate::node::{node_size, Node};
use crate::pager::PageManager;
use crate::payload::Payload;

const METADATA_PAGE: i64 = 0;
const ROOT_PAGE: i64 = 1;
const METADATA_SIZE: usize = 16;

#[derive(Clone, Copy)]
struct Metadata {
    root_id: i64,
    count: i64,
}

impl Metadata {
    fn encode(&self, page_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; page_size];
        buf[0..8].copy_from_slice(&self.root_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < METADATA_SIZE {
            return Err(err!(Storage, "metadata page is shorter than {} bytes", METADATA_SIZE));
        }
        let mut root_id_bytes = [0u8; 8];
        root_id_bytes.copy_from_slice(&buf[0..8]);
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&buf[8..16]);
        Ok(Self {
            root_id: i64::from_le_bytes(root_id_bytes),
            count: i64::from_le_bytes(count_bytes),
        })
    }
}

enum State {
    Overflow,
    Normal,
}

/// Computes the ORDER the reference implementation used for a given page
/// size: `(page_size - (2*sizeof(long) + sizeof(int) + 2*sizeof(long))) /
/// (sizeof(int) + sizeof(long))`, with `sizeof(long) = 8` and
/// `sizeof(int) = 4` as on the original's target platform. Reproduced for
/// callers who want the historical sizing; it is not a function of the
/// payload type, so callers sizing a node for their own `T` should compute
/// `order` directly against `node::node_size` instead.
pub fn classic_order(page_size: usize) -> usize {
    const SIZEOF_LONG: usize = 8;
    const SIZEOF_INT: usize = 4;
    (page_size - (2 * SIZEOF_LONG + SIZEOF_INT + 2 * SIZEOF_LONG)) / (SIZEOF_INT + SIZEOF_LONG)
}

/// A disk-backed B+-tree mapping `i64` keys to fixed-size payloads of type `T`.
pub struct BPlusTree<T: Payload> {
    pm: Rc<RefCell<PageManager>>,
    order: usize,
    metadata: Metadata,
    _marker: PhantomData<T>,
}

impl<T: Payload> BPlusTree<T> {
    /// Opens (or initializes) a tree backed by `pm`, using `order` keys per
    /// node. `order` is explicit rather than derived from `T`, see
    /// `classic_order` for the reference sizing and why it isn't
    /// payload-dependent.
    pub fn open(pm: Rc<RefCell<PageManager>>, order: usize) -> Result<Self, Error> {
        let page_size = pm.borrow().page_size();
        let needed = node_size(order, T::SIZE);
        if needed > page_size {
            return Err(err!(
                Capacity,
                "node size {} exceeds page_size {} for order {} and payload size {}",
                needed,
                page_size,
                order,
                T::SIZE
            ));
        }

        let is_empty = pm.borrow().is_empty();
        let metadata = if is_empty {
            info!(order, page_size, "initializing fresh index");
            let root = Node::new(ROOT_PAGE, order, T::SIZE);
            pm.borrow_mut().save(ROOT_PAGE, root.as_bytes())?;
            let metadata = Metadata {
                root_id: ROOT_PAGE,
                count: 1,
            };
            pm.borrow_mut().save(METADATA_PAGE, &metadata.encode(page_size))?;
            metadata
        } else {
            info!("recovering index metadata");
            let mut buf = vec![0u8; page_size];
            pm.borrow_mut().recover(METADATA_PAGE, &mut buf)?;
            Metadata::decode(&buf)?
        };

        Ok(Self {
            pm,
            order,
            metadata,
            _marker: PhantomData,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of pages ever allocated (page 0's metadata record). Exposed for
    /// invariant checks, not part of the navigational contract.
    pub fn page_count(&self) -> i64 {
        self.metadata.count
    }

    fn page_size(&self) -> usize {
        self.pm.borrow().page_size()
    }

    fn write_metadata(&mut self) -> Result<(), Error> {
        let page_size = self.page_size();
        self.pm
            .borrow_mut()
            .save(METADATA_PAGE, &self.metadata.encode(page_size))
    }

    fn new_node(&mut self) -> Result<Node, Error> {
        self.metadata.count += 1;
        let node = Node::new(self.metadata.count, self.order, T::SIZE);
        self.write_metadata()?;
        Ok(node)
    }

    fn read_node(&self, page_id: i64) -> Result<Node, Error> {
        let mut buf = vec![0u8; node_size(self.order, T::SIZE)];
        self.pm.borrow_mut().recover(page_id, &mut buf)?;
        Node::from_bytes(buf, self.order, T::SIZE)
    }

    fn write_node(&mut self, node: &Node) -> Result<(), Error> {
        self.pm.borrow_mut().save(node.page_id(), node.as_bytes())
    }

    fn erase_node(&mut self, page_id: i64) -> Result<(), Error> {
        self.pm.borrow_mut().erase(page_id)
    }

    fn end_cursor(&self) -> Cursor {
        Cursor::new(self.pm.clone(), self.order, T::SIZE, 0, 0)
    }

    pub fn end(&self) -> Cursor {
        self.end_cursor()
    }

    /// Descends the leftmost spine to the first leaf, slot 0.
    pub fn begin(&self) -> Result<Cursor, Error> {
        let mut node = self.read_node(self.metadata.root_id)?;
        while !node.is_leaf() {
            let child_id = node.child(0)?;
            node = self.read_node(child_id)?;
        }
        Ok(Cursor::new(self.pm.clone(), self.order, T::SIZE, node.page_id(), 0))
    }

    pub fn insert(&mut self, value: T, key: i64) -> Result<(), Error> {
        let root = self.read_node(self.metadata.root_id)?;
        let mut ancestors = Vec::new();
        let (root, state) = self.insert_rec(root, &value, key, &mut ancestors)?;
        if matches!(state, State::Overflow) {
            warn!(key, "root overflow, splitting root");
            self.split_root(root)?;
        }
        Ok(())
    }

    /// Descends to the insertion point, tracking the full `(page_id,
    /// child_pos)` ancestor stack on the way down. The stack is only consumed
    /// by `split` when a position-0 split needs to relink a leaf outside the
    /// immediate parent, see `relink_via_ancestors`.
    ///
    /// The descent comparison here is `key`, not `value`: the source computes
    /// this position with `keys[pos] < value`, comparing the stored
    /// separator to the incoming payload rather than the incoming key, which
    /// corrupts ordering for any payload that doesn't happen to sort like its
    /// key. `find` in the source already compares against the key; this
    /// makes insertion consistent with it.
    fn insert_rec(
        &mut self,
        mut node: Node,
        value: &T,
        key: i64,
        ancestors: &mut Vec<(i64, usize)>,
    ) -> Result<(Node, State), Error> {
        let count = node.count() as usize;
        let mut pos = 0;
        while pos < count && node.key(pos)? < key {
            pos += 1;
        }

        let child_id = node.child(pos)?;
        if child_id != 0 {
            ancestors.push((node.page_id(), pos));
            let child = self.read_node(child_id)?;
            let (_, child_state) = self.insert_rec(child, value, key, ancestors)?;
            ancestors.pop();
            if matches!(child_state, State::Overflow) {
                self.split(&mut node, pos, ancestors)?;
            }
        } else {
            let mut payload_buf = vec![0u8; T::SIZE];
            value.encode_fixed(&mut payload_buf)?;
            node.insert_in_node(pos, key, Some(&payload_buf))?;
        }

        self.write_node(&node)?;
        let state = if node.is_overflow() {
            State::Overflow
        } else {
            State::Normal
        };
        Ok((node, state))
    }

    /// Splits `parent.children[pos]` into two new pages and promotes its
    /// median into `parent`. When the split child is a leaf, also relinks the
    /// leaf chain around the new pair.
    fn split(&mut self, parent: &mut Node, pos: usize, ancestors: &[(i64, usize)]) -> Result<(), Error> {
        let child = self.read_node(parent.child(pos)?)?;
        let is_leaf = child.is_leaf();
        debug!(page_id = child.page_id(), is_leaf, "splitting node");

        let mut left = self.new_node()?;
        let mut right = self.new_node()?;

        let half = self.order / 2;
        let mut iter = 0usize;
        let mut i = 0usize;
        while iter < half {
            left.set_child(i, child.child(iter)?)?;
            left.set_key(i, child.key(iter)?)?;
            if is_leaf {
                let bytes = child.data_raw(iter)?.to_vec();
                left.set_data_raw(i, &bytes)?;
            }
            left.set_count(left.count() + 1);
            iter += 1;
            i += 1;
        }
        left.set_child(i, child.child(iter)?)?;

        // Promote the median. Only the key travels up; the parent never
        // stores payload data, matching `insert_in_node`'s `isLeaf = false`.
        let mid_key = child.key(iter)?;
        parent.insert_in_node(pos, mid_key, None)?;

        // A leaf keeps its median key in `right` too (every key must persist
        // in a leaf for a B+-tree); an internal node's median is fully
        // consumed by the parent and skipped here.
        if !is_leaf {
            iter += 1;
        }

        i = 0;
        while iter < self.order + 1 {
            right.set_child(i, child.child(iter)?)?;
            right.set_key(i, child.key(iter)?)?;
            if is_leaf {
                let bytes = child.data_raw(iter)?.to_vec();
                right.set_data_raw(i, &bytes)?;
            }
            right.set_count(right.count() + 1);
            iter += 1;
            i += 1;
        }
        right.set_child(i, child.child(iter)?)?;

        parent.set_child(pos, left.page_id())?;
        parent.set_child(pos + 1, right.page_id())?;
        parent.set_next(0);

        if is_leaf {
            left.set_next(right.page_id());
            right.set_next(child.next());

            if pos > 0 {
                let prev_id = parent.child(pos - 1)?;
                self.relink_rightmost_leaf(prev_id, left.page_id())?;
            } else {
                self.relink_via_ancestors(ancestors, left.page_id())?;
            }
        }

        self.erase_node(child.page_id())?;
        self.write_node(&left)?;
        self.write_node(&right)?;
        Ok(())
    }

    /// Repoints the rightmost leaf reachable from `start_id` to `new_next`.
    /// If `start_id` already names a leaf this is a single write.
    fn relink_rightmost_leaf(&mut self, start_id: i64, new_next: i64) -> Result<(), Error> {
        let mut node = self.read_node(start_id)?;
        while !node.is_leaf() {
            let rightmost = node.count() as usize;
            let child_id = node.child(rightmost)?;
            node = self.read_node(child_id)?;
        }
        node.set_next(new_next);
        self.write_node(&node)
    }

    /// Relinks the predecessor of a leaf produced by a position-0 split.
    ///
    /// The source only looks one level up (a single `grandpa_id`): it finds
    /// `parent`'s position in `grandpa`, steps to the previous sibling, and
    /// treats that sibling's rightmost child as the leaf to relink directly,
    /// which is only correct when the split is exactly two levels above the
    /// leaves. For a deeper split this lands on an internal node and
    /// corrupts its `next` field instead of the leaf's. Walking the full
    /// ancestor stack until a non-zero child position is found, then
    /// descending that ancestor's previous sibling all the way to its
    /// rightmost leaf, is correct at any depth.
    fn relink_via_ancestors(&mut self, ancestors: &[(i64, usize)], new_next: i64) -> Result<(), Error> {
        for &(ancestor_id, ancestor_pos) in ancestors.iter().rev() {
            if ancestor_pos != 0 {
                let ancestor = self.read_node(ancestor_id)?;
                let prev_id = ancestor.child(ancestor_pos - 1)?;
                return self.relink_rightmost_leaf(prev_id, new_next);
            }
        }
        // No ancestor was reached at a non-zero position: this leaf is the
        // leftmost leaf in the whole tree and has no predecessor.
        Ok(())
    }

    /// Splits the root in place. The root's page id never changes; two fresh
    /// pages receive its old contents and the root becomes a one-key
    /// internal node pointing at both.
    fn split_root(&mut self, mut root: Node) -> Result<(), Error> {
        let is_leaf = root.is_leaf();
        debug!(is_leaf, "splitting root");

        let mut left = self.new_node()?;
        let mut right = self.new_node()?;

        let half = self.order / 2;
        let mut iter = 0usize;
        let mut i = 0usize;
        while iter < half {
            left.set_child(i, root.child(iter)?)?;
            left.set_key(i, root.key(iter)?)?;
            if is_leaf {
                let bytes = root.data_raw(iter)?.to_vec();
                left.set_data_raw(i, &bytes)?;
            }
            left.set_count(left.count() + 1);
            iter += 1;
            i += 1;
        }
        left.set_child(i, root.child(iter)?)?;

        let mid_key = root.key(iter)?;
        if !is_leaf {
            iter += 1;
        }

        i = 0;
        while iter < self.order + 1 {
            right.set_child(i, root.child(iter)?)?;
            right.set_key(i, root.key(iter)?)?;
            if is_leaf {
                let bytes = root.data_raw(iter)?.to_vec();
                right.set_data_raw(i, &bytes)?;
            }
            right.set_count(right.count() + 1);
            iter += 1;
            i += 1;
        }
        right.set_child(i, root.child(iter)?)?;

        root.set_next(0);
        if is_leaf {
            // The root-as-leaf was always the sole (and rightmost) leaf
            // before this split, so its successor is simply "none".
            left.set_next(right.page_id());
            right.set_next(0);
        }

        root.set_child(0, left.page_id());
        root.set_key(0, mid_key);
        root.set_child(1, right.page_id());
        root.set_count(1);

        self.write_node(&root)?;
        self.write_node(&left)?;
        self.write_node(&right)?;
        Ok(())
    }

    /// Returns whether `key` is present, and a cursor positioned at the
    /// first slot with `key(slot) >= key`. When no such slot exists in the
    /// descended leaf, the cursor moves to slot 0 of the next leaf, or to
    /// `end()` if there is no next leaf.
    pub fn find(&self, key: i64) -> Result<(bool, Cursor), Error> {
        let root = self.read_node(self.metadata.root_id)?;
        self.find_in(root, key)
    }

    fn find_in(&self, node: Node, key: i64) -> Result<(bool, Cursor), Error> {
        let count = node.count() as usize;
        let mut pos = 0;
        while pos < count && node.key(pos)? < key {
            pos += 1;
        }

        let child_id = node.child(pos)?;
        if child_id != 0 {
            let child = self.read_node(child_id)?;
            return self.find_in(child, key);
        }

        let mut i = 0usize;
        while i < count && node.key(i)? < key {
            i += 1;
        }

        if i < count {
            let found = node.key(i)? == key;
            let cursor = Cursor::new(self.pm.clone(), self.order, T::SIZE, node.page_id(), i);
            return Ok((found, cursor));
        }

        let next = node.next();
        if next == 0 {
            return Ok((false, self.end_cursor()));
        }
        Ok((false, Cursor::new(self.pm.clone(), self.order, T::SIZE, next, 0)))
    }

    /// A cursor over the half-open range `[low, high)`.
    pub fn range_search(&self, low: i64, high: i64) -> Result<Cursor, Error> {
        let (_, mut it) = self.find(low)?;
        let (_, it_end) = self.find(high)?;
        it.set_limit(it_end.page(), it_end.slot());
        Ok(it)
    }
}
