//! On-disk node layout.
//!
//! A single physical layout serves both leaves and internal nodes, exactly as
//! `utec::disk::btree::Node<T, ORDER>` lays them out: `children[0] == 0` is
//! the leaf predicate (see invariant 1). Unlike the C++ template, the payload
//! width is not known at compile time here, so the node holds a raw byte
//! buffer and slices out key/child/data fields by offset, the same idiom
//! `storage/btree.rs::Node` in the teacher crate uses for its fixed
//! `PAGE_SIZE` buffer, generalized to a runtime `order`/`payload_size`.

use crate::err;
use crate::error::Error;

const I64_SIZE: usize = 8;

/// Computes the byte size of a node image for the given `order` and
/// `payload_size`, matching the field layout
/// `{page_id, count, keys[order+1], data[order+1], children[order+2], next}`.
pub fn node_size(order: usize, payload_size: usize) -> usize {
    I64_SIZE * 2                 // page_id, count
        + I64_SIZE * (order + 1) // keys
        + payload_size * (order + 1) // data
        + I64_SIZE * (order + 2) // children
        + I64_SIZE // next
}

pub struct Node {
    buf: Vec<u8>,
    order: usize,
    payload_size: usize,
}

impl Node {
    /// A freshly allocated, empty node (all keys `-1`, all children `0`).
    pub fn new(page_id: i64, order: usize, payload_size: usize) -> Self {
        let mut node = Self {
            buf: vec![0u8; node_size(order, payload_size)],
            order,
            payload_size,
        };
        node.set_page_id(page_id);
        node.set_count(0);
        for i in 0..=order {
            node.set_key(i, -1).expect("key slot in range");
        }
        for i in 0..=(order + 1) {
            node.set_child(i, 0).expect("child slot in range");
        }
        node.set_next(0);
        node
    }

    /// Wraps an existing byte image (as read from a `PageManager`) for field access.
    pub fn from_bytes(buf: Vec<u8>, order: usize, payload_size: usize) -> Result<Self, Error> {
        let expected = node_size(order, payload_size);
        if buf.len() != expected {
            return Err(err!(
                Storage,
                "node image is {} bytes, expected {} for order={} payload_size={}",
                buf.len(),
                expected,
                order,
                payload_size
            ));
        }
        Ok(Self {
            buf,
            order,
            payload_size,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    fn keys_offset(&self) -> usize {
        I64_SIZE * 2
    }

    fn data_offset(&self) -> usize {
        self.keys_offset() + I64_SIZE * (self.order + 1)
    }

    fn children_offset(&self) -> usize {
        self.data_offset() + self.payload_size * (self.order + 1)
    }

    fn next_offset(&self) -> usize {
        self.children_offset() + I64_SIZE * (self.order + 2)
    }

    fn read_i64(&self, offset: usize) -> i64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.buf[offset..offset + 8]);
        i64::from_le_bytes(b)
    }

    fn write_i64(&mut self, offset: usize, value: i64) {
        self.buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn page_id(&self) -> i64 {
        self.read_i64(0)
    }

    pub fn set_page_id(&mut self, value: i64) {
        self.write_i64(0, value);
    }

    pub fn count(&self) -> i64 {
        self.read_i64(I64_SIZE)
    }

    pub fn set_count(&mut self, value: i64) {
        self.write_i64(I64_SIZE, value);
    }

    fn check_key_slot(&self, i: usize) -> Result<(), Error> {
        if i > self.order {
            return Err(err!(Storage, "key slot {} out of range (order {})", i, self.order));
        }
        Ok(())
    }

    pub fn key(&self, i: usize) -> Result<i64, Error> {
        self.check_key_slot(i)?;
        Ok(self.read_i64(self.keys_offset() + i * I64_SIZE))
    }

    pub fn set_key(&mut self, i: usize, value: i64) -> Result<(), Error> {
        self.check_key_slot(i)?;
        let offset = self.keys_offset() + i * I64_SIZE;
        self.write_i64(offset, value);
        Ok(())
    }

    fn check_data_slot(&self, i: usize) -> Result<(), Error> {
        if i > self.order {
            return Err(err!(Storage, "data slot {} out of range (order {})", i, self.order));
        }
        Ok(())
    }

    pub fn data_raw(&self, i: usize) -> Result<&[u8], Error> {
        self.check_data_slot(i)?;
        let offset = self.data_offset() + i * self.payload_size;
        Ok(&self.buf[offset..offset + self.payload_size])
    }

    pub fn set_data_raw(&mut self, i: usize, bytes: &[u8]) -> Result<(), Error> {
        self.check_data_slot(i)?;
        if bytes.len() != self.payload_size {
            return Err(err!(
                Capacity,
                "payload is {} bytes, node reserves {}",
                bytes.len(),
                self.payload_size
            ));
        }
        let offset = self.data_offset() + i * self.payload_size;
        self.buf[offset..offset + self.payload_size].copy_from_slice(bytes);
        Ok(())
    }

    fn check_child_slot(&self, i: usize) -> Result<(), Error> {
        if i > self.order + 1 {
            return Err(err!(Storage, "child slot {} out of range (order {})", i, self.order));
        }
        Ok(())
    }

    pub fn child(&self, i: usize) -> Result<i64, Error> {
        self.check_child_slot(i)?;
        Ok(self.read_i64(self.children_offset() + i * I64_SIZE))
    }

    pub fn set_child(&mut self, i: usize, value: i64) -> Result<(), Error> {
        self.check_child_slot(i)?;
        let offset = self.children_offset() + i * I64_SIZE;
        self.write_i64(offset, value);
        Ok(())
    }

    pub fn next(&self) -> i64 {
        self.read_i64(self.next_offset())
    }

    pub fn set_next(&mut self, value: i64) {
        let offset = self.next_offset();
        self.write_i64(offset, value);
    }

    /// `children[0] == 0` marks a leaf; this holds for every node since
    /// internal nodes always have a non-zero leftmost child.
    pub fn is_leaf(&self) -> bool {
        self.child(0).unwrap_or(0) == 0
    }

    pub fn is_overflow(&self) -> bool {
        self.count() > self.order as i64
    }

    /// Shifts `keys[pos..count]`, `data[pos..count]` and `children[pos+1..count+1]`
    /// one slot right, then writes `key` (and `payload`, only if this node is a
    /// leaf) into slot `pos`. The new slot's right-child pointer inherits the
    /// pre-shift `children[pos]`, same as the source: callers overwrite both
    /// child pointers explicitly right after a split.
    pub fn insert_in_node(&mut self, pos: usize, key: i64, payload: Option<&[u8]>) -> Result<(), Error> {
        let mut j = self.count() as usize;
        while j > pos {
            let prev_data = self.data_raw(j - 1)?.to_vec();
            self.set_data_raw(j, &prev_data)?;
            let prev_key = self.key(j - 1)?;
            self.set_key(j, prev_key)?;
            let prev_child = self.child(j)?;
            self.set_child(j + 1, prev_child)?;
            j -= 1;
        }
        self.set_key(j, key)?;
        if let Some(bytes) = payload {
            self.set_data_raw(j, bytes)?;
        }
        let child_at_j = self.child(j)?;
        self.set_child(j + 1, child_at_j)?;
        self.set_count(self.count() + 1);
        Ok(())
    }
}
