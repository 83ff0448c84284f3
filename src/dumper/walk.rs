//! Child enumeration over pointer chasing containers.
//!
//! Walkers yield node addresses, a caller computes payload addresses with the layout calculator.
//! Every walker is bounded by a node limit, a corrupted structure (a cycle, a dangling link)
//! ends the walk with an error or at the limit, never loops forever.

use crate::dumper::error::MemoryError;
use crate::dumper::layout::{TreeFlavor, TreeLayout};
use crate::dumper::memory::{advance, MemView};
use fallible_iterator::FallibleIterator;

/// Enumeration bounds: a logical container size and a per-shape cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cap {
    pub total: usize,
    pub cap: usize,
}

impl Cap {
    pub fn new(total: usize, cap: usize) -> Self {
        Self { total, cap }
    }

    /// Number of real children to emit.
    pub fn shown(&self) -> usize {
        self.total.min(self.cap)
    }

    /// True if an ellipsis record is required.
    pub fn is_cut(&self) -> bool {
        self.total > self.cap
    }
}

/// Forward chain: each node keeps a pointer to the next one at a fixed offset.
/// Walk ends at a sentinel (ring header) or at a null link.
pub struct ChainWalker<'a> {
    mem: MemView<'a>,
    next_offset: usize,
    current: usize,
    sentinel: usize,
    limit: usize,
    visited: usize,
}

impl<'a> ChainWalker<'a> {
    pub fn new(mem: MemView<'a>, first: usize, next_offset: usize, sentinel: usize) -> Self {
        Self {
            mem,
            next_offset,
            current: first,
            sentinel,
            limit: usize::MAX,
            visited: 0,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn visited(&self) -> usize {
        self.visited
    }

    fn at_end(&self) -> bool {
        self.current == self.sentinel || self.current == 0
    }

    /// True if walk stopped because of the node limit.
    pub fn truncated(&self) -> bool {
        self.visited >= self.limit && !self.at_end()
    }
}

impl<'a> FallibleIterator for ChainWalker<'a> {
    type Item = usize;
    type Error = MemoryError;

    fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        if self.at_end() || self.visited >= self.limit {
            return Ok(None);
        }
        let node = self.current;
        self.current = self.mem.deref_at(node, self.next_offset)?;
        self.visited += 1;
        Ok(Some(node))
    }
}

/// Bucket array with chained nodes. A chain ends at a node whose `next` link is null
/// (the shared end marker of the table), the limit bounds the whole table.
pub struct BucketWalker<'a> {
    mem: MemView<'a>,
    buckets: usize,
    num_buckets: usize,
    next_offset: usize,
    bucket: usize,
    node: Option<usize>,
    limit: usize,
    visited: usize,
}

impl<'a> BucketWalker<'a> {
    pub fn new(mem: MemView<'a>, buckets: usize, num_buckets: usize, next_offset: usize) -> Self {
        Self {
            mem,
            buckets,
            num_buckets,
            next_offset,
            bucket: 0,
            node: None,
            limit: usize::MAX,
            visited: 0,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn visited(&self) -> usize {
        self.visited
    }

    pub fn truncated(&self) -> bool {
        self.visited >= self.limit
    }
}

impl<'a> FallibleIterator for BucketWalker<'a> {
    type Item = usize;
    type Error = MemoryError;

    fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        let ptr_size = self.mem.target().pointer_size;
        loop {
            if self.visited >= self.limit {
                return Ok(None);
            }

            if let Some(node) = self.node.take() {
                let next = self.mem.deref_at(node, self.next_offset)?;
                if next != 0 {
                    self.node = Some(next);
                    self.visited += 1;
                    return Ok(Some(node));
                }
            }

            if self.bucket >= self.num_buckets {
                return Ok(None);
            }
            let slot = advance(self.buckets, self.bucket * ptr_size)?;
            let head = self.mem.ptr(slot)?;
            self.bucket += 1;
            self.node = (head != 0).then_some(head);
        }
    }
}

/// In-order walk over a red-black tree of a standard library map or set.
pub struct TreeWalker<'a> {
    mem: MemView<'a>,
    layout: TreeLayout,
    header: usize,
    current: usize,
    limit: usize,
    visited: usize,
}

impl<'a> TreeWalker<'a> {
    /// Start at the leftmost node, `header` is the tree's header (end) node.
    pub fn new(mem: MemView<'a>, layout: TreeLayout, header: usize) -> Result<Self, MemoryError> {
        let first = mem.deref_at(header, layout.left)?;
        Ok(Self {
            mem,
            layout,
            header,
            current: first,
            limit: usize::MAX,
            visited: 0,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn visited(&self) -> usize {
        self.visited
    }

    /// Payload address of a node.
    pub fn value_addr(&self, node: usize) -> Result<usize, MemoryError> {
        advance(node, self.layout.value)
    }

    fn is_nil(&self, node: usize) -> Result<bool, MemoryError> {
        if node == 0 {
            return Ok(true);
        }
        match self.layout.flavor {
            TreeFlavor::Gnu => Ok(false),
            TreeFlavor::Msvc => Ok(self.mem.u8(advance(node, self.layout.is_nil)?)? != 0),
        }
    }

    fn link(&self, node: usize, offset: usize) -> Result<usize, MemoryError> {
        self.mem.deref_at(node, offset)
    }

    fn successor(&self, mut node: usize) -> Result<usize, MemoryError> {
        let right = self.link(node, self.layout.right)?;
        if !self.is_nil(right)? {
            node = right;
            loop {
                let left = self.link(node, self.layout.left)?;
                if self.is_nil(left)? {
                    return Ok(node);
                }
                node = left;
            }
        }

        let mut parent = self.link(node, self.layout.parent)?;
        match self.layout.flavor {
            TreeFlavor::Gnu => {
                while node == self.link(parent, self.layout.right)? {
                    node = parent;
                    parent = self.link(parent, self.layout.parent)?;
                }
                // rightmost node reached through the header
                if self.link(node, self.layout.right)? != parent {
                    node = parent;
                }
                Ok(node)
            }
            TreeFlavor::Msvc => {
                while !self.is_nil(parent)? && node == self.link(parent, self.layout.right)? {
                    node = parent;
                    parent = self.link(parent, self.layout.parent)?;
                }
                Ok(parent)
            }
        }
    }

    fn at_end(&self) -> Result<bool, MemoryError> {
        Ok(self.current == self.header || self.is_nil(self.current)?)
    }
}

impl<'a> FallibleIterator for TreeWalker<'a> {
    type Item = usize;
    type Error = MemoryError;

    fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        if self.visited >= self.limit || self.at_end()? {
            return Ok(None);
        }
        let node = self.current;
        self.current = self.successor(node)?;
        self.visited += 1;
        Ok(Some(node))
    }
}
