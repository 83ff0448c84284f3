//! Builders of framework and standard library values in a [`SimHeap`].
//!
//! Every builder lays a value out the way a process built for the heap's [`Target`] would,
//! using the same layout descriptors the dumpers read with. Used by tests and demos.

use crate::dumper::layout::{
    hash_offset, map_node_shape, vector_payload_offset, GnuBitVector, GnuCowRep, GnuRbTree,
    GnuSsoString, ListNodeBase, MsvcBitVector, MsvcList, MsvcString, MsvcTree, MsvcTreeNode,
    QArrayData, QHashData, QLinkedListData, QLinkedListNode, QListData, QMapData, QObject,
    QObjectPrivate46, QVectorData, TreeLayout, VectorImpl,
};
use crate::dumper::memory::{MemView, SimHeap, StdAbi};
use crate::dumper::render::utf16_bytes;

impl SimHeap {
    fn read_ptr(&self, addr: usize) -> usize {
        MemView::new(self.memory(), *self.target())
            .ptr(addr)
            .expect("pointer inside an allocated region")
    }

    /// Shared `QString::Data`/`QByteArray::Data` block over `units`, return the d pointer.
    fn array_data(&mut self, units: &[u8], count: usize, unit: usize) -> usize {
        let t = *self.target();
        let l = QArrayData::new(&t);
        let chars = self.alloc(units.len() + unit);
        self.put_bytes(chars, units);
        let d = self.alloc(l.struct_size);
        self.put_i32(d + l.refcount, 1);
        self.put_i32(d + l.alloc, count as i32);
        self.put_i32(d + l.size, count as i32);
        self.put_ptr(d + l.data, chars);
        d
    }

    /// Allocate a pointer sized holder of `d`.
    fn holder(&mut self, d: usize) -> usize {
        let holder = self.alloc(self.target().pointer_size);
        self.put_ptr(holder, d);
        holder
    }

    /// `QString`, return address of the d pointer holder.
    pub fn qstring(&mut self, text: &str) -> usize {
        let units = utf16_bytes(text, self.target().byte_order);
        let d = self.array_data(&units, units.len() / 2, 2);
        self.holder(d)
    }

    /// `QByteArray`, return address of the d pointer holder.
    pub fn qbytearray(&mut self, data: &[u8]) -> usize {
        let d = self.array_data(data, data.len(), 1);
        self.holder(d)
    }

    /// `QListData::Data` with pointer sized slots written by `put`, return the d pointer.
    fn list_data(&mut self, count: usize, mut put: impl FnMut(&mut Self, usize, usize)) -> usize {
        let t = *self.target();
        let l = QListData::new(&t);
        let d = self.alloc(l.array + count.max(1) * t.pointer_size);
        self.put_i32(d + l.refcount, 1);
        self.put_i32(d + l.alloc, count as i32);
        self.put_i32(d + l.begin, 0);
        self.put_i32(d + l.end, count as i32);
        for i in 0..count {
            put(self, i, d + l.array + i * t.pointer_size);
        }
        d
    }

    /// `QList` whose slots hold raw pointer values.
    pub fn qlist_slots(&mut self, slots: &[usize]) -> usize {
        let d = self.list_data(slots.len(), |heap, i, slot| heap.put_ptr(slot, slots[i]));
        self.holder(d)
    }

    /// `QList<int>`, elements are stored inside the slots.
    pub fn qlist_of_ints(&mut self, items: &[i32]) -> usize {
        let d = self.list_data(items.len(), |heap, i, slot| heap.put_i32(slot, items[i]));
        self.holder(d)
    }

    /// `QVector<int>`.
    pub fn qvector_of_ints(&mut self, items: &[i32]) -> usize {
        let t = *self.target();
        let l = QVectorData::new(&t);
        let payload = vector_payload_offset(&t, 4);
        let d = self.alloc(payload + items.len() * 4);
        self.put_i32(d + l.refcount, 1);
        self.put_i32(d + l.alloc, items.len() as i32);
        self.put_i32(d + l.size, items.len() as i32);
        for (i, item) in items.iter().enumerate() {
            self.put_i32(d + payload + i * 4, *item);
        }
        self.holder(d)
    }

    /// `QLinkedList<int>`: a ring of nodes closed by the header.
    pub fn qlinkedlist_of_ints(&mut self, items: &[i32]) -> usize {
        let t = *self.target();
        let l = QLinkedListData::new(&t);
        let node = QLinkedListNode::new(&t);
        let d = self.alloc(l.struct_size);
        self.put_i32(d + l.refcount, 1);
        self.put_i32(d + l.size, items.len() as i32);

        let mut prev = d;
        for item in items {
            let n = self.alloc(node.struct_size + 4);
            self.put_i32(n + node.struct_size, *item);
            self.put_ptr(n + node.prev, prev);
            self.put_ptr(prev + node.next, n);
            prev = n;
        }
        self.put_ptr(prev + node.next, d);
        self.put_ptr(d + l.prev, prev);
        self.holder(d)
    }

    /// `QHash<int, int>` with `num_buckets` buckets, nodes use the optimized integer key layout.
    pub fn qhash_int_int(&mut self, items: &[(i32, i32)], num_buckets: usize) -> usize {
        let t = *self.target();
        let l = QHashData::new(&t);
        let ptr = t.pointer_size;
        let key_offset = hash_offset(&t, true, true, 4, 4);
        let value_offset = hash_offset(&t, true, false, 4, 4);
        let node_size = value_offset + 4;

        let d = self.alloc(l.struct_size);
        let buckets = self.alloc(num_buckets.max(1) * ptr);
        self.put_ptr(d + l.buckets, buckets);
        self.put_i32(d + l.refcount, 1);
        self.put_i32(d + l.size, items.len() as i32);
        self.put_i32(d + l.node_size, node_size as i32);
        self.put_i32(d + l.num_buckets, num_buckets as i32);
        // empty buckets and chain ends point at the table itself
        for b in 0..num_buckets {
            self.put_ptr(buckets + b * ptr, d);
        }
        for (key, value) in items {
            let slot = buckets + (*key as i64).rem_euclid(num_buckets.max(1) as i64) as usize * ptr;
            let node = self.alloc(node_size);
            self.put_i32(node + key_offset, *key);
            self.put_i32(node + value_offset, *value);
            let head = self.read_ptr(slot);
            self.put_ptr(node, head);
            self.put_ptr(slot, node);
        }
        self.holder(d)
    }

    /// `QMap<int, int>`: a skip list level 0 ring closed by the header, keys in given order.
    pub fn qmap_int_int(&mut self, items: &[(i32, i32)]) -> usize {
        let t = *self.target();
        let l = QMapData::new(&t);
        let ptr = t.pointer_size;
        let (value_offset, node_size) = map_node_shape(&t, (4, 4), (4, 4));
        let link_offset = node_size - 2 * ptr;

        let d = self.alloc(l.struct_size);
        self.put_i32(d + l.refcount, 1);
        self.put_i32(d + l.size, items.len() as i32);

        let mut prev = d;
        for (key, value) in items {
            let node = self.alloc(node_size);
            self.put_i32(node, *key);
            self.put_i32(node + value_offset, *value);
            let link = node + link_offset;
            self.put_ptr(link, prev);
            self.put_ptr(prev + ptr, link);
            prev = link;
        }
        self.put_ptr(prev + ptr, d);
        self.put_ptr(d + l.backward, prev);
        self.holder(d)
    }

    /// `QObject` of the class behind `vtable` named `name`, return the object address.
    /// Object private data has an empty children list, the object itself has room for
    /// property fields at offsets 16..32.
    pub fn qobject(&mut self, name: &str, vtable: usize, parent: usize) -> usize {
        let t = *self.target();
        let l = QObject::new(&t);
        let p = QObjectPrivate46::new(&t);
        let object = self.alloc(l.struct_size.max(32));
        let private = self.alloc(p.struct_size);
        self.put_ptr(object + l.vptr, vtable);
        self.put_ptr(object + l.d_ptr, private);

        let name = self.qstring(name);
        let name = self.read_ptr(name);
        let children = self.list_data(0, |_, _, _| {});
        self.put_ptr(private + p.q_ptr, object);
        self.put_ptr(private + p.parent, parent);
        self.put_ptr(private + p.children, children);
        self.put_ptr(private + p.object_name, name);
        object
    }

    /// Replace a children list of an object built by [`SimHeap::qobject`].
    pub fn set_qobject_children(&mut self, object: usize, children: &[usize]) {
        let t = *self.target();
        let private = self.read_ptr(object + QObject::new(&t).d_ptr);
        let d = self.list_data(children.len(), |heap, i, slot| heap.put_ptr(slot, children[i]));
        self.put_ptr(private + QObjectPrivate46::new(&t).children, d);
    }

    /// `std::string` of the heap's ABI, return the object address.
    pub fn std_string(&mut self, text: &[u8]) -> usize {
        let t = *self.target();
        let ptr = t.pointer_size;
        match t.abi {
            StdAbi::GnuCxx11 => {
                let l = GnuSsoString::new(&t);
                let addr = self.alloc(l.struct_size);
                let data = if text.len() < 16 {
                    addr + l.local
                } else {
                    self.alloc(text.len() + 1)
                };
                self.put_bytes(data, text);
                self.put_ptr(addr + l.data, data);
                self.put_uint(addr + l.length, text.len() as u64, ptr);
                addr
            }
            StdAbi::GnuCow => {
                let rep = GnuCowRep::new(&t);
                let block = self.alloc(rep.struct_size + text.len() + 1);
                self.put_uint(block + rep.length, text.len() as u64, ptr);
                self.put_uint(block + rep.capacity, text.len() as u64, ptr);
                let chars = block + rep.struct_size;
                self.put_bytes(chars, text);
                let addr = self.alloc(ptr);
                self.put_ptr(addr, chars);
                addr
            }
            StdAbi::Msvc => {
                let l = MsvcString::new(&t);
                let addr = self.alloc(l.struct_size);
                if text.len() < 16 {
                    self.put_bytes(addr + l.bx, text);
                    self.put_uint(addr + l.reserved, 15, ptr);
                } else {
                    let data = self.alloc(text.len() + 1);
                    self.put_bytes(data, text);
                    self.put_ptr(addr + l.bx, data);
                    self.put_uint(addr + l.reserved, text.len() as u64, ptr);
                }
                self.put_uint(addr + l.size, text.len() as u64, ptr);
                addr
            }
        }
    }

    /// `std::vector<int>`, MSVC keeps the pointers after a pointer sized allocator slot.
    pub fn std_vector_of_ints(&mut self, items: &[i32]) -> usize {
        let t = *self.target();
        let l = VectorImpl::new(&t);
        let base = if t.abi == StdAbi::Msvc { t.pointer_size } else { 0 };
        let addr = self.alloc(base + l.struct_size);
        let start = self.alloc(items.len() * 4);
        for (i, item) in items.iter().enumerate() {
            self.put_i32(start + i * 4, *item);
        }
        let finish = start + items.len() * 4;
        self.put_ptr(addr + base + l.start, start);
        self.put_ptr(addr + base + l.finish, finish);
        self.put_ptr(addr + base + l.end_of_storage, finish);
        addr
    }

    /// `std::vector<bool>` packed into `long` words (libstdc++) or `int` words (MSVC).
    pub fn std_vector_of_bools(&mut self, bits: &[bool]) -> usize {
        let t = *self.target();
        let word_size = if t.abi == StdAbi::Msvc {
            t.int_size()
        } else {
            t.long_size()
        };
        let word_bits = word_size * 8;
        let words = self.alloc(bits.len().div_ceil(word_bits).max(1) * word_size);
        for (i, _) in bits.iter().enumerate().filter(|(_, bit)| **bit) {
            let word = words + i / word_bits * word_size;
            let value = MemView::new(self.memory(), t)
                .unsigned(word, word_size)
                .expect("word inside an allocated region");
            self.put_uint(word, value | (1 << (i % word_bits)), word_size);
        }

        if t.abi == StdAbi::Msvc {
            let l = MsvcBitVector::new(&t);
            let addr = self.alloc(l.struct_size);
            let last = words + bits.len().div_ceil(word_bits) * word_size;
            self.put_ptr(addr + l.first, words);
            self.put_ptr(addr + l.last, last);
            self.put_ptr(addr + l.end, last);
            self.put_uint(addr + l.size, bits.len() as u64, t.pointer_size);
            addr
        } else {
            let l = GnuBitVector::new(&t);
            let addr = self.alloc(l.struct_size);
            let finish = words + bits.len() / word_bits * word_size;
            self.put_ptr(addr + l.start, words);
            self.put_i32(addr + l.start_offset, 0);
            self.put_ptr(addr + l.finish, finish);
            self.put_i32(addr + l.finish_offset, (bits.len() % word_bits) as i32);
            self.put_ptr(addr + l.end_of_storage, finish + word_size);
            addr
        }
    }

    /// `std::list<int>`: libstdc++ embeds the sentinel node, MSVC points at it.
    pub fn std_list_of_ints(&mut self, items: &[i32]) -> usize {
        let t = *self.target();
        let node = ListNodeBase::new(&t);
        let (addr, sentinel) = if t.abi == StdAbi::Msvc {
            let l = MsvcList::new(&t);
            let addr = self.alloc(l.struct_size);
            let head = self.alloc(node.struct_size + 4);
            self.put_ptr(addr + l.head, head);
            self.put_uint(addr + l.size, items.len() as u64, t.pointer_size);
            (addr, head)
        } else {
            // node base followed by a size field
            let addr = self.alloc(node.struct_size + t.pointer_size);
            if t.abi == StdAbi::GnuCxx11 {
                self.put_uint(addr + node.struct_size, items.len() as u64, t.pointer_size);
            }
            (addr, addr)
        };

        let mut prev = sentinel;
        for item in items {
            let n = self.alloc(node.struct_size + 4);
            self.put_i32(n + node.struct_size, *item);
            self.put_ptr(n + node.prev, prev);
            self.put_ptr(prev + node.next, n);
            prev = n;
        }
        self.put_ptr(prev + node.next, sentinel);
        self.put_ptr(sentinel + node.prev, prev);
        addr
    }

    /// Red-black tree of `count` nodes as a right leaning chain, return the container
    /// address and node payload addresses in order.
    fn std_tree(&mut self, count: usize, payload_size: usize) -> (usize, Vec<usize>) {
        let t = *self.target();
        let layout = TreeLayout::new(&t);
        let (addr, header) = if t.abi == StdAbi::Msvc {
            let l = MsvcTree::new(&t);
            let addr = self.alloc(l.struct_size);
            let head = self.alloc(MsvcTreeNode::new(&t).struct_size);
            self.put_bytes(head + layout.is_nil, &[1]);
            self.put_ptr(addr + l.head, head);
            self.put_uint(addr + l.size, count as u64, t.pointer_size);
            (addr, head)
        } else {
            let l = GnuRbTree::new(&t);
            let addr = self.alloc(l.struct_size);
            self.put_uint(addr + l.node_count, count as u64, t.pointer_size);
            (addr, addr + l.header)
        };
        // absent children: null for libstdc++, the nil head for MSVC
        let absent = if t.abi == StdAbi::Msvc { header } else { 0 };

        let nodes: Vec<usize> = (0..count)
            .map(|_| self.alloc(layout.value + payload_size))
            .collect();
        for (i, &node) in nodes.iter().enumerate() {
            let parent = if i == 0 { header } else { nodes[i - 1] };
            self.put_ptr(node + layout.parent, parent);
            self.put_ptr(node + layout.left, absent);
            self.put_ptr(node + layout.right, nodes.get(i + 1).copied().unwrap_or(absent));
        }
        let (root, leftmost, rightmost) = match (nodes.first(), nodes.last()) {
            (Some(&first), Some(&last)) => (first, first, last),
            _ if t.abi == StdAbi::Msvc => (header, header, header),
            _ => (0, header, header),
        };
        self.put_ptr(header + layout.parent, root);
        self.put_ptr(header + layout.left, leftmost);
        self.put_ptr(header + layout.right, rightmost);

        let payloads = nodes.iter().map(|node| node + layout.value).collect();
        (addr, payloads)
    }

    /// `std::map<int, int>`, keys in given order.
    pub fn std_map_int_int(&mut self, items: &[(i32, i32)]) -> usize {
        let (addr, payloads) = self.std_tree(items.len(), 8);
        for ((key, value), payload) in items.iter().zip(payloads) {
            self.put_i32(payload, *key);
            self.put_i32(payload + 4, *value);
        }
        addr
    }

    /// `std::set<int>`, items in given order.
    pub fn std_set_of_ints(&mut self, items: &[i32]) -> usize {
        let (addr, payloads) = self.std_tree(items.len(), 4);
        for (item, payload) in items.iter().zip(payloads) {
            self.put_i32(payload, *item);
        }
        addr
    }
}
