use crate::dumper::catalog::{checked_count, next_node, pointee_of, put_element, MAX_CONTAINER_SIZE};
use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::layout::{
    pair_second_offset, value_shape, GnuBitVector, GnuRbTree, ListNodeBase, MsvcBitVector, MsvcList,
    MsvcTree, TreeLayout, VectorImpl,
};
use crate::dumper::memory::{advance, MemView, StdAbi};
use crate::dumper::names::is_simple_type;
use crate::dumper::render::{
    inner_value, inner_value_or_pointer, read_std_string, InnerSummary, InnerValue,
};
use crate::dumper::walk::{Cap, ChainWalker, TreeWalker};
use crate::dumper::wire::Encoding;
use bit_field::BitField;
use crate::muted_error;
use bytes::Bytes;
use fallible_iterator::FallibleIterator;

/// Summary shared by standard library containers.
fn put_std_summary(cx: &mut DumpContext, size: usize) {
    cx.out.put_item_count("value", size);
    cx.out.put_item("valuedisabled", "true");
    cx.out.put_item("numchild", size);
}

/// `std::string` and `std::wstring`.
pub struct StdStringHandler {
    pub wide: bool,
}

impl StdStringHandler {
    fn char_size(&self, cx: &DumpContext) -> usize {
        if self.wide {
            cx.target().wchar_size()
        } else {
            1
        }
    }
}

impl ShapeHandler for StdStringHandler {
    type Header = Bytes;

    fn validate(&self, cx: &DumpContext) -> Result<Bytes, DumpError> {
        read_std_string(&cx.mem, cx.address()?, self.char_size(cx))
    }

    fn render_summary(&self, cx: &mut DumpContext, units: &Bytes) -> Result<(), DumpError> {
        let encoding = Encoding::for_unit_width(self.char_size(cx));
        cx.out.put_encoded("value", units, encoding);
        cx.out.put_item("numchild", 0);
        Ok(())
    }

    fn enumerate_children(&self, _: &mut DumpContext, _: &Bytes) -> Result<InnerValue, DumpError> {
        Ok(InnerValue::ChildrenSpecified)
    }
}

// ----------------------------------------------- vector ------------------------------------------

/// Distance in bytes between two pointers of a contiguous container, `to` must not precede `from`.
fn pointer_span(what: &'static str, from: usize, to: usize) -> Result<usize, DumpError> {
    to.checked_sub(from).ok_or(DumpError::InvalidCount {
        what,
        value: -saturating_i64(from - to),
    })
}

fn saturating_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Address of the implementation pointers, MSVC keeps them at the end of the object
/// after the allocator.
fn vector_impl_addr(mem: &MemView, addr: usize) -> Result<usize, DumpError> {
    let t = mem.target();
    Ok(match t.abi {
        StdAbi::Msvc => advance(addr, t.pointer_size)?,
        StdAbi::GnuCxx11 | StdAbi::GnuCow => addr,
    })
}

#[derive(Clone, Copy, Debug)]
pub struct StdVectorHeader {
    start: usize,
    size: usize,
    stride: usize,
}

pub struct StdVectorHandler;

impl ShapeHandler for StdVectorHandler {
    type Header = StdVectorHeader;

    fn validate(&self, cx: &DumpContext) -> Result<StdVectorHeader, DumpError> {
        let l = VectorImpl::new(cx.target());
        let v = vector_impl_addr(&cx.mem, cx.address()?)?;
        let start = cx.mem.deref_at(v, l.start)?;
        let finish = cx.mem.deref_at(v, l.finish)?;
        let end_of_storage = cx.mem.deref_at(v, l.end_of_storage)?;
        let stride = cx.hints().size(0, "vector element size")?;

        let bytes = pointer_span("vector size", start, finish)?;
        let size = checked_count(
            "vector size",
            saturating_i64(bytes / stride),
            MAX_CONTAINER_SIZE,
        )?;
        pointer_span("vector capacity", finish, end_of_storage)?;
        if size > 0 {
            cx.mem
                .check(start, size.min(cx.caps().validate_prefix.max(1)) * stride)?;
        }
        Ok(StdVectorHeader {
            start,
            size,
            stride,
        })
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &StdVectorHeader) -> Result<(), DumpError> {
        put_std_summary(cx, header.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &StdVectorHeader,
    ) -> Result<InnerValue, DumpError> {
        let inner = cx.inner_type().to_string();
        let pointee = pointee_of(&inner).map(ToString::to_string);
        let cap = Cap::new(header.size, cx.caps().container_cap);

        let mut summary = InnerSummary::default();
        for i in 0..cap.shown() {
            put_element(cx, i, &mut summary, |cx| {
                let addr = advance(header.start, i * header.stride)?;
                inner_value_or_pointer(cx, &inner, pointee.as_deref(), addr)
            });
        }
        cx.put_ellipsis_if_cut(cap, &inner);
        Ok(summary.result())
    }
}

/// Packed bits of a `std::vector<bool>`: words of `word_size` bytes,
/// the first element is bit `first_bit` of the first word.
#[derive(Clone, Copy, Debug)]
pub struct BitVector {
    words: usize,
    word_size: usize,
    first_bit: usize,
    size: usize,
}

impl BitVector {
    fn read(mem: &MemView, addr: usize) -> Result<Self, DumpError> {
        let t = *mem.target();
        let bits = match t.abi {
            StdAbi::Msvc => {
                let l = MsvcBitVector::new(&t);
                let words = mem.deref_at(addr, l.first)?;
                let size = mem.signed(advance(addr, l.size)?, t.pointer_size)?;
                BitVector {
                    words,
                    word_size: t.int_size(),
                    first_bit: 0,
                    size: checked_count("bit vector size", size, MAX_CONTAINER_SIZE)?,
                }
            }
            StdAbi::GnuCxx11 | StdAbi::GnuCow => {
                let l = GnuBitVector::new(&t);
                let start = mem.deref_at(addr, l.start)?;
                let start_offset = mem.u32(advance(addr, l.start_offset)?)? as i64;
                let finish = mem.deref_at(addr, l.finish)?;
                let finish_offset = mem.u32(advance(addr, l.finish_offset)?)? as i64;
                let word_size = t.long_size();
                let words = pointer_span("bit vector size", start, finish)? / word_size;
                let size = saturating_i64(words)
                    .checked_mul(8 * word_size as i64)
                    .and_then(|bits| bits.checked_add(finish_offset - start_offset))
                    .ok_or(DumpError::InvalidCount {
                        what: "bit vector size",
                        value: saturating_i64(words),
                    })?;
                BitVector {
                    words: start,
                    word_size,
                    first_bit: start_offset as usize,
                    size: checked_count("bit vector size", size, MAX_CONTAINER_SIZE)?,
                }
            }
        };
        if bits.size > 0 {
            mem.check(bits.words, bits.word_size)?;
        }
        Ok(bits)
    }

    fn bit(&self, mem: &MemView, idx: usize) -> Result<bool, DumpError> {
        let word_bits = self.word_size * 8;
        let pos = self.first_bit + idx;
        let word = advance(self.words, pos / word_bits * self.word_size)?;
        let value = mem.unsigned(word, self.word_size)?;
        Ok(value.get_bit(pos % word_bits))
    }
}

pub struct StdVectorBoolHandler;

impl ShapeHandler for StdVectorBoolHandler {
    type Header = BitVector;

    fn validate(&self, cx: &DumpContext) -> Result<BitVector, DumpError> {
        BitVector::read(&cx.mem, cx.address()?)
    }

    fn render_summary(&self, cx: &mut DumpContext, bits: &BitVector) -> Result<(), DumpError> {
        put_std_summary(cx, bits.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        bits: &BitVector,
    ) -> Result<InnerValue, DumpError> {
        let cap = Cap::new(bits.size, cx.caps().container_cap);
        for i in 0..cap.shown() {
            cx.child(i, |cx| {
                let value = bits.bit(&cx.mem, i)?;
                cx.out.put_item("value", value);
                Ok(())
            });
        }
        cx.put_ellipsis_if_cut(cap, "bool");
        Ok(InnerValue::NoFurtherChildren)
    }

    fn child_type(&self, _: &DumpContext, _: &BitVector) -> Option<String> {
        Some("bool".to_string())
    }
}

// ------------------------------------------------ list -------------------------------------------

/// Ring of `std::list` nodes: the first node and the sentinel that ends the walk.
#[derive(Clone, Copy, Debug)]
pub struct StdListHeader {
    first: usize,
    sentinel: usize,
    /// Element count kept by the list, or nodes seen while counting up to one past the count cap.
    size: usize,
    /// List has no size field and holds more nodes than the count cap.
    uncounted: bool,
}

/// `std::list`. Lists without a size field (copy-on-write libstdc++) are counted by a walk
/// that stops one past `std_list_count_cap`, such a list reports `numchild` of the cap plus one
/// and emits at most `std_list_count_cap` children followed by an ellipsis.
pub struct StdListHandler;

impl StdListHandler {
    fn ring(mem: &MemView, addr: usize) -> Result<(usize, usize), DumpError> {
        let t = mem.target();
        let node = ListNodeBase::new(t);
        let sentinel = match t.abi {
            StdAbi::Msvc => mem.deref_at(addr, MsvcList::new(t).head)?,
            StdAbi::GnuCxx11 | StdAbi::GnuCow => addr,
        };
        let first = mem.deref_at(sentinel, node.next)?;
        mem.check(mem.deref_at(sentinel, node.prev)?, node.struct_size)?;
        Ok((first, sentinel))
    }

    /// Size field of a list, libstdc++ keeps it after the sentinel node since the C++11 ABI.
    fn stored_size(mem: &MemView, addr: usize) -> Result<Option<i64>, DumpError> {
        let t = mem.target();
        let offset = match t.abi {
            StdAbi::Msvc => MsvcList::new(t).size,
            StdAbi::GnuCxx11 => ListNodeBase::new(t).struct_size,
            StdAbi::GnuCow => return Ok(None),
        };
        Ok(Some(mem.signed(advance(addr, offset)?, t.pointer_size)?))
    }
}

impl ShapeHandler for StdListHandler {
    type Header = StdListHeader;

    fn validate(&self, cx: &DumpContext) -> Result<StdListHeader, DumpError> {
        let addr = cx.address()?;
        let (first, sentinel) = Self::ring(&cx.mem, addr)?;
        let next = ListNodeBase::new(cx.target()).next;
        let cap = cx.caps().std_list_count_cap;
        let mut walker = ChainWalker::new(cx.mem, first, next, sentinel).with_limit(cap + 1);
        while walker.next()?.is_some() {}
        let counted = walker.visited();

        let Some(stored) = Self::stored_size(&cx.mem, addr)? else {
            return Ok(StdListHeader {
                first,
                sentinel,
                size: counted,
                uncounted: counted > cap,
            });
        };
        let size = checked_count("list size", stored, MAX_CONTAINER_SIZE)?;
        let consistent = if counted > cap {
            size >= counted
        } else {
            size == counted
        };
        if !consistent {
            return Err(DumpError::InvalidCount {
                what: "list size",
                value: stored,
            });
        }
        Ok(StdListHeader {
            first,
            sentinel,
            size,
            uncounted: false,
        })
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &StdListHeader) -> Result<(), DumpError> {
        if header.uncounted {
            let cap = cx.caps().std_list_count_cap;
            cx.out.put_item("value", format!("<more than {cap} items>"));
        } else {
            cx.out.put_item_count("value", header.size);
        }
        cx.out.put_item("numchild", header.size);
        cx.out.put_item("valuedisabled", "true");
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &StdListHeader,
    ) -> Result<InnerValue, DumpError> {
        let inner = cx.inner_type().to_string();
        let pointee = pointee_of(&inner).map(ToString::to_string);
        let node = ListNodeBase::new(cx.target());
        let count_cap = cx.caps().std_list_count_cap;
        let limit = if header.uncounted {
            cx.caps().container_cap.min(count_cap)
        } else {
            cx.caps().container_cap
        };
        let cap = Cap::new(header.size, limit);
        let mut walker = ChainWalker::new(cx.mem, header.first, node.next, header.sentinel)
            .with_limit(cap.shown());

        let mut summary = InnerSummary::default();
        let mut i = 0;
        while let Some(n) = next_node(&mut walker) {
            put_element(cx, i, &mut summary, |cx| {
                let payload = advance(n, node.struct_size)?;
                inner_value_or_pointer(cx, &inner, pointee.as_deref(), payload)
            });
            i += 1;
        }
        if header.uncounted {
            cx.out.put_ellipsis(&inner, format!("more than {count_cap}"));
        } else {
            cx.put_ellipsis_if_cut(cap, &inner);
        }
        Ok(summary.result())
    }
}

// --------------------------------------------- map and set ---------------------------------------

/// Red-black tree of a `std::map` or `std::set`: header node and a node count.
#[derive(Clone, Copy, Debug)]
pub struct StdTreeHeader {
    header: usize,
    size: usize,
}

impl StdTreeHeader {
    fn read(mem: &MemView, addr: usize) -> Result<Self, DumpError> {
        let t = *mem.target();
        let ptr = t.pointer_size;
        let (header, size) = match t.abi {
            StdAbi::Msvc => {
                let l = MsvcTree::new(&t);
                let head = mem.deref_at(addr, l.head)?;
                (head, mem.signed(advance(addr, l.size)?, ptr)?)
            }
            StdAbi::GnuCxx11 | StdAbi::GnuCow => {
                let l = GnuRbTree::new(&t);
                (
                    advance(addr, l.header)?,
                    mem.signed(advance(addr, l.node_count)?, ptr)?,
                )
            }
        };
        let size = checked_count("tree size", size, MAX_CONTAINER_SIZE)?;
        if size > 0 {
            let layout = TreeLayout::new(&t);
            mem.check(mem.deref_at(header, layout.left)?, layout.value)?;
            mem.check(mem.deref_at(header, layout.right)?, layout.value)?;
        }
        Ok(StdTreeHeader { header, size })
    }

    fn walker<'a>(&self, cx: &DumpContext<'a>, limit: usize) -> Result<TreeWalker<'a>, DumpError> {
        let layout = TreeLayout::new(cx.target());
        Ok(TreeWalker::new(cx.mem, layout, self.header)?
            .with_limit(limit.min(cx.caps().node_walk_limit)))
    }
}

/// `std::pair<const K, V >` out of the allocator template parameter.
fn pair_type(allocator: &str) -> &str {
    let pair = allocator.strip_prefix("std::allocator<").unwrap_or(allocator);
    pair.strip_suffix('>')
        .map(str::trim_end)
        .unwrap_or(pair)
}

/// Key and value types of a `std::map` with the value placement inside a node payload.
#[derive(Clone, Debug)]
struct StdMapGeometry {
    key_type: String,
    value_type: String,
    pair_type: String,
    value_offset: usize,
}

impl StdMapGeometry {
    /// Value offset comes from hint 2, for well known key and value types it is computed
    /// when the hint is absent.
    fn new(cx: &DumpContext) -> Result<Self, DumpError> {
        let key_type = cx.template_parameter(0)?.to_string();
        let value_type = cx.template_parameter(1)?.to_string();
        let pair_type = match cx.template_parameter(3) {
            Ok(allocator) => pair_type(allocator).to_string(),
            Err(_) => format!("std::pair<const {key_type}, {value_type} >"),
        };
        let value_offset = match cx.hints().get(2) {
            off if off > 0 => off as usize,
            _ => {
                let t = cx.target();
                let key = value_shape(&key_type, t).ok_or(DumpError::MissingHint("map value offset"))?;
                let value =
                    value_shape(&value_type, t).ok_or(DumpError::MissingHint("map value offset"))?;
                pair_second_offset(t, key, value)
            }
        };
        Ok(Self {
            key_type,
            value_type,
            pair_type,
            value_offset,
        })
    }
}

pub struct StdMapHandler;

impl ShapeHandler for StdMapHandler {
    type Header = StdTreeHeader;

    fn validate(&self, cx: &DumpContext) -> Result<StdTreeHeader, DumpError> {
        StdTreeHeader::read(&cx.mem, cx.address()?)
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &StdTreeHeader) -> Result<(), DumpError> {
        put_std_summary(cx, header.size);
        if let Some(geometry) = muted_error!(StdMapGeometry::new(cx), "map geometry:") {
            cx.out.put_item("valueoffset", geometry.value_offset);
            cx.out.put_item("pairtype", &geometry.pair_type);
        }
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &StdTreeHeader,
    ) -> Result<InnerValue, DumpError> {
        let geometry = StdMapGeometry::new(cx)?;
        let simple = is_simple_type(&geometry.key_type) && is_simple_type(&geometry.value_type);
        let cap = Cap::new(header.size, cx.caps().container_cap);
        let mut walker = header.walker(cx, cap.shown())?;

        let mut summary = InnerSummary::default();
        let mut i = 0;
        while let Some(node) = next_node(&mut walker) {
            let payload = walker.value_addr(node)?;
            put_element(cx, i, &mut summary, |cx| {
                inner_value(cx, &geometry.key_type, payload, "key")?;
                let value = advance(payload, geometry.value_offset)?;
                let inner = inner_value(cx, &geometry.value_type, value, "value")?;
                if simple {
                    cx.out.put_item("type", &geometry.value_type);
                    cx.out.put_address("addr", value);
                    Ok(inner)
                } else {
                    cx.out.put_address("addr", payload);
                    cx.out.put_item("type", &geometry.pair_type);
                    cx.out.put_item("numchild", 2);
                    Ok(InnerValue::ChildrenSpecified)
                }
            });
            i += 1;
        }
        cx.put_ellipsis_if_cut(cap, &geometry.pair_type);
        Ok(summary.result())
    }
}

pub struct StdSetHandler;

impl ShapeHandler for StdSetHandler {
    type Header = StdTreeHeader;

    fn validate(&self, cx: &DumpContext) -> Result<StdTreeHeader, DumpError> {
        StdTreeHeader::read(&cx.mem, cx.address()?)
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &StdTreeHeader) -> Result<(), DumpError> {
        put_std_summary(cx, header.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &StdTreeHeader,
    ) -> Result<InnerValue, DumpError> {
        let inner = cx.inner_type().to_string();
        let pointee = pointee_of(&inner).map(ToString::to_string);
        let cap = Cap::new(header.size, cx.caps().container_cap);
        let mut walker = header.walker(cx, cap.shown())?;

        let mut summary = InnerSummary::default();
        let mut i = 0;
        while let Some(node) = next_node(&mut walker) {
            let payload = walker.value_addr(node)?;
            put_element(cx, i, &mut summary, |cx| {
                inner_value_or_pointer(cx, &inner, pointee.as_deref(), payload)
            });
            i += 1;
        }
        cx.put_ellipsis_if_cut(cap, &inner);
        Ok(summary.result())
    }
}
