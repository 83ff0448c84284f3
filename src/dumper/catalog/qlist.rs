use crate::dumper::catalog::{checked_count, next_node, pointee_of, put_element, MAX_CONTAINER_SIZE};
use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::layout::{vector_payload_offset, QLinkedListData, QLinkedListNode, QListData, QVectorData};
use crate::dumper::memory::{advance, MemView};
use crate::dumper::names::is_movable_type;
use crate::dumper::render::{
    inner_value_or_pointer, inner_value_with_type, put_qstring, InnerSummary, InnerValue,
};
use crate::dumper::walk::{Cap, ChainWalker};

/// Validated `QListData::Data`.
#[derive(Clone, Copy, Debug)]
pub struct ListHeader {
    pub size: usize,
    /// Address of the first used slot.
    pub slots: usize,
}

impl ListHeader {
    pub fn slot(&self, mem: &MemView, idx: usize) -> Result<usize, DumpError> {
        Ok(advance(self.slots, idx * mem.target().pointer_size)?)
    }
}

/// Read a list whose d pointer is at `addr`.
pub fn list_header(mem: &MemView, addr: usize, validate_prefix: usize) -> Result<ListHeader, DumpError> {
    let l = QListData::new(mem.target());
    let d = mem.ptr(addr)?;
    let begin = mem.i32(advance(d, l.begin)?)? as i64;
    let end = mem.i32(advance(d, l.end)?)? as i64;
    let size = checked_count("list size", end - begin, MAX_CONTAINER_SIZE)?;
    let ptr = mem.target().pointer_size;
    let slots = advance(d, l.array + checked_count("list begin", begin, MAX_CONTAINER_SIZE)? * ptr)?;
    if size > 0 {
        let refcount = mem.i32(advance(d, l.refcount)?)?;
        if refcount <= 0 {
            return Err(DumpError::InvalidCount {
                what: "list refcount",
                value: refcount as i64,
            });
        }
        mem.check(slots, size.min(validate_prefix.max(1)) * ptr)?;
    }
    Ok(ListHeader { size, slots })
}

/// Number of elements in a list whose d pointer is at `addr`.
pub fn list_size(mem: &MemView, addr: usize) -> Result<usize, DumpError> {
    Ok(list_header(mem, addr, 1)?.size)
}

/// Summary shared by all sequences: an item count in place of a value.
fn put_sequence_summary(cx: &mut DumpContext, size: usize) {
    cx.out.put_item_count("value", size);
    cx.out.put_item("valuedisabled", "true");
    cx.out.put_item("numchild", size);
}

/// Element type of a sequence, a child type hint for the frontend.
fn sequence_child_type(cx: &DumpContext) -> Option<String> {
    let inner = cx.inner_type();
    (!inner.is_empty()).then(|| inner.to_string())
}

/// True if a list keeps elements in slots instead of pointers to heap nodes.
fn is_internal(cx: &DumpContext) -> bool {
    let size = cx.hints().get(0);
    size <= cx.target().pointer_size as i64 && is_movable_type(cx.inner_type(), cx.ns())
}

pub struct QListHandler;

impl ShapeHandler for QListHandler {
    type Header = ListHeader;

    fn validate(&self, cx: &DumpContext) -> Result<ListHeader, DumpError> {
        list_header(&cx.mem, cx.address()?, cx.caps().validate_prefix)
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &ListHeader) -> Result<(), DumpError> {
        put_sequence_summary(cx, header.size);
        if cx.expand_children() {
            cx.out.put_item("internal", u8::from(is_internal(cx)));
        }
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &ListHeader,
    ) -> Result<InnerValue, DumpError> {
        let inner = cx.inner_type().to_string();
        let pointee = pointee_of(&inner).map(ToString::to_string);
        let internal = is_internal(cx);
        let cap = Cap::new(header.size, cx.caps().container_cap);

        let mut summary = InnerSummary::default();
        for i in 0..cap.shown() {
            put_element(cx, i, &mut summary, |cx| {
                let slot = header.slot(&cx.mem, i)?;
                match (&pointee, internal) {
                    (Some(pointee), _) => {
                        inner_value_or_pointer(cx, &inner, Some(pointee.as_str()), slot)
                    }
                    (None, true) => inner_value_with_type(cx, &inner, slot),
                    (None, false) => {
                        inner_value_or_pointer(cx, &inner, Some(inner.as_str()), slot)
                    }
                }
            });
        }
        cx.put_ellipsis_if_cut(cap, &inner);
        Ok(summary.result())
    }

    fn child_type(&self, cx: &DumpContext, _: &ListHeader) -> Option<String> {
        sequence_child_type(cx)
    }
}

pub struct QStringListHandler;

impl ShapeHandler for QStringListHandler {
    type Header = ListHeader;

    fn validate(&self, cx: &DumpContext) -> Result<ListHeader, DumpError> {
        let header = list_header(&cx.mem, cx.address()?, cx.caps().validate_prefix)?;
        if header.size > 0 {
            // last element must be reachable too
            let last = header.slot(&cx.mem, header.size - 1)?;
            cx.mem.check(last, cx.target().pointer_size)?;
        }
        Ok(header)
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &ListHeader) -> Result<(), DumpError> {
        put_sequence_summary(cx, header.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &ListHeader,
    ) -> Result<InnerValue, DumpError> {
        let cap = Cap::new(header.size, cx.caps().container_cap);
        let mut summary = InnerSummary::default();
        for i in 0..cap.shown() {
            put_element(cx, i, &mut summary, |cx| {
                let slot = header.slot(&cx.mem, i)?;
                put_qstring(cx, "value", slot)?;
                Ok(InnerValue::NoFurtherChildren)
            });
        }
        let string_type = cx.ns_type("QString");
        cx.put_ellipsis_if_cut(cap, &string_type);
        Ok(summary.result())
    }

    fn child_type(&self, cx: &DumpContext, _: &ListHeader) -> Option<String> {
        Some(cx.ns_type("QString"))
    }
}

/// Validated `QVectorData` with element geometry.
#[derive(Clone, Copy, Debug)]
pub struct VectorHeader {
    size: usize,
    /// Address of the first element.
    data: usize,
    stride: usize,
}

pub struct QVectorHandler;

impl ShapeHandler for QVectorHandler {
    type Header = VectorHeader;

    fn validate(&self, cx: &DumpContext) -> Result<VectorHeader, DumpError> {
        let l = QVectorData::new(cx.target());
        let d = cx.mem.ptr(cx.address()?)?;
        let size = cx.mem.i32(advance(d, l.size)?)? as i64;
        let size = checked_count("vector size", size, MAX_CONTAINER_SIZE)?;
        if size == 0 {
            return Ok(VectorHeader {
                size,
                data: d,
                stride: 0,
            });
        }

        let alloc = cx.mem.i32(advance(d, l.alloc)?)? as i64;
        if alloc < size as i64 {
            return Err(DumpError::InvalidCount {
                what: "vector capacity",
                value: alloc,
            });
        }
        let stride = cx.hints().size(0, "vector element size")?;
        let payload = match cx.hints().get(1) {
            off if off > 0 => off as usize,
            _ => vector_payload_offset(cx.target(), stride.min(8)),
        };
        let data = advance(d, payload)?;
        cx.mem
            .check(data, size.min(cx.caps().validate_prefix.max(1)) * stride)?;
        Ok(VectorHeader { size, data, stride })
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &VectorHeader) -> Result<(), DumpError> {
        put_sequence_summary(cx, header.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &VectorHeader,
    ) -> Result<InnerValue, DumpError> {
        let inner = cx.inner_type().to_string();
        let pointee = pointee_of(&inner).map(ToString::to_string);
        let cap = Cap::new(header.size, cx.caps().container_cap);

        let mut summary = InnerSummary::default();
        for i in 0..cap.shown() {
            put_element(cx, i, &mut summary, |cx| {
                let addr = advance(header.data, i * header.stride)?;
                inner_value_or_pointer(cx, &inner, pointee.as_deref(), addr)
            });
        }
        cx.put_ellipsis_if_cut(cap, &inner);
        Ok(summary.result())
    }

    fn child_type(&self, cx: &DumpContext, _: &VectorHeader) -> Option<String> {
        sequence_child_type(cx)
    }
}

/// Validated `QLinkedListData`: the ring header and an element count.
#[derive(Clone, Copy, Debug)]
pub struct LinkedListHeader {
    d: usize,
    size: usize,
}

pub struct QLinkedListHandler;

impl ShapeHandler for QLinkedListHandler {
    type Header = LinkedListHeader;

    fn validate(&self, cx: &DumpContext) -> Result<LinkedListHeader, DumpError> {
        let l = QLinkedListData::new(cx.target());
        let d = cx.mem.ptr(cx.address()?)?;
        let size = cx.mem.i32(advance(d, l.size)?)? as i64;
        let size = checked_count("linked list size", size, MAX_CONTAINER_SIZE)?;
        Ok(LinkedListHeader { d, size })
    }

    fn render_summary(
        &self,
        cx: &mut DumpContext,
        header: &LinkedListHeader,
    ) -> Result<(), DumpError> {
        put_sequence_summary(cx, header.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &LinkedListHeader,
    ) -> Result<InnerValue, DumpError> {
        let inner = cx.inner_type().to_string();
        let pointee = pointee_of(&inner).map(ToString::to_string);
        let cap = Cap::new(header.size, cx.caps().container_cap);
        let link = QLinkedListNode::new(cx.target());
        let first = cx.mem.deref_at(header.d, QLinkedListData::new(cx.target()).next)?;
        let mut walker = ChainWalker::new(cx.mem, first, link.next, header.d)
            .with_limit(cap.shown().min(cx.caps().node_walk_limit));

        let mut summary = InnerSummary::default();
        let mut i = 0;
        while let Some(node) = next_node(&mut walker) {
            put_element(cx, i, &mut summary, |cx| {
                let payload = advance(node, link.struct_size)?;
                inner_value_or_pointer(cx, &inner, pointee.as_deref(), payload)
            });
            i += 1;
        }
        cx.put_ellipsis_if_cut(cap, &inner);
        Ok(summary.result())
    }

    fn child_type(&self, cx: &DumpContext, _: &LinkedListHeader) -> Option<String> {
        sequence_child_type(cx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DumperConfig;
    use crate::dumper::memory::{SimHeap, Target};
    use crate::dumper::request::InspectionRequest;
    use crate::dumper::Dumper;

    // ----------------------------------------- test helpers ------------------------------------------

    fn dump(heap: SimHeap, request: InspectionRequest) -> String {
        let t = *heap.target();
        let mem = heap.into_memory();
        Dumper::new(DumperConfig::default().with_target(t))
            .dump(&request, &mem)
            .payload
    }

    // ---------------------------------------------------------------------------------------------

    #[test]
    fn test_qlist_internal_ints() {
        let mut heap = SimHeap::new(Target::default());
        let addr = heap.qlist_of_ints(&[7, 8]);
        let out = dump(
            heap,
            InspectionRequest::new("QList<int>", "local.l")
                .with_address(addr)
                .with_inner("int")
                .with_hints([4, 0, 0, 0])
                .with_children(true),
        );
        assert!(out.contains(r#"value="<2 items>",valuedisabled="true",numchild="2",internal="1",children=["#));
        assert!(out.contains(r#"type="int",value="7",numchild="0"}"#));
        assert!(out.ends_with(r#"type="int",value="8",numchild="0"}],childtype="int",childnumchild="0""#));
    }

    #[test]
    fn test_qlist_by_pointer_elements() {
        let t = Target {
            pointer_size: 4,
            ..Target::default()
        };
        let mut heap = SimHeap::new(t);
        let a = heap.alloc(8);
        heap.put_f64(a, 0.5);
        let addr = heap.qlist_slots(&[a]);
        let out = dump(
            heap,
            InspectionRequest::new("QList<double>", "local.l")
                .with_address(addr)
                .with_inner("double")
                .with_hints([8, 0, 0, 0])
                .with_children(true),
        );
        assert!(out.contains(r#"internal="0""#));
        assert!(out.contains(&format!(
            r#"{{name="0",addr="{a:#x}",saddr="{a:#x}",type="double",value="0.5",numchild="0"}}"#
        )));
    }

    #[test]
    fn test_qlist_negative_size() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let addr = heap.qlist_of_ints(&[1, 2, 3]);
        let d = MemView::new(heap.memory(), t).ptr(addr).unwrap();
        heap.put_i32(d + QListData::new(&t).end, -4);
        let out = dump(
            heap,
            InspectionRequest::new("QList<int>", "local.l")
                .with_address(addr)
                .with_children(true),
        );
        assert!(out.ends_with(r#"value="<internal error>",numchild="0""#));
        assert!(!out.contains("children"));
    }

    #[test]
    fn test_qstringlist() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let first = heap.qstring("a");
        let second = heap.qstring("b");
        let d_first = MemView::new(heap.memory(), t).ptr(first).unwrap();
        let d_second = MemView::new(heap.memory(), t).ptr(second).unwrap();
        let addr = heap.qlist_slots(&[d_first, d_second]);
        let out = dump(
            heap,
            InspectionRequest::new("QStringList", "local.sl")
                .with_address(addr)
                .with_children(true),
        );
        assert!(out.contains(r#"children=[{name="0",value="YQA=",valueencoded="2",numchild="0"},{name="1",value="YgA=",valueencoded="2",numchild="0"}]"#));
        assert!(out.ends_with(r#"childtype="QString",childnumchild="0""#));
    }

    #[test]
    fn test_qvector() {
        let mut heap = SimHeap::new(Target::default());
        let addr = heap.qvector_of_ints(&[3, 4, 5]);
        let out = dump(
            heap,
            InspectionRequest::new("QVector<int>", "local.v")
                .with_address(addr)
                .with_inner("int")
                .with_hints([4, 0, 0, 0])
                .with_children(true),
        );
        assert!(out.contains(r#"value="<3 items>""#));
        assert!(out.contains(r#"type="int",value="5",numchild="0"}]"#));
    }

    #[test]
    fn test_qvector_missing_element_size() {
        let mut heap = SimHeap::new(Target::default());
        let addr = heap.qvector_of_ints(&[3]);
        let out = dump(
            heap,
            InspectionRequest::new("QVector<int>", "local.v").with_address(addr),
        );
        assert!(out.ends_with(r#"value="<internal error>",numchild="0""#));
    }

    #[test]
    fn test_qlinkedlist_chain() {
        let mut heap = SimHeap::new(Target::default());
        let addr = heap.qlinkedlist_of_ints(&[1, 2, 3]);
        let out = dump(
            heap,
            InspectionRequest::new("QLinkedList<int>", "local.ll")
                .with_address(addr)
                .with_inner("int")
                .with_children(true),
        );
        assert!(out.contains(r#"numchild="3",children=[{name="0","#));
        for (i, v) in [1, 2, 3].iter().enumerate() {
            assert!(out.contains(&format!(r#"{{name="{i}",addr="#)));
            assert!(out.contains(&format!(r#"type="int",value="{v}",numchild="0"}}"#)));
        }
        assert!(!out.contains("<incomplete>"));
    }

    #[test]
    fn test_qlinkedlist_broken_link() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let addr = heap.qlinkedlist_of_ints(&[1, 2, 3]);
        let first = {
            let view = MemView::new(heap.memory(), t);
            let d = view.ptr(addr).unwrap();
            view.ptr(d).unwrap()
        };
        let dangling = heap.dangling();
        heap.put_ptr(first, dangling);
        let out = dump(
            heap,
            InspectionRequest::new("QLinkedList<int>", "local.ll")
                .with_address(addr)
                .with_inner("int")
                .with_children(true),
        );
        // first node is still shown, the walk stops at the broken link
        assert!(out.contains(r#"value="1""#));
        assert!(!out.contains(r#"value="2""#));
        assert!(out.contains(r#"numchild="3""#));
    }
}
