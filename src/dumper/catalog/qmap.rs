use crate::dumper::catalog::{checked_count, next_node, put_element, MAX_CONTAINER_SIZE};
use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::layout::{map_node_offsets, map_node_shape, value_shape, MapNodeOffsets, QMapData};
use crate::dumper::memory::{advance, offset, StdAbi};
use crate::dumper::names::is_simple_type;
use crate::dumper::render::{inner_value, InnerSummary, InnerValue};
use crate::dumper::walk::{Cap, ChainWalker};

/// Key and value types with their offsets from a node link.
#[derive(Clone, Debug)]
pub struct MapGeometry {
    key_type: String,
    value_type: String,
    offsets: MapNodeOffsets,
}

impl MapGeometry {
    /// Node size and value offset come from hints 2 and 3, for well known
    /// key and value types they are computed when hints are absent.
    fn new(cx: &DumpContext) -> Result<Self, DumpError> {
        let key_type = cx.template_parameter(0)?.to_string();
        let value_type = cx.template_parameter(1)?.to_string();
        let t = cx.target();
        let (node_size, value_offset) = match cx.hints().get(2) {
            size if size > 0 => (size as usize, cx.hints().offset(3, "map value offset")?),
            _ => {
                let key = value_shape(&key_type, t).ok_or(DumpError::MissingHint("map node size"))?;
                let value =
                    value_shape(&value_type, t).ok_or(DumpError::MissingHint("map node size"))?;
                let (value_offset, node_size) = map_node_shape(t, key, value);
                (node_size, value_offset)
            }
        };
        Ok(Self {
            offsets: map_node_offsets(t, node_size, value_offset),
            key_type,
            value_type,
        })
    }

    fn node_type(&self, cx: &DumpContext) -> String {
        let end = if cx.target().abi == StdAbi::Msvc { ">" } else { " >" };
        format!(
            "{}<{},{}{end}",
            cx.ns_type("QMapNode"),
            self.key_type,
            self.value_type
        )
    }
}

/// Validated `QMapData`: a ring header and an element count.
#[derive(Clone, Copy, Debug)]
pub struct MapHeader {
    d: usize,
    size: usize,
}

pub struct QMapHandler;

impl ShapeHandler for QMapHandler {
    type Header = MapHeader;

    fn validate(&self, cx: &DumpContext) -> Result<MapHeader, DumpError> {
        let l = QMapData::new(cx.target());
        let d = cx.mem.ptr(cx.address()?)?;
        let size = cx.mem.i32(advance(d, l.size)?)? as i64;
        let size = checked_count("map size", size, MAX_CONTAINER_SIZE)?;
        if size > 0 {
            let ptr = cx.target().pointer_size;
            let backward = cx.mem.deref_at(d, l.backward)?;
            let first = cx.mem.deref_at(d, l.forward)?;
            cx.mem.check(backward, 2 * ptr)?;
            cx.mem.check(first, 2 * ptr)?;
        }
        Ok(MapHeader { d, size })
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &MapHeader) -> Result<(), DumpError> {
        cx.out.put_item_count("value", header.size);
        cx.out.put_item("numchild", header.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &MapHeader,
    ) -> Result<InnerValue, DumpError> {
        let geometry = MapGeometry::new(cx)?;
        let simple = is_simple_type(&geometry.key_type) && is_simple_type(&geometry.value_type);
        let node_type = geometry.node_type(cx);
        let cap = Cap::new(header.size, cx.caps().container_cap);

        let ptr = cx.target().pointer_size;
        let first = cx.mem.deref_at(header.d, QMapData::new(cx.target()).forward)?;
        let mut walker = ChainWalker::new(cx.mem, first, ptr, header.d)
            .with_limit(cap.shown().min(cx.caps().node_walk_limit));

        let mut summary = InnerSummary::default();
        let mut i = 0;
        while let Some(node) = next_node(&mut walker) {
            put_element(cx, i, &mut summary, |cx| {
                let key = offset(node, geometry.offsets.key)?;
                let value = offset(node, geometry.offsets.value)?;
                inner_value(cx, &geometry.key_type, key, "key")?;
                let inner = inner_value(cx, &geometry.value_type, value, "value")?;
                if simple {
                    cx.out.put_item("type", &geometry.value_type);
                    cx.out.put_address("addr", value);
                    Ok(inner)
                } else {
                    cx.out.put_address("addr", node);
                    cx.out.put_item("type", &node_type);
                    cx.out.put_item("numchild", 2);
                    Ok(InnerValue::ChildrenSpecified)
                }
            });
            i += 1;
        }
        cx.put_ellipsis_if_cut(cap, &node_type);
        Ok(summary.result())
    }
}

/// A single map node, `addr` points at the node link part.
pub struct QMapNodeHandler;

impl ShapeHandler for QMapNodeHandler {
    type Header = MapGeometry;

    fn validate(&self, cx: &DumpContext) -> Result<MapGeometry, DumpError> {
        let addr = cx.address()?;
        let ptr = cx.target().pointer_size;
        cx.mem.check(cx.mem.ptr(addr)?, ptr)?;
        cx.mem.check(cx.mem.deref_at(addr, ptr)?, ptr)?;
        MapGeometry::new(cx)
    }

    fn render_summary(&self, cx: &mut DumpContext, _: &MapGeometry) -> Result<(), DumpError> {
        cx.out.put_item("value", "");
        cx.out.put_item("numchild", 2);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        geometry: &MapGeometry,
    ) -> Result<InnerValue, DumpError> {
        let addr = cx.address()?;
        let mut key_summary = InnerSummary::default();
        let mut value_summary = InnerSummary::default();
        put_element(cx, "key", &mut key_summary, |cx| {
            let key = offset(addr, geometry.offsets.key)?;
            cx.out.put_address("addr", key);
            cx.out.put_item("type", &geometry.key_type);
            inner_value(cx, &geometry.key_type, key, "value")
        });
        put_element(cx, "value", &mut value_summary, |cx| {
            let value = offset(addr, geometry.offsets.value)?;
            cx.out.put_address("addr", value);
            cx.out.put_item("type", &geometry.value_type);
            inner_value(cx, &geometry.value_type, value, "value")
        });
        // like a two element container, `childnumchild` follows the value
        Ok(value_summary.result())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DumperConfig;
    use crate::dumper::memory::{SimHeap, Target};
    use crate::dumper::request::InspectionRequest;
    use crate::dumper::Dumper;

    fn dump(heap: SimHeap, request: InspectionRequest) -> String {
        let t = *heap.target();
        let mem = heap.into_memory();
        Dumper::new(DumperConfig::default().with_target(t))
            .dump(&request, &mem)
            .payload
    }

    #[test]
    fn test_qmap_in_order() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let addr = heap.qmap_int_int(&[(1, 100), (2, 200), (3, 300)]);
        let (value_offset, node_size) = map_node_shape(&t, (4, 4), (4, 4));
        let out = dump(
            heap,
            InspectionRequest::new("QMap<int, int>", "local.m")
                .with_address(addr)
                .with_inner("int@int")
                .with_hints([4, 4, node_size as i64, value_offset as i64])
                .with_children(true),
        );
        assert!(out.contains(r#"value="<3 items>",numchild="3",children=[{name="0",key="1",value="100",type="int""#));
        assert!(out.contains(r#"{name="2",key="3",value="300",type="int""#));
        assert!(out.ends_with(r#"numchild="0"}],childnumchild="0""#));
    }

    #[test]
    fn test_qmap_without_hints() {
        let mut heap = SimHeap::new(Target::default());
        let addr = heap.qmap_int_int(&[(7, 70)]);
        let out = dump(
            heap,
            InspectionRequest::new("QMap<int, int>", "local.m")
                .with_address(addr)
                .with_inner("int@int")
                .with_children(true),
        );
        assert!(out.contains(r#"key="7",value="70""#));
    }

    #[test]
    fn test_qmap_unreadable_node() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let addr = heap.qmap_int_int(&[(1, 1)]);
        let d = crate::dumper::memory::MemView::new(heap.memory(), t)
            .ptr(addr)
            .unwrap();
        let dangling = heap.dangling();
        heap.put_ptr(d + QMapData::new(&t).forward, dangling);
        let out = dump(
            heap,
            InspectionRequest::new("QMap<int, int>", "local.m")
                .with_address(addr)
                .with_inner("int@int")
                .with_children(true),
        );
        assert!(out.ends_with(r#"value="<internal error>",numchild="0""#));
    }

    #[test]
    fn test_qmap_node() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let addr = heap.qmap_int_int(&[(4, 40)]);
        let node = {
            let view = crate::dumper::memory::MemView::new(heap.memory(), t);
            let d = view.ptr(addr).unwrap();
            view.deref_at(d, QMapData::new(&t).forward).unwrap()
        };
        let out = dump(
            heap,
            InspectionRequest::new("QMapNode<int, int>", "local.n")
                .with_address(node)
                .with_inner("int@int")
                .with_children(true),
        );
        assert!(out.contains(r#"value="",numchild="2",children=[{name="key",addr="#));
        assert!(out.contains(r#"type="int",value="4",numchild="0"}"#));
        assert!(out.ends_with(r#"type="int",value="40",numchild="0"}],childnumchild="0""#));
    }

    #[test]
    fn test_node_type_name() {
        let geometry = MapGeometry {
            key_type: "QString".to_string(),
            value_type: "int".to_string(),
            offsets: MapNodeOffsets { key: -24, value: -16 },
        };
        let mem = crate::dumper::memory::SimulatedMemory::new();
        let config = DumperConfig::default().with_namespace("ns");
        let request = InspectionRequest::new("QMap<QString, int>", "local.m");
        let cx = DumpContext::new(
            &request,
            crate::dumper::memory::MemView::new(&mem, Target::default()),
            &config,
            &crate::dumper::object::NoMetaObjects,
        )
        .unwrap();
        assert_eq!(geometry.node_type(&cx), "ns::QMapNode<QString,int >");
    }
}
