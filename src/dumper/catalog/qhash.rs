use crate::dumper::catalog::{checked_count, next_node, put_element, MAX_CONTAINER_SIZE};
use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::layout::{hash_offset, value_shape, QHashData};
use crate::dumper::memory::{advance, StdAbi};
use crate::dumper::names::{is_optimized_int_key, is_simple_type, ScalarKind};
use crate::dumper::render::{inner_value, InnerSummary, InnerValue};
use crate::dumper::walk::{BucketWalker, Cap};

/// Key and value placement inside a hash node.
#[derive(Clone, Debug)]
pub struct NodeGeometry {
    key_type: String,
    value_type: String,
    key_offset: usize,
    value_offset: usize,
}

/// Size of a key or value: a backend hint, a well known size or a pointer size.
fn element_size(cx: &DumpContext, hint: usize, name: &str) -> usize {
    match cx.hints().get(hint) {
        size if size > 0 => size as usize,
        _ => value_shape(name, cx.target())
            .map(|(size, _)| size)
            .or_else(|| ScalarKind::from_name(name).map(|k| k.size(cx.target())))
            .unwrap_or(cx.target().pointer_size),
    }
}

impl NodeGeometry {
    fn new(cx: &DumpContext) -> Result<Self, DumpError> {
        let key_type = cx.template_parameter(0)?.to_string();
        let value_type = cx.template_parameter(1)?.to_string();
        let key_size = element_size(cx, 0, &key_type);
        let value_size = element_size(cx, 1, &value_type);
        let opt = is_optimized_int_key(&key_type, cx.target().byte_order);
        Ok(Self {
            key_offset: hash_offset(cx.target(), opt, true, key_size, value_size),
            value_offset: hash_offset(cx.target(), opt, false, key_size, value_size),
            key_type,
            value_type,
        })
    }

    fn node_type(&self, cx: &DumpContext) -> String {
        let end = if cx.target().abi == StdAbi::Msvc { ">" } else { " >" };
        format!(
            "'{}<{},{}{end}'",
            cx.ns_type("QHashNode"),
            self.key_type,
            self.value_type
        )
    }
}

/// Validated `QHashData`.
#[derive(Clone, Copy, Debug)]
pub struct HashHeader {
    size: usize,
    buckets: usize,
    num_buckets: usize,
}

/// Read a hash whose d pointer is at `addr`. Only the first and the last bucket slots
/// are probed, a table may be large.
fn hash_header(cx: &DumpContext) -> Result<HashHeader, DumpError> {
    let l = QHashData::new(cx.target());
    let d = cx.mem.ptr(cx.address()?)?;
    let size = cx.mem.i32(advance(d, l.size)?)? as i64;
    let size = checked_count("hash size", size, MAX_CONTAINER_SIZE)?;
    let num_buckets = cx.mem.i32(advance(d, l.num_buckets)?)? as i64;
    let num_buckets = checked_count("hash buckets", num_buckets, MAX_CONTAINER_SIZE)?;
    let buckets = cx.mem.ptr(advance(d, l.buckets)?)?;

    if size > 0 {
        if num_buckets == 0 {
            return Err(DumpError::InvalidCount {
                what: "hash buckets",
                value: 0,
            });
        }
        let ptr = cx.target().pointer_size;
        cx.mem.check(buckets, ptr)?;
        cx.mem.check(advance(buckets, (num_buckets - 1) * ptr)?, ptr)?;
    }
    Ok(HashHeader {
        size,
        buckets,
        num_buckets,
    })
}

pub struct QHashHandler;

impl ShapeHandler for QHashHandler {
    type Header = HashHeader;

    fn validate(&self, cx: &DumpContext) -> Result<HashHeader, DumpError> {
        hash_header(cx)
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &HashHeader) -> Result<(), DumpError> {
        cx.out.put_item_count("value", header.size);
        cx.out.put_item("numchild", header.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &HashHeader,
    ) -> Result<InnerValue, DumpError> {
        let geometry = NodeGeometry::new(cx)?;
        let simple = is_simple_type(&geometry.key_type) && is_simple_type(&geometry.value_type);
        let node_type = geometry.node_type(cx);
        let cap = Cap::new(header.size, cx.caps().container_cap);
        let mut walker = BucketWalker::new(cx.mem, header.buckets, header.num_buckets, 0)
            .with_limit(cap.shown().min(cx.caps().node_walk_limit));

        let mut summary = InnerSummary::default();
        let mut i = 0;
        while let Some(node) = next_node(&mut walker) {
            put_element(cx, i, &mut summary, |cx| {
                let key = advance(node, geometry.key_offset)?;
                let value = advance(node, geometry.value_offset)?;
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

/// A single hash node, `addr` points at the node itself.
pub struct QHashNodeHandler;

impl ShapeHandler for QHashNodeHandler {
    type Header = NodeGeometry;

    fn validate(&self, cx: &DumpContext) -> Result<NodeGeometry, DumpError> {
        let geometry = NodeGeometry::new(cx)?;
        let addr = cx.address()?;
        cx.mem.check(advance(addr, geometry.key_offset)?, 1)?;
        Ok(geometry)
    }

    fn render_summary(&self, cx: &mut DumpContext, geometry: &NodeGeometry) -> Result<(), DumpError> {
        let value = advance(cx.address()?, geometry.value_offset)?;
        if is_simple_type(&geometry.value_type) {
            inner_value(cx, &geometry.value_type, value, "value")?;
        } else {
            cx.out.put_item("value", "");
        }
        cx.out.put_item("numchild", 2);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        geometry: &NodeGeometry,
    ) -> Result<InnerValue, DumpError> {
        let addr = cx.address()?;
        let mut summary = InnerSummary::default();
        for (name, type_name, offset) in [
            ("key", &geometry.key_type, geometry.key_offset),
            ("value", &geometry.value_type, geometry.value_offset),
        ] {
            put_element(cx, name, &mut summary, |cx| {
                let field = advance(addr, offset)?;
                cx.out.put_item("type", type_name);
                cx.out.put_address("addr", field);
                inner_value(cx, type_name, field, "value")
            });
        }
        Ok(InnerValue::ChildrenSpecified)
    }
}

pub struct QSetHandler;

impl ShapeHandler for QSetHandler {
    type Header = HashHeader;

    fn validate(&self, cx: &DumpContext) -> Result<HashHeader, DumpError> {
        hash_header(cx)
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &HashHeader) -> Result<(), DumpError> {
        cx.out.put_item_count("value", header.size);
        cx.out.put_item("valuedisabled", "true");
        cx.out.put_item("numchild", header.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &HashHeader,
    ) -> Result<InnerValue, DumpError> {
        let inner = cx.template_parameter(0)?.to_string();
        let node_type = format!(
            "{}<{inner},{}>",
            cx.ns_type("QHashNode"),
            cx.ns_type("QHashDummyValue")
        );
        let cap = Cap::new(header.size, cx.caps().set_cap);
        let mut walker = BucketWalker::new(cx.mem, header.buckets, header.num_buckets, 0)
            .with_limit(cap.shown().min(cx.caps().node_walk_limit));

        let mut i = 0;
        while let Some(node) = next_node(&mut walker) {
            cx.child(i, |cx| {
                cx.out.put_item("type", &inner);
                cx.out.put_item("exp", format_args!("(('{node_type}'*){node:#x})->key"));
                Ok(())
            });
            i += 1;
        }
        cx.put_ellipsis_if_cut(cap, &inner);
        Ok(InnerValue::ChildrenSpecified)
    }

    fn child_type(&self, cx: &DumpContext, _: &HashHeader) -> Option<String> {
        cx.template_parameter(0).ok().map(ToString::to_string)
    }
}
