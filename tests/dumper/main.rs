mod common;

mod containers;
mod local;
mod objects;
mod stl;

use crate::common::{assert_well_formed, dump, dump_with};
use qdumper::config::DumperConfig;
use qdumper::dumper::layout::QVectorData;
use qdumper::dumper::memory::{MemView, SimHeap, Target};
use qdumper::dumper::names::{classify, strip_pointer_type, KnownType, TypeClass};
use qdumper::dumper::request::InspectionRequest;
use qdumper::dumper::wire::ReplyStatus;

#[test]
fn test_scalar_scenario() {
    let mut heap = SimHeap::new(Target::default());
    let addr = heap.alloc_bytes(&[0x2A, 0, 0, 0]);
    let reply = dump(heap, InspectionRequest::new("int", "local.i").with_address(addr));
    assert_eq!(reply.status, ReplyStatus::Complete);
    assert!(reply.payload.ends_with(r#"value="42",numchild="0""#));
    assert_eq!(reply.to_string().as_bytes()[0], b't');
}

#[test]
fn test_narrow_string_scenario() {
    let mut heap = SimHeap::new(Target::default());
    let addr = heap.qbytearray(b"hi");
    let reply = dump(heap, InspectionRequest::new("QByteArray", "local.ba").with_address(addr));
    assert!(reply
        .payload
        .ends_with(r#"type="QByteArray",value="aGk=",valueencoded="1",numchild="2""#));
}

#[test]
fn test_bounded_list_scenario() {
    let mut heap = SimHeap::new(Target::default());
    let addr = heap.qlinkedlist_of_ints(&[1, 2, 3]);
    let reply = dump(
        heap,
        InspectionRequest::new("QLinkedList<int>", "local.ll")
            .with_address(addr)
            .with_children(true),
    );
    let out = reply.payload;
    assert!(out.contains(r#"numchild="3""#));
    for (i, v) in [1, 2, 3].iter().enumerate() {
        assert!(out.contains(&format!(r#"{{name="{i}","#)));
        assert!(out.contains(&format!(r#"value="{v}""#)));
    }
    assert!(!out.contains("<incomplete>"));
    assert_well_formed(&out);
}

#[test]
fn test_unreadable_container_scenario() {
    let mut heap = SimHeap::new(Target::default());
    let holder = heap.alloc(Target::default().pointer_size);
    let dangling = heap.dangling();
    heap.put_ptr(holder, dangling);
    let reply = dump(
        heap,
        InspectionRequest::new("QLinkedList<int>", "local.ll")
            .with_address(holder)
            .with_children(true),
    );
    assert_eq!(reply.status, ReplyStatus::Complete);
    assert!(reply
        .payload
        .ends_with(r#"value="<internal error>",numchild="0""#));
}

#[test]
fn test_negative_size_containment() {
    let t = Target::default();
    let mut heap = SimHeap::new(t);
    let addr = heap.qvector_of_ints(&[1, 2, 3]);
    let d = MemView::new(heap.memory(), t).ptr(addr).unwrap();
    heap.put_i32(d + QVectorData::new(&t).size, -1);
    let reply = dump(
        heap,
        InspectionRequest::new("QVector<int>", "local.v")
            .with_address(addr)
            .with_hints([4, 0, 0, 0])
            .with_children(true),
    );
    assert!(reply.payload.ends_with(r#"numchild="0""#));
    assert!(!reply.payload.contains("children"));
}

#[test]
fn test_enumeration_cap() {
    let items: Vec<i32> = (0..1500).collect();
    let mut heap = SimHeap::new(Target::default());
    let addr = heap.qvector_of_ints(&items);
    let reply = dump(
        heap,
        InspectionRequest::new("QVector<int>", "local.v")
            .with_address(addr)
            .with_hints([4, 0, 0, 0])
            .with_children(true),
    );
    let out = reply.payload;
    assert!(out.contains(r#"numchild="1500""#));
    assert_eq!(out.matches("{name=").count(), 1001);
    assert!(out.contains(r#"{name="999","#));
    assert!(!out.contains(r#"{name="1000","#));
    assert!(out.contains(r#"{name="<incomplete>",value="<1500 items, cut>",type="int",numchild="0"}"#));
    assert_well_formed(&out);
}

#[test]
fn test_output_truncation() {
    let t = Target::default();
    let items: Vec<i32> = (0..100).collect();
    let mut heap = SimHeap::new(t);
    let addr = heap.qvector_of_ints(&items);
    let mut config = DumperConfig::default().with_target(t);
    config.output_buffer_size = 400;
    config.headroom = 30;

    let reply = dump_with(
        config,
        heap,
        InspectionRequest::new("QVector<int>", "local.v")
            .with_address(addr)
            .with_hints([4, 0, 0, 0])
            .with_children(true),
    );
    assert_eq!(reply.status, ReplyStatus::Truncated);
    assert!(reply.payload.len() <= 400);
    assert_well_formed(&reply.payload);
    assert_eq!(reply.to_transport()[0], b'+');
}

#[test]
fn test_classification_idempotence() {
    for known in KnownType::catalog() {
        let name = known.name();
        let pointer = format!("{name} *");
        assert_eq!(classify(&pointer, ""), TypeClass::Pointer);
        assert_eq!(
            classify(strip_pointer_type(&pointer), ""),
            classify(name, ""),
            "{name}"
        );
        assert_eq!(classify(name, ""), TypeClass::Known(known));
    }
}

#[test]
fn test_namespaced_types() {
    let t = Target::default();
    let mut heap = SimHeap::new(t);
    let addr = heap.qstring("ok");
    let config = DumperConfig::default().with_target(t).with_namespace("Qt4::");
    let reply = dump_with(
        config,
        heap,
        InspectionRequest::new("Qt4::QString", "local.s").with_address(addr),
    );
    assert!(reply
        .payload
        .ends_with(r#"type="Qt4::QString",value="bwBrAA==",valueencoded="2",numchild="0""#));
}
