use crate::common::{assert_well_formed, dump, target32};
use qdumper::dumper::layout::map_node_shape;
use qdumper::dumper::memory::{SimHeap, StdAbi, Target};
use qdumper::dumper::request::InspectionRequest;

#[test]
fn test_qlist_of_ints() {
    for t in [Target::default(), target32(StdAbi::GnuCxx11)] {
        let mut heap = SimHeap::new(t);
        let addr = heap.qlist_of_ints(&[4, 5, 6]);
        let reply = dump(
            heap,
            InspectionRequest::new("QList<int>", "local.l")
                .with_address(addr)
                .with_hints([4, 0, 0, 0])
                .with_children(true),
        );
        let out = reply.payload;
        assert!(out.contains(r#"value="<3 items>""#), "{out}");
        assert!(out.ends_with(r#"childtype="int",childnumchild="0""#), "{out}");
        assert_well_formed(&out);
    }
}

#[test]
fn test_qhash_chains() {
    let items: Vec<(i32, i32)> = (0..20).map(|i| (i, i * 10)).collect();
    let mut heap = SimHeap::new(Target::default());
    // fewer buckets than items, so chains have several nodes
    let addr = heap.qhash_int_int(&items, 7);
    let reply = dump(
        heap,
        InspectionRequest::new("QHash<int, int>", "local.h")
            .with_address(addr)
            .with_hints([4, 4, 0, 0])
            .with_children(true),
    );
    let out = reply.payload;
    assert!(out.contains(r#"value="<20 items>",numchild="20""#), "{out}");
    for (k, v) in items {
        assert!(out.contains(&format!(r#"key="{k}",value="{v}""#)), "{out}");
    }
    assert_eq!(out.matches("{name=").count(), 20);
    assert_well_formed(&out);
}

#[test]
fn test_qset_cap() {
    let items: Vec<(i32, i32)> = (0..150).map(|i| (i, 0)).collect();
    let mut heap = SimHeap::new(Target::default());
    let addr = heap.qhash_int_int(&items, 31);
    let reply = dump(
        heap,
        InspectionRequest::new("QSet<int>", "local.s")
            .with_address(addr)
            .with_children(true),
    );
    let out = reply.payload;
    assert!(out.contains(r#"numchild="150""#), "{out}");
    assert!(out.contains(r#"value="<150 items, cut>""#), "{out}");
    assert_eq!(out.matches("{name=").count(), 101);
    assert_well_formed(&out);
}

#[test]
fn test_qmap_in_order() {
    let t = Target::default();
    let mut heap = SimHeap::new(t);
    let addr = heap.qmap_int_int(&[(1, 11), (2, 22)]);
    let (value_offset, node_size) = map_node_shape(&t, (4, 4), (4, 4));
    let reply = dump(
        heap,
        InspectionRequest::new("QMap<int, int>", "local.m")
            .with_address(addr)
            .with_hints([4, 4, node_size as i64, value_offset as i64])
            .with_children(true),
    );
    let out = reply.payload;
    let first = out.find(r#"key="1",value="11""#).expect("first node");
    let second = out.find(r#"key="2",value="22""#).expect("second node");
    assert!(first < second);
    assert_well_formed(&out);
}

#[test]
fn test_pointer_to_string() {
    let t = Target::default();
    let mut heap = SimHeap::new(t);
    let string = heap.qstring("x");
    let slot = heap.alloc(t.pointer_size);
    heap.put_ptr(slot, string);
    let reply = dump(
        heap,
        InspectionRequest::new("QString *", "local.p")
            .with_address(slot)
            .with_children(true),
    );
    assert!(reply.payload.ends_with(&format!(
        r#"value="{string:#x}",numchild="1",children=[{{name="*",addr="{string:#x}",type="QString",value="eAA=",valueencoded="2",numchild="0"}}]"#
    )));
}
