use crate::common::assert_well_formed;
use qdumper::config::DumperConfig;
use qdumper::dumper::memory::{SimHeap, Target};
use qdumper::dumper::object::{MetaMethod, MetaObject, MetaProperty, MethodKind, StaticMetaObjects};
use qdumper::dumper::request::InspectionRequest;
use qdumper::dumper::Dumper;

const LABEL_VTABLE: usize = 0xa0_0000;
const DIALOG_VTABLE: usize = 0xd0_0000;

fn resolver() -> StaticMetaObjects {
    let mut resolver = StaticMetaObjects::new();
    resolver
        .register(
            LABEL_VTABLE,
            MetaObject::new("QLabel")
                .with_method(MetaMethod::new("destroyed(QObject*)", MethodKind::Signal))
                .with_method(MetaMethod::new("setText(QString)", MethodKind::Slot))
                .with_property(MetaProperty::new("objectName", "QString")),
        )
        .register(
            DIALOG_VTABLE,
            MetaObject::new("QDialog")
                .with_method(MetaMethod::new("destroyed(QObject*)", MethodKind::Signal))
                .with_method(MetaMethod::new("accept()", MethodKind::Slot)),
        );
    resolver
}

#[test]
fn test_object_tree() {
    let t = Target::default();
    let mut heap = SimHeap::new(t);
    let dialog = heap.qobject("dialog", DIALOG_VTABLE, 0);
    let label = heap.qobject("label", LABEL_VTABLE, dialog);
    heap.set_qobject_children(dialog, &[label]);
    let mem = heap.into_memory();
    let dumper = Dumper::new(DumperConfig::default().with_target(t)).with_object_resolver(resolver());

    let out = dumper
        .dump(
            &InspectionRequest::new("QObject", "local.dialog")
                .with_address(dialog)
                .with_children(true),
            &mem,
        )
        .payload;
    assert!(out.contains(r#"displayedtype="QDialog""#), "{out}");
    assert!(out.contains(r#"{name="children","#), "{out}");
    assert!(!out.contains(r#"{name="parent","#), "{out}");
    assert_well_formed(&out);

    let out = dumper
        .dump(
            &InspectionRequest::new("QObjectChildList", "local.dialog.children")
                .with_address(dialog)
                .with_children(true),
            &mem,
        )
        .payload;
    assert!(out.contains(&format!(r#"{{name="0",addr="{label:#x}",type="QObject""#)), "{out}");
    assert!(out.contains(r#"displayedtype="QLabel""#), "{out}");
    assert_well_formed(&out);
}

#[test]
fn test_object_pointer_summary() {
    let t = Target::default();
    let mut heap = SimHeap::new(t);
    let label = heap.qobject("label", LABEL_VTABLE, 0);
    let slot = heap.alloc(t.pointer_size);
    heap.put_ptr(slot, label);
    let mem = heap.into_memory();
    let dumper = Dumper::new(DumperConfig::default().with_target(t)).with_object_resolver(resolver());

    let out = dumper
        .dump(
            &InspectionRequest::new("QObject *", "local.p")
                .with_address(slot)
                .with_children(true),
            &mem,
        )
        .payload;
    assert!(out.contains(&format!(r#"{{name="*",addr="{label:#x}",type="QObject""#)), "{out}");
    assert!(out.contains(r#"displayedtype="QLabel""#), "{out}");
}
