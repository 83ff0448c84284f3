//! Dumpers of the known type catalog.

pub mod qhash;
pub mod qlist;
pub mod qmap;
pub mod qobject;
pub mod qstring;
pub mod scalar;
pub mod smart;
pub mod stl;
pub mod value;

use crate::dumper::error::{DumpError, MemoryError};
use crate::dumper::handler::{DumpContext, HandlerRegistry};
use crate::dumper::names::{is_pointer_type, strip_pointer_type, KnownType};
use crate::dumper::render::{put_num_child, utf16_bytes, InnerSummary, InnerValue};
use crate::dumper::wire::Encoding;
use crate::weak_error;
use fallible_iterator::FallibleIterator;
use std::fmt::Display;

/// Registry with a dumper for every catalog type.
pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register(KnownType::QString, qstring::QStringHandler);
    registry.register(KnownType::QByteArray, qstring::QByteArrayHandler);

    registry.register(KnownType::QList, qlist::QListHandler);
    registry.register(KnownType::QStringList, qlist::QStringListHandler);
    registry.register(KnownType::QVector, qlist::QVectorHandler);
    registry.register(KnownType::QLinkedList, qlist::QLinkedListHandler);

    registry.register(KnownType::QHash, qhash::QHashHandler);
    registry.register(KnownType::QMultiHash, qhash::QHashHandler);
    registry.register(KnownType::QHashNode, qhash::QHashNodeHandler);
    registry.register(KnownType::QSet, qhash::QSetHandler);

    registry.register(KnownType::QMap, qmap::QMapHandler);
    registry.register(KnownType::QMultiMap, qmap::QMapHandler);
    registry.register(KnownType::QMapNode, qmap::QMapNodeHandler);

    registry.register(KnownType::QSharedPointer, smart::SmartPointerHandler::shared());
    registry.register(KnownType::QWeakPointer, smart::SmartPointerHandler::weak());

    registry.register(KnownType::QDate, value::QDateHandler);
    registry.register(KnownType::QTime, value::QTimeHandler);
    registry.register(KnownType::QDateTime, value::QDateTimeHandler);
    registry.register(KnownType::QVariant, value::QVariantHandler);

    registry.register(KnownType::QObject, qobject::QObjectHandler);
    registry.register(KnownType::QObjectPropertyList, qobject::PropertyListHandler);
    registry.register(KnownType::QObjectProperty, qobject::PropertyHandler);
    registry.register(KnownType::QObjectMethodList, qobject::MethodListHandler);
    registry.register(KnownType::QObjectSignalList, qobject::SignalListHandler);
    registry.register(KnownType::QObjectSignal, qobject::SignalHandler);
    registry.register(KnownType::QObjectSlotList, qobject::SlotListHandler);
    registry.register(KnownType::QObjectSlot, qobject::SlotHandler);
    registry.register(KnownType::QObjectChildList, qobject::ChildListHandler);

    registry.register(KnownType::StdString, stl::StdStringHandler { wide: false });
    registry.register(KnownType::StdWString, stl::StdStringHandler { wide: true });
    registry.register(KnownType::StdVector, stl::StdVectorHandler);
    registry.register(KnownType::StdVectorBool, stl::StdVectorBoolHandler);
    registry.register(KnownType::StdList, stl::StdListHandler);
    registry.register(KnownType::StdMap, stl::StdMapHandler);
    registry.register(KnownType::StdSet, stl::StdSetHandler);

    registry
}

/// Pointee of a container element type if elements are pointers.
pub(crate) fn pointee_of(inner: &str) -> Option<&str> {
    is_pointer_type(inner).then(|| strip_pointer_type(inner))
}

/// Write one container element. `f` renders the element and returns an inline value result,
/// child `numchild` is derived from it.
pub(crate) fn put_element<F>(
    cx: &mut DumpContext,
    name: impl Display,
    summary: &mut InnerSummary,
    f: F,
) where
    F: FnOnce(&mut DumpContext) -> Result<InnerValue, DumpError>,
{
    cx.child(name, |cx| {
        let inner = f(cx)?;
        put_num_child(&mut cx.out, inner);
        summary.add(inner);
        Ok(())
    });
}

/// Next node of a walk, a broken link ends the walk.
pub(crate) fn next_node<I>(walker: &mut I) -> Option<usize>
where
    I: FallibleIterator<Item = usize, Error = MemoryError>,
{
    weak_error!(walker.next(), "walk:").flatten()
}

/// Reject a negative or implausibly large element count.
pub(crate) fn checked_count(what: &'static str, value: i64, max: i64) -> Result<usize, DumpError> {
    if (0..=max).contains(&value) {
        Ok(value as usize)
    } else {
        Err(DumpError::InvalidCount { what, value })
    }
}

/// Max plausible number of elements in a container.
pub(crate) const MAX_CONTAINER_SIZE: i64 = 10_000_000;

/// Value of a synthetic child computed by a dumper.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Field<'a> {
    Text(&'a str),
    Int(i64),
    Long(i64),
    Bool(bool),
}

/// Write a synthetic child `{name, value, type, numchild="0"}`, text is UTF-16 encoded.
pub(crate) fn put_field(cx: &mut DumpContext, name: &str, field: Field) {
    cx.child(name, |cx| {
        match field {
            Field::Text(text) => {
                let units = utf16_bytes(text, cx.target().byte_order);
                cx.out.put_encoded("value", &units, Encoding::Utf16);
                let string_type = cx.ns_type("QString");
                cx.out.put_item("type", string_type);
            }
            Field::Int(v) => {
                cx.out.put_item("value", v);
                cx.out.put_item("type", "int");
            }
            Field::Long(v) => {
                cx.out.put_item("value", v);
                cx.out.put_item("type", "long");
            }
            Field::Bool(v) => {
                cx.out.put_item("value", v);
                cx.out.put_item("type", "bool");
            }
        }
        cx.out.put_item("numchild", 0);
        Ok(())
    });
}
