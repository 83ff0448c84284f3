//! Framework objects and their synthetic views: properties, signals, slots and children.
//!
//! Identity, name, parent and connections are read from object private data, class
//! information comes from a [`crate::dumper::object::MetaObjectResolver`].

use crate::dumper::catalog::next_node;
use crate::dumper::catalog::qlist::{list_header, ListHeader};
use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::layout::{
    vector_payload_offset, Connection, ConnectionList, ObjectPrivateLayout, QObject, QVectorData,
};
use crate::dumper::memory::{advance, MemView};
use crate::dumper::names::{classify, KnownType, TypeClass};
use crate::dumper::object::{MetaObject, MetaProperty, MethodKind};
use crate::dumper::render::{inner_value, put_num_child, put_text, read_qstring, InnerValue};
use crate::dumper::walk::{Cap, ChainWalker};
use crate::dumper::wire::Encoding;
use crate::muted_error;

const CONNECTION_TYPES: [&str; 5] = ["auto", "direct", "queued", "autocompat", "blockingqueued"];

fn connection_type_name(code: i32) -> &'static str {
    CONNECTION_TYPES
        .get((code & 0b111) as usize)
        .copied()
        .unwrap_or("unknown")
}

/// Object with its private data located and its meta object resolved.
#[derive(Clone, Debug)]
pub struct ObjectView {
    pub object: usize,
    private: usize,
    layout: ObjectPrivateLayout,
    pub meta: MetaObject,
}

impl ObjectView {
    pub fn read(cx: &DumpContext, object: usize) -> Result<Self, DumpError> {
        let layout = ObjectPrivateLayout::new(cx.target(), cx.version())
            .ok_or(DumpError::UnsupportedLayout("object private data"))?;
        let private = cx.mem.deref_at(object, QObject::new(cx.target()).d_ptr)?;
        cx.mem
            .check(advance(private, layout.object_name)?, cx.target().pointer_size)?;
        let meta = cx
            .objects
            .resolve(&cx.mem, object)
            .unwrap_or_else(|| MetaObject::new(cx.ns_type("QObject")));
        Ok(Self {
            object,
            private,
            layout,
            meta,
        })
    }

    /// `objectName` as UTF-16 code units.
    fn name(&self, mem: &MemView) -> Result<bytes::Bytes, DumpError> {
        read_qstring(mem, advance(self.private, self.layout.object_name)?)
    }

    fn parent(&self, mem: &MemView) -> Result<usize, DumpError> {
        Ok(mem.deref_at(self.private, self.layout.parent)?)
    }

    fn children(&self, mem: &MemView, validate_prefix: usize) -> Result<ListHeader, DumpError> {
        list_header(mem, advance(self.private, self.layout.children)?, validate_prefix)
    }

    /// Connections of a signal, in connection order.
    fn connections(&self, cx: &DumpContext, signal: usize) -> Result<Vec<usize>, DumpError> {
        if !self.layout.connections_supported {
            return Ok(vec![]);
        }
        let t = cx.target();
        let lists = cx.mem.deref_at(self.private, self.layout.connection_lists)?;
        if lists == 0 {
            return Ok(vec![]);
        }
        let size = cx.mem.i32(advance(lists, QVectorData::new(t).size)?)?;
        if signal >= size.max(0) as usize {
            return Ok(vec![]);
        }
        let list = advance(
            lists,
            vector_payload_offset(t, t.pointer_size) + signal * ConnectionList::new(t).struct_size,
        )?;
        let first = cx.mem.deref_at(list, ConnectionList::new(t).first)?;
        let mut walker = ChainWalker::new(cx.mem, first, Connection::new(t).next_connection_list, 0)
            .with_limit(cx.caps().node_walk_limit);
        let mut connections = vec![];
        while let Some(connection) = next_node(&mut walker) {
            connections.push(connection);
        }
        Ok(connections)
    }

    /// Connections this object receives, in the order senders were connected.
    fn senders(&self, cx: &DumpContext) -> Result<Vec<usize>, DumpError> {
        if !self.layout.connections_supported {
            return Ok(vec![]);
        }
        let first = cx.mem.deref_at(self.private, self.layout.senders)?;
        let mut walker = ChainWalker::new(cx.mem, first, Connection::new(cx.target()).next, 0)
            .with_limit(cx.caps().node_walk_limit);
        let mut connections = vec![];
        while let Some(connection) = next_node(&mut walker) {
            connections.push(connection);
        }
        Ok(connections)
    }

    /// Index of a signal whose connection list holds `connection`.
    fn signal_of(&self, cx: &DumpContext, connection: usize) -> Option<usize> {
        self.meta
            .methods_of(MethodKind::Signal)
            .map(|(idx, _)| idx)
            .find(|&idx| {
                muted_error!(self.connections(cx, idx))
                    .is_some_and(|connections| connections.contains(&connection))
            })
    }
}

/// Decoded `QObjectPrivate::Connection`.
#[derive(Clone, Copy, Debug)]
struct ConnectionView {
    sender: usize,
    receiver: usize,
    method: usize,
    connection_type: i32,
}

impl ConnectionView {
    fn read(mem: &MemView, addr: usize) -> Result<Self, DumpError> {
        let l = Connection::new(mem.target());
        Ok(Self {
            sender: mem.deref_at(addr, l.sender)?,
            receiver: mem.deref_at(addr, l.receiver)?,
            method: mem.i32(advance(addr, l.method)?)?.max(0) as usize,
            connection_type: mem.i32(advance(addr, l.connection_type)?)?,
        })
    }
}

/// Put `value`, `displayedtype` and `numchild` of an object, caller writes `addr` and `type`.
pub fn put_object_summary(cx: &mut DumpContext, object: usize) -> Result<InnerValue, DumpError> {
    if object == 0 {
        cx.out.put_item("value", "0x0");
        cx.out.put_item("numchild", 0);
        return Ok(InnerValue::ChildrenSpecified);
    }
    let view = ObjectView::read(cx, object)?;
    let name = view.name(&cx.mem)?;
    cx.out.put_encoded("value", &name, Encoding::Utf16);
    cx.out.put_item("displayedtype", &view.meta.class_name);
    cx.out.put_item("numchild", 1);
    Ok(InnerValue::ChildrenSpecified)
}

/// Put an object referenced by a pointer: `addr`, `type` and a summary.
fn put_object_ref(cx: &mut DumpContext, object: usize) -> Result<(), DumpError> {
    if object == 0 {
        let pointer_type = format!("{} *", cx.ns_type("QObject"));
        cx.out.put_item("type", pointer_type);
    } else {
        cx.out.put_address("addr", object);
        let object_type = cx.ns_type("QObject");
        cx.out.put_item("type", object_type);
    }
    put_object_summary(cx, object)?;
    Ok(())
}

/// Put a party of a connection, an object never refers to itself.
fn put_connection_party(cx: &mut DumpContext, owner: &ObjectView, party: usize) -> Result<(), DumpError> {
    if party == owner.object {
        cx.out.put_item("value", "<this>");
        cx.out.put_item("type", &owner.meta.class_name);
        cx.out.put_item("numchild", 0);
        cx.out.put_address("addr", owner.object);
        return Ok(());
    }
    put_object_ref(cx, party)
}

/// Put a synthetic `{name, value, type="", numchild="0"}` child.
fn put_note(cx: &mut DumpContext, name: String, value: &str) {
    cx.child(name, |cx| {
        let order = cx.target().byte_order;
        cx.out.put_item("type", "");
        put_text(&mut cx.out, "value", value, order);
        cx.out.put_item("numchild", 0);
        Ok(())
    });
}

/// Put a child that opens a synthetic view over the same object.
fn put_view_child(cx: &mut DumpContext, name: &str, object: usize, view_type: &str, count: usize) {
    let view_type = cx.ns_type(view_type);
    cx.child(name, |cx| {
        cx.out.put_address("addr", object);
        cx.out.put_item("type", view_type);
        cx.out.put_item_count("value", count);
        cx.out.put_item("numchild", count);
        Ok(())
    });
}

/// Connections into the slot with index `slot` with their addresses.
fn slot_connections(
    cx: &DumpContext,
    view: &ObjectView,
    slot: usize,
) -> Result<Vec<(usize, ConnectionView)>, DumpError> {
    let mut connections = vec![];
    for addr in view.senders(cx)? {
        if let Some(conn) = muted_error!(ConnectionView::read(&cx.mem, addr)) {
            if conn.receiver == view.object && conn.method == slot {
                connections.push((addr, conn));
            }
        }
    }
    Ok(connections)
}

/// Signature of a signal a sender connection comes from.
fn sender_signal(cx: &DumpContext, conn_addr: usize, conn: &ConnectionView) -> Option<String> {
    let sender = muted_error!(ObjectView::read(cx, conn.sender))?;
    let signal = sender.signal_of(cx, conn_addr)?;
    sender.meta.signature(signal).map(ToString::to_string)
}

pub struct QObjectHandler;

/// Object and its number of children.
pub struct ObjectHeader {
    view: ObjectView,
    children: usize,
}

impl ShapeHandler for QObjectHandler {
    type Header = ObjectHeader;

    fn validate(&self, cx: &DumpContext) -> Result<ObjectHeader, DumpError> {
        let view = ObjectView::read(cx, cx.address()?)?;
        let children = view.children(&cx.mem, 1)?.size;
        Ok(ObjectHeader { view, children })
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &ObjectHeader) -> Result<(), DumpError> {
        let name = header.view.name(&cx.mem)?;
        cx.out.put_encoded("value", &name, Encoding::Utf16);
        cx.out.put_item("displayedtype", &header.view.meta.class_name);
        // properties, signals, slots, parent and class name
        let synthetic = 5 + usize::from(header.children > 0);
        cx.out.put_item("numchild", synthetic);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &ObjectHeader,
    ) -> Result<InnerValue, DumpError> {
        let view = &header.view;
        let meta = &view.meta;
        put_view_child(cx, "properties", view.object, "QObjectPropertyList", meta.properties.len());
        put_view_child(
            cx,
            "signals",
            view.object,
            "QObjectSignalList",
            meta.count_of(MethodKind::Signal),
        );
        put_view_child(
            cx,
            "slots",
            view.object,
            "QObjectSlotList",
            meta.count_of(MethodKind::Slot),
        );
        if header.children > 0 {
            put_view_child(cx, "children", view.object, "QObjectChildList", header.children);
        }
        cx.child("parent", |cx| {
            let parent = view.parent(&cx.mem)?;
            put_object_ref(cx, parent)
        });
        cx.child("className", |cx| {
            cx.out.put_item("value", &meta.class_name);
            cx.out.put_item("type", "");
            cx.out.put_item("numchild", 0);
            Ok(())
        });
        Ok(InnerValue::ChildrenSpecified)
    }
}

// ----------------------------------------- properties --------------------------------------------

/// True if a property value of `type_name` renders inline.
fn renders_inline(type_name: &str, ns: &str) -> bool {
    matches!(
        classify(type_name, ns),
        TypeClass::Scalar(_)
            | TypeClass::Pointer
            | TypeClass::Known(
                KnownType::QString
                    | KnownType::QByteArray
                    | KnownType::StdString
                    | KnownType::StdWString
                    | KnownType::QList
                    | KnownType::QStringList
                    | KnownType::QObject
            )
    )
}

pub struct PropertyListHandler;

impl ShapeHandler for PropertyListHandler {
    type Header = ObjectView;

    fn validate(&self, cx: &DumpContext) -> Result<ObjectView, DumpError> {
        ObjectView::read(cx, cx.address()?)
    }

    fn render_summary(&self, cx: &mut DumpContext, view: &ObjectView) -> Result<(), DumpError> {
        cx.out.put_item_count("value", view.meta.properties.len());
        cx.out.put_item("numchild", view.meta.properties.len());
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        view: &ObjectView,
    ) -> Result<InnerValue, DumpError> {
        let property_type = cx.ns_type("QObjectProperty");
        for property in &view.meta.properties {
            cx.child(&property.name, |cx| {
                let Some(offset) = property.offset else {
                    cx.out.put_item("type", &property.type_name);
                    cx.out.put_item("value", "<not accessible>");
                    cx.out.put_item("numchild", 0);
                    return Ok(());
                };
                if !renders_inline(&property.type_name, cx.ns()) {
                    cx.out.put_address("addr", view.object);
                    cx.out.put_item("type", &property_type);
                    cx.out.put_item("numchild", 1);
                    return Ok(());
                }
                cx.out.put_item("type", &property.type_name);
                let field = advance(view.object, offset)?;
                let inner = inner_value(cx, &property.type_name, field, "value")?;
                put_num_child(&mut cx.out, inner);
                Ok(())
            });
        }
        Ok(InnerValue::ChildrenSpecified)
    }
}

/// A single property, the property name is the last component of a request iname.
pub struct PropertyHandler;

impl ShapeHandler for PropertyHandler {
    type Header = (ObjectView, MetaProperty);

    fn validate(&self, cx: &DumpContext) -> Result<(ObjectView, MetaProperty), DumpError> {
        let view = ObjectView::read(cx, cx.address()?)?;
        let name = cx.request.iname.rsplit('.').next().unwrap_or_default();
        let property = view
            .meta
            .property(name)
            .cloned()
            .ok_or_else(|| DumpError::UnknownProperty(name.to_string()))?;
        Ok((view, property))
    }

    fn render_summary(
        &self,
        cx: &mut DumpContext,
        (view, property): &(ObjectView, MetaProperty),
    ) -> Result<(), DumpError> {
        let Some(offset) = property.offset else {
            cx.out.put_item("value", "<not accessible>");
            cx.out.put_item("numchild", 0);
            return Ok(());
        };
        if !renders_inline(&property.type_name, cx.ns()) {
            cx.out.put_item("value", "");
            cx.out.put_item("numchild", 1);
            return Ok(());
        }
        let field = advance(view.object, offset)?;
        let inner = inner_value(cx, &property.type_name, field, "value")?;
        put_num_child(&mut cx.out, inner);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        (view, property): &(ObjectView, MetaProperty),
    ) -> Result<InnerValue, DumpError> {
        let Some(offset) = property.offset else {
            return Ok(InnerValue::ChildrenSpecified);
        };
        if renders_inline(&property.type_name, cx.ns()) {
            return Ok(InnerValue::ChildrenSpecified);
        }
        cx.child("value", |cx| {
            cx.out.put_address("addr", advance(view.object, offset)?);
            cx.out.put_item("type", &property.type_name);
            cx.out.put_item("numchild", 1);
            Ok(())
        });
        Ok(InnerValue::ChildrenSpecified)
    }
}

// ------------------------------------------ methods ----------------------------------------------

pub struct MethodListHandler;

impl ShapeHandler for MethodListHandler {
    type Header = ObjectView;

    fn validate(&self, cx: &DumpContext) -> Result<ObjectView, DumpError> {
        ObjectView::read(cx, cx.address()?)
    }

    fn render_summary(&self, cx: &mut DumpContext, view: &ObjectView) -> Result<(), DumpError> {
        cx.out.put_item_count("value", view.meta.methods.len());
        cx.out.put_item("numchild", view.meta.methods.len());
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        view: &ObjectView,
    ) -> Result<InnerValue, DumpError> {
        for (i, method) in view.meta.methods.iter().enumerate() {
            cx.child(format_args!("{i} {}", method.signature), |cx| {
                cx.out
                    .put_item("value", format_args!("<{}> ({})", method.kind, method.kind.code()));
                cx.out.put_item("numchild", 0);
                Ok(())
            });
        }
        Ok(InnerValue::NoFurtherChildren)
    }

    fn child_type(&self, _: &DumpContext, _: &ObjectView) -> Option<String> {
        Some("QMetaMethod::Method".to_string())
    }
}

pub struct SignalListHandler;

impl ShapeHandler for SignalListHandler {
    type Header = ObjectView;

    fn validate(&self, cx: &DumpContext) -> Result<ObjectView, DumpError> {
        ObjectView::read(cx, cx.address()?)
    }

    fn render_summary(&self, cx: &mut DumpContext, view: &ObjectView) -> Result<(), DumpError> {
        let count = view.meta.count_of(MethodKind::Signal);
        cx.out.put_item_count("value", count);
        cx.out.put_item("numchild", count);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        view: &ObjectView,
    ) -> Result<InnerValue, DumpError> {
        let signal_type = cx.ns_type("QObjectSignal");
        for (idx, method) in view.meta.methods_of(MethodKind::Signal) {
            cx.child(idx, |cx| {
                let connections = view.connections(cx, idx)?.len();
                let order = cx.target().byte_order;
                put_text(&mut cx.out, "value", &method.signature, order);
                cx.out.put_item("numchild", connections);
                cx.out.put_address("addr", view.object);
                cx.out.put_item("type", &signal_type);
                Ok(())
            });
        }
        Ok(InnerValue::ChildrenSpecified)
    }
}

/// Signal with its connections, a signal index is passed in hint 0.
pub struct SignalHeader {
    view: ObjectView,
    signal: usize,
    connections: Vec<ConnectionView>,
}

pub struct SignalHandler;

impl ShapeHandler for SignalHandler {
    type Header = SignalHeader;

    fn validate(&self, cx: &DumpContext) -> Result<SignalHeader, DumpError> {
        let view = ObjectView::read(cx, cx.address()?)?;
        let signal = cx.hints().offset(0, "signal index")?;
        let connections = view
            .connections(cx, signal)?
            .into_iter()
            .map(|addr| ConnectionView::read(&cx.mem, addr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SignalHeader {
            view,
            signal,
            connections,
        })
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &SignalHeader) -> Result<(), DumpError> {
        let signature = header.view.meta.signature(header.signal).unwrap_or_default();
        let order = cx.target().byte_order;
        put_text(&mut cx.out, "value", signature, order);
        cx.out.put_item("numchild", 3 * header.connections.len());
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &SignalHeader,
    ) -> Result<InnerValue, DumpError> {
        for (i, conn) in header.connections.iter().enumerate() {
            cx.child(format_args!("{i} receiver"), |cx| {
                put_connection_party(cx, &header.view, conn.receiver)
            });
            let slot = if conn.receiver == 0 {
                "<invalid receiver>".to_string()
            } else {
                cx.objects
                    .resolve(&cx.mem, conn.receiver)
                    .and_then(|meta| meta.signature(conn.method).map(ToString::to_string))
                    .unwrap_or_else(|| format!("<method {}>", conn.method))
            };
            put_note(cx, format!("{i} slot"), &slot);
            put_note(
                cx,
                format!("{i} type"),
                &format!("<{} connection>", connection_type_name(conn.connection_type)),
            );
        }
        Ok(InnerValue::ChildrenSpecified)
    }
}

pub struct SlotListHandler;

impl ShapeHandler for SlotListHandler {
    type Header = ObjectView;

    fn validate(&self, cx: &DumpContext) -> Result<ObjectView, DumpError> {
        ObjectView::read(cx, cx.address()?)
    }

    fn render_summary(&self, cx: &mut DumpContext, view: &ObjectView) -> Result<(), DumpError> {
        let count = view.meta.count_of(MethodKind::Slot);
        cx.out.put_item_count("value", count);
        cx.out.put_item("numchild", count);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        view: &ObjectView,
    ) -> Result<InnerValue, DumpError> {
        let slot_type = cx.ns_type("QObjectSlot");
        for (idx, method) in view.meta.methods_of(MethodKind::Slot) {
            cx.child(idx, |cx| {
                let senders = slot_connections(cx, view, idx)?.len();
                let order = cx.target().byte_order;
                put_text(&mut cx.out, "value", &method.signature, order);
                cx.out.put_item("numchild", senders);
                cx.out.put_address("addr", view.object);
                cx.out.put_item("type", &slot_type);
                Ok(())
            });
        }
        Ok(InnerValue::ChildrenSpecified)
    }
}

/// Slot with connections into it, a slot index is passed in hint 0.
pub struct SlotHeader {
    view: ObjectView,
    slot: usize,
    connections: Vec<(usize, ConnectionView)>,
}

pub struct SlotHandler;

impl ShapeHandler for SlotHandler {
    type Header = SlotHeader;

    fn validate(&self, cx: &DumpContext) -> Result<SlotHeader, DumpError> {
        let view = ObjectView::read(cx, cx.address()?)?;
        let slot = cx.hints().offset(0, "slot index")?;
        let connections = slot_connections(cx, &view, slot)?;
        Ok(SlotHeader {
            view,
            slot,
            connections,
        })
    }

    fn render_summary(&self, cx: &mut DumpContext, header: &SlotHeader) -> Result<(), DumpError> {
        let signature = header.view.meta.signature(header.slot).unwrap_or_default();
        let order = cx.target().byte_order;
        put_text(&mut cx.out, "value", signature, order);
        cx.out.put_item("numchild", 3 * header.connections.len());
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &SlotHeader,
    ) -> Result<InnerValue, DumpError> {
        for (s, (addr, conn)) in header.connections.iter().enumerate() {
            cx.child(format_args!("{s} sender"), |cx| {
                put_connection_party(cx, &header.view, conn.sender)
            });
            let signal = sender_signal(cx, *addr, conn);
            put_note(
                cx,
                format!("{s} signal"),
                signal.as_deref().unwrap_or("<unknown signal>"),
            );
            put_note(
                cx,
                format!("{s} type"),
                &format!("<{} connection>", connection_type_name(conn.connection_type)),
            );
        }
        Ok(InnerValue::ChildrenSpecified)
    }
}

// ------------------------------------------ children ---------------------------------------------

pub struct ChildListHandler;

impl ShapeHandler for ChildListHandler {
    type Header = (ObjectView, ListHeader);

    fn validate(&self, cx: &DumpContext) -> Result<(ObjectView, ListHeader), DumpError> {
        let view = ObjectView::read(cx, cx.address()?)?;
        let children = view.children(&cx.mem, cx.caps().validate_prefix)?;
        Ok((view, children))
    }

    fn render_summary(
        &self,
        cx: &mut DumpContext,
        (_, children): &(ObjectView, ListHeader),
    ) -> Result<(), DumpError> {
        cx.out.put_item_count("value", children.size);
        cx.out.put_item("numchild", children.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        (_, children): &(ObjectView, ListHeader),
    ) -> Result<InnerValue, DumpError> {
        let cap = Cap::new(children.size, cx.caps().container_cap);
        for i in 0..cap.shown() {
            cx.child(i, |cx| {
                let child = cx.mem.ptr(children.slot(&cx.mem, i)?)?;
                put_object_ref(cx, child)
            });
        }
        let object_type = cx.ns_type("QObject");
        cx.put_ellipsis_if_cut(cap, &object_type);
        Ok(InnerValue::ChildrenSpecified)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DumperConfig;
    use crate::dumper::layout::QObjectPrivate46;
    use crate::dumper::memory::{SimHeap, SimulatedMemory, Target};
    use crate::dumper::object::{MetaMethod, StaticMetaObjects};
    use crate::dumper::render::utf16_bytes;
    use crate::dumper::request::InspectionRequest;
    use crate::dumper::Dumper;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    // ----------------------------------------- test helpers ------------------------------------------

    const BUTTON_VTABLE: usize = 0xb0_0000;
    const WINDOW_VTABLE: usize = 0xc0_0000;

    fn button() -> MetaObject {
        MetaObject::new("QPushButton")
            .with_method(MetaMethod::new("destroyed(QObject*)", MethodKind::Signal))
            .with_method(MetaMethod::new("deleteLater()", MethodKind::Slot))
            .with_method(MetaMethod::new("clicked(bool)", MethodKind::Signal))
            .with_property(MetaProperty::new("objectName", "QString"))
            .with_property(MetaProperty::new("checked", "bool").with_offset(16))
            .with_property(MetaProperty::new("icon", "QIcon").with_offset(20))
    }

    fn window() -> MetaObject {
        MetaObject::new("QMainWindow")
            .with_method(MetaMethod::new("destroyed(QObject*)", MethodKind::Signal))
            .with_method(MetaMethod::new("deleteLater()", MethodKind::Slot))
            .with_method(MetaMethod::new("close()", MethodKind::Slot))
    }

    fn resolver() -> StaticMetaObjects {
        let mut resolver = StaticMetaObjects::new();
        resolver
            .register(BUTTON_VTABLE, button())
            .register(WINDOW_VTABLE, window());
        resolver
    }

    fn private_of(heap: &SimHeap, object: usize) -> usize {
        let t = *heap.target();
        MemView::new(heap.memory(), t)
            .deref_at(object, QObject::new(&t).d_ptr)
            .unwrap()
    }

    /// Connect `signal` of `sender` to `method` of `receiver`.
    fn connect(
        heap: &mut SimHeap,
        sender: usize,
        signal: usize,
        receiver: usize,
        method: usize,
        connection_type: i32,
    ) -> usize {
        let t = *heap.target();
        let l = Connection::new(&t);
        let conn = heap.alloc(l.struct_size);
        heap.put_ptr(conn + l.sender, sender);
        heap.put_ptr(conn + l.receiver, receiver);
        heap.put_i32(conn + l.method, method as i32);
        heap.put_i32(conn + l.connection_type, connection_type);

        let p = QObjectPrivate46::new(&t);
        let sender_private = private_of(heap, sender);
        let lists_size = 4;
        let cl = ConnectionList::new(&t);
        let payload = vector_payload_offset(&t, t.pointer_size);
        let lists = {
            let view = MemView::new(heap.memory(), t);
            view.deref_at(sender_private, p.connection_lists).unwrap()
        };
        let lists = if lists == 0 {
            let lists = heap.alloc(payload + lists_size * cl.struct_size);
            let v = QVectorData::new(&t);
            heap.put_i32(lists + v.refcount, 1);
            heap.put_i32(lists + v.alloc, lists_size as i32);
            heap.put_i32(lists + v.size, lists_size as i32);
            heap.put_ptr(sender_private + p.connection_lists, lists);
            lists
        } else {
            lists
        };
        let list = lists + payload + signal * cl.struct_size;
        let last = MemView::new(heap.memory(), t).deref_at(list, cl.last).unwrap();
        if last == 0 {
            heap.put_ptr(list + cl.first, conn);
        } else {
            heap.put_ptr(last + l.next_connection_list, conn);
        }
        heap.put_ptr(list + cl.last, conn);

        let receiver_private = private_of(heap, receiver);
        let head = MemView::new(heap.memory(), t)
            .deref_at(receiver_private, p.senders)
            .unwrap();
        heap.put_ptr(conn + l.next, head);
        heap.put_ptr(receiver_private + p.senders, conn);
        conn
    }

    fn dump(heap: SimHeap, request: InspectionRequest) -> String {
        let t = *heap.target();
        let mem: SimulatedMemory = heap.into_memory();
        Dumper::new(DumperConfig::default().with_target(t))
            .with_object_resolver(resolver())
            .dump(&request, &mem)
            .payload
    }

    fn encoded(text: &str) -> String {
        STANDARD.encode(utf16_bytes(text, Target::default().byte_order))
    }

    // ---------------------------------------------------------------------------------------------

    #[test]
    fn test_object_children() {
        let mut heap = SimHeap::new(Target::default());
        let window = heap.qobject("main", WINDOW_VTABLE, 0);
        let ok = heap.qobject("ok", BUTTON_VTABLE, window);
        let out = dump(
            heap,
            InspectionRequest::new("QObject", "local.ok")
                .with_address(ok)
                .with_children(true),
        );
        let name = encoded("ok");
        assert!(out.contains(&format!(
            r#"value="{name}",valueencoded="2",displayedtype="QPushButton",numchild="5",children=["#
        )));
        assert!(out.contains(&format!(
            r#"{{name="properties",addr="{ok:#x}",type="QObjectPropertyList",value="<3 items>",numchild="3"}}"#
        )));
        assert!(out.contains(r#"{name="signals",addr="#));
        assert!(out.contains(r#"type="QObjectSignalList",value="<2 items>",numchild="2"}"#));
        assert!(out.contains(r#"type="QObjectSlotList",value="<1 items>",numchild="1"}"#));
        assert!(!out.contains(r#"{name="children""#));
        assert!(out.contains(&format!(
            r#"{{name="parent",addr="{window:#x}",type="QObject",value="{}",valueencoded="2",displayedtype="QMainWindow",numchild="1"}}"#,
            encoded("main")
        )));
        assert!(out.ends_with(r#"{name="className",value="QPushButton",type="",numchild="0"}]"#));
    }

    #[test]
    fn test_child_list() {
        let mut heap = SimHeap::new(Target::default());
        let window = heap.qobject("main", WINDOW_VTABLE, 0);
        let ok = heap.qobject("ok", BUTTON_VTABLE, window);
        let cancel = heap.qobject("cancel", BUTTON_VTABLE, window);
        heap.set_qobject_children(window, &[ok, cancel]);

        let out = dump(
            heap,
            InspectionRequest::new("QObjectChildList", "local.w.children")
                .with_address(window)
                .with_children(true),
        );
        assert!(out.contains(r#"value="<2 items>",numchild="2",children=[{name="0","#));
        assert!(out.contains(&format!(r#"{{name="1",addr="{cancel:#x}",type="QObject""#)));
    }

    #[test]
    fn test_null_parent() {
        let mut heap = SimHeap::new(Target::default());
        let window = heap.qobject("main", WINDOW_VTABLE, 0);
        let out = dump(
            heap,
            InspectionRequest::new("QObject", "local.w")
                .with_address(window)
                .with_children(true),
        );
        assert!(out.contains(r#"{name="parent",type="QObject *",value="0x0",numchild="0"}"#));
    }

    #[test]
    fn test_property_list() {
        let mut heap = SimHeap::new(Target::default());
        let ok = heap.qobject("ok", BUTTON_VTABLE, 0);
        heap.put_bytes(ok + 16, &[1]);
        let out = dump(
            heap,
            InspectionRequest::new("QObjectPropertyList", "local.ok.properties")
                .with_address(ok)
                .with_children(true),
        );
        assert!(out.contains(
            r#"{name="objectName",type="QString",value="<not accessible>",numchild="0"}"#
        ));
        assert!(out.contains(r#"{name="checked",type="bool",value="true",numchild="0"}"#));
        assert!(out.contains(&format!(
            r#"{{name="icon",addr="{ok:#x}",type="QObjectProperty",numchild="1"}}"#
        )));
    }

    #[test]
    fn test_single_property() {
        let mut heap = SimHeap::new(Target::default());
        let ok = heap.qobject("ok", BUTTON_VTABLE, 0);
        let out = dump(
            heap,
            InspectionRequest::new("QObjectProperty", "local.ok.properties.checked")
                .with_address(ok),
        );
        assert!(out.ends_with(r#"type="QObjectProperty",value="false",numchild="0""#));

        let mut heap = SimHeap::new(Target::default());
        let ok = heap.qobject("ok", BUTTON_VTABLE, 0);
        let out = dump(
            heap,
            InspectionRequest::new("QObjectProperty", "local.ok.properties.text")
                .with_address(ok),
        );
        assert!(out.ends_with(r#"value="<internal error>",numchild="0""#));
    }

    #[test]
    fn test_method_list() {
        let mut heap = SimHeap::new(Target::default());
        let ok = heap.qobject("ok", BUTTON_VTABLE, 0);
        let out = dump(
            heap,
            InspectionRequest::new("QObjectMethodList", "local.ok.methods")
                .with_address(ok)
                .with_children(true),
        );
        assert!(out.contains(
            r#"children=[{name="0 destroyed(QObject*)",value="<Signal> (1)",numchild="0"},{name="1 deleteLater()",value="<Slot> (2)",numchild="0"}"#
        ));
        assert!(out.ends_with(r#"],childtype="QMetaMethod::Method",childnumchild="0""#));
    }

    #[test]
    fn test_signals_and_slots() {
        let mut heap = SimHeap::new(Target::default());
        let window = heap.qobject("main", WINDOW_VTABLE, 0);
        let ok = heap.qobject("ok", BUTTON_VTABLE, window);
        // clicked(bool) => close()
        connect(&mut heap, ok, 2, window, 2, 2);
        // clicked(bool) => deleteLater() on itself
        connect(&mut heap, ok, 2, ok, 1, 0);

        let t = *heap.target();
        let mem = heap.into_memory();
        let dumper = Dumper::new(DumperConfig::default().with_target(t)).with_object_resolver(resolver());

        let signals = dumper
            .dump(
                &InspectionRequest::new("QObjectSignalList", "local.ok.signals")
                    .with_address(ok)
                    .with_children(true),
                &mem,
            )
            .payload;
        assert!(signals.contains(r#"{name="0",value="destroyed(QObject*)",numchild="0","#));
        assert!(signals.contains(r#"{name="2",value="clicked(bool)",numchild="2","#));

        let signal = dumper
            .dump(
                &InspectionRequest::new("QObjectSignal", "local.ok.signals.2")
                    .with_address(ok)
                    .with_hints([2, 0, 0, 0])
                    .with_children(true),
                &mem,
            )
            .payload;
        assert!(signal.contains(r#"value="clicked(bool)",numchild="6",children=[{name="0 receiver""#));
        assert!(signal.contains(r#"{name="0 slot",type="",value="close()",numchild="0"}"#));
        assert!(signal.contains(r#"{name="0 type",type="",value="<queued connection>",numchild="0"}"#));
        assert!(signal.contains(&format!(
            r#"{{name="1 receiver",value="<this>",type="QPushButton",numchild="0",addr="{ok:#x}"}}"#
        )));
        assert!(signal.contains(r#"{name="1 slot",type="",value="deleteLater()",numchild="0"}"#));
        assert!(signal.contains(r#"{name="1 type",type="",value="<auto connection>",numchild="0"}"#));

        let slots = dumper
            .dump(
                &InspectionRequest::new("QObjectSlotList", "local.w.slots")
                    .with_address(window)
                    .with_children(true),
                &mem,
            )
            .payload;
        assert!(slots.contains(r#"{name="1",value="deleteLater()",numchild="0","#));
        assert!(slots.contains(r#"{name="2",value="close()",numchild="1","#));

        let slot = dumper
            .dump(
                &InspectionRequest::new("QObjectSlot", "local.w.slots.2")
                    .with_address(window)
                    .with_hints([2, 0, 0, 0])
                    .with_children(true),
                &mem,
            )
            .payload;
        assert!(slot.contains(&format!(
            r#"value="close()",numchild="3",children=[{{name="0 sender",addr="{ok:#x}",type="QObject""#
        )));
        assert!(slot.contains(r#"{name="0 signal",type="",value="clicked(bool)",numchild="0"}"#));
        assert!(slot.ends_with(r#"{name="0 type",type="",value="<queued connection>",numchild="0"}]"#));
    }

    #[test]
    fn test_unresolved_class() {
        let mut heap = SimHeap::new(Target::default());
        let object = heap.qobject("anon", 0xdead, 0);
        let t = *heap.target();
        let mem = heap.into_memory();
        let out = Dumper::new(DumperConfig::default().with_target(t))
            .dump(&InspectionRequest::new("QObject", "local.o").with_address(object), &mem)
            .payload;
        assert!(out.ends_with(r#"displayedtype="QObject",numchild="5""#));
    }

    #[test]
    fn test_connection_type_names() {
        assert_eq!(connection_type_name(0), "auto");
        assert_eq!(connection_type_name(4), "blockingqueued");
        assert_eq!(connection_type_name(7), "unknown");
    }
}
