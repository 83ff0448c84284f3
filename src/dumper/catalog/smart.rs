use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::layout::{ExternalRefCount, QSharedPointer, QWeakPointer};
use crate::dumper::memory::{advance, Target};
use crate::dumper::names::is_simple_type;
use crate::dumper::render::{inner_value, inner_value_with_type, put_num_child, InnerValue};

/// Pointee and reference count block of a smart pointer.
#[derive(Clone, Copy, Debug)]
pub struct SmartPointer {
    value: usize,
    d: usize,
}

fn shared_fields(t: &Target) -> (usize, usize) {
    let l = QSharedPointer::new(t);
    (l.value, l.d)
}

fn weak_fields(t: &Target) -> (usize, usize) {
    let l = QWeakPointer::new(t);
    (l.value, l.d)
}

/// `QSharedPointer` and `QWeakPointer`, they differ by a field order only.
pub struct SmartPointerHandler {
    /// Offsets of the value pointer and the ref count block pointer.
    fields: fn(&Target) -> (usize, usize),
}

impl SmartPointerHandler {
    pub fn shared() -> Self {
        Self {
            fields: shared_fields,
        }
    }

    pub fn weak() -> Self {
        Self {
            fields: weak_fields,
        }
    }
}

impl ShapeHandler for SmartPointerHandler {
    type Header = SmartPointer;

    fn validate(&self, cx: &DumpContext) -> Result<SmartPointer, DumpError> {
        let addr = cx.address()?;
        let (value, d) = (self.fields)(cx.target());
        let value = cx.mem.deref_at(addr, value)?;
        let d = cx.mem.deref_at(addr, d)?;
        if value != 0 {
            cx.mem.check(d, ExternalRefCount::new(cx.target()).struct_size)?;
        }
        Ok(SmartPointer { value, d })
    }

    fn render_summary(&self, cx: &mut DumpContext, ptr: &SmartPointer) -> Result<(), DumpError> {
        if ptr.value == 0 {
            cx.out.put_item("value", "<null>");
            cx.out.put_item("numchild", 0);
            return Ok(());
        }
        let inner = cx.inner_type().to_string();
        if is_simple_type(&inner) {
            inner_value(cx, &inner, ptr.value, "value")?;
        } else {
            cx.out.put_item("value", "");
        }
        cx.out.put_item("valuedisabled", "true");
        cx.out.put_item("numchild", 3);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        ptr: &SmartPointer,
    ) -> Result<InnerValue, DumpError> {
        if ptr.value == 0 {
            return Ok(InnerValue::ChildrenSpecified);
        }
        let inner = cx.inner_type().to_string();
        cx.child("data", |cx| {
            let result = inner_value_with_type(cx, &inner, ptr.value)?;
            put_num_child(&mut cx.out, result);
            Ok(())
        });

        let l = ExternalRefCount::new(cx.target());
        for (name, field) in [("weakref", l.weakref), ("strongref", l.strongref)] {
            cx.child(name, |cx| {
                let addr = advance(ptr.d, field)?;
                let count = cx.mem.i32(addr)?;
                cx.out.put_item("value", count);
                cx.out.put_item("type", "int");
                cx.out.put_address("addr", addr);
                cx.out.put_item("numchild", 0);
                Ok(())
            });
        }
        Ok(InnerValue::ChildrenSpecified)
    }
}
