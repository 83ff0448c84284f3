use crate::dumper::catalog::put_element;
use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::render::{array_payload, put_qbytearray, put_qstring, ArrayPayload, InnerSummary, InnerValue};
use crate::dumper::walk::Cap;

pub struct QStringHandler;

impl ShapeHandler for QStringHandler {
    type Header = usize;

    fn validate(&self, cx: &DumpContext) -> Result<usize, DumpError> {
        cx.address()
    }

    fn render_summary(&self, cx: &mut DumpContext, addr: &usize) -> Result<(), DumpError> {
        put_qstring(cx, "value", *addr)?;
        cx.out.put_item("numchild", 0);
        Ok(())
    }

    fn enumerate_children(&self, _: &mut DumpContext, _: &usize) -> Result<InnerValue, DumpError> {
        Ok(InnerValue::ChildrenSpecified)
    }
}

/// Byte array: a preview value and a child per byte.
pub struct QByteArrayHandler;

/// Render a byte like `61  (97 'a')`.
fn byte_value(b: u8) -> String {
    let c = if b.is_ascii_graphic() && b != b'\'' && b != b'"' || b == b' ' {
        b as char
    } else {
        '?'
    };
    format!("{b:02x}  ({b} '{c}')")
}

impl ShapeHandler for QByteArrayHandler {
    type Header = ArrayPayload;

    fn validate(&self, cx: &DumpContext) -> Result<ArrayPayload, DumpError> {
        let d = cx.mem.ptr(cx.address()?)?;
        array_payload(&cx.mem, d, 1)
    }

    fn render_summary(&self, cx: &mut DumpContext, payload: &ArrayPayload) -> Result<(), DumpError> {
        put_qbytearray(cx, "value", cx.address()?)?;
        cx.out.put_item("numchild", payload.size);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        payload: &ArrayPayload,
    ) -> Result<InnerValue, DumpError> {
        let cap = Cap::new(payload.size, cx.caps().container_cap);
        let bytes = cx.mem.bytes(payload.data, cap.shown())?;
        let mut summary = InnerSummary::default();
        for (i, b) in bytes.iter().enumerate() {
            put_element(cx, i, &mut summary, |cx| {
                cx.out.put_item("value", byte_value(*b));
                Ok(InnerValue::ChildrenSpecified)
            });
        }
        cx.put_ellipsis_if_cut(cap, "char");
        Ok(InnerValue::NoFurtherChildren)
    }

    fn child_type(&self, _: &DumpContext, _: &ArrayPayload) -> Option<String> {
        Some("char".to_string())
    }
}
