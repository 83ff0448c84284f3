use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::names::{strip_pointer_type, ScalarKind};
use crate::dumper::render::{inner_value_with_type, put_num_child, InnerValue, ScalarValue};

/// Plain scalar: a value and no children.
pub struct ScalarHandler(pub ScalarKind);

impl ShapeHandler for ScalarHandler {
    type Header = ScalarValue;

    fn validate(&self, cx: &DumpContext) -> Result<ScalarValue, DumpError> {
        ScalarValue::read(&cx.mem, self.0, cx.address()?)
    }

    fn render_summary(&self, cx: &mut DumpContext, value: &ScalarValue) -> Result<(), DumpError> {
        cx.out.put_item("value", value);
        cx.out.put_item("numchild", 0);
        Ok(())
    }

    fn enumerate_children(
        &self,
        _: &mut DumpContext,
        _: &ScalarValue,
    ) -> Result<InnerValue, DumpError> {
        Ok(InnerValue::ChildrenSpecified)
    }
}

/// Pointer: an address and the pointee as a single `*` child.
pub struct PointerHandler;

impl ShapeHandler for PointerHandler {
    /// Pointer value.
    type Header = usize;

    fn validate(&self, cx: &DumpContext) -> Result<usize, DumpError> {
        Ok(cx.mem.ptr(cx.address()?)?)
    }

    fn render_summary(&self, cx: &mut DumpContext, ptr: &usize) -> Result<(), DumpError> {
        cx.out.put_address("value", *ptr);
        cx.out.put_item("numchild", usize::from(*ptr != 0));
        Ok(())
    }

    fn enumerate_children(&self, cx: &mut DumpContext, ptr: &usize) -> Result<InnerValue, DumpError> {
        if *ptr == 0 {
            return Ok(InnerValue::ChildrenSpecified);
        }
        let pointee = strip_pointer_type(&cx.request.outer_type).to_string();
        let ptr = *ptr;
        cx.child("*", |cx| {
            let inner = inner_value_with_type(cx, &pointee, ptr)?;
            put_num_child(&mut cx.out, inner);
            Ok(())
        });
        Ok(InnerValue::ChildrenSpecified)
    }
}

#[cfg(test)]
mod test {
    use crate::config::DumperConfig;
    use crate::dumper::memory::{SimHeap, Target};
    use crate::dumper::request::InspectionRequest;
    use crate::dumper::Dumper;

    #[test]
    fn test_int_scalar() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let addr = heap.alloc_bytes(&[0x2A, 0, 0, 0]);
        let mem = heap.into_memory();

        let dumper = Dumper::new(DumperConfig::default().with_target(t));
        let reply = dumper.dump(&InspectionRequest::new("int", "local.i").with_address(addr), &mem);
        assert_eq!(
            reply.payload,
            format!(r#"iname="local.i",addr="{addr:#x}",type="int",value="42",numchild="0""#)
        );
    }

    #[test]
    fn test_pointer_child() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let value = heap.alloc(8);
        heap.put_f64(value, 2.5);
        let slot = heap.alloc(t.pointer_size);
        heap.put_ptr(slot, value);
        let mem = heap.into_memory();

        let dumper = Dumper::new(DumperConfig::default().with_target(t));
        let request = InspectionRequest::new("double *", "local.p")
            .with_address(slot)
            .with_children(true);
        let reply = dumper.dump(&request, &mem);
        assert!(reply.payload.contains(&format!(
            r#"value="{value:#x}",numchild="1",children=[{{name="*",addr="{value:#x}",type="double",value="2.5",numchild="0"}}]"#
        )));
    }

    #[test]
    fn test_null_pointer() {
        let t = Target::default();
        let mut heap = SimHeap::new(t);
        let slot = heap.alloc(t.pointer_size);
        let mem = heap.into_memory();

        let dumper = Dumper::new(DumperConfig::default().with_target(t));
        let request = InspectionRequest::new("QObject *", "local.p")
            .with_address(slot)
            .with_children(true);
        let reply = dumper.dump(&request, &mem);
        assert!(reply
            .payload
            .ends_with(r#"value="<null>",numchild="0",children=[]"#));
    }
}
