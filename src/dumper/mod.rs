pub mod capability;
pub mod catalog;
pub mod error;
pub mod handler;
pub mod layout;
pub mod memory;
pub mod names;
pub mod object;
pub mod render;
pub mod request;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod walk;
pub mod wire;

pub use crate::version::DUMPER_VERSION;

use crate::config::DumperConfig;
use crate::dumper::capability::Catalog;
use crate::dumper::catalog::scalar::{PointerHandler, ScalarHandler};
use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, DynHandler, HandlerRegistry};
use crate::dumper::memory::{MemView, MemoryAccessor};
use crate::dumper::names::{classify, TypeClass};
use crate::dumper::object::{MetaObjectResolver, NoMetaObjects};
use crate::dumper::request::{InspectionRequest, ProtocolVersion, RequestHeader};
use crate::dumper::wire::{Encoding, Reply, WireWriter};
use crate::{dm_debug, dm_warn};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Value of a record that could not be produced.
const INTERNAL_ERROR: &str = "<internal error>";

/// Pretty printer of values living in an inspected process.
///
/// A dumper is stateless between requests, each [`Dumper::dump`] call reads
/// memory through a [`MemoryAccessor`] and returns a complete reply.
pub struct Dumper {
    config: DumperConfig,
    registry: HandlerRegistry,
    objects: Box<dyn MetaObjectResolver + Send + Sync>,
}

impl Dumper {
    pub fn new(config: DumperConfig) -> Self {
        Self {
            config,
            registry: catalog::registry(),
            objects: Box::new(NoMetaObjects),
        }
    }

    /// Use `resolver` for runtime class information of objects.
    pub fn with_object_resolver(
        mut self,
        resolver: impl MetaObjectResolver + Send + Sync + 'static,
    ) -> Self {
        self.objects = Box::new(resolver);
        self
    }

    pub fn config(&self) -> &DumperConfig {
        &self.config
    }

    /// Protocol-1 capability catalog.
    pub fn catalog(&self) -> Reply {
        Catalog::new(&self.config, &self.registry).render()
    }

    /// Dump a single value. Any failure results in a well-formed degraded record
    /// for the requested `iname`.
    pub fn dump(&self, request: &InspectionRequest, mem: &dyn MemoryAccessor) -> Reply {
        if request.outer_type.trim().is_empty() {
            dm_warn!("request #{}: empty type of `{}`", request.token, request.iname);
            let mut out = self.writer();
            out.put_item("iname", &request.iname);
            put_degraded(&mut out, INTERNAL_ERROR);
            out.put_item("type", &request.outer_type);
            return out.finish();
        }

        let view = MemView::new(mem, self.config.target);
        let mut cx = match DumpContext::new(request, view, &self.config, self.objects.as_ref()) {
            Ok(cx) => cx,
            Err(e) => {
                dm_warn!("request #{}: {e:#}", request.token);
                let mut out = self.writer();
                put_header(&mut out, request);
                put_degraded(&mut out, INTERNAL_ERROR);
                return out.finish();
            }
        };

        put_header(&mut cx.out, request);
        let checkpoint = cx.out.checkpoint();

        let class = classify(&request.outer_type, cx.ns());
        dm_debug!(
            "request #{}: dump `{}` as {:?}",
            request.token,
            request.outer_type,
            class.shape()
        );
        if let Err(e) = self.dispatch(&mut cx, class) {
            if e.is_recoverable() {
                dm_debug!("request #{}: {e:#}", request.token);
            } else {
                dm_warn!("request #{}: {e:#}", request.token);
            }
            cx.out.rollback(checkpoint);
            put_degraded(&mut cx.out, INTERNAL_ERROR);
        }
        cx.out.finish()
    }

    /// Like [`Dumper::dump`] but a panic inside a handler is converted into a degraded record.
    /// Used with accessors that may fault on corrupted targets.
    pub fn dump_guarded(&self, request: &InspectionRequest, mem: &dyn MemoryAccessor) -> Reply {
        match catch_unwind(AssertUnwindSafe(|| self.dump(request, mem))) {
            Ok(reply) => reply,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                let e = DumpError::Fault(reason);
                dm_warn!("request #{}: {e:#}", request.token);

                let mut out = self.writer();
                put_header(&mut out, request);
                put_degraded(&mut out, INTERNAL_ERROR);
                out.finish()
            }
        }
    }

    /// Serve a raw request: a NUL separated string block and numeric fields.
    /// A request that can not be decoded yields a malformed reply.
    pub fn handle_input(
        &self,
        input: &[u8],
        header: RequestHeader,
        mem: &dyn MemoryAccessor,
    ) -> Reply {
        let protocol = match ProtocolVersion::try_from(header.protocol) {
            Ok(protocol) => protocol,
            Err(e) => {
                dm_warn!("request #{}: {e:#}", header.token);
                return Reply::malformed();
            }
        };

        match protocol {
            ProtocolVersion::Catalog => self.catalog(),
            ProtocolVersion::Dump => match InspectionRequest::decode(input, &header) {
                Ok(request) => self.dump_guarded(&request, mem),
                Err(e) => {
                    dm_warn!("request #{}: {e:#}", header.token);
                    Reply::malformed()
                }
            },
        }
    }

    fn writer(&self) -> WireWriter {
        WireWriter::new(self.config.output_buffer_size, self.config.headroom)
    }

    fn dispatch(&self, cx: &mut DumpContext, class: TypeClass) -> Result<(), DumpError> {
        match class {
            TypeClass::Scalar(kind) => ScalarHandler(kind).run(cx),
            TypeClass::Pointer => PointerHandler.run(cx),
            TypeClass::Known(known) => match self.registry.get(known) {
                Some(handler) => handler.run(cx),
                None => Err(DumpError::UnknownType(known.name().to_string())),
            },
            TypeClass::Opaque => Err(DumpError::UnknownType(cx.request.outer_type.clone())),
        }
    }
}

/// Put `iname`, `addr` and `type` of a requested value. A value without an address
/// is identified by the backend expression instead.
fn put_header(out: &mut WireWriter, request: &InspectionRequest) {
    out.put_item("iname", &request.iname);
    match request.address {
        Some(addr) => out.put_address("addr", addr),
        None if !request.expression.is_empty() => put_expression(out, &request.expression),
        None => {}
    }
    out.put_item("type", &request.outer_type);
}

fn put_expression(out: &mut WireWriter, exp: &str) {
    if exp.contains(|c: char| c == '"' || c.is_control()) {
        out.put_encoded("exp", exp.as_bytes(), Encoding::Bytes);
    } else {
        out.put_item("exp", exp);
    }
}

fn put_degraded(out: &mut WireWriter, value: &str) {
    out.put_item("value", value);
    out.put_item("numchild", 0);
}
