//! Request scoped dump context and the shape handler capability.

use crate::config::{Caps, DumperConfig};
use crate::dumper::error::{DumpError, RequestError};
use crate::dumper::memory::{MemView, Target};
use crate::dumper::names::KnownType;
use crate::dumper::object::MetaObjectResolver;
use crate::dumper::render::{put_child_num_children, InnerValue};
use crate::dumper::request::{InspectionRequest, RequestHints};
use crate::dumper::walk::Cap;
use crate::dumper::wire::WireWriter;
use crate::muted_error;
use crate::version::Version;
use indexmap::IndexMap;
use std::fmt::Display;

/// Everything a handler needs to serve a single request.
pub struct DumpContext<'a> {
    pub request: &'a InspectionRequest,
    pub mem: MemView<'a>,
    pub out: WireWriter,
    pub config: &'a DumperConfig,
    pub objects: &'a dyn MetaObjectResolver,
    params: Vec<String>,
}

impl<'a> DumpContext<'a> {
    pub fn new(
        request: &'a InspectionRequest,
        mem: MemView<'a>,
        config: &'a DumperConfig,
        objects: &'a dyn MetaObjectResolver,
    ) -> Result<Self, RequestError> {
        let params = request
            .template_parameters()?
            .into_iter()
            .map(ToString::to_string)
            .collect();
        Ok(Self {
            request,
            mem,
            out: WireWriter::new(config.output_buffer_size, config.headroom),
            config,
            objects,
            params,
        })
    }

    pub fn target(&self) -> &Target {
        self.mem.target()
    }

    pub fn caps(&self) -> &Caps {
        &self.config.caps
    }

    pub fn version(&self) -> Version {
        self.config.framework_version
    }

    /// Framework namespace without a trailing `::`.
    pub fn ns(&self) -> &str {
        self.config.namespace.trim_end_matches(':')
    }

    /// Framework type name qualified with the namespace: `QObject` => `ns::QObject`.
    pub fn ns_type(&self, name: &str) -> String {
        match self.ns() {
            "" => name.to_string(),
            ns => format!("{ns}::{name}"),
        }
    }

    pub fn address(&self) -> Result<usize, DumpError> {
        self.request.address.ok_or(DumpError::NoAddress)
    }

    pub fn hints(&self) -> &RequestHints {
        &self.request.hints
    }

    pub fn expand_children(&self) -> bool {
        self.request.expand_children
    }

    pub fn template_parameter(&self, idx: usize) -> Result<&str, DumpError> {
        self.params
            .get(idx)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .ok_or(DumpError::MissingTemplateParameter(idx))
    }

    pub fn template_parameters(&self) -> &[String] {
        &self.params
    }

    /// First template parameter or empty string.
    pub fn inner_type(&self) -> &str {
        self.params.first().map(String::as_str).unwrap_or_default()
    }

    /// Write a child record `{name="...",...}`. A failure inside `f` discards everything `f`
    /// wrote and leaves a placeholder child, the enumeration goes on.
    pub fn child<F>(&mut self, name: impl Display, f: F)
    where
        F: FnOnce(&mut Self) -> Result<(), DumpError>,
    {
        self.out.begin_hash();
        self.out.put_item("name", name);
        let checkpoint = self.out.checkpoint();
        let result = f(self);
        if muted_error!(result, "child:").is_none() {
            self.out.rollback(checkpoint);
            self.out.put_item("value", "<not accessible>");
            self.out.put_item("numchild", 0);
        }
        self.out.end_hash();
    }

    /// Append ellipsis record if a children list was cut.
    pub fn put_ellipsis_if_cut(&mut self, cap: Cap, inner_type: &str) {
        if cap.is_cut() {
            self.out.put_ellipsis(inner_type, cap.total);
        }
    }
}

/// Capability of a known type dumper. A dump is a validation of a header read from memory,
/// a summary (`value`, `numchild` and friends) and, if requested, children.
pub trait ShapeHandler {
    /// Validated container header.
    type Header;

    fn validate(&self, cx: &DumpContext) -> Result<Self::Header, DumpError>;

    fn render_summary(&self, cx: &mut DumpContext, header: &Self::Header) -> Result<(), DumpError>;

    /// Write children records, return aggregated inner value result.
    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        header: &Self::Header,
    ) -> Result<InnerValue, DumpError>;

    /// Type of all children, written after a children list.
    fn child_type(&self, _cx: &DumpContext, _header: &Self::Header) -> Option<String> {
        None
    }
}

/// Type erased [`ShapeHandler`].
pub trait DynHandler {
    fn run(&self, cx: &mut DumpContext) -> Result<(), DumpError>;
}

impl<H: ShapeHandler> DynHandler for H {
    fn run(&self, cx: &mut DumpContext) -> Result<(), DumpError> {
        let header = self.validate(cx)?;
        self.render_summary(cx, &header)?;
        if cx.expand_children() {
            cx.out.begin_children();
            let inner = self.enumerate_children(cx, &header)?;
            cx.out.end_children();
            if let Some(child_type) = self.child_type(cx, &header) {
                cx.out.put_item("childtype", child_type);
            }
            put_child_num_children(&mut cx.out, inner);
        }
        Ok(())
    }
}

/// Handlers keyed by a known type, in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: IndexMap<KnownType, Box<dyn DynHandler + Send + Sync>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, known: KnownType, handler: impl DynHandler + Send + Sync + 'static) {
        self.handlers.insert(known, Box::new(handler));
    }

    pub fn get(&self, known: KnownType) -> Option<&(dyn DynHandler + Send + Sync)> {
        self.handlers.get(&known).map(|h| h.as_ref())
    }

    pub fn contains(&self, known: KnownType) -> bool {
        self.handlers.contains_key(&known)
    }

    /// Types with a registered handler.
    pub fn known_types(&self) -> impl Iterator<Item = KnownType> + '_ {
        self.handlers.keys().copied()
    }
}
