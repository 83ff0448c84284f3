//! Inspection request: what a debugger backend asks to dump.

use crate::dumper::error::{DumpError, RequestError};
use crate::dumper::names::inner_types_of;
use smallvec::SmallVec;

/// Max number of `@` separated template parameters in an inner type spec.
pub const MAX_TEMPLATE_PARAMETERS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// Capability and version negotiation.
    Catalog,
    /// Dump of a single value.
    Dump,
}

impl TryFrom<i32> for ProtocolVersion {
    type Error = RequestError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProtocolVersion::Catalog),
            2 | 3 => Ok(ProtocolVersion::Dump),
            v => Err(RequestError::Protocol(v)),
        }
    }
}

/// Numeric request fields, passed by value next to the input buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestHeader {
    pub protocol: i32,
    /// Correlation token of a backend, only used in log records.
    pub token: i32,
    pub addr: usize,
    pub expand_children: bool,
    pub hints: [i64; 4],
}

/// Four integers computed by a backend with its own type introspection,
/// usually element sizes and struct field offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestHints(pub [i64; 4]);

impl RequestHints {
    pub fn get(&self, idx: usize) -> i64 {
        self.0.get(idx).copied().unwrap_or_default()
    }

    /// Hint used as a size, must be positive.
    pub fn size(&self, idx: usize, what: &'static str) -> Result<usize, DumpError> {
        match self.get(idx) {
            v if v > 0 => Ok(v as usize),
            _ => Err(DumpError::MissingHint(what)),
        }
    }

    /// Hint used as an offset, must not be negative.
    pub fn offset(&self, idx: usize, what: &'static str) -> Result<usize, DumpError> {
        match self.get(idx) {
            v if v >= 0 => Ok(v as usize),
            _ => Err(DumpError::MissingHint(what)),
        }
    }
}

/// Input of a single dump operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InspectionRequest {
    /// Declared type, may be namespace qualified and templated.
    pub outer_type: String,
    /// Display path of a value, like `local.foo.bar`.
    pub iname: String,
    /// Backend expression reproducing the value.
    pub expression: String,
    /// `@` separated template arguments.
    pub inner_spec: String,
    /// `None` if value has no addressable storage.
    pub address: Option<usize>,
    pub expand_children: bool,
    pub hints: RequestHints,
    pub token: i32,
}

impl InspectionRequest {
    pub fn new(outer_type: impl Into<String>, iname: impl Into<String>) -> Self {
        Self {
            outer_type: outer_type.into(),
            iname: iname.into(),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, addr: usize) -> Self {
        self.address = (addr != 0).then_some(addr);
        self
    }

    pub fn with_expression(mut self, exp: impl Into<String>) -> Self {
        self.expression = exp.into();
        self
    }

    pub fn with_inner(mut self, inner: impl Into<String>) -> Self {
        self.inner_spec = inner.into();
        self
    }

    pub fn with_children(mut self, expand: bool) -> Self {
        self.expand_children = expand;
        self
    }

    pub fn with_hints(mut self, hints: [i64; 4]) -> Self {
        self.hints = RequestHints(hints);
        self
    }

    pub fn with_token(mut self, token: i32) -> Self {
        self.token = token;
        self
    }

    /// Decode a NUL separated input block: outer type, iname, expression, inner type spec,
    /// iname again. The second iname wins if not empty.
    pub fn decode(input: &[u8], header: &RequestHeader) -> Result<Self, RequestError> {
        let mut fields = NulFields { rest: input };
        let outer_type = fields.next_field("outer type")?;
        let iname = fields.next_field("iname")?;
        let expression = fields.next_field("expression")?;
        let inner_spec = fields.next_field("inner type")?;
        let iname_again = fields.next_field("iname")?;

        let iname = if iname_again.is_empty() {
            iname
        } else {
            iname_again
        };

        let request = InspectionRequest::new(outer_type, iname)
            .with_expression(expression)
            .with_inner(inner_spec)
            .with_address(header.addr)
            .with_children(header.expand_children)
            .with_hints(header.hints)
            .with_token(header.token);
        request.template_parameters()?;
        Ok(request)
    }

    /// Template parameters: `@` separated inner spec if given, template arguments of
    /// the outer type otherwise.
    pub fn template_parameters(&self) -> Result<SmallVec<[&str; 4]>, RequestError> {
        let params: SmallVec<[&str; 4]> = if self.inner_spec.is_empty() {
            inner_types_of(&self.outer_type)
        } else {
            self.inner_spec.split('@').collect()
        };
        if params.len() > MAX_TEMPLATE_PARAMETERS {
            return Err(RequestError::TooManyTemplateParameters(params.len()));
        }
        Ok(params)
    }
}

struct NulFields<'a> {
    rest: &'a [u8],
}

impl<'a> NulFields<'a> {
    fn next_field(&mut self, name: &'static str) -> Result<&'a str, RequestError> {
        let end = self
            .rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(RequestError::MissingField(name))?;
        let field = std::str::from_utf8(&self.rest[..end])?;
        self.rest = &self.rest[end + 1..];
        Ok(field)
    }
}
