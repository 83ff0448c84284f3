//! Value rendering: scalars, text payloads and inline values of container elements.

use crate::dumper::catalog::{qlist, qobject};
use crate::dumper::error::{DumpError, MemoryError};
use crate::dumper::handler::DumpContext;
use crate::dumper::layout::{QArrayData, StdStringLayout};
use crate::dumper::memory::{advance, ByteOrder, MemView};
use crate::dumper::names::{classify, strip_pointer_type, KnownType, ScalarKind, TypeClass};
use crate::dumper::wire::{Encoding, WireWriter};
use bytes::Bytes;
use std::fmt::{Display, Formatter};

/// Max plausible length of a string in the inspected process.
pub const MAX_STRING_LEN: i64 = 100_000_000;

/// Tell a container whether a `childnumchild` attribute makes sense for its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InnerValue {
    /// Value is not known to the inline renderer.
    NotHandled,
    /// Renderer wrote `numchild` itself.
    ChildrenSpecified,
    NoFurtherChildren,
    FurtherChildren,
}

impl InnerValue {
    /// Result for a set of children: common result if all agree.
    pub fn combine(self, other: InnerValue) -> InnerValue {
        if self == other {
            self
        } else {
            InnerValue::ChildrenSpecified
        }
    }
}

/// Accumulate [`InnerValue`] over enumerated children.
#[derive(Clone, Copy, Debug, Default)]
pub struct InnerSummary(Option<InnerValue>);

impl InnerSummary {
    pub fn add(&mut self, value: InnerValue) {
        self.0 = Some(self.0.map_or(value, |acc| acc.combine(value)));
    }

    pub fn result(self) -> InnerValue {
        self.0.unwrap_or(InnerValue::ChildrenSpecified)
    }
}

/// Put container level `childnumchild`.
pub fn put_child_num_children(out: &mut WireWriter, inner: InnerValue) {
    match inner {
        InnerValue::NotHandled | InnerValue::ChildrenSpecified => {}
        InnerValue::NoFurtherChildren => out.put_item("childnumchild", 0),
        InnerValue::FurtherChildren => out.put_item("childnumchild", 1),
    }
}

/// Put child level `numchild`, unknown values are announced as expandable.
pub fn put_num_child(out: &mut WireWriter, inner: InnerValue) {
    match inner {
        InnerValue::ChildrenSpecified => {}
        InnerValue::NoFurtherChildren => out.put_item("numchild", 0),
        InnerValue::NotHandled | InnerValue::FurtherChildren => out.put_item("numchild", 1),
    }
}

/// Decoded scalar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarValue {
    Bool(u8),
    Char(i64),
    QChar(u16),
    Signed(i64),
    Unsigned(u64),
    Float(f32),
    Double(f64),
}

fn is_printable(code: i64) -> bool {
    // quote is a wire delimiter
    (0x20..0x7f).contains(&code) && code != b'"' as i64
}

impl ScalarValue {
    /// Decode scalar of `kind` from raw target bytes.
    pub fn decode(kind: ScalarKind, raw: &[u8], order: ByteOrder) -> Option<Self> {
        let n = raw.len();
        if n == 0 || n > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        let unsigned = match order {
            ByteOrder::Little => {
                buf[..n].copy_from_slice(raw);
                u64::from_le_bytes(buf)
            }
            ByteOrder::Big => {
                buf[8 - n..].copy_from_slice(raw);
                u64::from_be_bytes(buf)
            }
        };
        let shift = 64 - 8 * n as u32;
        let signed = ((unsigned << shift) as i64) >> shift;

        Some(match kind {
            ScalarKind::Bool => ScalarValue::Bool(unsigned as u8),
            ScalarKind::Char | ScalarKind::SignedChar => ScalarValue::Char(signed),
            ScalarKind::UnsignedChar => ScalarValue::Char(unsigned as i64),
            ScalarKind::QChar => ScalarValue::QChar(unsigned as u16),
            ScalarKind::Float if n == 4 => ScalarValue::Float(f32::from_bits(unsigned as u32)),
            ScalarKind::Double if n == 8 => ScalarValue::Double(f64::from_bits(unsigned)),
            ScalarKind::Float | ScalarKind::Double => return None,
            k if k.is_signed() => ScalarValue::Signed(signed),
            _ => ScalarValue::Unsigned(unsigned),
        })
    }

    pub fn read(mem: &MemView, kind: ScalarKind, addr: usize) -> Result<Self, DumpError> {
        let size = kind.size(mem.target());
        let raw = mem.bytes(addr, size)?;
        ScalarValue::decode(kind, &raw, mem.target().byte_order)
            .ok_or(DumpError::UnsupportedLayout("scalar size"))
    }
}

impl Display for ScalarValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            ScalarValue::Bool(0) => f.write_str("false"),
            ScalarValue::Bool(1) => f.write_str("true"),
            ScalarValue::Bool(raw) => write!(f, "{raw}"),
            ScalarValue::Char(code) => {
                let c = if is_printable(code) { code as u8 as char } else { '?' };
                write!(f, "'{c}', ascii={code}")
            }
            ScalarValue::QChar(ucs) => {
                let code = ucs as i64;
                let c = if is_printable(code) { code as u8 as char } else { '?' };
                write!(f, "'{c}', ucs={ucs}")
            }
            ScalarValue::Signed(v) => write!(f, "{v}"),
            ScalarValue::Unsigned(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Double(v) => write!(f, "{v}"),
        }
    }
}

/// Text as UTF-16 code units in target byte order.
pub fn utf16_bytes(text: &str, order: ByteOrder) -> Vec<u8> {
    text.encode_utf16()
        .flat_map(|unit| match order {
            ByteOrder::Little => unit.to_le_bytes(),
            ByteOrder::Big => unit.to_be_bytes(),
        })
        .collect()
}

/// Put text value: raw if it is wire safe, UTF-16 encoded otherwise.
pub fn put_text(out: &mut WireWriter, key: &str, text: &str, order: ByteOrder) {
    if text.bytes().all(|b| is_printable(b as i64)) {
        out.put_item(key, text);
    } else {
        out.put_encoded(key, &utf16_bytes(text, order), Encoding::Utf16);
    }
}

// ------------------------------------------ text payloads ----------------------------------------

/// Characters of a framework string or byte array.
#[derive(Clone, Debug)]
pub struct ArrayPayload {
    /// Number of characters.
    pub size: usize,
    /// Address of the first character.
    pub data: usize,
}

/// Read and validate `QString::Data`/`QByteArray::Data` at `d`, `unit` is a character width.
pub fn array_payload(mem: &MemView, d: usize, unit: usize) -> Result<ArrayPayload, DumpError> {
    let l = QArrayData::new(mem.target());
    let size = mem.i32(advance(d, l.size)?)? as i64;
    if !(0..=MAX_STRING_LEN).contains(&size) {
        return Err(DumpError::InvalidCount {
            what: "string size",
            value: size,
        });
    }
    let alloc = mem.i32(advance(d, l.alloc)?)? as i64;
    if alloc < size {
        return Err(DumpError::InvalidCount {
            what: "string capacity",
            value: alloc,
        });
    }
    let data = mem.ptr(advance(d, l.data)?)?;
    let size = size as usize;
    // characters and the terminator
    mem.check(data, (size + 1) * unit)?;
    Ok(ArrayPayload { size, data })
}

/// UTF-16 code units of a `QString` whose d pointer is at `addr`. A string is required
/// to be zero terminated.
pub fn read_qstring(mem: &MemView, addr: usize) -> Result<Bytes, DumpError> {
    let d = mem.ptr(addr)?;
    let payload = array_payload(mem, d, 2)?;
    if mem.u16(payload.data + payload.size * 2)? != 0 {
        return Err(DumpError::Unterminated);
    }
    Ok(mem.bytes(payload.data, payload.size * 2)?)
}

/// Put `QString` stored at `addr` as an UTF-16 encoded field.
pub fn put_qstring(cx: &mut DumpContext, key: &str, addr: usize) -> Result<(), DumpError> {
    let units = read_qstring(&cx.mem, addr)?;
    cx.out.put_encoded(key, &units, Encoding::Utf16);
    Ok(())
}

/// Bytes of a `QByteArray` whose d pointer is at `addr`, cut to `limit` bytes.
/// Return bytes and full size.
pub fn read_qbytearray(mem: &MemView, addr: usize, limit: usize) -> Result<(Bytes, usize), DumpError> {
    let d = mem.ptr(addr)?;
    let payload = array_payload(mem, d, 1)?;
    let shown = payload.size.min(limit);
    Ok((mem.bytes(payload.data, shown)?, payload.size))
}

/// Put `QByteArray` stored at `addr`: base64 of leading bytes and a size note for a cut array.
pub fn put_qbytearray(cx: &mut DumpContext, key: &str, addr: usize) -> Result<usize, DumpError> {
    let (bytes, size) = read_qbytearray(&cx.mem, addr, cx.caps().byte_array_preview)?;
    cx.out.begin_item(key);
    cx.out.push_base64(&bytes);
    if size > bytes.len() {
        cx.out.push_text(&format!(" <size: {size}, cut...>"));
    }
    cx.out.end_item();
    cx.out.put_item(&format!("{key}encoded"), Encoding::Bytes.code());
    Ok(size)
}

/// Code units of a `std::basic_string` at `addr` with `char_size` wide characters.
pub fn read_std_string(mem: &MemView, addr: usize, char_size: usize) -> Result<Bytes, DumpError> {
    let ptr_size = mem.target().pointer_size;
    let (data, len) = match StdStringLayout::new(mem.target()) {
        StdStringLayout::Sso { data, length } => (
            mem.ptr(advance(addr, data)?)?,
            mem.unsigned(advance(addr, length)?, ptr_size)?,
        ),
        StdStringLayout::Cow { data, rep_size } => {
            let chars = mem.ptr(advance(addr, data)?)?;
            let rep = chars
                .checked_sub(rep_size)
                .ok_or(MemoryError::Overflow(chars))?;
            (chars, mem.unsigned(rep, ptr_size)?)
        }
        StdStringLayout::Msvc {
            bx,
            size,
            reserved,
            buffer,
        } => {
            let len = mem.unsigned(advance(addr, size)?, ptr_size)?;
            let reserved = mem.unsigned(advance(addr, reserved)?, ptr_size)?;
            let data = if (reserved as usize) < buffer / char_size {
                advance(addr, bx)?
            } else {
                mem.ptr(advance(addr, bx)?)?
            };
            (data, len)
        }
    };

    if len > MAX_STRING_LEN as u64 {
        return Err(DumpError::InvalidCount {
            what: "string length",
            value: len as i64,
        });
    }
    let byte_len = len as usize * char_size;
    if byte_len == 0 {
        return Ok(Bytes::new());
    }
    Ok(mem.bytes(data, byte_len)?)
}

/// Put `std::string` (`wide == false`) or `std::wstring` stored at `addr`.
pub fn put_std_string(cx: &mut DumpContext, key: &str, addr: usize, wide: bool) -> Result<(), DumpError> {
    let char_size = if wide { cx.target().wchar_size() } else { 1 };
    let units = read_std_string(&cx.mem, addr, char_size)?;
    cx.out.put_encoded(key, &units, Encoding::for_unit_width(char_size));
    Ok(())
}

// ------------------------------------------ inner values -----------------------------------------

/// Render a container element of `type_name` at `addr` into `field` if the type is known
/// to be rendered inline.
pub fn inner_value(
    cx: &mut DumpContext,
    type_name: &str,
    addr: usize,
    field: &str,
) -> Result<InnerValue, DumpError> {
    match classify(type_name, cx.ns()) {
        TypeClass::Scalar(kind) => {
            let value = ScalarValue::read(&cx.mem, kind, addr)?;
            cx.out.put_item(field, value);
            Ok(InnerValue::NoFurtherChildren)
        }
        TypeClass::Known(KnownType::QString) => {
            put_qstring(cx, field, addr)?;
            Ok(InnerValue::NoFurtherChildren)
        }
        TypeClass::Known(KnownType::QByteArray) => {
            put_qbytearray(cx, field, addr)?;
            Ok(InnerValue::FurtherChildren)
        }
        TypeClass::Known(KnownType::StdString) => {
            put_std_string(cx, field, addr, false)?;
            Ok(InnerValue::NoFurtherChildren)
        }
        TypeClass::Known(KnownType::StdWString) => {
            put_std_string(cx, field, addr, true)?;
            Ok(InnerValue::NoFurtherChildren)
        }
        TypeClass::Known(KnownType::QList | KnownType::QStringList) if field == "value" => {
            let size = qlist::list_size(&cx.mem, addr)?;
            cx.out.put_item_count("value", size);
            cx.out.put_item("valuedisabled", "true");
            cx.out.put_item("numchild", size);
            Ok(InnerValue::ChildrenSpecified)
        }
        TypeClass::Known(KnownType::QObject) if field == "value" => {
            qobject::put_object_summary(cx, addr)
        }
        TypeClass::Pointer if field == "value" => {
            let pointee = strip_pointer_type(type_name);
            let ptr = cx.mem.ptr(addr)?;
            if classify(pointee, cx.ns()) == TypeClass::Known(KnownType::QObject) {
                return qobject::put_object_summary(cx, ptr);
            }
            cx.out.put_address("value", ptr);
            Ok(if ptr == 0 {
                InnerValue::NoFurtherChildren
            } else {
                InnerValue::FurtherChildren
            })
        }
        _ => Ok(InnerValue::NotHandled),
    }
}

/// Put element `addr`, `type` and an inline value.
pub fn inner_value_with_type(
    cx: &mut DumpContext,
    type_name: &str,
    addr: usize,
) -> Result<InnerValue, DumpError> {
    cx.out.put_address("addr", addr);
    cx.out.put_item("type", type_name);
    if type_name.is_empty() {
        return Ok(InnerValue::NotHandled);
    }
    inner_value(cx, type_name, addr, "value")
}

/// Like [`inner_value_with_type`], but for a container that stores pointers to `pointee`
/// elements: the element at `addr` is a pointer, it is dereferenced.
pub fn inner_value_or_pointer(
    cx: &mut DumpContext,
    type_name: &str,
    pointee: Option<&str>,
    addr: usize,
) -> Result<InnerValue, DumpError> {
    let Some(pointee) = pointee else {
        return inner_value_with_type(cx, type_name, addr);
    };

    let target = cx.mem.ptr(addr)?;
    if target != 0 {
        cx.out.put_address("addr", target);
        cx.out.put_address("saddr", target);
        cx.out.put_item("type", pointee);
        return inner_value(cx, pointee, target, "value");
    }
    cx.out.put_address("addr", addr);
    cx.out.put_item("type", pointee);
    cx.out.put_item("value", "<null>");
    cx.out.put_item("numchild", 0);
    Ok(InnerValue::ChildrenSpecified)
}
