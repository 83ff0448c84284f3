//! Value records: dates, times and variants.

use crate::dumper::catalog::{put_field, Field};
use crate::dumper::error::DumpError;
use crate::dumper::handler::{DumpContext, ShapeHandler};
use crate::dumper::layout::{QDateTimePrivate, QVariantPrivate};
use crate::dumper::memory::{advance, ByteOrder, MemView};
use crate::dumper::names::ScalarKind;
use crate::dumper::render::{put_text, read_qstring, utf16_bytes, InnerValue, ScalarValue};
use crate::dumper::wire::Encoding;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use strum_macros::{Display, FromRepr};

/// Julian day of 0001-01-01 minus one.
const JULIAN_DAY_CE_OFFSET: i64 = 1_721_425;
const MSECS_PER_DAY: i32 = 86_400_000;

const DATE_FORMAT: &str = "%a %b %-d %Y";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATE_TIME_FORMAT: &str = "%a %b %-d %H:%M:%S %Y";
const ISO_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Date from a julian day, zero is a null date.
pub fn julian_date(jd: u32) -> Option<NaiveDate> {
    if jd == 0 {
        return None;
    }
    let days = i32::try_from(jd as i64 - JULIAN_DAY_CE_OFFSET).ok()?;
    NaiveDate::from_num_days_from_ce_opt(days)
}

/// Time from milliseconds since midnight, negative is a null time.
pub fn day_time(mds: i32) -> Option<NaiveTime> {
    if !(0..MSECS_PER_DAY).contains(&mds) {
        return None;
    }
    let mds = mds as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(mds / 1000, (mds % 1000) * 1_000_000)
}

/// Put UTF-16 encoded text as `value`.
fn put_value_text(cx: &mut DumpContext, text: &str) {
    let units = utf16_bytes(text, cx.target().byte_order);
    cx.out.put_encoded("value", &units, Encoding::Utf16);
}

pub struct QDateHandler;

impl ShapeHandler for QDateHandler {
    type Header = (u32, Option<NaiveDate>);

    fn validate(&self, cx: &DumpContext) -> Result<(u32, Option<NaiveDate>), DumpError> {
        let jd = cx.mem.u32(cx.address()?)?;
        Ok((jd, julian_date(jd)))
    }

    fn render_summary(
        &self,
        cx: &mut DumpContext,
        (_, date): &(u32, Option<NaiveDate>),
    ) -> Result<(), DumpError> {
        match date {
            Some(date) => put_value_text(cx, &date.format(DATE_FORMAT).to_string()),
            None => cx.out.put_item("value", "(null)"),
        }
        cx.out.put_item("numchild", 3);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        (jd, date): &(u32, Option<NaiveDate>),
    ) -> Result<InnerValue, DumpError> {
        let iso = date
            .map(|d| d.format(ISO_DATE_FORMAT).to_string())
            .unwrap_or_default();
        put_field(cx, "isNull", Field::Bool(*jd == 0));
        put_field(cx, "toString_(ISO)", Field::Text(&iso));
        put_field(cx, "julianDay", Field::Long(*jd as i64));
        Ok(InnerValue::ChildrenSpecified)
    }
}

pub struct QTimeHandler;

impl ShapeHandler for QTimeHandler {
    type Header = (i32, Option<NaiveTime>);

    fn validate(&self, cx: &DumpContext) -> Result<(i32, Option<NaiveTime>), DumpError> {
        let mds = cx.mem.i32(cx.address()?)?;
        Ok((mds, day_time(mds)))
    }

    fn render_summary(
        &self,
        cx: &mut DumpContext,
        (mds, time): &(i32, Option<NaiveTime>),
    ) -> Result<(), DumpError> {
        match time {
            Some(time) => put_value_text(cx, &time.format(TIME_FORMAT).to_string()),
            None if *mds == -1 => cx.out.put_item("value", "(null)"),
            None => cx.out.put_item("value", "(invalid)"),
        }
        cx.out.put_item("numchild", 3);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        (mds, time): &(i32, Option<NaiveTime>),
    ) -> Result<InnerValue, DumpError> {
        let iso = time
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_default();
        put_field(cx, "isNull", Field::Bool(*mds == -1));
        put_field(cx, "toString_(ISO)", Field::Text(&iso));
        put_field(cx, "msecs", Field::Int(*mds as i64));
        Ok(InnerValue::ChildrenSpecified)
    }
}

/// Time spec of a date time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeSpec {
    /// Local time, rendered as is, the time zone of the inspected process is unknown.
    Local,
    Utc,
    /// Offset from UTC in seconds.
    Offset(i32),
}

impl TimeSpec {
    fn new(spec: i32, utc_offset: i32) -> Self {
        match spec {
            2 => TimeSpec::Utc,
            3 => TimeSpec::Offset(utc_offset),
            _ => TimeSpec::Local,
        }
    }
}

/// Decoded `QDateTimePrivate`.
#[derive(Clone, Copy, Debug)]
pub struct DateTimeValue {
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    spec: TimeSpec,
}

impl DateTimeValue {
    fn is_null(&self) -> bool {
        self.date.is_none() && self.time.is_none()
    }

    fn naive(&self) -> Option<NaiveDateTime> {
        Some(NaiveDateTime::new(self.date?, self.time?))
    }

    fn to_string(&self) -> String {
        self.naive()
            .map(|dt| dt.format(DATE_TIME_FORMAT).to_string())
            .unwrap_or_default()
    }

    fn to_iso_string(&self) -> String {
        let Some(dt) = self.naive() else {
            return String::new();
        };
        let text = dt.format(ISO_DATE_TIME_FORMAT).to_string();
        match self.spec {
            TimeSpec::Local => text,
            TimeSpec::Utc => text + "Z",
            TimeSpec::Offset(secs) => match FixedOffset::east_opt(secs) {
                Some(offset) => text + &offset.to_string(),
                None => text,
            },
        }
    }

    /// Seconds since the epoch, -1 for an invalid date time.
    fn to_time_t(&self) -> i64 {
        let Some(dt) = self.naive() else {
            return -1;
        };
        let utc = Utc.from_utc_datetime(&dt).timestamp();
        match self.spec {
            TimeSpec::Offset(secs) => utc - secs as i64,
            TimeSpec::Local | TimeSpec::Utc => utc,
        }
    }
}

pub struct QDateTimeHandler;

impl ShapeHandler for QDateTimeHandler {
    type Header = DateTimeValue;

    fn validate(&self, cx: &DumpContext) -> Result<DateTimeValue, DumpError> {
        let l = QDateTimePrivate::new(cx.target());
        let d = cx.mem.ptr(cx.address()?)?;
        cx.mem.check(d, l.struct_size)?;
        let jd = cx.mem.u32(advance(d, l.jd)?)?;
        let mds = cx.mem.i32(advance(d, l.mds)?)?;
        let spec = cx.mem.i32(advance(d, l.spec)?)?;
        let utc_offset = cx.mem.i32(advance(d, l.utc_offset)?)?;
        Ok(DateTimeValue {
            date: julian_date(jd),
            time: day_time(mds),
            spec: TimeSpec::new(spec, utc_offset),
        })
    }

    fn render_summary(&self, cx: &mut DumpContext, value: &DateTimeValue) -> Result<(), DumpError> {
        if value.is_null() {
            cx.out.put_item("value", "(null)");
        } else {
            put_value_text(cx, &value.to_string());
        }
        cx.out.put_item("numchild", 4);
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        value: &DateTimeValue,
    ) -> Result<InnerValue, DumpError> {
        put_field(cx, "isNull", Field::Bool(value.is_null()));
        put_field(cx, "toTime_t", Field::Long(value.to_time_t()));
        put_field(cx, "toString", Field::Text(&value.to_string()));
        put_field(cx, "toString_(ISO)", Field::Text(&value.to_iso_string()));
        Ok(InnerValue::ChildrenSpecified)
    }
}

// ------------------------------------------- variants --------------------------------------------

/// Built-in variant types of the 4.x series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, FromRepr)]
#[repr(u32)]
pub enum VariantType {
    #[strum(serialize = "bool")]
    Bool = 1,
    #[strum(serialize = "int")]
    Int = 2,
    #[strum(serialize = "uint")]
    UInt = 3,
    #[strum(serialize = "qlonglong")]
    LongLong = 4,
    #[strum(serialize = "qulonglong")]
    ULongLong = 5,
    #[strum(serialize = "double")]
    Double = 6,
    #[strum(serialize = "QChar")]
    Char = 7,
    #[strum(serialize = "QVariantMap")]
    Map = 8,
    #[strum(serialize = "QVariantList")]
    List = 9,
    #[strum(serialize = "QString")]
    String = 10,
    #[strum(serialize = "QStringList")]
    StringList = 11,
    #[strum(serialize = "QByteArray")]
    ByteArray = 12,
    #[strum(serialize = "QBitArray")]
    BitArray = 13,
    #[strum(serialize = "QDate")]
    Date = 14,
    #[strum(serialize = "QTime")]
    Time = 15,
    #[strum(serialize = "QDateTime")]
    DateTime = 16,
    #[strum(serialize = "QUrl")]
    Url = 17,
    #[strum(serialize = "QLocale")]
    Locale = 18,
    #[strum(serialize = "QRect")]
    Rect = 19,
    #[strum(serialize = "QRectF")]
    RectF = 20,
    #[strum(serialize = "QSize")]
    Size = 21,
    #[strum(serialize = "QSizeF")]
    SizeF = 22,
    #[strum(serialize = "QLine")]
    Line = 23,
    #[strum(serialize = "QLineF")]
    LineF = 24,
    #[strum(serialize = "QPoint")]
    Point = 25,
    #[strum(serialize = "QPointF")]
    PointF = 26,
    #[strum(serialize = "QRegExp")]
    RegExp = 27,
    #[strum(serialize = "QVariantHash")]
    Hash = 28,
    #[strum(serialize = "QEasingCurve")]
    EasingCurve = 29,
    #[strum(serialize = "QFont")]
    Font = 64,
    #[strum(serialize = "QPixmap")]
    Pixmap = 65,
    #[strum(serialize = "QBrush")]
    Brush = 66,
    #[strum(serialize = "QColor")]
    Color = 67,
    #[strum(serialize = "QPalette")]
    Palette = 68,
    #[strum(serialize = "QIcon")]
    Icon = 69,
    #[strum(serialize = "QImage")]
    Image = 70,
    #[strum(serialize = "QPolygon")]
    Polygon = 71,
    #[strum(serialize = "QRegion")]
    Region = 72,
    #[strum(serialize = "QBitmap")]
    Bitmap = 73,
    #[strum(serialize = "QCursor")]
    Cursor = 74,
    #[strum(serialize = "QSizePolicy")]
    SizePolicy = 75,
    #[strum(serialize = "QKeySequence")]
    KeySequence = 76,
    #[strum(serialize = "QPen")]
    Pen = 77,
    #[strum(serialize = "QTextLength")]
    TextLength = 78,
    #[strum(serialize = "QTextFormat")]
    TextFormat = 79,
    #[strum(serialize = "QMatrix")]
    Matrix = 80,
    #[strum(serialize = "QTransform")]
    Transform = 81,
    #[strum(serialize = "QMatrix4x4")]
    Matrix4x4 = 82,
    #[strum(serialize = "QVector2D")]
    Vector2D = 83,
    #[strum(serialize = "QVector3D")]
    Vector3D = 84,
    #[strum(serialize = "QVector4D")]
    Vector4D = 85,
    #[strum(serialize = "QQuaternion")]
    Quaternion = 86,
}

impl VariantType {
    /// Catalog type a value of this variant type is dumped with.
    fn catalog_type(&self, cx: &DumpContext) -> Option<String> {
        let (string, variant) = (cx.ns_type("QString"), cx.ns_type("QVariant"));
        Some(match self {
            VariantType::StringList | VariantType::ByteArray | VariantType::DateTime => {
                cx.ns_type(&self.to_string())
            }
            VariantType::Map => format!("{}<{string},{variant} >", cx.ns_type("QMap")),
            VariantType::Hash => format!("{}<{string},{variant} >", cx.ns_type("QHash")),
            VariantType::List => format!("{}<{variant} >", cx.ns_type("QList")),
            _ => return None,
        })
    }

    /// Short text for types rendered inline.
    fn inline_text(&self, mem: &MemView, addr: usize) -> Result<Option<String>, DumpError> {
        let scalar = |kind| -> Result<Option<String>, DumpError> {
            Ok(Some(ScalarValue::read(mem, kind, addr)?.to_string()))
        };
        let ints = |n: usize| -> Result<Vec<i32>, DumpError> {
            (0..n).map(|i| Ok(mem.i32(advance(addr, i * 4)?)?)).collect()
        };
        let reals = |n: usize| -> Result<Vec<f64>, DumpError> {
            (0..n).map(|i| Ok(mem.f64(advance(addr, i * 8)?)?)).collect()
        };

        Ok(Some(match self {
            VariantType::Bool => return scalar(ScalarKind::Bool),
            VariantType::Int => return scalar(ScalarKind::Int),
            VariantType::UInt => return scalar(ScalarKind::UInt),
            VariantType::LongLong => return scalar(ScalarKind::LongLong),
            VariantType::ULongLong => return scalar(ScalarKind::ULongLong),
            VariantType::Double => return scalar(ScalarKind::Double),
            VariantType::Char => return scalar(ScalarKind::QChar),
            VariantType::String => format!("\"{}\"", qstring_text(mem, addr)?),
            VariantType::Date => julian_date(mem.u32(addr)?)
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| "(null)".to_string()),
            VariantType::Time => day_time(mem.i32(addr)?)
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_else(|| "(null)".to_string()),
            VariantType::Point => {
                let p = ints(2)?;
                format!("{}, {}", p[0], p[1])
            }
            VariantType::Size => {
                let s = ints(2)?;
                format!("{}x{}", s[0], s[1])
            }
            VariantType::Rect => {
                // x1, y1, x2, y2
                let r = ints(4)?;
                format!("{}x{}+{}+{}", r[2] - r[0] + 1, r[3] - r[1] + 1, r[0], r[1])
            }
            VariantType::PointF => {
                let p = reals(2)?;
                format!("{}, {}", p[0], p[1])
            }
            VariantType::SizeF => {
                let s = reals(2)?;
                format!("{}x{}", s[0], s[1])
            }
            VariantType::RectF => {
                // x, y, width, height
                let r = reals(4)?;
                format!("{}x{}+{}+{}", r[2], r[3], r[0], r[1])
            }
            _ => return Ok(None),
        }))
    }
}

/// Text of a `QString` whose d pointer is at `addr`.
fn qstring_text(mem: &MemView, addr: usize) -> Result<String, DumpError> {
    let raw = read_qstring(mem, addr)?;
    let order = mem.target().byte_order;
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| match order {
            ByteOrder::Little => u16::from_le_bytes([c[0], c[1]]),
            ByteOrder::Big => u16::from_be_bytes([c[0], c[1]]),
        })
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Decoded `QVariant::Private` header.
#[derive(Clone, Copy, Debug)]
pub struct VariantValue {
    type_id: u32,
    /// Address of the stored value.
    value: usize,
}

/// Split `type:30, is_shared:1, is_null:1` bit fields, return (type, is_shared).
fn variant_type_bits(raw: u32, order: ByteOrder) -> (u32, bool) {
    match order {
        ByteOrder::Little => (raw & 0x3fff_ffff, raw & (1 << 30) != 0),
        ByteOrder::Big => (raw >> 2, raw & 0b10 != 0),
    }
}

pub struct QVariantHandler;

impl QVariantHandler {
    const USER_TYPE: u32 = 127;
}

impl ShapeHandler for QVariantHandler {
    type Header = VariantValue;

    fn validate(&self, cx: &DumpContext) -> Result<VariantValue, DumpError> {
        let l = QVariantPrivate::new(cx.target());
        let addr = cx.address()?;
        let raw = cx.mem.u32(advance(addr, l.type_bits)?)?;
        let (type_id, is_shared) = variant_type_bits(raw, cx.target().byte_order);
        let data = advance(addr, l.data)?;
        let value = if is_shared {
            // shared data keeps a pointer to the value first
            cx.mem.ptr(cx.mem.ptr(data)?)?
        } else {
            data
        };
        Ok(VariantValue { type_id, value })
    }

    fn render_summary(&self, cx: &mut DumpContext, v: &VariantValue) -> Result<(), DumpError> {
        if v.type_id == 0 {
            cx.out.put_item("value", "(invalid)");
            cx.out.put_item("numchild", 0);
            return Ok(());
        }
        let Some(kind) = VariantType::from_repr(v.type_id) else {
            let name = if v.type_id >= Self::USER_TYPE {
                "user type"
            } else {
                "unknown type"
            };
            cx.out.put_item("value", format_args!("({name} {})", v.type_id));
            cx.out.put_item("numchild", 0);
            return Ok(());
        };

        match kind.inline_text(&cx.mem, v.value)? {
            Some(text) => {
                let order = cx.target().byte_order;
                put_text(&mut cx.out, "value", &format!("({kind}) {text}"), order);
                cx.out.put_item("numchild", 0);
            }
            None => {
                cx.out.put_item("value", format_args!("({kind})"));
                cx.out.put_item("numchild", 1);
            }
        }
        Ok(())
    }

    fn enumerate_children(
        &self,
        cx: &mut DumpContext,
        v: &VariantValue,
    ) -> Result<InnerValue, DumpError> {
        let Some(kind) = VariantType::from_repr(v.type_id) else {
            return Ok(InnerValue::ChildrenSpecified);
        };
        if kind.inline_text(&cx.mem, v.value)?.is_some() {
            return Ok(InnerValue::ChildrenSpecified);
        }

        let addr = cx.address()?;
        let catalog_type = kind.catalog_type(cx);
        let name = cx.ns_type(&kind.to_string());
        let accessor = cx.ns_type("qVariantValue");
        let variant = cx.ns_type("QVariant");
        cx.child("value", |cx| {
            match catalog_type {
                Some(type_name) => {
                    cx.out.put_address("addr", v.value);
                    cx.out.put_item("type", type_name);
                }
                None => {
                    cx.out.put_item(
                        "exp",
                        format_args!("'{name} {accessor}<{name} >'(*('{variant}'*){addr:#x})"),
                    );
                    cx.out.put_item("type", &name);
                }
            }
            cx.out.put_item("numchild", 1);
            Ok(())
        });
        Ok(InnerValue::ChildrenSpecified)
    }
}
