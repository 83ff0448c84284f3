//! Type name classification.
//!
//! Classification is a pure function of a type name: it never touches inspected memory.

use crate::dumper::memory::{ByteOrder, Target};
use smallvec::SmallVec;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Scalar kinds a dumper can render from raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum ScalarKind {
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    /// UTF-16 code unit of a framework string.
    QChar,
}

impl ScalarKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => ScalarKind::Bool,
            "char" => ScalarKind::Char,
            "signed char" => ScalarKind::SignedChar,
            "unsigned char" | "uchar" => ScalarKind::UnsignedChar,
            "short" | "short int" | "signed short" => ScalarKind::Short,
            "unsigned short" | "unsigned short int" | "ushort" => ScalarKind::UShort,
            "int" | "signed int" | "signed" => ScalarKind::Int,
            "unsigned int" | "unsigned" | "uint" => ScalarKind::UInt,
            "long" | "long int" | "signed long" => ScalarKind::Long,
            "unsigned long" | "unsigned long int" | "ulong" => ScalarKind::ULong,
            "long long" | "long long int" | "qint64" | "qlonglong" => ScalarKind::LongLong,
            "unsigned long long" | "unsigned long long int" | "quint64" | "qulonglong" => {
                ScalarKind::ULongLong
            }
            "float" => ScalarKind::Float,
            "double" | "qreal" => ScalarKind::Double,
            "QChar" => ScalarKind::QChar,
            _ => return None,
        })
    }

    /// Size of a scalar in the target process.
    pub fn size(&self, target: &Target) -> usize {
        match self {
            ScalarKind::Bool
            | ScalarKind::Char
            | ScalarKind::SignedChar
            | ScalarKind::UnsignedChar => 1,
            ScalarKind::Short | ScalarKind::UShort | ScalarKind::QChar => 2,
            ScalarKind::Int | ScalarKind::UInt | ScalarKind::Float => 4,
            ScalarKind::Long | ScalarKind::ULong => target.long_size(),
            ScalarKind::LongLong | ScalarKind::ULongLong | ScalarKind::Double => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ScalarKind::Char
                | ScalarKind::SignedChar
                | ScalarKind::Short
                | ScalarKind::Int
                | ScalarKind::Long
                | ScalarKind::LongLong
        )
    }
}

/// Closed catalog of the types dumpers exist for.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum KnownType {
    #[strum(serialize = "QByteArray")]
    QByteArray,
    #[strum(serialize = "QDate")]
    QDate,
    #[strum(serialize = "QDateTime")]
    QDateTime,
    #[strum(serialize = "QHash")]
    QHash,
    #[strum(serialize = "QHashNode")]
    QHashNode,
    #[strum(serialize = "QLinkedList")]
    QLinkedList,
    #[strum(serialize = "QList")]
    QList,
    #[strum(serialize = "QMap")]
    QMap,
    #[strum(serialize = "QMapNode")]
    QMapNode,
    #[strum(serialize = "QMultiHash")]
    QMultiHash,
    #[strum(serialize = "QMultiMap")]
    QMultiMap,
    #[strum(serialize = "QObject")]
    QObject,
    #[strum(serialize = "QObjectChildList")]
    QObjectChildList,
    #[strum(serialize = "QObjectMethodList")]
    QObjectMethodList,
    #[strum(serialize = "QObjectProperty")]
    QObjectProperty,
    #[strum(serialize = "QObjectPropertyList")]
    QObjectPropertyList,
    #[strum(serialize = "QObjectSignal")]
    QObjectSignal,
    #[strum(serialize = "QObjectSignalList")]
    QObjectSignalList,
    #[strum(serialize = "QObjectSlot")]
    QObjectSlot,
    #[strum(serialize = "QObjectSlotList")]
    QObjectSlotList,
    #[strum(serialize = "QSet")]
    QSet,
    #[strum(serialize = "QSharedPointer")]
    QSharedPointer,
    #[strum(serialize = "QString")]
    QString,
    #[strum(serialize = "QStringList")]
    QStringList,
    #[strum(serialize = "QTime")]
    QTime,
    #[strum(serialize = "QVariant")]
    QVariant,
    #[strum(serialize = "QVector")]
    QVector,
    #[strum(serialize = "QWeakPointer")]
    QWeakPointer,
    #[strum(serialize = "std::list")]
    StdList,
    #[strum(serialize = "std::map")]
    StdMap,
    #[strum(serialize = "std::set")]
    StdSet,
    #[strum(serialize = "std::string")]
    StdString,
    #[strum(serialize = "std::vector")]
    StdVector,
    /// Bit-packed `std::vector<bool>` specialization.
    #[strum(serialize = "std::vector<bool>")]
    StdVectorBool,
    #[strum(serialize = "std::wstring")]
    StdWString,
}

impl KnownType {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn shape(&self) -> Shape {
        match self {
            KnownType::QByteArray | KnownType::StdString => Shape::ByteString,
            KnownType::QString | KnownType::StdWString => Shape::WideString,
            KnownType::QList
            | KnownType::QStringList
            | KnownType::QVector
            | KnownType::StdVector
            | KnownType::StdVectorBool => Shape::FixedArray,
            KnownType::QLinkedList => Shape::SinglyLinkedList,
            KnownType::StdList => Shape::DoublyLinkedNodeRing,
            KnownType::QHash | KnownType::QMultiHash | KnownType::QHashNode | KnownType::QSet => {
                Shape::HashBucketTable
            }
            KnownType::QMap
            | KnownType::QMultiMap
            | KnownType::QMapNode
            | KnownType::StdMap
            | KnownType::StdSet => Shape::OrderedTreeNodeChain,
            KnownType::QSharedPointer | KnownType::QWeakPointer => Shape::SmartPointerPair,
            KnownType::QObject
            | KnownType::QObjectChildList
            | KnownType::QObjectMethodList
            | KnownType::QObjectProperty
            | KnownType::QObjectPropertyList
            | KnownType::QObjectSignal
            | KnownType::QObjectSignalList
            | KnownType::QObjectSlot
            | KnownType::QObjectSlotList => Shape::ObjectGraphNode,
            KnownType::QDate | KnownType::QTime | KnownType::QDateTime | KnownType::QVariant => {
                Shape::ValueRecord
            }
        }
    }

    /// Catalog names as announced to a debugger backend.
    pub fn catalog() -> impl Iterator<Item = KnownType> {
        KnownType::iter()
    }

    /// Find a catalog type by its template-less name. The first two characters
    /// select a short candidate list, an exact comparison picks the entry.
    pub fn lookup(base: &str) -> Option<KnownType> {
        use KnownType::*;

        let b = base.as_bytes();
        if b.len() < 2 {
            return None;
        }
        let candidates: &[KnownType] = match (b[0], b[1]) {
            (b'Q', b'B') => &[QByteArray],
            (b'Q', b'D') => &[QDate, QDateTime],
            (b'Q', b'H') => &[QHash, QHashNode],
            (b'Q', b'L') => &[QLinkedList, QList],
            (b'Q', b'M') => &[QMap, QMapNode, QMultiHash, QMultiMap],
            (b'Q', b'O') => &[
                QObject,
                QObjectChildList,
                QObjectMethodList,
                QObjectProperty,
                QObjectPropertyList,
                QObjectSignal,
                QObjectSignalList,
                QObjectSlot,
                QObjectSlotList,
            ],
            (b'Q', b'S') => &[QSet, QSharedPointer, QString, QStringList],
            (b'Q', b'T') => &[QTime],
            (b'Q', b'V') => &[QVariant, QVector],
            (b'Q', b'W') => &[QWeakPointer],
            (b's', b't') => &[StdList, StdMap, StdSet, StdString, StdVector, StdWString],
            _ => &[],
        };
        candidates.iter().copied().find(|k| k.name() == base)
    }
}

/// Known-shape classification of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar(ScalarKind),
    Pointer,
    ByteString,
    WideString,
    FixedArray,
    SinglyLinkedList,
    DoublyLinkedNodeRing,
    HashBucketTable,
    OrderedTreeNodeChain,
    SmartPointerPair,
    ObjectGraphNode,
    /// Fixed-layout value types (dates, variants).
    ValueRecord,
    Opaque,
}

/// Result of a type name classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Scalar(ScalarKind),
    /// Pointer to something, pointee is classified on dereference.
    Pointer,
    Known(KnownType),
    Opaque,
}

impl TypeClass {
    pub fn shape(&self) -> Shape {
        match self {
            TypeClass::Scalar(kind) => Shape::Scalar(*kind),
            TypeClass::Pointer => Shape::Pointer,
            TypeClass::Known(known) => known.shape(),
            TypeClass::Opaque => Shape::Opaque,
        }
    }
}

/// Classify a type name. Namespace prefix `ns` (with or without trailing `::`) is stripped
/// from framework names.
pub fn classify(raw: &str, ns: &str) -> TypeClass {
    let name = raw.trim();
    if name.is_empty() {
        return TypeClass::Opaque;
    }
    if is_pointer_type(name) {
        return TypeClass::Pointer;
    }

    let name = strip_class_prefixes(strip_module(strip_const(name)));
    let name = strip_namespace(name, ns);
    if let Some(kind) = ScalarKind::from_name(name) {
        return TypeClass::Scalar(kind);
    }

    let base = template_base(name);
    match KnownType::lookup(base) {
        Some(KnownType::StdVector) if first_template_argument(name) == Some("bool") => {
            TypeClass::Known(KnownType::StdVectorBool)
        }
        Some(known) => TypeClass::Known(known),
        None => classify_alias(name, base),
    }
}

/// Alternative spellings of standard library strings.
fn classify_alias(name: &str, base: &str) -> TypeClass {
    let unprefixed = base.strip_prefix("std::").unwrap_or(base);
    match unprefixed {
        "basic_string" | "__cxx11::basic_string" => match first_template_argument(name) {
            Some("char") => TypeClass::Known(KnownType::StdString),
            Some("wchar_t") | Some("unsigned short") => TypeClass::Known(KnownType::StdWString),
            _ => TypeClass::Opaque,
        },
        "__cxx11::list" => TypeClass::Known(KnownType::StdList),
        _ => TypeClass::Opaque,
    }
}

/// Return name without template arguments: `QList<int>` => `QList`.
pub fn template_base(name: &str) -> &str {
    match name.find('<') {
        Some(pos) => name[..pos].trim_end(),
        None => name,
    }
}

fn first_template_argument(name: &str) -> Option<&str> {
    inner_types_of(name).into_iter().next()
}

/// Split top-level template arguments: `QMap<QString, QList<int> >` => [`QString`, `QList<int>`].
pub fn inner_types_of(name: &str) -> SmallVec<[&str; 4]> {
    let mut result = SmallVec::new();
    let (Some(open), Some(close)) = (name.find('<'), name.rfind('>')) else {
        return result;
    };
    if close <= open {
        return result;
    }

    let args = &name[open + 1..close];
    let mut depth = 0_usize;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                result.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = args[start..].trim();
    if !last.is_empty() {
        result.push(last);
    }
    result
}

/// Strip namespace prefix, `ns` may be given with or without trailing `::`.
pub fn strip_namespace<'a>(name: &'a str, ns: &str) -> &'a str {
    let ns = ns.trim_end_matches(':');
    if ns.is_empty() {
        return name;
    }
    name.strip_prefix(ns)
        .and_then(|rest| rest.strip_prefix("::"))
        .unwrap_or(name)
}

/// True for `T *` and `T * const`.
pub fn is_pointer_type(name: &str) -> bool {
    let name = name.trim_end();
    name.ends_with('*') || name.ends_with("* const")
}

/// `T * const` => `T`, `T *` => `T`.
pub fn strip_pointer_type(name: &str) -> &str {
    let name = name.trim_end();
    if let Some(pointee) = name
        .strip_suffix("const")
        .and_then(|n| n.trim_end().strip_suffix('*'))
    {
        return pointee.trim_end();
    }
    match name.strip_suffix('*') {
        Some(pointee) => pointee.trim_end(),
        None => name,
    }
}

/// Remove leading and trailing `const` qualifiers.
pub fn strip_const(name: &str) -> &str {
    let name = name.trim();
    let name = name.strip_prefix("const ").unwrap_or(name);
    name.strip_suffix(" const").unwrap_or(name).trim()
}

/// Remove `class `/`struct `/`union `/`enum ` prefixes some debuggers report.
pub fn strip_class_prefixes(name: &str) -> &str {
    for prefix in ["class ", "struct ", "union ", "enum "] {
        if let Some(rest) = name.strip_prefix(prefix) {
            return rest.trim_start();
        }
    }
    name
}

/// Remove debugger module qualification: `app!QString` => `QString`.
pub fn strip_module(name: &str) -> &str {
    match name.find('!') {
        Some(pos) if !name[..pos].contains('<') => &name[pos + 1..],
        _ => name,
    }
}

/// Simple types, stored inline in every container and rendered without children.
pub fn is_simple_type(name: &str) -> bool {
    match name.as_bytes().first() {
        Some(b'c') => name == "char",
        Some(b'd') => name == "double",
        Some(b'f') => name == "float",
        Some(b'i') => name == "int",
        Some(b'l') => name.starts_with("long"),
        Some(b's') => name.starts_with("short") || name.starts_with("signed"),
        Some(b'u') => name.starts_with("unsigned"),
        _ => false,
    }
}

/// Types the framework may move with a plain memory copy, containers store
/// such values inline when they fit into a pointer.
pub fn is_movable_type(name: &str, ns: &str) -> bool {
    if is_pointer_type(name) || is_simple_type(name) {
        return true;
    }

    let name = strip_namespace(name, ns);
    let b = name.as_bytes();
    if b.len() < 2 || b[0] != b'Q' {
        return false;
    }
    let movable: &[&str] = match b[1] {
        b'B' => &["QBrush", "QBitArray", "QByteArray"],
        b'C' => &["QCustomTypeInfo", "QChar"],
        b'D' => &["QDate", "QDateTime"],
        b'F' => &["QFileInfo", "QFixed", "QFixedPoint", "QFixedSize"],
        b'H' => &["QHashDummyValue"],
        b'I' => &["QIcon", "QImage"],
        b'L' => &["QLine", "QLineF", "QLatin1Char", "QLocal"],
        b'M' => &["QMatrix", "QModelIndex"],
        b'P' => &["QPoint", "QPointF", "QPen", "QPersistentModelIndex"],
        b'R' => &["QResourceRoot", "QRect", "QRectF", "QRegExp"],
        b'S' => &["QSize", "QSizeF", "QString"],
        b'T' => &["QTime", "QTextBlock"],
        b'U' => &["QUrl"],
        b'V' => &["QVariant"],
        b'X' => &[
            "QXmlStreamAttribute",
            "QXmlStreamNamespaceDeclaration",
            "QXmlStreamNotationDeclaration",
            "QXmlStreamEntityDeclaration",
        ],
        _ => &[],
    };
    movable.contains(&name)
}

/// Integer key types the framework hash stores in the place of the hash value.
pub fn is_optimized_int_key(name: &str, byte_order: ByteOrder) -> bool {
    match name {
        "int" | "uint" => true,
        "short" | "ushort" => byte_order == ByteOrder::Little,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_classify_scalars() {
        assert_eq!(classify("int", ""), TypeClass::Scalar(ScalarKind::Int));
        assert_eq!(
            classify("const unsigned long long", ""),
            TypeClass::Scalar(ScalarKind::ULongLong)
        );
        assert_eq!(
            classify("Qt::QChar", "Qt"),
            TypeClass::Scalar(ScalarKind::QChar)
        );
    }

    #[test]
    fn test_classify_catalog() {
        struct TestCase {
            name: &'static str,
            ns: &'static str,
            expected: TypeClass,
        }
        let test_cases = [
            TestCase {
                name: "QList<int>",
                ns: "",
                expected: TypeClass::Known(KnownType::QList),
            },
            TestCase {
                name: "MyNs::QMap<MyNs::QString, int>",
                ns: "MyNs::",
                expected: TypeClass::Known(KnownType::QMap),
            },
            TestCase {
                name: "class QString",
                ns: "",
                expected: TypeClass::Known(KnownType::QString),
            },
            TestCase {
                name: "app!QHash<int,int>",
                ns: "",
                expected: TypeClass::Known(KnownType::QHash),
            },
            TestCase {
                name: "std::vector<bool, std::allocator<bool> >",
                ns: "",
                expected: TypeClass::Known(KnownType::StdVectorBool),
            },
            TestCase {
                name: "std::basic_string<char,std::char_traits<char>,std::allocator<char> >",
                ns: "",
                expected: TypeClass::Known(KnownType::StdString),
            },
            TestCase {
                name: "std::basic_string<wchar_t,std::char_traits<wchar_t>,std::allocator<wchar_t> >",
                ns: "",
                expected: TypeClass::Known(KnownType::StdWString),
            },
            TestCase {
                name: "QWidget",
                ns: "",
                expected: TypeClass::Opaque,
            },
            TestCase {
                name: "Q",
                ns: "",
                expected: TypeClass::Opaque,
            },
            TestCase {
                name: "",
                ns: "",
                expected: TypeClass::Opaque,
            },
            TestCase {
                name: "QObject * const",
                ns: "",
                expected: TypeClass::Pointer,
            },
        ];

        for tc in test_cases {
            assert_eq!(classify(tc.name, tc.ns), tc.expected, "type: {}", tc.name);
        }
    }

    #[test]
    fn test_classify_pointer_roundtrip() {
        for known in KnownType::catalog() {
            let name = known.name();
            let pointer = format!("{name} *");
            assert_eq!(classify(&pointer, ""), TypeClass::Pointer);
            assert_eq!(
                classify(strip_pointer_type(&pointer), ""),
                classify(name, ""),
                "type: {name}"
            );
        }
    }

    #[test]
    fn test_catalog_names_dispatch() {
        for known in KnownType::catalog() {
            if known == KnownType::StdVectorBool {
                continue;
            }
            assert_eq!(KnownType::lookup(known.name()), Some(known));
        }
    }

    #[test]
    fn test_inner_types() {
        assert_eq!(
            inner_types_of("QMap<QString, QList<int> >").as_slice(),
            &["QString", "QList<int>"]
        );
        assert!(inner_types_of("QString").is_empty());
        assert_eq!(inner_types_of("QList<int>").as_slice(), &["int"]);
    }

    #[test]
    fn test_pointer_helpers() {
        assert!(is_pointer_type("QObject *"));
        assert!(is_pointer_type("char * const"));
        assert!(!is_pointer_type("int"));
        assert_eq!(strip_pointer_type("char * const"), "char");
        assert_eq!(strip_pointer_type("QObject *"), "QObject");
        assert_eq!(strip_pointer_type("int"), "int");
    }

    #[test]
    fn test_simple_and_movable() {
        assert!(is_simple_type("unsigned short"));
        assert!(is_simple_type("long long"));
        assert!(!is_simple_type("bool"));
        assert!(!is_simple_type("QString"));
        assert!(is_movable_type("QString", ""));
        assert!(is_movable_type("ns::QDate", "ns"));
        assert!(is_movable_type("Foo *", ""));
        assert!(!is_movable_type("QObject", ""));
    }

    #[test]
    fn test_optimized_keys() {
        assert!(is_optimized_int_key("int", ByteOrder::Big));
        assert!(is_optimized_int_key("short", ByteOrder::Little));
        assert!(!is_optimized_int_key("short", ByteOrder::Big));
        assert!(!is_optimized_int_key("long", ByteOrder::Little));
    }
}
