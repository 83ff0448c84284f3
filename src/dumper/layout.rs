//! Layout descriptors of the containers dumpers read.
//!
//! Every descriptor is declared as an ordered list of fields and laid out with C struct rules
//! for a concrete [`Target`], so offsets follow the target's pointer size and alignment instead of
//! being spelled out by hand. Descriptors are cheap and built on demand for every request.

use self::FieldKind::*;
use crate::dumper::memory::{StdAbi, Target};
use crate::version::Version;
use crate::version_switch;

#[derive(Clone, Copy, Debug)]
pub enum FieldKind {
    I8,
    I16,
    I32,
    I64,
    Ptr,
    /// Fixed size array of pointers.
    PtrArray(usize),
    /// Byte buffer aligned as a pointer (unions with a pointer or size member).
    WordAlignedBytes(usize),
    /// Nested struct described by another descriptor, returns (size, align).
    Nested(fn(&Target) -> (usize, usize)),
    Blob { size: usize, align: usize },
}

impl FieldKind {
    pub fn size(&self, target: &Target) -> usize {
        match self {
            I8 => 1,
            I16 => 2,
            I32 => 4,
            I64 => 8,
            Ptr => target.pointer_size,
            PtrArray(n) => target.pointer_size * n,
            WordAlignedBytes(n) => *n,
            Nested(shape) => shape(target).0,
            Blob { size, .. } => *size,
        }
    }

    pub fn align(&self, target: &Target) -> usize {
        match self {
            I8 | I16 | I32 | I64 => self.size(target),
            Ptr | PtrArray(_) | WordAlignedBytes(_) => target.pointer_size,
            Nested(shape) => shape(target).1,
            Blob { align, .. } => (*align).max(1),
        }
    }
}

pub fn align_up(value: usize, align: usize) -> usize {
    let align = align.max(1);
    value.div_ceil(align) * align
}

/// Places fields one by one following C struct layout rules.
pub struct LayoutCursor<'t> {
    target: &'t Target,
    offset: usize,
    align: usize,
}

impl<'t> LayoutCursor<'t> {
    pub fn new(target: &'t Target) -> Self {
        Self {
            target,
            offset: 0,
            align: 1,
        }
    }

    /// Place next field, return its offset.
    pub fn field(&mut self, kind: FieldKind) -> usize {
        let align = kind.align(self.target);
        self.offset = align_up(self.offset, align);
        let at = self.offset;
        self.offset += kind.size(self.target);
        self.align = self.align.max(align);
        at
    }

    /// Return (size, align) of a struct with trailing padding.
    pub fn finish(self) -> (usize, usize) {
        (align_up(self.offset, self.align), self.align)
    }
}

macro_rules! c_struct {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($field:ident: $kind:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[allow(dead_code)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        $vis struct $name {
            $(pub $field: usize,)+
            pub struct_size: usize,
            pub struct_align: usize,
        }

        impl $name {
            pub fn new(target: &Target) -> Self {
                let mut cursor = LayoutCursor::new(target);
                $(let $field = cursor.field($kind);)+
                let (struct_size, struct_align) = cursor.finish();
                Self { $($field,)+ struct_size, struct_align }
            }

            /// Return (size, align) for use as a nested field.
            #[allow(unused)]
            pub fn shape(target: &Target) -> (usize, usize) {
                let layout = Self::new(target);
                (layout.struct_size, layout.struct_align)
            }
        }
    };
}

// ------------------------------------ framework private data ------------------------------------

c_struct! {
    /// Shared header of `QString::Data` and `QByteArray::Data`.
    pub struct QArrayData { refcount: I32, alloc: I32, size: I32, data: Ptr }
}

c_struct! {
    /// `QListData::Data`, elements (or pointers to them) start at `array`.
    pub struct QListData { refcount: I32, alloc: I32, begin: I32, end: I32, sharable: I32, array: Ptr }
}

c_struct! {
    pub struct QLinkedListData { next: Ptr, prev: Ptr, refcount: I32, size: I32, sharable: I32 }
}

c_struct! {
    /// Link part of `QLinkedListNode<T>`, payload follows.
    pub struct QLinkedListNode { next: Ptr, prev: Ptr }
}

c_struct! {
    pub struct QHashData {
        fake_next: Ptr,
        buckets: Ptr,
        refcount: I32,
        size: I32,
        node_size: I32,
        user_num_bits: I16,
        num_bits: I16,
        num_buckets: I32,
        sharable: I32,
    }
}

c_struct! {
    pub struct QMapData {
        backward: Ptr,
        forward: PtrArray(12),
        refcount: I32,
        top_level: I32,
        size: I32,
        random_seed: I32,
        flags: I32,
    }
}

c_struct! {
    /// `QVectorData`, typed elements start at an offset depending on element alignment.
    pub struct QVectorData { refcount: I32, alloc: I32, size: I32, flags: I32 }
}

c_struct! {
    pub struct QSharedPointer { value: Ptr, d: Ptr }
}

c_struct! {
    pub struct QWeakPointer { d: Ptr, value: Ptr }
}

c_struct! {
    /// `ExternalRefCountData` block shared by strong and weak pointers.
    pub struct ExternalRefCount { vptr: Ptr, weakref: I32, strongref: I32 }
}

c_struct! {
    pub struct QObject { vptr: Ptr, d_ptr: Ptr }
}

c_struct! {
    /// `QObjectPrivate` for 4.5 series.
    pub struct QObjectPrivate45 {
        vptr: Ptr,
        q_ptr: Ptr,
        parent: Ptr,
        children: Ptr,
        flags: I32,
        posted_events: I32,
        current_child_being_deleted: Ptr,
        thread_data: Ptr,
        current_sender: Ptr,
        event_filters: Ptr,
        extra_data: Ptr,
        connected_signals: I32,
        object_name: Ptr,
        connection_lists: Ptr,
        senders: Ptr,
    }
}

c_struct! {
    /// `QObjectPrivate` for 4.6+ series.
    pub struct QObjectPrivate46 {
        vptr: Ptr,
        q_ptr: Ptr,
        parent: Ptr,
        children: Ptr,
        flags: I32,
        posted_events: I32,
        meta_object: Ptr,
        extra_data: Ptr,
        thread_data: Ptr,
        connection_lists: Ptr,
        senders: Ptr,
        current_sender: Ptr,
        connected_signals: Blob { size: 8, align: 4 },
        object_name: Ptr,
    }
}

/// Object private data fields dumpers need, independent of a framework version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectPrivateLayout {
    pub parent: usize,
    pub children: usize,
    pub object_name: usize,
    pub connection_lists: usize,
    pub senders: usize,
    /// True if connection records use the 4.6 layout.
    pub connections_supported: bool,
}

impl ObjectPrivateLayout {
    pub fn new(target: &Target, version: Version) -> Option<Self> {
        version_switch!(
            version,
            (4, 5, 0) ..= (4, 5, u32::MAX) => {
                let l = QObjectPrivate45::new(target);
                Self {
                    parent: l.parent,
                    children: l.children,
                    object_name: l.object_name,
                    connection_lists: l.connection_lists,
                    senders: l.senders,
                    connections_supported: false,
                }
            },
            (4, 6, 0) ..= (4, 8, u32::MAX) => {
                let l = QObjectPrivate46::new(target);
                Self {
                    parent: l.parent,
                    children: l.children,
                    object_name: l.object_name,
                    connection_lists: l.connection_lists,
                    senders: l.senders,
                    connections_supported: true,
                }
            },
        )
    }
}

c_struct! {
    /// `QObjectPrivate::Connection` of 4.6+ series.
    pub struct Connection {
        sender: Ptr,
        receiver: Ptr,
        method: I32,
        connection_type: I32,
        argument_types: Ptr,
        next_connection_list: Ptr,
        next: Ptr,
        prev: Ptr,
    }
}

c_struct! {
    pub struct ConnectionList { first: Ptr, last: Ptr }
}

c_struct! {
    /// `QVariant::Private`: value union followed by `type:30, is_shared:1, is_null:1` bits.
    pub struct QVariantPrivate { data: Blob { size: 8, align: 8 }, type_bits: I32 }
}

c_struct! {
    pub struct QDateTimePrivate { refcount: I32, jd: I32, mds: I32, spec: I32, utc_offset: I32 }
}

/// Offset of typed elements after a `QVectorData` header.
pub fn vector_payload_offset(target: &Target, element_align: usize) -> usize {
    align_up(QVectorData::new(target).struct_size, element_align)
}

// ------------------------------------ hash and map nodes -----------------------------------------

c_struct! {
    /// Optimized integer key, value fits into an int.
    struct NodeOS { next: Ptr, key: I32, value: I32 }
}

c_struct! {
    /// Optimized integer key, larger value.
    struct NodeOL { next: Ptr, key: I32, value: Ptr }
}

c_struct! {
    /// Generic small key, value fits into an int.
    struct NodeNS { next: Ptr, hash: I32, key: I32, value: I32 }
}

c_struct! {
    /// Generic small key, larger value.
    struct NodeNL { next: Ptr, hash: I32, key: I32, value: Ptr }
}

c_struct! {
    /// Key larger than an int.
    struct NodeL { next: Ptr, hash: I32, key: Ptr, value: Ptr }
}

/// Physical layouts of a framework hash node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashNodeLayout {
    OptimizedKeySmallValue,
    OptimizedKeyLargeValue,
    SmallKeySmallValue,
    SmallKeyLargeValue,
    LargeKey,
}

impl HashNodeLayout {
    pub fn select(target: &Target, optimized_key: bool, key_size: usize, value_size: usize) -> Self {
        let int = target.int_size();
        if optimized_key {
            if value_size > int {
                HashNodeLayout::OptimizedKeyLargeValue
            } else {
                HashNodeLayout::OptimizedKeySmallValue
            }
        } else if key_size > int {
            HashNodeLayout::LargeKey
        } else if value_size > int {
            HashNodeLayout::SmallKeyLargeValue
        } else {
            HashNodeLayout::SmallKeySmallValue
        }
    }

    /// Return (key offset, value offset) inside a node.
    pub fn offsets(&self, target: &Target) -> (usize, usize) {
        match self {
            HashNodeLayout::OptimizedKeySmallValue => {
                let n = NodeOS::new(target);
                (n.key, n.value)
            }
            HashNodeLayout::OptimizedKeyLargeValue => {
                let n = NodeOL::new(target);
                (n.key, n.value)
            }
            HashNodeLayout::SmallKeySmallValue => {
                let n = NodeNS::new(target);
                (n.key, n.value)
            }
            HashNodeLayout::SmallKeyLargeValue => {
                let n = NodeNL::new(target);
                (n.key, n.value)
            }
            HashNodeLayout::LargeKey => {
                let n = NodeL::new(target);
                (n.key, n.value)
            }
        }
    }
}

/// Byte offset of the key (`for_key`) or the value inside a hash node.
pub fn hash_offset(
    target: &Target,
    optimized_key: bool,
    for_key: bool,
    key_size: usize,
    value_size: usize,
) -> usize {
    let (key, value) =
        HashNodeLayout::select(target, optimized_key, key_size, value_size).offsets(target);
    if for_key {
        key
    } else {
        value
    }
}

/// Key and value offsets relative to a map node link pointer. The payload lies
/// before the link fields, so offsets are negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapNodeOffsets {
    pub key: isize,
    pub value: isize,
}

/// Compute map node offsets from the node size and the value offset inside the node,
/// both are supplied by a backend.
pub fn map_node_offsets(target: &Target, node_size: usize, value_offset: usize) -> MapNodeOffsets {
    let key = 2 * target.pointer_size as isize - node_size as isize;
    MapNodeOffsets {
        key,
        value: key + value_offset as isize,
    }
}

/// Size and alignment of some well known value types, used for node layouts
/// in the capability catalog.
pub fn value_shape(name: &str, target: &Target) -> Option<(usize, usize)> {
    let ptr = target.pointer_size;
    Some(match name {
        "int" | "uint" | "float" => (4, 4),
        "char" | "bool" => (1, 1),
        "double" | "long long" => (8, 8),
        "QString" | "QByteArray" | "QStringList" | "QDateTime" | "QList" => (ptr, ptr),
        "QVariant" => QVariantPrivate::shape(target),
        "std::string" | "std::wstring" => StdStringLayout::shape(target),
        _ => return None,
    })
}

/// `QMapNode<K, V>`: key, value, then the link fields. Return (value offset, node size).
pub fn map_node_shape(target: &Target, key: (usize, usize), value: (usize, usize)) -> (usize, usize) {
    let mut cursor = LayoutCursor::new(target);
    cursor.field(Blob {
        size: key.0,
        align: key.1,
    });
    let value_offset = cursor.field(Blob {
        size: value.0,
        align: value.1,
    });
    cursor.field(Ptr);
    cursor.field(PtrArray(1));
    (value_offset, cursor.finish().0)
}

/// `std::pair<K, V>`, return offset of `second`.
pub fn pair_second_offset(target: &Target, first: (usize, usize), second: (usize, usize)) -> usize {
    let mut cursor = LayoutCursor::new(target);
    cursor.field(Blob {
        size: first.0,
        align: first.1,
    });
    cursor.field(Blob {
        size: second.0,
        align: second.1,
    })
}

// ------------------------------------ standard library -------------------------------------------

c_struct! {
    /// libstdc++ C++11 `basic_string`.
    pub struct GnuSsoString { data: Ptr, length: Ptr, local: WordAlignedBytes(16) }
}

c_struct! {
    /// libstdc++ copy-on-write `basic_string`, points at characters, `GnuCowRep` lies before them.
    pub struct GnuCowString { data: Ptr }
}

c_struct! {
    pub struct GnuCowRep { length: Ptr, capacity: Ptr, refcount: I32 }
}

c_struct! {
    /// MSVC `basic_string`: inline buffer until capacity reaches the buffer size.
    pub struct MsvcString { bx: WordAlignedBytes(16), size: Ptr, reserved: Ptr }
}

/// Resolved `std::basic_string` layout for an ABI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdStringLayout {
    /// Pointer to characters at `data`, length at `length`.
    Sso { data: usize, length: usize },
    /// Pointer to characters at `data`, length at `data - rep_size`.
    Cow { data: usize, rep_size: usize },
    /// Inline buffer while `reserved < 16 / char_size`, otherwise pointer at `bx`.
    Msvc {
        bx: usize,
        size: usize,
        reserved: usize,
        buffer: usize,
    },
}

impl StdStringLayout {
    pub fn new(target: &Target) -> Self {
        match target.abi {
            StdAbi::GnuCxx11 => {
                let l = GnuSsoString::new(target);
                StdStringLayout::Sso {
                    data: l.data,
                    length: l.length,
                }
            }
            StdAbi::GnuCow => StdStringLayout::Cow {
                data: GnuCowString::new(target).data,
                rep_size: GnuCowRep::new(target).struct_size,
            },
            StdAbi::Msvc => {
                let l = MsvcString::new(target);
                StdStringLayout::Msvc {
                    bx: l.bx,
                    size: l.size,
                    reserved: l.reserved,
                    buffer: 16,
                }
            }
        }
    }

    pub fn shape(target: &Target) -> (usize, usize) {
        match target.abi {
            StdAbi::GnuCxx11 => GnuSsoString::shape(target),
            StdAbi::GnuCow => GnuCowString::shape(target),
            StdAbi::Msvc => MsvcString::shape(target),
        }
    }
}

c_struct! {
    /// `std::vector` implementation pointers.
    pub struct VectorImpl { start: Ptr, finish: Ptr, end_of_storage: Ptr }
}

c_struct! {
    /// libstdc++ `std::vector<bool>`: bit iterators are (word pointer, bit offset) pairs.
    pub struct GnuBitVector {
        start: Ptr,
        start_offset: I32,
        finish: Ptr,
        finish_offset: I32,
        end_of_storage: Ptr,
    }
}

c_struct! {
    /// MSVC `std::vector<bool>`: vector of words and a bit count.
    pub struct MsvcBitVector { first: Ptr, last: Ptr, end: Ptr, size: Ptr }
}

c_struct! {
    /// `std::list` node link part, payload follows.
    pub struct ListNodeBase { next: Ptr, prev: Ptr }
}

c_struct! {
    /// MSVC `std::list`: pointer to a sentinel node and an element count.
    pub struct MsvcList { head: Ptr, size: Ptr }
}

c_struct! {
    pub struct GnuRbNodeBase { color: I32, parent: Ptr, left: Ptr, right: Ptr }
}

c_struct! {
    /// libstdc++ `_Rb_tree_impl`: comparator, header node, node count.
    pub struct GnuRbTree { compare: I8, header: Nested(GnuRbNodeBase::shape), node_count: Ptr }
}

c_struct! {
    pub struct MsvcTreeNode { left: Ptr, parent: Ptr, right: Ptr, color: I8, is_nil: I8 }
}

c_struct! {
    pub struct MsvcTree { head: Ptr, size: Ptr }
}

/// How a standard library tree marks the end of the walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeFlavor {
    /// Null children, header node as end.
    Gnu,
    /// Nil flagged sentinel children.
    Msvc,
}

/// Resolved red-black tree layout for an ABI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeLayout {
    pub flavor: TreeFlavor,
    pub left: usize,
    pub right: usize,
    pub parent: usize,
    pub is_nil: usize,
    /// Offset of a payload in a node.
    pub value: usize,
}

impl TreeLayout {
    pub fn new(target: &Target) -> Self {
        match target.abi {
            StdAbi::Msvc => {
                let n = MsvcTreeNode::new(target);
                TreeLayout {
                    flavor: TreeFlavor::Msvc,
                    left: n.left,
                    right: n.right,
                    parent: n.parent,
                    is_nil: n.is_nil,
                    value: n.struct_size,
                }
            }
            _ => {
                let n = GnuRbNodeBase::new(target);
                TreeLayout {
                    flavor: TreeFlavor::Gnu,
                    left: n.left,
                    right: n.right,
                    parent: n.parent,
                    is_nil: 0,
                    value: n.struct_size,
                }
            }
        }
    }
}
