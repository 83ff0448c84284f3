//! Runtime type information of framework objects.
//!
//! Object name, parent, children and connections live in object private data and are read
//! from memory. Class names, properties and methods come from compiled meta objects, which
//! the dumper can not interpret without the framework itself, so a [`MetaObjectResolver`]
//! supplies them.

use crate::dumper::memory::MemView;
use std::collections::HashMap;
use strum_macros::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum MethodKind {
    #[strum(serialize = "Signal")]
    Signal,
    #[strum(serialize = "Slot")]
    Slot,
    #[strum(serialize = "Method")]
    Method,
}

impl MethodKind {
    /// Method type code of the framework meta object system.
    pub fn code(self) -> u8 {
        match self {
            MethodKind::Method => 0,
            MethodKind::Signal => 1,
            MethodKind::Slot => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaMethod {
    /// Normalized signature like `clicked(bool)`.
    pub signature: String,
    pub kind: MethodKind,
}

impl MetaMethod {
    pub fn new(signature: impl Into<String>, kind: MethodKind) -> Self {
        Self {
            signature: signature.into(),
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaProperty {
    pub name: String,
    pub type_name: String,
    /// Offset of a property backing field inside an object, if known.
    pub offset: Option<usize>,
}

impl MetaProperty {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Class description, methods and properties include inherited ones, base class first,
/// so a method index is a signal or slot number.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaObject {
    pub class_name: String,
    pub properties: Vec<MetaProperty>,
    pub methods: Vec<MetaMethod>,
}

impl MetaObject {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, property: MetaProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_method(mut self, method: MetaMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Methods of a kind with their indexes.
    pub fn methods_of(&self, kind: MethodKind) -> impl Iterator<Item = (usize, &MetaMethod)> {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.kind == kind)
    }

    pub fn count_of(&self, kind: MethodKind) -> usize {
        self.methods_of(kind).count()
    }

    pub fn property(&self, name: &str) -> Option<&MetaProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Signature of a method by its index.
    pub fn signature(&self, index: usize) -> Option<&str> {
        self.methods.get(index).map(|m| m.signature.as_str())
    }
}

/// Source of meta objects for objects in inspected memory.
pub trait MetaObjectResolver {
    /// Return meta object of an object at `object` address.
    fn resolve(&self, mem: &MemView, object: usize) -> Option<MetaObject>;
}

/// Resolver without any runtime type information.
pub struct NoMetaObjects;

impl MetaObjectResolver for NoMetaObjects {
    fn resolve(&self, _: &MemView, _: usize) -> Option<MetaObject> {
        None
    }
}

/// Resolver with a fixed set of classes keyed by a virtual table address,
/// the first word of every framework object.
#[derive(Default)]
pub struct StaticMetaObjects {
    classes: HashMap<usize, MetaObject>,
}

impl StaticMetaObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, vtable: usize, meta: MetaObject) -> &mut Self {
        self.classes.insert(vtable, meta);
        self
    }
}

impl MetaObjectResolver for StaticMetaObjects {
    fn resolve(&self, mem: &MemView, object: usize) -> Option<MetaObject> {
        let vtable = crate::muted_error!(mem.ptr(object), "meta object:")?;
        self.classes.get(&vtable).cloned()
    }
}
