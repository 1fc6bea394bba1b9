//! Attribute storage kinds for opaque records.
//!
//! `spec.md` §4.1 restricts tracking to opaque records whose every attribute
//! is one of a handled set of storage kinds. This mirrors the granularity of
//! `darmie-rayzor`'s `IrType` (`compiler/src/ir/types.rs`) but only models
//! what a flat-layout record needs, since arrays and custom representations
//! are explicitly out of scope (§1 Non-goals).

use serde::{Deserialize, Serialize};

/// Storage kind of a single attribute slot in an opaque record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrKind {
    /// A reference to another (possibly tracked) heap object.
    Reference,
    /// A 64-bit signed integer stored unboxed in the slot.
    Int64,
    /// A 64-bit float stored unboxed in the slot.
    Float64,
    /// A string handle.
    Str,
    /// A big-integer box handle.
    BigInt,
}

/// The kind of concrete SSA register a hypothetical register resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegKind {
    Object,
    Int64,
    Float64,
    Str,
    BigInt,
}

impl From<AttrKind> for RegKind {
    fn from(k: AttrKind) -> Self {
        match k {
            AttrKind::Reference => RegKind::Object,
            AttrKind::Int64 => RegKind::Int64,
            AttrKind::Float64 => RegKind::Float64,
            AttrKind::Str => RegKind::Str,
            AttrKind::BigInt => RegKind::BigInt,
        }
    }
}

/// How an auto-vivifying attribute read should materialize a missing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VivifyKind {
    /// Vivify the attribute's declared type object.
    TypeObject,
    /// Clone a prototype value into the attribute.
    ClonePrototype,
}

/// Static shape of an opaque record as reported by the object model.
#[derive(Debug, Clone)]
pub struct OpaqueShape {
    pub attr_count: usize,
    pub attr_kind: Vec<AttrKind>,
    pub attr_offset: Vec<u32>,
    /// Index of the big-integer attribute, if this shape has one.
    pub bigint_attr: Option<usize>,
}

impl OpaqueShape {
    pub fn attr_index_of_offset(&self, offset: u32) -> Option<usize> {
        self.attr_offset.iter().position(|&o| o == offset)
    }
}
