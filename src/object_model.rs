//! The external services the Transformer and Analyzer assume but do not
//! themselves implement (`spec.md` §6 "Consumed services").
//!
//! Grounded on how `darmie-rayzor`'s own `EscapeAnalyzer`
//! (`semantic_graph/analysis/escape_analyzer.rs`) takes its DFG/call-graph
//! dependencies as injected context rather than reaching for globals: here
//! the real object model, GC, and JIT back-end are all out of scope
//! (`spec.md` §1 Non-goals), so this pass is built against a trait instead
//! of a concrete VM binding, which also makes it testable with a fake.

use crate::ir::{AttrKind, OpaqueShape, RegKind, StableId};

/// Object-model queries the Allocation Tracker and Big-Integer Decomposition
/// need: attribute layout and boxing-primitive classification for a given
/// stable type slot.
pub trait ObjectModel {
    /// Returns the opaque shape for `stable`, or `None` if `stable` does not
    /// name a transparent opaque record (arrays and custom representations
    /// are out of scope; `try_track` must reject them).
    fn opaque_shape(&self, stable: StableId) -> Option<OpaqueShape>;

    /// Byte offset of the big-integer attribute of `stable`, if it has one.
    fn bigint_offset(&self, stable: StableId) -> Option<u32> {
        self.opaque_shape(stable)
            .and_then(|s| s.bigint_attr.map(|i| s.attr_offset[i]))
    }

    /// Storage kind of the attribute at `offset` on `stable`.
    fn attr_kind_at(&self, stable: StableId, offset: u32) -> Option<AttrKind> {
        let shape = self.opaque_shape(stable)?;
        let idx = shape.attr_index_of_offset(offset)?;
        Some(shape.attr_kind[idx])
    }

    /// True if `stable` boxes a primitive value directly (no nested
    /// reference attributes) — used by the integer-cache lookup for
    /// `MaterializeBigInt` and by boxing classification in general.
    fn is_boxing_primitive(&self, stable: StableId) -> bool;

    /// Looks up a cached boxed instance for `value` under `stable`'s type,
    /// if the VM's small-integer cache covers it. A cache hit lets
    /// `MaterializeBigInt` skip allocating a fresh box.
    fn integer_cache_lookup(&self, stable: StableId, value: i64) -> Option<StableId>;
}

/// An in-memory `ObjectModel` used by tests and the scenario fixtures.
/// Real production use wires a concrete binding to the VM's type table;
/// this is sufficient for exercising every dispatch-table path without one.
#[derive(Debug, Default, Clone)]
pub struct FakeObjectModel {
    shapes: std::collections::HashMap<u32, OpaqueShape>,
    boxing_primitives: std::collections::HashSet<u32>,
}

impl FakeObjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_shape(&mut self, stable: StableId, shape: OpaqueShape) {
        self.shapes.insert(stable.0, shape);
    }

    pub fn register_boxing_primitive(&mut self, stable: StableId) {
        self.boxing_primitives.insert(stable.0);
    }

    /// Convenience constructor for a flat record with `attrs` in ascending
    /// offset order, one slot per 8 bytes, used by the scenario tests.
    pub fn with_flat_record(mut self, stable: StableId, attrs: &[AttrKind]) -> Self {
        let mut attr_offset = Vec::with_capacity(attrs.len());
        let mut bigint_attr = None;
        for (i, kind) in attrs.iter().enumerate() {
            attr_offset.push((i as u32) * 8);
            if *kind == AttrKind::BigInt {
                bigint_attr = Some(i);
            }
        }
        self.register_shape(
            stable,
            OpaqueShape {
                attr_count: attrs.len(),
                attr_kind: attrs.to_vec(),
                attr_offset,
                bigint_attr,
            },
        );
        self
    }
}

impl ObjectModel for FakeObjectModel {
    fn opaque_shape(&self, stable: StableId) -> Option<OpaqueShape> {
        self.shapes.get(&stable.0).cloned()
    }

    fn is_boxing_primitive(&self, stable: StableId) -> bool {
        self.boxing_primitives.contains(&stable.0)
    }

    fn integer_cache_lookup(&self, _stable: StableId, value: i64) -> Option<StableId> {
        if (-1..=255).contains(&value) {
            Some(StableId(u32::MAX))
        } else {
            None
        }
    }
}

/// Convenience: the concrete register kind an attribute of `kind` resolves
/// its hypothetical register to once materialized.
pub fn reg_kind_for(kind: AttrKind) -> RegKind {
    RegKind::from(kind)
}
