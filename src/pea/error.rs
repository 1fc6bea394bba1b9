//! Bailout reasons (`spec.md` §7).
//!
//! Design-violations (inconsistent graph, misused interface) are `panic!`
//! with fixed messages, following the teacher's convention of asserting
//! graph invariants rather than threading an error type through internal
//! dispatch bugs. Graceful bailouts are this enum, returned from
//! `PeaContext::analyze` — never a partial mutation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BailoutReason {
    /// A back-edge was found; loops are unsupported.
    BackEdge,
    /// An attribute was written on some but not all merge predecessors.
    InconsistentAttributeWrites,
    /// The static type of a tracked value could not be resolved.
    MissingTypeInformation,
    /// A big-integer attribute offset could not be resolved for a
    /// decomposition candidate.
    UnresolvableBigIntOffset,
    /// An attribute's storage kind is not one of the handled set.
    UnrecognizedAttributeStorageKind,
    /// Merge predecessors disagreed on whether an allocation was
    /// materialized.
    PartiallyMaterializedAcrossMerge,
    /// The pass was disabled via configuration.
    Disabled,
}

impl fmt::Display for BailoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BailoutReason::BackEdge => "back-edge detected; loops are unsupported",
            BailoutReason::InconsistentAttributeWrites => {
                "attribute written inconsistently across merge predecessors"
            }
            BailoutReason::MissingTypeInformation => "missing static type information",
            BailoutReason::UnresolvableBigIntOffset => "unresolvable big-integer offset",
            BailoutReason::UnrecognizedAttributeStorageKind => {
                "unrecognized attribute storage kind"
            }
            BailoutReason::PartiallyMaterializedAcrossMerge => {
                "allocation materialized on some but not all merge predecessors"
            }
            BailoutReason::Disabled => "pass disabled by configuration",
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for BailoutReason {}
