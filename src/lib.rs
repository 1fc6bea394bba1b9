//! Partial escape analysis and scalar replacement of aggregates for a
//! tracing/specializing JIT's per-frame SSA graph.
//!
//! [`pea::run`] is the entry point: it analyzes a [`ir::ControlFlowGraph`]
//! against an [`object_model::ObjectModel`], then rewrites the graph in
//! place with every transform that survived analysis. See `SPEC_FULL.md`
//! for the full module-by-module design.

pub mod config;
pub mod ir;
pub mod object_model;
pub mod pea;

pub use config::PeaConfig;
pub use pea::{run, AnalysisResult, BailoutReason, TransformReport};
