//! Call graph construction and reachability analysis.
//!
//! Builds a project-wide call graph from extracted chunks, resolving each raw
//! call within its language, then classifies every chunk as reachable, dead
//! or indeterminate with respect to a configurable set of entry points.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//! use sightline_core::{Chunk, ChunkKind, ExtractedChunk, RawCall, Span};
//! use sightline_graph::{CallGraph, EntryPolicy, ReachabilityReport, Status};
//!
//! let span = Span { start_byte: 0, end_byte: 1, start_line: 1, end_line: 1 };
//! let make = |name: &str, calls: &[&str]| {
//!     let mut c = ExtractedChunk::new(Chunk::new(
//!         Path::new("main.go"), "go", name, ChunkKind::Function, span, name,
//!     ));
//!     c.calls = calls.iter().map(|n| RawCall::plain(*n, 1)).collect();
//!     c
//! };
//!
//! let graph = CallGraph::build(&[make("main", &["serve"]), make("serve", &[]), make("legacy", &[])]);
//! let report = ReachabilityReport::build(&graph, &EntryPolicy::default());
//!
//! assert_eq!(report.reachability.status(&"main.go#serve@go".into()), Some(Status::Reachable));
//! assert_eq!(report.dead_code.len(), 1);
//! assert_eq!(report.dead_code[0].name, "legacy");
//! ```

pub mod callgraph;
pub mod entry;
pub mod reachability;
pub mod report;
pub mod symbols;

pub use callgraph::{CallEdge, CallGraph};
pub use entry::{EntryPolicy, EntryReason};
pub use reachability::{analyze, ChunkReachability, ReachabilityResult, Status};
pub use report::{DeadCodeEntry, GraphStats, ReachabilityReport};
pub use symbols::{Resolution, Symbol, SymbolTable};
