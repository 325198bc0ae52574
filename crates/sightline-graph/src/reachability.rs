//! Reachability classification over a [`CallGraph`].
//!
//! 1. Breadth-first search from the entry points over statically resolved
//!    calls. A reached member makes its owning type or module reachable, and
//!    a reached type makes its constructors reachable.
//! 2. Chunks not reached but named by a dynamic or ambiguous call site, or
//!    that can only run through dispatch (trait impls, overrides, chunks
//!    without call data), are `indeterminate`, and so is everything they
//!    reach in turn.
//! 3. Everything else is `dead`.
//!
//! Nodes are visited in ascending chunk-id order, so statuses and paths are
//! identical across runs for the same graph and policy.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use sightline_core::{ChunkId, ChunkKind};
use tracing::debug;

use crate::callgraph::CallGraph;
use crate::entry::{EntryPolicy, EntryReason};
use crate::symbols::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Reachable,
    Dead,
    Indeterminate,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Reachable => "reachable",
            Status::Dead => "dead",
            Status::Indeterminate => "indeterminate",
        };
        f.write_str(s)
    }
}

/// Classification of one chunk with its explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReachability {
    pub status: Status,
    /// Set when the chunk is itself an entry point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryReason>,
    /// Shortest discovered path from an entry point, ending at this chunk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<ChunkId>,
    /// For indeterminate chunks: the dynamic call site's caller, or the chunk
    /// itself when it is only reachable through dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<ChunkId>,
}

/// Per-chunk reachability for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachabilityResult {
    pub snapshot_id: String,
    pub entry_points: Vec<ChunkId>,
    pub chunks: BTreeMap<ChunkId, ChunkReachability>,
}

impl ReachabilityResult {
    pub fn status(&self, id: &ChunkId) -> Option<Status> {
        self.chunks.get(id).map(|c| c.status)
    }

    /// Ids with `status`, ascending.
    pub fn with_status(&self, status: Status) -> Vec<&ChunkId> {
        self.chunks
            .iter()
            .filter(|(_, c)| c.status == status)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn count(&self, status: Status) -> usize {
        self.chunks.values().filter(|c| c.status == status).count()
    }
}

/// Classify every chunk in `graph`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sightline_core::{Chunk, ChunkKind, ExtractedChunk, RawCall, Span};
/// use sightline_graph::{analyze, CallGraph, EntryPolicy, Status};
///
/// let span = Span { start_byte: 0, end_byte: 1, start_line: 1, end_line: 1 };
/// let func = |name: &str, calls: &[&str]| {
///     let mut c = ExtractedChunk::new(Chunk::new(
///         Path::new("app.py"), "python", name, ChunkKind::Function, span, name,
///     ));
///     c.calls = calls.iter().map(|n| RawCall::plain(*n, 1)).collect();
///     c
/// };
/// let graph = CallGraph::build(&[func("main", &["load"]), func("load", &[]), func("unused", &[])]);
/// let result = analyze(&graph, &EntryPolicy::default());
///
/// assert_eq!(result.status(&"app.py#load@python".into()), Some(Status::Reachable));
/// assert_eq!(result.status(&"app.py#unused@python".into()), Some(Status::Dead));
/// ```
pub fn analyze(graph: &CallGraph, policy: &EntryPolicy) -> ReachabilityResult {
    let symbols = graph.symbols();
    let n = symbols.len();

    let entries: Vec<(usize, EntryReason)> = symbols
        .iter()
        .enumerate()
        .filter_map(|(i, s)| policy.entry_reason(s).map(|r| (i, r)))
        .collect();

    let owners = owner_links(graph);

    // Pass 1: BFS over static calls plus owner/constructor links.
    let mut reached_from: Vec<Option<Option<usize>>> = vec![None; n];
    let mut queue = VecDeque::new();
    for &(idx, _) in &entries {
        reached_from[idx] = Some(None);
        queue.push_back(idx);
    }
    while let Some(idx) = queue.pop_front() {
        for next in static_neighbours(graph, &owners, idx) {
            if reached_from[next].is_none() {
                reached_from[next] = Some(Some(idx));
                queue.push_back(next);
            }
        }
    }

    // Pass 2: conservative marking from dynamic call sites and dispatch-only chunks.
    let mut anchor: Vec<Option<usize>> = vec![None; n];
    let mut queue = VecDeque::new();
    for idx in 0..n {
        if reached_from[idx].is_some() {
            continue;
        }
        let symbol = &symbols[idx];
        let seed = if symbol.flags.dispatched || symbol.flags.opaque {
            Some(idx)
        } else {
            graph
                .predecessors(idx, |r| matches!(r, Resolution::Dynamic | Resolution::Unresolved))
                .first()
                .copied()
        };
        if let Some(via) = seed {
            anchor[idx] = Some(via);
            queue.push_back(idx);
        }
    }
    while let Some(idx) = queue.pop_front() {
        let via = anchor[idx];
        let mut next = static_neighbours(graph, &owners, idx);
        next.extend(graph.successors(idx, |r| !r.is_static()));
        next.sort_unstable();
        next.dedup();
        for target in next {
            if reached_from[target].is_none() && anchor[target].is_none() {
                anchor[target] = via;
                queue.push_back(target);
            }
        }
    }

    let entry_reasons: BTreeMap<usize, EntryReason> = entries.iter().copied().collect();
    let mut chunks = BTreeMap::new();
    for (idx, symbol) in symbols.iter().enumerate() {
        let entry = entry_reasons.get(&idx).copied();
        let classified = if reached_from[idx].is_some() {
            ChunkReachability {
                status: Status::Reachable,
                entry,
                path: path_to(&reached_from, idx)
                    .into_iter()
                    .map(|i| symbols[i].id.clone())
                    .collect(),
                via: None,
            }
        } else if let Some(via) = anchor[idx] {
            ChunkReachability {
                status: Status::Indeterminate,
                entry,
                path: Vec::new(),
                via: Some(symbols[via].id.clone()),
            }
        } else {
            ChunkReachability {
                status: Status::Dead,
                entry,
                path: Vec::new(),
                via: None,
            }
        };
        chunks.insert(symbol.id.clone(), classified);
    }

    let result = ReachabilityResult {
        snapshot_id: graph.snapshot_id(),
        entry_points: entries.iter().map(|&(i, _)| symbols[i].id.clone()).collect(),
        chunks,
    };
    debug!(
        entry_points = result.entry_points.len(),
        reachable = result.count(Status::Reachable),
        indeterminate = result.count(Status::Indeterminate),
        dead = result.count(Status::Dead),
        "reachability analyzed"
    );
    result
}

/// Implicit links between a chunk and its owner.
struct OwnerLinks {
    /// Member → owning type or module.
    upward: Vec<Option<usize>>,
    /// Type → its constructors, ascending.
    constructors: Vec<Vec<usize>>,
}

fn owner_links(graph: &CallGraph) -> OwnerLinks {
    let symbols = graph.symbols();
    let mut upward = vec![None; symbols.len()];
    let mut constructors = vec![Vec::new(); symbols.len()];
    for (idx, symbol) in symbols.iter().enumerate() {
        let Some(parent) = symbol.parent.as_ref().and_then(|p| graph.index_of(p)) else {
            continue;
        };
        if matches!(graph.symbol_at(parent).kind, ChunkKind::Class | ChunkKind::Module) {
            upward[idx] = Some(parent);
            if symbol.flags.constructor {
                constructors[parent].push(idx);
            }
        }
    }
    OwnerLinks {
        upward,
        constructors,
    }
}

fn static_neighbours(graph: &CallGraph, owners: &OwnerLinks, idx: usize) -> Vec<usize> {
    let mut next = graph.successors(idx, Resolution::is_static);
    next.extend(owners.upward[idx]);
    next.extend(owners.constructors[idx].iter().copied());
    next.sort_unstable();
    next.dedup();
    next
}

fn path_to(reached_from: &[Option<Option<usize>>], idx: usize) -> Vec<usize> {
    let mut path = vec![idx];
    let mut current = idx;
    while let Some(Some(prev)) = reached_from[current] {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}
