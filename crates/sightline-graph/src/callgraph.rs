use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sightline_core::{ChunkId, ExtractedChunk, RawCall};
use tracing::debug;

use crate::symbols::{Resolution, Symbol, SymbolTable};

/// One call site in a caller's body and what it was bound to.
///
/// An edge always has a caller; `targets` is empty for external or purely
/// dynamic calls and lists every candidate for ambiguous ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEdge {
    pub caller: ChunkId,
    /// Raw callee name, or the raw expression for dynamic calls.
    pub callee_name: String,
    pub qualifier: Option<String>,
    pub line: u32,
    pub targets: Vec<ChunkId>,
    pub resolution: Resolution,
}

/// Project-wide call graph over chunk ids.
///
/// Nodes are inserted in ascending chunk-id order, so ordering by node index
/// is ordering by id. Cycles are allowed.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sightline_core::{Chunk, ChunkKind, ExtractedChunk, RawCall, Span};
/// use sightline_graph::{CallGraph, Resolution};
///
/// let span = Span { start_byte: 0, end_byte: 1, start_line: 1, end_line: 1 };
/// let mut main = ExtractedChunk::new(Chunk::new(
///     Path::new("app.py"), "python", "main", ChunkKind::Function, span, "def main(): run()",
/// ));
/// main.calls.push(RawCall::plain("run", 1));
/// let run = ExtractedChunk::new(Chunk::new(
///     Path::new("app.py"), "python", "run", ChunkKind::Function, span, "def run(): pass",
/// ));
///
/// let graph = CallGraph::build(&[main, run]);
/// let edges = graph.callees(&"app.py#main@python".into());
/// assert_eq!(edges.len(), 1);
/// assert_eq!(edges[0].resolution, Resolution::ResolvedLocal);
/// assert_eq!(graph.callers(&"app.py#run@python".into()).len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    table: SymbolTable,
    /// Node weights are symbol-table indices; edge weights index `edges`.
    graph: DiGraph<usize, usize>,
    nodes: Vec<NodeIndex>,
    edges: Vec<CallEdge>,
    outgoing: HashMap<ChunkId, Vec<usize>>,
}

impl CallGraph {
    /// Resolve every chunk's raw calls against the whole snapshot.
    ///
    /// All chunks must be present; cross-file resolution needs the complete
    /// symbol table.
    pub fn build<'a>(chunks: impl IntoIterator<Item = &'a ExtractedChunk> + Clone) -> Self {
        let table = SymbolTable::build(chunks.clone());

        let mut graph = DiGraph::with_capacity(table.len(), 0);
        let nodes: Vec<NodeIndex> = (0..table.len()).map(|i| graph.add_node(i)).collect();

        let mut calls_by_id: HashMap<&ChunkId, &[RawCall]> = HashMap::new();
        for chunk in chunks {
            calls_by_id.entry(&chunk.chunk.id).or_insert(&chunk.calls);
        }

        let mut edges = Vec::new();
        let mut outgoing: HashMap<ChunkId, Vec<usize>> = HashMap::new();
        for (caller, symbol) in table.symbols().iter().enumerate() {
            let Some(calls) = calls_by_id.get(&symbol.id) else {
                continue;
            };
            for call in calls.iter() {
                let (resolution, targets) = table.resolve(caller, call);
                let edge_idx = edges.len();
                for &target in &targets {
                    graph.add_edge(nodes[caller], nodes[target], edge_idx);
                }
                edges.push(CallEdge {
                    caller: symbol.id.clone(),
                    callee_name: call.name.clone(),
                    qualifier: call.qualifier.clone(),
                    line: call.line,
                    targets: targets.iter().map(|&t| table.get(t).id.clone()).collect(),
                    resolution,
                });
                outgoing.entry(symbol.id.clone()).or_default().push(edge_idx);
            }
        }

        debug!(
            symbols = table.len(),
            call_sites = edges.len(),
            links = graph.edge_count(),
            "built call graph"
        );

        Self {
            table,
            graph,
            nodes,
            edges,
            outgoing,
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        self.table.symbols()
    }

    pub fn symbol(&self, id: &ChunkId) -> Option<&Symbol> {
        self.table.index_of(id).map(|i| self.table.get(i))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Every call site, grouped by caller in ascending id order.
    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    /// Call sites in `id`'s body, in source order.
    pub fn callees(&self, id: &ChunkId) -> Vec<&CallEdge> {
        self.outgoing
            .get(id)
            .map(|idxs| idxs.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Call sites that name `id` as a target, ordered by caller id then line.
    pub fn callers(&self, id: &ChunkId) -> Vec<&CallEdge> {
        let Some(idx) = self.table.index_of(id) else {
            return Vec::new();
        };
        let mut found: Vec<usize> = self
            .graph
            .edges_directed(self.nodes[idx], Direction::Incoming)
            .map(|e| *e.weight())
            .collect();
        found.sort_unstable();
        found.dedup();
        found.into_iter().map(|i| &self.edges[i]).collect()
    }

    /// Neighbour symbol indices along outgoing links accepted by `keep`,
    /// ascending and deduplicated.
    pub(crate) fn successors(&self, idx: usize, keep: impl Fn(Resolution) -> bool) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .edges_directed(self.nodes[idx], Direction::Outgoing)
            .filter(|e| keep(self.edges[*e.weight()].resolution))
            .map(|e| self.graph[e.target()])
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Distinct caller symbol indices whose links into `idx` are accepted by `keep`.
    pub(crate) fn predecessors(&self, idx: usize, keep: impl Fn(Resolution) -> bool) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .edges_directed(self.nodes[idx], Direction::Incoming)
            .filter(|e| keep(self.edges[*e.weight()].resolution))
            .map(|e| self.graph[e.source()])
            .filter(|&source| source != idx)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub(crate) fn index_of(&self, id: &ChunkId) -> Option<usize> {
        self.table.index_of(id)
    }

    pub(crate) fn symbol_at(&self, idx: usize) -> &Symbol {
        self.table.get(idx)
    }

    /// Fingerprint of the snapshot: every chunk id with its content hash.
    ///
    /// Identical for identical chunk sets regardless of input order.
    pub fn snapshot_id(&self) -> String {
        let mut hasher = Sha256::new();
        for symbol in self.table.symbols() {
            hasher.update(symbol.id.as_str().as_bytes());
            hasher.update(b"\0");
            hasher.update(symbol.content_hash.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    /// Number of call sites in each resolution state.
    pub fn resolution_counts(&self) -> HashMap<Resolution, usize> {
        let mut counts = HashMap::new();
        for edge in &self.edges {
            *counts.entry(edge.resolution).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_core::{CallForm, Chunk, ChunkKind, Span};
    use std::path::Path;

    fn chunk(file: &str, path: &str, calls: &[RawCall]) -> ExtractedChunk {
        let span = Span {
            start_byte: 0,
            end_byte: path.len(),
            start_line: 1,
            end_line: 1,
        };
        let mut c = ExtractedChunk::new(Chunk::new(
            Path::new(file),
            "go",
            path,
            ChunkKind::Function,
            span,
            path,
        ));
        c.calls = calls.to_vec();
        c
    }

    fn id(s: &str) -> ChunkId {
        ChunkId::from(s)
    }

    #[test]
    fn cycles_and_self_recursion_are_kept() {
        let chunks = vec![
            chunk("a.go", "ping", &[RawCall::plain("pong", 1)]),
            chunk("a.go", "pong", &[RawCall::plain("ping", 2), RawCall::plain("pong", 3)]),
        ];
        let graph = CallGraph::build(&chunks);
        assert_eq!(graph.callers(&id("a.go#ping@go")).len(), 1);
        assert_eq!(graph.callers(&id("a.go#pong@go")).len(), 2);
        assert_eq!(graph.callees(&id("a.go#pong@go")).len(), 2);

        let pong = graph.index_of(&id("a.go#pong@go")).unwrap();
        let ping = graph.index_of(&id("a.go#ping@go")).unwrap();
        assert_eq!(graph.predecessors(pong, Resolution::is_static), vec![ping]);
    }

    #[test]
    fn unresolved_and_dynamic_calls_keep_their_caller() {
        let dynamic = RawCall {
            name: "handlers[key]".into(),
            qualifier: None,
            form: CallForm::Dynamic,
            line: 4,
        };
        let chunks = vec![chunk("a.go", "main", &[RawCall::plain("fmt_print", 1), dynamic])];
        let graph = CallGraph::build(&chunks);

        let edges = graph.callees(&id("a.go#main@go"));
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].resolution, Resolution::Unresolved);
        assert_eq!(edges[1].resolution, Resolution::Dynamic);
        assert!(edges.iter().all(|e| e.caller == id("a.go#main@go") && e.targets.is_empty()));

        let counts = graph.resolution_counts();
        assert_eq!(counts[&Resolution::Unresolved], 1);
        assert_eq!(counts[&Resolution::Dynamic], 1);
    }

    #[test]
    fn snapshot_id_ignores_input_order() {
        let a = chunk("a.go", "a", &[]);
        let b = chunk("b.go", "b", &[]);
        let forward = CallGraph::build(&[a.clone(), b.clone()]);
        let backward = CallGraph::build(&[b, a]);
        assert_eq!(forward.snapshot_id(), backward.snapshot_id());

        let changed = CallGraph::build(&[chunk("a.go", "a", &[]), chunk("b.go", "bb", &[])]);
        assert_ne!(forward.snapshot_id(), changed.snapshot_id());
    }

    #[test]
    fn unknown_ids_have_no_neighbours() {
        let graph = CallGraph::build(&[chunk("a.go", "a", &[])]);
        assert!(graph.callers(&id("nope")).is_empty());
        assert!(graph.callees(&id("nope")).is_empty());
    }
}
