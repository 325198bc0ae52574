//! Dead-code report, graph statistics and report persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sightline_core::{ChunkId, ChunkKind, SightlineError};
use tracing::debug;

use crate::callgraph::CallGraph;
use crate::entry::EntryPolicy;
use crate::reachability::{analyze, ReachabilityResult, Status};
use crate::symbols::{Resolution, Symbol};

const BASE_CONFIDENCE: f32 = 0.85;

/// One chunk believed to be dead, with the evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadCodeEntry {
    pub chunk_id: ChunkId,
    pub name: String,
    pub kind: ChunkKind,
    pub file_path: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub reason: String,
    /// 0..1, higher means more likely dead.
    pub confidence: f32,
    pub caller_count: usize,
    #[serde(default)]
    pub dead_callers: usize,
}

/// Counts describing one analyzed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub total_chunks: usize,
    pub call_sites: usize,
    pub resolved_local: usize,
    pub resolved_cross_file: usize,
    pub unresolved: usize,
    pub dynamic: usize,
    pub entry_points: usize,
    pub reachable: usize,
    pub dead: usize,
    pub indeterminate: usize,
}

/// Reachability plus the derived dead-code list for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachabilityReport {
    pub snapshot_id: String,
    pub reachability: ReachabilityResult,
    /// Sorted by confidence descending, then chunk id.
    pub dead_code: Vec<DeadCodeEntry>,
    pub stats: GraphStats,
}

impl ReachabilityReport {
    /// Analyze `graph` under `policy` and derive the dead-code list.
    pub fn build(graph: &CallGraph, policy: &EntryPolicy) -> Self {
        let reachability = analyze(graph, policy);

        let mut dead_code: Vec<DeadCodeEntry> = graph
            .symbols()
            .iter()
            .filter(|s| reachability.status(&s.id) == Some(Status::Dead))
            .map(|s| dead_entry(graph, policy, &reachability, s))
            .collect();
        dead_code.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        let counts = graph.resolution_counts();
        let count = |r: Resolution| counts.get(&r).copied().unwrap_or(0);
        let stats = GraphStats {
            total_chunks: graph.len(),
            call_sites: graph.edges().len(),
            resolved_local: count(Resolution::ResolvedLocal),
            resolved_cross_file: count(Resolution::ResolvedCrossFile),
            unresolved: count(Resolution::Unresolved),
            dynamic: count(Resolution::Dynamic),
            entry_points: reachability.entry_points.len(),
            reachable: reachability.count(Status::Reachable),
            dead: reachability.count(Status::Dead),
            indeterminate: reachability.count(Status::Indeterminate),
        };

        Self {
            snapshot_id: reachability.snapshot_id.clone(),
            reachability,
            dead_code,
            stats,
        }
    }

    /// Dead entries at or above `min_confidence`, at most `limit` (0 = all).
    pub fn dead_code(&self, limit: usize, min_confidence: f32) -> Vec<&DeadCodeEntry> {
        let matching = self
            .dead_code
            .iter()
            .filter(|e| e.confidence >= min_confidence);
        if limit == 0 {
            matching.collect()
        } else {
            matching.take(limit).collect()
        }
    }

    /// Write the report as `<dir>/<snapshot_id>.json`.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Io`] or [`SightlineError::Serialization`] on failure.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, SightlineError> {
        fs::create_dir_all(dir)?;
        let path = report_path(dir, &self.snapshot_id);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        debug!(path = %path.display(), "saved reachability report");
        Ok(path)
    }

    /// Delete every other saved report in `dir`, returning how many went.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Io`] if the directory cannot be listed or a
    /// report cannot be removed.
    pub fn prune(&self, dir: &Path) -> Result<usize, SightlineError> {
        let keep = report_path(dir, &self.snapshot_id);
        let mut removed = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path == keep || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            fs::remove_file(&path)?;
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, "pruned stale reachability reports");
        }
        Ok(removed)
    }

    /// Load the report saved for `snapshot_id`, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Io`] or [`SightlineError::Serialization`] if
    /// the file exists but cannot be read.
    pub fn load(dir: &Path, snapshot_id: &str) -> Result<Option<Self>, SightlineError> {
        let path = report_path(dir, snapshot_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

fn report_path(dir: &Path, snapshot_id: &str) -> PathBuf {
    dir.join(format!("{snapshot_id}.json"))
}

fn dead_entry(
    graph: &CallGraph,
    policy: &EntryPolicy,
    reachability: &ReachabilityResult,
    symbol: &Symbol,
) -> DeadCodeEntry {
    let mut callers: Vec<&ChunkId> = graph.callers(&symbol.id).into_iter().map(|e| &e.caller).collect();
    callers.retain(|c| **c != symbol.id);
    callers.sort();
    callers.dedup();
    let dead_callers = callers
        .iter()
        .filter(|c| reachability.status(c) != Some(Status::Reachable))
        .count();
    let exported = policy.is_exported(symbol);

    let reason = if callers.is_empty() {
        if exported {
            "no callers found (exported - verify if public API)"
        } else {
            "no callers found"
        }
    } else {
        "only called by dead code"
    };

    DeadCodeEntry {
        chunk_id: symbol.id.clone(),
        name: symbol.name.clone(),
        kind: symbol.kind,
        file_path: symbol.file_path.clone(),
        start_line: symbol.start_line,
        end_line: symbol.end_line,
        reason: reason.to_string(),
        confidence: confidence(policy, symbol, exported, !callers.is_empty()),
        caller_count: callers.len(),
        dead_callers,
    }
}

/// Heuristic certainty that `symbol` is really unused.
fn confidence(policy: &EntryPolicy, symbol: &Symbol, exported: bool, has_dead_callers: bool) -> f32 {
    let name = symbol.name.as_str();
    let mut confidence = BASE_CONFIDENCE;

    if exported {
        confidence -= 0.3;
    }
    if ["New", "Create", "Make"].iter().any(|p| name.starts_with(p)) {
        confidence -= 0.15;
    }
    if symbol.kind == ChunkKind::Method && policy.methods_are_interface_candidates(&symbol.language) {
        confidence -= 0.2;
    }
    if has_dead_callers {
        confidence += 0.1;
    }
    let lower = name.to_lowercase();
    if lower.contains("handler") || lower.contains("middleware") {
        confidence -= 0.15;
    }
    if name.starts_with("on") || name.starts_with("On") {
        confidence -= 0.1;
    }
    confidence.clamp(0.0, 1.0)
}
