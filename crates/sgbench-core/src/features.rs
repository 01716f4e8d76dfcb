use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use petgraph::algo::isomorphism::is_isomorphic_subgraph_matching;

use crate::fsutil::atomic_write_bytes;
use crate::graph::GraphRecord;
use crate::patterns::MinedPattern;

/// True when the pattern occurs in the target graph with matching node and
/// edge labels.
pub fn pattern_occurs(pattern: &GraphRecord, target: &GraphRecord) -> bool {
    if pattern.node_count() == 0 || pattern.node_count() > target.node_count() {
        return false;
    }
    is_isomorphic_subgraph_matching(
        &pattern.graph,
        &target.graph,
        |a, b| a == b,
        |a, b| a == b,
    )
}

/// Binary feature matrix: one row per graph, one column per pattern.
pub fn feature_matrix(graphs: &[GraphRecord], patterns: &[MinedPattern]) -> Vec<Vec<u8>> {
    graphs
        .iter()
        .map(|graph| {
            patterns
                .iter()
                .map(|pattern| u8::from(pattern_occurs(&pattern.graph, graph)))
                .collect()
        })
        .collect()
}

/// Component-wise dominance: every feature the query has, the database
/// graph has too.
pub fn dominates(db_row: &[u8], query_row: &[u8]) -> bool {
    query_row
        .iter()
        .zip(db_row.iter())
        .all(|(q, d)| *q == 0 || *d == 1)
}

/// For each query row, the indices of database rows that dominate it.
pub fn candidate_sets(db_rows: &[Vec<u8>], query_rows: &[Vec<u8>]) -> Vec<Vec<usize>> {
    query_rows
        .iter()
        .map(|query| {
            db_rows
                .iter()
                .enumerate()
                .filter(|(_, db)| dominates(db, query))
                .map(|(idx, _)| idx)
                .collect()
        })
        .collect()
}

pub fn render_candidates(candidates: &[Vec<usize>]) -> String {
    let mut out = String::new();
    for (query_idx, ids) in candidates.iter().enumerate() {
        let _ = writeln!(out, "q # {}", query_idx);
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "c # {}", joined);
    }
    out
}

pub fn write_candidates(candidates: &[Vec<usize>], path: &Path) -> Result<()> {
    atomic_write_bytes(path, render_candidates(candidates).as_bytes())
        .with_context(|| format!("write candidates file {}", path.display()))
}
