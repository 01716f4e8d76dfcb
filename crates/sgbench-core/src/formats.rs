use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;

use crate::fsutil::atomic_write_bytes;
use crate::graph::{dedup_graphs, parse_blocks_path, parse_sparse_path, GraphRecord, NodeLabel};

/// gSpan/Gaston transaction format: `t # <id>` then `v <id> <label>` and
/// `e <source> <target> <label>` lines.
pub struct TransactionWriter;

impl TransactionWriter {
    pub fn render(graphs: &[GraphRecord]) -> String {
        let mut out = String::new();
        for graph in graphs {
            let _ = writeln!(out, "t # {}", graph.tag);
            for node_id in graph.sorted_node_ids() {
                if let Some(label) = graph.node_label(node_id) {
                    let _ = writeln!(out, "v {} {}", node_id, label);
                }
            }
            for (source, target, label) in graph.edges() {
                let _ = writeln!(out, "e {} {} {}", source, target, label);
            }
        }
        out
    }

    pub fn write_to_path(graphs: &[GraphRecord], path: &Path) -> Result<()> {
        atomic_write_bytes(path, Self::render(graphs).as_bytes())
            .with_context(|| format!("write transaction file {}", path.display()))
    }
}

/// FSG input format: sequential transaction ids, `V<label>` node and
/// `E<label>` edge tokens, undirected edges written as `u <min> <max>`.
pub struct FsgWriter;

impl FsgWriter {
    pub fn render(graphs: &[GraphRecord]) -> String {
        let mut out = String::new();
        for (idx, graph) in graphs.iter().enumerate() {
            let _ = writeln!(out, "t # {}", idx);
            let ids = graph.sorted_node_ids();
            let positions: IndexMap<u32, usize> =
                ids.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
            for id in &ids {
                if let Some(label) = graph.node_label(*id) {
                    let _ = writeln!(out, "v {} V{}", positions[id], label);
                }
            }
            for (source, target, label) in graph.edges() {
                let s = positions[&source];
                let t = positions[&target];
                let _ = writeln!(out, "u {} {} E{}", s.min(t), s.max(t), label);
            }
        }
        out
    }

    pub fn write_to_path(graphs: &[GraphRecord], path: &Path) -> Result<()> {
        atomic_write_bytes(path, Self::render(graphs).as_bytes())
            .with_context(|| format!("write fsg file {}", path.display()))
    }
}

/// Block layout: `#<id>`, node count, one label per line, edge count, then
/// `<source>, <target>, <label>` rows.
pub struct BlockWriter;

impl BlockWriter {
    pub fn render(graphs: &[GraphRecord]) -> String {
        let mut out = String::new();
        for graph in graphs {
            let _ = writeln!(out, "#{}", graph.tag);
            let ids = graph.sorted_node_ids();
            let _ = writeln!(out, "{}", ids.len());
            for id in &ids {
                if let Some(label) = graph.node_label(*id) {
                    let _ = writeln!(out, "{}", label);
                }
            }
            let edges = graph.edges();
            let _ = writeln!(out, "{}", edges.len());
            for (source, target, label) in edges {
                let _ = writeln!(out, "{}, {}, {}", source, target, label);
            }
        }
        out
    }

    pub fn write_to_path(graphs: &[GraphRecord], path: &Path) -> Result<()> {
        atomic_write_bytes(path, Self::render(graphs).as_bytes())
            .with_context(|| format!("write block file {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub parsed_graphs: usize,
    pub written_graphs: usize,
    pub label_map: IndexMap<String, NodeLabel>,
    pub outputs: Vec<(String, PathBuf)>,
}

fn output_path(input: &Path, out_dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    out_dir.join(format!("{}_{}.dat", stem, suffix))
}

/// Convert a block-format dataset into the three miner input files.
pub fn convert_block_dataset(input: &Path, out_dir: &Path) -> Result<ConvertReport> {
    let dataset = parse_blocks_path(input)
        .with_context(|| format!("parse block dataset {}", input.display()))?;

    let fsg_path = output_path(input, out_dir, "fsg");
    let gspan_path = output_path(input, out_dir, "gspan");
    let gaston_path = output_path(input, out_dir, "gaston");

    FsgWriter::write_to_path(&dataset.graphs, &fsg_path)?;
    TransactionWriter::write_to_path(&dataset.graphs, &gspan_path)?;
    // Gaston reads the same transaction layout gSpan does.
    TransactionWriter::write_to_path(&dataset.graphs, &gaston_path)?;

    Ok(ConvertReport {
        parsed_graphs: dataset.graphs.len(),
        written_graphs: dataset.graphs.len(),
        label_map: dataset.label_map,
        outputs: vec![
            ("fsg".to_string(), fsg_path),
            ("gspan".to_string(), gspan_path),
            ("gaston".to_string(), gaston_path),
        ],
    })
}

/// Convert a sparse dataset: drop duplicate graphs, then emit the FSG block
/// layout and the transaction layout.
pub fn convert_sparse_dataset(input: &Path, out_dir: &Path) -> Result<ConvertReport> {
    let graphs = parse_sparse_path(input)
        .with_context(|| format!("parse sparse dataset {}", input.display()))?;
    let parsed = graphs.len();
    let unique = dedup_graphs(graphs);

    let fsg_path = output_path(input, out_dir, "fsg");
    let gspan_path = output_path(input, out_dir, "gspan");

    BlockWriter::write_to_path(&unique, &fsg_path)?;
    TransactionWriter::write_to_path(&unique, &gspan_path)?;

    Ok(ConvertReport {
        parsed_graphs: parsed,
        written_graphs: unique.len(),
        label_map: IndexMap::new(),
        outputs: vec![
            ("fsg".to_string(), fsg_path),
            ("gspan".to_string(), gspan_path),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::parse_sparse;

    fn sample() -> Vec<GraphRecord> {
        parse_sparse("# a\nv 0 3\nv 1 4\ne 1 0 7\n# b\nv 0 5\n").expect("sample graphs")
    }

    #[test]
    fn transaction_writer_keeps_tags_and_ids() {
        let rendered = TransactionWriter::render(&sample());
        assert_eq!(rendered, "t # a\nv 0 3\nv 1 4\ne 1 0 7\nt # b\nv 0 5\n");
    }

    #[test]
    fn fsg_writer_orders_endpoints_and_prefixes_labels() {
        let rendered = FsgWriter::render(&sample());
        assert_eq!(rendered, "t # 0\nv 0 V3\nv 1 V4\nu 0 1 E7\nt # 1\nv 0 V5\n");
    }

    #[test]
    fn block_writer_emits_counts_and_rows() {
        let rendered = BlockWriter::render(&sample());
        assert_eq!(rendered, "#a\n2\n3\n4\n1\n1, 0, 7\n#b\n1\n5\n0\n");
    }

    #[test]
    fn sparse_conversion_round_trips_through_block_layout() {
        let graphs = sample();
        let block = BlockWriter::render(&graphs);
        let reparsed = crate::graph::parse_blocks(&block).expect("reparse block output");
        assert_eq!(reparsed.graphs.len(), graphs.len());
        assert_eq!(reparsed.graphs[0].edge_count(), 1);
        // Labels pass through the first-seen map: 3 -> 0, 4 -> 1, 5 -> 2.
        assert_eq!(reparsed.graphs[0].node_label(0), Some(0));
        assert_eq!(reparsed.graphs[1].node_label(0), Some(2));
    }
}
