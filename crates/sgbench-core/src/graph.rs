use std::collections::HashSet;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use petgraph::graph::{NodeIndex, UnGraph};
use thiserror::Error;

pub type NodeLabel = i64;
pub type EdgeLabel = i64;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("graph {graph}: duplicate node id {node}")]
    DuplicateNode { graph: usize, node: u32 },
    #[error("graph {graph}: edge references unknown node {node}")]
    UnknownNode { graph: usize, node: u32 },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl DatasetError {
    fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            message: message.into(),
        }
    }
}

/// One labeled undirected graph from a mining dataset. Node ids are the
/// external ids from the input file; `id` is the graph's position in the
/// dataset and `tag` the raw header token (they differ after dedup or when
/// headers carry symbolic ids).
#[derive(Debug, Clone)]
pub struct GraphRecord {
    pub id: usize,
    pub tag: String,
    pub graph: UnGraph<NodeLabel, EdgeLabel>,
    pub node_lookup: IndexMap<u32, NodeIndex>,
    pub reverse_lookup: IndexMap<NodeIndex, u32>,
}

impl GraphRecord {
    pub fn new(id: usize, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            graph: UnGraph::default(),
            node_lookup: IndexMap::new(),
            reverse_lookup: IndexMap::new(),
        }
    }

    pub fn add_node(&mut self, node_id: u32, label: NodeLabel) -> Result<(), DatasetError> {
        if self.node_lookup.contains_key(&node_id) {
            return Err(DatasetError::DuplicateNode {
                graph: self.id,
                node: node_id,
            });
        }
        let idx = self.graph.add_node(label);
        self.node_lookup.insert(node_id, idx);
        self.reverse_lookup.insert(idx, node_id);
        Ok(())
    }

    pub fn add_edge(&mut self, source: u32, target: u32, label: EdgeLabel) -> Result<(), DatasetError> {
        let s = *self
            .node_lookup
            .get(&source)
            .ok_or(DatasetError::UnknownNode {
                graph: self.id,
                node: source,
            })?;
        let t = *self
            .node_lookup
            .get(&target)
            .ok_or(DatasetError::UnknownNode {
                graph: self.id,
                node: target,
            })?;
        self.graph.add_edge(s, t, label);
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_label(&self, node_id: u32) -> Option<NodeLabel> {
        let idx = self.node_lookup.get(&node_id)?;
        self.graph.node_weight(*idx).copied()
    }

    pub fn sorted_node_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.node_lookup.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Edges with external endpoint ids, in insertion order.
    pub fn edges(&self) -> Vec<(u32, u32, EdgeLabel)> {
        use petgraph::visit::EdgeRef;
        self.graph
            .edge_references()
            .filter_map(|e| {
                let s = self.reverse_lookup.get(&e.source())?;
                let t = self.reverse_lookup.get(&e.target())?;
                Some((*s, *t, *e.weight()))
            })
            .collect()
    }

    /// Canonical signature: equal for graphs with the same node labels and
    /// the same undirected labeled edge set.
    pub fn signature(&self) -> GraphSignature {
        let mut nodes: Vec<(u32, NodeLabel)> = self
            .node_lookup
            .iter()
            .filter_map(|(id, idx)| self.graph.node_weight(*idx).map(|l| (*id, *l)))
            .collect();
        nodes.sort_unstable();
        let mut edges: Vec<(u32, u32, EdgeLabel)> = self
            .edges()
            .into_iter()
            .map(|(u, v, l)| (u.min(v), u.max(v), l))
            .collect();
        edges.sort_unstable();
        (nodes, edges)
    }
}

pub type GraphSignature = (Vec<(u32, NodeLabel)>, Vec<(u32, u32, EdgeLabel)>);

fn read_input(path: &Path) -> Result<String, DatasetError> {
    fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Parse the sparse format: a `#` (or `t # <id>`) header per graph followed
/// by `v <id> <label>` and `e <source> <target> <label>` lines.
pub fn parse_sparse(text: &str) -> Result<Vec<GraphRecord>, DatasetError> {
    let mut graphs: Vec<GraphRecord> = Vec::new();
    let mut current: Option<GraphRecord> = None;

    for (lineno, raw) in text.lines().enumerate() {
        let lineno = lineno + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') || line.split_whitespace().next() == Some("t") {
            if let Some(done) = current.take() {
                graphs.push(done);
            }
            let id = graphs.len();
            let tag = header_tag(line).unwrap_or_else(|| id.to_string());
            current = Some(GraphRecord::new(id, tag));
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let graph = current
            .as_mut()
            .ok_or_else(|| DatasetError::malformed(lineno, "data line before graph header"))?;
        match parts[0] {
            "v" => {
                if parts.len() < 3 {
                    return Err(DatasetError::malformed(lineno, "node line needs id and label"));
                }
                let node_id = parse_num::<u32>(parts[1], lineno, "node id")?;
                let label = parse_num::<i64>(parts[2], lineno, "node label")?;
                graph.add_node(node_id, label)?;
            }
            "e" => {
                if parts.len() < 4 {
                    return Err(DatasetError::malformed(
                        lineno,
                        "edge line needs source, target and label",
                    ));
                }
                let source = parse_num::<u32>(parts[1], lineno, "edge source")?;
                let target = parse_num::<u32>(parts[2], lineno, "edge target")?;
                let label = parse_num::<i64>(parts[3], lineno, "edge label")?;
                graph.add_edge(source, target, label)?;
            }
            other => {
                return Err(DatasetError::malformed(
                    lineno,
                    format!("unexpected directive '{}'", other),
                ));
            }
        }
    }

    if let Some(done) = current.take() {
        graphs.push(done);
    }
    Ok(graphs)
}

pub fn parse_sparse_path(path: &Path) -> Result<Vec<GraphRecord>, DatasetError> {
    parse_sparse(&read_input(path)?)
}

fn header_tag(line: &str) -> Option<String> {
    let rest = if let Some(stripped) = line.strip_prefix('#') {
        stripped
    } else {
        // "t # <id>" style header
        line.trim_start_matches('t').trim_start().trim_start_matches('#')
    };
    let tag = rest.trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_string())
    }
}

fn parse_num<T: std::str::FromStr>(
    token: &str,
    line: usize,
    what: &str,
) -> Result<T, DatasetError> {
    token
        .parse::<T>()
        .map_err(|_| DatasetError::malformed(line, format!("invalid {}: '{}'", what, token)))
}

/// Result of parsing the block format, whose symbolic node labels are mapped
/// to dense integers in first-seen order.
#[derive(Debug, Clone)]
pub struct BlockDataset {
    pub graphs: Vec<GraphRecord>,
    pub label_map: IndexMap<String, NodeLabel>,
}

/// Parse the block format: per graph a `#<id>` header, a node count, that
/// many node-label lines, an edge count, then `<source> <target> <label>`
/// rows. Node ids are implicit positions.
pub fn parse_blocks(text: &str) -> Result<BlockDataset, DatasetError> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .collect();

    let mut graphs: Vec<GraphRecord> = Vec::new();
    let mut label_map: IndexMap<String, NodeLabel> = IndexMap::new();
    let mut pos = 0usize;

    while pos < lines.len() {
        let (lineno, header) = lines[pos];
        if !header.starts_with('#') {
            return Err(DatasetError::malformed(lineno, "expected '#' graph header"));
        }
        let id = graphs.len();
        let tag = header[1..].trim();
        let tag = if tag.is_empty() {
            id.to_string()
        } else {
            tag.to_string()
        };
        pos += 1;

        let (lineno, count_line) = next_line(&lines, pos, lineno, "node count")?;
        let node_count = parse_num::<usize>(count_line, lineno, "node count")?;
        pos += 1;

        let mut graph = GraphRecord::new(id, tag);
        for i in 0..node_count {
            let (lineno, label_line) = next_line(&lines, pos, lineno, "node label")?;
            let label = intern_label(&mut label_map, label_line);
            graph.add_node(i as u32, label).map_err(|_| {
                DatasetError::malformed(lineno, "duplicate implicit node id")
            })?;
            pos += 1;
        }

        let (lineno, count_line) = next_line(&lines, pos, lineno, "edge count")?;
        let edge_count = parse_num::<usize>(count_line, lineno, "edge count")?;
        pos += 1;

        for _ in 0..edge_count {
            let (lineno, edge_line) = next_line(&lines, pos, lineno, "edge row")?;
            // Rows are either space-separated or comma-separated.
            let parts: Vec<&str> = edge_line
                .split_whitespace()
                .map(|t| t.trim_end_matches(','))
                .collect();
            if parts.len() < 3 {
                return Err(DatasetError::malformed(
                    lineno,
                    "edge row needs source, target and label",
                ));
            }
            let source = parse_num::<u32>(parts[0], lineno, "edge source")?;
            let target = parse_num::<u32>(parts[1], lineno, "edge target")?;
            let label = parse_num::<i64>(parts[2], lineno, "edge label")?;
            graph.add_edge(source, target, label)?;
            pos += 1;
        }

        graphs.push(graph);
    }

    Ok(BlockDataset { graphs, label_map })
}

pub fn parse_blocks_path(path: &Path) -> Result<BlockDataset, DatasetError> {
    parse_blocks(&read_input(path)?)
}

fn next_line<'a>(
    lines: &[(usize, &'a str)],
    pos: usize,
    prev_line: usize,
    what: &str,
) -> Result<(usize, &'a str), DatasetError> {
    lines
        .get(pos)
        .copied()
        .ok_or_else(|| DatasetError::malformed(prev_line, format!("missing {}", what)))
}

fn intern_label(map: &mut IndexMap<String, NodeLabel>, raw: &str) -> NodeLabel {
    if let Some(existing) = map.get(raw) {
        return *existing;
    }
    let next = map.len() as NodeLabel;
    map.insert(raw.to_string(), next);
    next
}

/// Drop structurally identical graphs, keeping the first occurrence and
/// re-numbering survivors sequentially.
pub fn dedup_graphs(graphs: Vec<GraphRecord>) -> Vec<GraphRecord> {
    let mut seen: HashSet<GraphSignature> = HashSet::new();
    let mut unique: Vec<GraphRecord> = Vec::new();
    for mut graph in graphs {
        if seen.insert(graph.signature()) {
            graph.id = unique.len();
            graph.tag = graph.id.to_string();
            unique.push(graph);
        }
    }
    unique
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetStats {
    pub graphs: usize,
    pub nodes: usize,
    pub edges: usize,
    pub node_labels: usize,
    pub edge_labels: usize,
}

pub fn dataset_stats(graphs: &[GraphRecord]) -> DatasetStats {
    let mut node_labels: HashSet<NodeLabel> = HashSet::new();
    let mut edge_labels: HashSet<EdgeLabel> = HashSet::new();
    let mut nodes = 0usize;
    let mut edges = 0usize;
    for graph in graphs {
        nodes += graph.node_count();
        edges += graph.edge_count();
        for idx in graph.graph.node_indices() {
            if let Some(label) = graph.graph.node_weight(idx) {
                node_labels.insert(*label);
            }
        }
        for (_, _, label) in graph.edges() {
            edge_labels.insert(label);
        }
    }
    DatasetStats {
        graphs: graphs.len(),
        nodes,
        edges,
        node_labels: node_labels.len(),
        edge_labels: edge_labels.len(),
    }
}

/// Absolute support for a percentage threshold. Zero graphs means zero
/// support; otherwise at least one graph so the miners get a usable count.
pub fn absolute_support(percent: f64, total_graphs: usize) -> usize {
    if total_graphs == 0 {
        return 0;
    }
    let raw = (percent / 100.0 * total_graphs as f64).ceil() as usize;
    raw.max(1)
}

/// Fraction of graphs containing a pattern, 0 when the dataset is empty.
pub fn support_ratio(support: usize, total_graphs: usize) -> f64 {
    if total_graphs == 0 {
        return 0.0;
    }
    support as f64 / total_graphs as f64
}
