use serde_json::{json, Value};

use crate::graph::{support_ratio, DatasetError, GraphRecord};

pub const MIN_PATTERN_EDGES: usize = 2;
pub const MIN_SUPPORT_RATIO: f64 = 0.05;
pub const MAX_SUPPORT_RATIO: f64 = 0.80;
pub const DEFAULT_TOP_K: usize = 100;

/// A frequent subgraph reported by the miner, with the number of database
/// graphs containing it and (when the miner emits `x:` rows) their ids.
#[derive(Debug, Clone)]
pub struct MinedPattern {
    pub id: usize,
    pub graph: GraphRecord,
    pub support: usize,
    pub graph_ids: Vec<usize>,
    pub score: f64,
}

/// Parse miner output: `t # <id> * <support>` headers, `v`/`e` body lines
/// and optional `x: <id>...` membership rows.
pub fn parse_miner_output(text: &str) -> Result<Vec<MinedPattern>, DatasetError> {
    let mut patterns: Vec<MinedPattern> = Vec::new();
    let mut current: Option<MinedPattern> = None;

    for (lineno, raw) in text.lines().enumerate() {
        let lineno = lineno + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "t" => {
                if let Some(done) = current.take() {
                    patterns.push(done);
                }
                let id = patterns.len();
                let support = parts
                    .iter()
                    .position(|p| *p == "*")
                    .and_then(|star| parts.get(star + 1))
                    .and_then(|tok| tok.parse::<usize>().ok())
                    .unwrap_or(0);
                current = Some(MinedPattern {
                    id,
                    graph: GraphRecord::new(id, id.to_string()),
                    support,
                    graph_ids: Vec::new(),
                    score: 0.0,
                });
            }
            "v" => {
                let pattern = current.as_mut().ok_or_else(|| DatasetError::Malformed {
                    line: lineno,
                    message: "vertex line before pattern header".to_string(),
                })?;
                if parts.len() < 3 {
                    return Err(DatasetError::Malformed {
                        line: lineno,
                        message: "vertex line needs id and label".to_string(),
                    });
                }
                let node_id = parse_token::<u32>(parts[1], lineno)?;
                let label = parse_token::<i64>(parts[2], lineno)?;
                pattern.graph.add_node(node_id, label)?;
            }
            "e" => {
                let pattern = current.as_mut().ok_or_else(|| DatasetError::Malformed {
                    line: lineno,
                    message: "edge line before pattern header".to_string(),
                })?;
                if parts.len() < 4 {
                    return Err(DatasetError::Malformed {
                        line: lineno,
                        message: "edge line needs source, target and label".to_string(),
                    });
                }
                let source = parse_token::<u32>(parts[1], lineno)?;
                let target = parse_token::<u32>(parts[2], lineno)?;
                let label = parse_token::<i64>(parts[3], lineno)?;
                pattern.graph.add_edge(source, target, label)?;
            }
            "x:" => {
                if let Some(pattern) = current.as_mut() {
                    pattern.graph_ids = parts[1..]
                        .iter()
                        .filter_map(|tok| tok.parse::<usize>().ok())
                        .collect();
                }
            }
            // Miners interleave informational lines with pattern blocks.
            _ => continue,
        }
    }

    if let Some(done) = current.take() {
        patterns.push(done);
    }
    Ok(patterns)
}

fn parse_token<T: std::str::FromStr>(token: &str, line: usize) -> Result<T, DatasetError> {
    token.parse::<T>().map_err(|_| DatasetError::Malformed {
        line,
        message: format!("invalid numeric token '{}'", token),
    })
}

/// `|D1| * |D2| / total^2`: highest when a pattern splits the database in
/// half, 0 for an empty database.
pub fn discriminative_power(support: usize, total_graphs: usize) -> f64 {
    if total_graphs == 0 {
        return 0.0;
    }
    let d1 = support as f64;
    let d2 = (total_graphs - support.min(total_graphs)) as f64;
    d1 * d2 / (total_graphs as f64 * total_graphs as f64)
}

/// Keep the `k` most discriminative patterns: filter out trivial patterns
/// (too few edges, support outside the useful window), score the rest, and
/// rank by score then size. When the filter removes everything, fall back to
/// ranking the full set so callers still get patterns to work with.
pub fn select_discriminative(
    patterns: Vec<MinedPattern>,
    total_graphs: usize,
    k: usize,
) -> Vec<MinedPattern> {
    let mut candidates: Vec<MinedPattern> = patterns
        .iter()
        .filter(|p| {
            let ratio = support_ratio(p.support, total_graphs);
            p.graph.edge_count() >= MIN_PATTERN_EDGES
                && ratio >= MIN_SUPPORT_RATIO
                && ratio <= MAX_SUPPORT_RATIO
        })
        .cloned()
        .collect();
    if candidates.is_empty() {
        candidates = patterns;
    }
    for pattern in candidates.iter_mut() {
        pattern.score = discriminative_power(pattern.support, total_graphs);
    }
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.graph.edge_count().cmp(&a.graph.edge_count()))
    });
    candidates.truncate(k);
    candidates
}

pub fn patterns_to_json(patterns: &[MinedPattern]) -> Value {
    let entries: Vec<Value> = patterns
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "nodes": p.graph.node_count(),
                "edges": p.graph.edge_count(),
                "support": p.support,
                "score": p.score,
                "graph_ids": p.graph_ids,
            })
        })
        .collect();
    json!({
        "schema_version": "patterns_v1",
        "count": patterns.len(),
        "patterns": entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINER_OUTPUT: &str = "\
t # 0 * 40
v 0 1
v 1 2
e 0 1 5
x: 0 2 4
t # 1 * 9
v 0 1
v 1 2
v 2 3
e 0 1 5
e 1 2 6
t # 2 * 55
v 0 7
v 1 7
v 2 7
e 0 1 1
e 1 2 1
";

    #[test]
    fn parses_patterns_with_support_and_membership() {
        let patterns = parse_miner_output(MINER_OUTPUT).expect("parse");
        assert_eq!(patterns.len(), 3);
        assert_eq!(patterns[0].support, 40);
        assert_eq!(patterns[0].graph_ids, vec![0, 2, 4]);
        assert_eq!(patterns[1].graph.node_count(), 3);
        assert_eq!(patterns[1].graph.edge_count(), 2);
    }

    #[test]
    fn tolerates_headers_without_support() {
        let patterns = parse_miner_output("t # 0\nv 0 1\n").expect("parse");
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].support, 0);
    }

    #[test]
    fn skips_informational_lines() {
        let patterns =
            parse_miner_output("found 1 pattern\nt # 0 * 3\nv 0 1\ndone\n").expect("parse");
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].support, 3);
    }

    #[test]
    fn discriminative_power_is_zero_for_empty_database() {
        assert_eq!(discriminative_power(10, 0), 0.0);
        assert_eq!(discriminative_power(0, 10), 0.0);
        assert!((discriminative_power(50, 100) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn selection_filters_support_window_and_edge_count() {
        let patterns = parse_miner_output(MINER_OUTPUT).expect("parse");
        // total 100: pattern 0 has one edge, pattern 1 ratio 0.09 in window,
        // pattern 2 ratio 0.55 in window.
        let selected = select_discriminative(patterns, 100, 10);
        assert_eq!(selected.len(), 2);
        // 0.55 splits closer to half than 0.09, so it ranks first.
        assert_eq!(selected[0].support, 55);
        assert_eq!(selected[1].support, 9);
        assert!(selected[0].score > selected[1].score);
    }

    #[test]
    fn selection_falls_back_when_filter_empties_the_set() {
        let patterns = parse_miner_output("t # 0 * 99\nv 0 1\nv 1 1\ne 0 1 1\n").expect("parse");
        let selected = select_discriminative(patterns, 100, 5);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].support, 99);
    }

    #[test]
    fn selection_truncates_to_k() {
        let patterns = parse_miner_output(MINER_OUTPUT).expect("parse");
        let selected = select_discriminative(patterns, 100, 1);
        assert_eq!(selected.len(), 1);
    }
}
