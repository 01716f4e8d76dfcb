pub mod features;
pub mod formats;
pub mod fsutil;
pub mod graph;
pub mod patterns;

pub use features::{candidate_sets, feature_matrix, pattern_occurs, write_candidates};
pub use formats::{BlockWriter, ConvertReport, FsgWriter, TransactionWriter};
pub use graph::{
    absolute_support, dataset_stats, dedup_graphs, parse_blocks_path, parse_sparse_path,
    support_ratio, DatasetError, DatasetStats, GraphRecord,
};
pub use patterns::{parse_miner_output, select_discriminative, MinedPattern};
