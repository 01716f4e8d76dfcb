use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use sgbench_core::features::{candidate_sets, feature_matrix, write_candidates};
use sgbench_core::formats::{
    convert_block_dataset, convert_sparse_dataset, ConvertReport, TransactionWriter,
};
use sgbench_core::fsutil::{atomic_write_json_pretty, ensure_dir, sha256_file};
use sgbench_core::graph::{
    absolute_support, dataset_stats, dedup_graphs, parse_sparse_path, DatasetStats,
};
use sgbench_core::patterns::{parse_miner_output, patterns_to_json, select_discriminative};

pub const TIMEOUT_MARKER: &str = "TIMEOUT";
pub const DEFAULT_SUPPORTS: &[u32] = &[5, 10, 25, 50, 95];
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 3600;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Gspan,
    Fsg,
    Gaston,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Gspan => "gspan",
            ToolKind::Fsg => "fsg",
            ToolKind::Gaston => "gaston",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub program: PathBuf,
}

/// One external child run: program, argument list, a log file receiving
/// stdout and stderr, and a wall-clock budget.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub log_path: PathBuf,
    pub time_limit: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessOutcome {
    pub elapsed: Duration,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
}

impl ProcessOutcome {
    /// The value recorded in the summary: seconds with two decimals, or the
    /// timeout marker. Never both.
    pub fn summary_value(&self) -> String {
        if self.timed_out {
            TIMEOUT_MARKER.to_string()
        } else {
            format!("{:.2}", self.elapsed.as_secs_f64())
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

fn looks_like_path(part: &str) -> bool {
    part.starts_with('.') || part.starts_with('/') || part.contains('/')
}

/// Run a child to completion or deadline. Output goes to the log file; on
/// deadline the process is killed and reaped, and the outcome carries the
/// timeout flag instead of an exit code.
pub fn run_child(invocation: &Invocation) -> Result<ProcessOutcome> {
    let program_text = invocation.program.to_string_lossy();
    if looks_like_path(&program_text) && !invocation.program.exists() {
        bail!("executable not found: {}", invocation.program.display());
    }
    if let Some(parent) = invocation.log_path.parent() {
        ensure_dir(parent)?;
    }
    let log = File::create(&invocation.log_path)
        .with_context(|| format!("create log file {}", invocation.log_path.display()))?;
    let err_log = log.try_clone()?;

    let started = Instant::now();
    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(err_log))
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow!("executable not found: {}", invocation.program.display())
            } else {
                anyhow!(e)
            }
        })?;

    loop {
        match child.try_wait()? {
            Some(status) => {
                return Ok(ProcessOutcome {
                    elapsed: started.elapsed(),
                    timed_out: false,
                    exit_code: status.code(),
                });
            }
            None => {
                if started.elapsed() >= invocation.time_limit {
                    let _ = child.kill();
                    child.wait()?;
                    return Ok(ProcessOutcome {
                        elapsed: started.elapsed(),
                        timed_out: true,
                        exit_code: None,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[derive(Debug)]
pub struct SweepLock {
    path: PathBuf,
}

impl Drop for SweepLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub fn acquire_sweep_lock(out_root: &Path) -> Result<SweepLock> {
    ensure_dir(out_root)?;
    let lock_path = out_root.join("sweep.lock");
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&lock_path)
    {
        Ok(mut file) => {
            let payload = format!(
                "{{\"pid\":{},\"acquired_at\":\"{}\"}}\n",
                std::process::id(),
                Utc::now().to_rfc3339()
            );
            let _ = file.write_all(payload.as_bytes());
            let _ = file.sync_all();
            Ok(SweepLock { path: lock_path })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(anyhow!(
            "sweep_in_progress: output root {} is locked by another run",
            out_root.display()
        )),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone)]
pub struct PlotParams {
    pub program: String,
    pub script: PathBuf,
    pub image_path: PathBuf,
    pub time_limit: Duration,
}

#[derive(Debug, Clone)]
pub struct SweepParams {
    pub gspan: PathBuf,
    pub fsg: PathBuf,
    pub gaston: PathBuf,
    pub dataset: PathBuf,
    /// FSG consumes its own input layout; defaults to `dataset` when unset.
    pub fsg_dataset: Option<PathBuf>,
    pub out_root: PathBuf,
    pub supports: Vec<u32>,
    pub time_limit: Duration,
    pub plot: Option<PlotParams>,
}

/// Immutable description of one invocation slot plus its recorded outcome.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub tool: String,
    pub support: u32,
    pub value: String,
    pub elapsed: Duration,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub log_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PlotOutcome {
    pub image_path: PathBuf,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

#[derive(Debug)]
pub struct SweepResult {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub summary_path: PathBuf,
    pub total_graphs: usize,
    pub records: Vec<RunRecord>,
    pub plot: Option<PlotOutcome>,
}

fn normalize_supports(raw: &[u32]) -> Result<Vec<u32>> {
    if raw.is_empty() {
        bail!("at least one support threshold is required");
    }
    let mut supports = raw.to_vec();
    supports.sort_unstable();
    supports.dedup();
    if let Some(bad) = supports.iter().find(|s| **s == 0 || **s > 100) {
        bail!("support threshold {}% out of range (1-100)", bad);
    }
    Ok(supports)
}

pub fn run_sweep(params: &SweepParams) -> Result<SweepResult> {
    let tools = [
        ToolSpec {
            kind: ToolKind::Gspan,
            program: params.gspan.clone(),
        },
        ToolSpec {
            kind: ToolKind::Fsg,
            program: params.fsg.clone(),
        },
        ToolSpec {
            kind: ToolKind::Gaston,
            program: params.gaston.clone(),
        },
    ];
    for tool in &tools {
        if !tool.program.exists() {
            bail!(
                "{} executable not found: {}",
                tool.kind.as_str(),
                tool.program.display()
            );
        }
    }
    if !params.dataset.exists() {
        bail!("dataset not found: {}", params.dataset.display());
    }
    let fsg_dataset = params
        .fsg_dataset
        .clone()
        .unwrap_or_else(|| params.dataset.clone());
    if !fsg_dataset.exists() {
        bail!("fsg dataset not found: {}", fsg_dataset.display());
    }
    let supports = normalize_supports(&params.supports)?;
    let time_limit = params.time_limit.max(Duration::from_secs(1));

    ensure_dir(&params.out_root)?;
    let _lock = acquire_sweep_lock(&params.out_root)?;

    let graphs = parse_sparse_path(&params.dataset)?;
    let total_graphs = graphs.len();
    if total_graphs == 0 {
        bail!(
            "dataset {} contains no graphs; absolute support cannot be derived",
            params.dataset.display()
        );
    }
    drop(graphs);

    let run_id = format!("run_{}", Utc::now().format("%Y%m%d_%H%M%S"));
    let run_dir = params.out_root.join(&run_id);
    ensure_dir(&run_dir)?;
    write_sweep_manifest(
        &run_dir,
        &run_id,
        params,
        &tools,
        &supports,
        total_graphs,
        time_limit,
    )?;

    info!(
        "sweep {}: {} graphs, supports {:?}, limit {}s",
        run_id,
        total_graphs,
        supports,
        time_limit.as_secs()
    );

    let mut records = Vec::with_capacity(supports.len() * tools.len());
    for support in &supports {
        info!("support threshold {}%", support);
        for tool in &tools {
            let record = run_tool_once(
                tool,
                &params.dataset,
                &fsg_dataset,
                *support,
                total_graphs,
                &run_dir,
                time_limit,
            )?;
            if record.timed_out {
                warn!(
                    "support {}%: {} timed out after {}s",
                    support,
                    record.tool,
                    time_limit.as_secs()
                );
            } else if record.exit_code != Some(0) {
                warn!(
                    "support {}%: {} exited with status {:?} in {}s (see {})",
                    support,
                    record.tool,
                    record.exit_code,
                    record.value,
                    record.log_path.display()
                );
            } else {
                info!("support {}%: {} done in {}s", support, record.tool, record.value);
            }
            records.push(record);
        }
    }

    let summary = build_summary(&records)?;
    let summary_path = run_dir.join("summary.json");
    atomic_write_json_pretty(&summary_path, &serde_json::to_value(&summary)?)?;

    let plot = match &params.plot {
        Some(plot_params) => Some(delegate_plot(plot_params, &summary_path, &run_dir)?),
        None => None,
    };

    Ok(SweepResult {
        run_id,
        run_dir,
        summary_path,
        total_graphs,
        records,
        plot,
    })
}

fn run_tool_once(
    tool: &ToolSpec,
    dataset: &Path,
    fsg_dataset: &Path,
    support: u32,
    total_graphs: usize,
    run_dir: &Path,
    time_limit: Duration,
) -> Result<RunRecord> {
    let slot_dir = run_dir.join(format!("{}_s{}", tool.kind.as_str(), support));
    ensure_dir(&slot_dir)?;
    let log_path = slot_dir.join("log.txt");
    let patterns_path = slot_dir.join("patterns.out");

    let (args, output_path) = match tool.kind {
        ToolKind::Gspan => (
            vec![
                "-f".to_string(),
                dataset.display().to_string(),
                "-s".to_string(),
                support.to_string(),
                "-o".to_string(),
                patterns_path.display().to_string(),
                "-i".to_string(),
            ],
            patterns_path,
        ),
        // FSG takes a percentage and drops its pattern file next to the input.
        ToolKind::Fsg => (
            vec![
                "-s".to_string(),
                support.to_string(),
                fsg_dataset.display().to_string(),
            ],
            fsg_dataset.with_extension("fp"),
        ),
        // Gaston wants an absolute transaction count.
        ToolKind::Gaston => (
            vec![
                absolute_support(support as f64, total_graphs).to_string(),
                dataset.display().to_string(),
                patterns_path.display().to_string(),
            ],
            patterns_path,
        ),
    };

    let invocation = Invocation {
        program: tool.program.clone(),
        args,
        log_path: log_path.clone(),
        time_limit,
    };
    let outcome = run_child(&invocation)?;
    Ok(RunRecord {
        tool: tool.kind.as_str().to_string(),
        support,
        value: outcome.summary_value(),
        elapsed: outcome.elapsed,
        timed_out: outcome.timed_out,
        exit_code: outcome.exit_code,
        log_path,
        output_path,
    })
}

fn write_sweep_manifest(
    run_dir: &Path,
    run_id: &str,
    params: &SweepParams,
    tools: &[ToolSpec],
    supports: &[u32],
    total_graphs: usize,
    time_limit: Duration,
) -> Result<()> {
    let mut tool_entries = Vec::new();
    for tool in tools {
        tool_entries.push(json!({
            "name": tool.kind.as_str(),
            "program": tool.program.display().to_string(),
            "sha256": sha256_file(&tool.program)?,
        }));
    }
    let manifest = json!({
        "schema_version": "sweep_manifest_v1",
        "run_id": run_id,
        "created_at": Utc::now().to_rfc3339(),
        "dataset": params.dataset.display().to_string(),
        "total_graphs": total_graphs,
        "supports": supports,
        "time_limit_secs": time_limit.as_secs(),
        "tools": tool_entries,
    });
    atomic_write_json_pretty(&run_dir.join("manifest.json"), &manifest)
}

/// Fold run records into the `tool -> support -> value` map the plotting
/// script consumes. A duplicate (tool, support) pair is a bug upstream.
pub fn build_summary(records: &[RunRecord]) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
    let mut summary: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for record in records {
        let by_support = summary.entry(record.tool.clone()).or_default();
        if by_support
            .insert(record.support.to_string(), record.value.clone())
            .is_some()
        {
            bail!(
                "duplicate run record for {} at support {}%",
                record.tool,
                record.support
            );
        }
    }
    Ok(summary)
}

/// Hand the summary to the external plotting script. The plot's failure is
/// reported, not fatal: the sweep results already exist on disk.
pub fn delegate_plot(
    plot: &PlotParams,
    summary_path: &Path,
    run_dir: &Path,
) -> Result<PlotOutcome> {
    if !plot.script.exists() {
        bail!("plot script not found: {}", plot.script.display());
    }
    if !summary_path.exists() {
        bail!("summary not found: {}", summary_path.display());
    }
    let log_path = run_dir.join("plot").join("log.txt");
    let invocation = Invocation {
        program: PathBuf::from(&plot.program),
        args: vec![
            plot.script.display().to_string(),
            summary_path.display().to_string(),
            plot.image_path.display().to_string(),
        ],
        log_path: log_path.clone(),
        time_limit: plot.time_limit.max(Duration::from_secs(1)),
    };
    let outcome = run_child(&invocation)?;
    if !outcome.succeeded() {
        warn!(
            "plot command exited with status {:?} (see {})",
            outcome.exit_code,
            log_path.display()
        );
    } else {
        info!("plot written to {}", plot.image_path.display());
    }
    Ok(PlotOutcome {
        image_path: plot.image_path.clone(),
        exit_code: outcome.exit_code,
        timed_out: outcome.timed_out,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweepFile {
    #[serde(default)]
    pub supports: Option<Vec<u32>>,
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
    #[serde(default)]
    pub plot: Option<PlotFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlotFileEntry {
    #[serde(default = "default_plot_program")]
    pub program: String,
    pub script: PathBuf,
    pub out: PathBuf,
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
}

fn default_plot_program() -> String {
    "python3".to_string()
}

pub fn load_sweep_file(path: &Path) -> Result<SweepFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read sweep config {}", path.display()))?;
    let file: SweepFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("parse sweep config {}", path.display()))?;
    Ok(file)
}

#[derive(Debug, Clone)]
pub struct CandidateParams {
    pub dataset: PathBuf,
    pub queries: PathBuf,
    pub out_dir: PathBuf,
    pub gspan: PathBuf,
    pub support: f64,
    pub top_k: usize,
    pub time_limit: Duration,
}

#[derive(Debug)]
pub struct CandidateResult {
    pub out_dir: PathBuf,
    pub candidates_path: PathBuf,
    pub patterns_path: PathBuf,
    pub parsed_graphs: usize,
    pub unique_graphs: usize,
    pub mined_patterns: usize,
    pub selected_patterns: usize,
    pub query_graphs: usize,
    pub total_candidates: usize,
}

fn format_support(support: f64) -> String {
    if support.fract().abs() < f64::EPSILON {
        format!("{}", support as u64)
    } else {
        format!("{}", support)
    }
}

/// End-to-end candidate generation: dedup the database, mine it with the
/// external gSpan binary, select discriminative patterns, vectorize both
/// sides and emit the per-query candidate sets.
pub fn run_candidate_workflow(params: &CandidateParams) -> Result<CandidateResult> {
    for (label, path) in [
        ("dataset", &params.dataset),
        ("query file", &params.queries),
        ("gspan executable", &params.gspan),
    ] {
        if !path.exists() {
            bail!("{} not found: {}", label, path.display());
        }
    }

    let graphs = parse_sparse_path(&params.dataset)?;
    let parsed_graphs = graphs.len();
    let db = dedup_graphs(graphs);
    if db.is_empty() {
        bail!("dataset {} contains no graphs", params.dataset.display());
    }
    let queries = parse_sparse_path(&params.queries)?;
    if queries.is_empty() {
        bail!("query file {} contains no graphs", params.queries.display());
    }
    info!(
        "loaded {} database graphs ({} duplicates dropped), {} queries",
        db.len(),
        parsed_graphs - db.len(),
        queries.len()
    );

    ensure_dir(&params.out_dir)?;
    let mining_dir = params.out_dir.join("mining");
    ensure_dir(&mining_dir)?;
    let miner_input = mining_dir.join("db.gspan");
    TransactionWriter::write_to_path(&db, &miner_input)?;
    let miner_output = mining_dir.join("patterns.out");
    let log_path = mining_dir.join("log.txt");

    let invocation = Invocation {
        program: params.gspan.clone(),
        args: vec![
            "-f".to_string(),
            miner_input.display().to_string(),
            "-s".to_string(),
            format_support(params.support),
            "-o".to_string(),
            miner_output.display().to_string(),
            "-i".to_string(),
        ],
        log_path: log_path.clone(),
        time_limit: params.time_limit.max(Duration::from_secs(1)),
    };
    info!(
        "mining {} graphs at support {}%",
        db.len(),
        format_support(params.support)
    );
    let outcome = run_child(&invocation)?;
    if outcome.timed_out {
        bail!(
            "mining timed out after {:.0}s; raise --time-limit or the support threshold",
            outcome.elapsed.as_secs_f64()
        );
    }
    if outcome.exit_code != Some(0) {
        bail!(
            "miner exited with status {:?}; see {}",
            outcome.exit_code,
            log_path.display()
        );
    }

    let output_text = fs::read_to_string(&miner_output)
        .with_context(|| format!("read miner output {}", miner_output.display()))?;
    let mined = parse_miner_output(&output_text)?;
    let mined_patterns = mined.len();
    if mined.is_empty() {
        bail!(
            "miner reported no patterns at support {}%; lower the threshold",
            format_support(params.support)
        );
    }
    let selected = select_discriminative(mined, db.len(), params.top_k);
    info!(
        "selected {} of {} mined patterns",
        selected.len(),
        mined_patterns
    );

    let db_matrix = feature_matrix(&db, &selected);
    let query_matrix = feature_matrix(&queries, &selected);
    let candidates = candidate_sets(&db_matrix, &query_matrix);
    let total_candidates = candidates.iter().map(|c| c.len()).sum();

    let candidates_path = params.out_dir.join("candidates.txt");
    write_candidates(&candidates, &candidates_path)?;
    let patterns_path = params.out_dir.join("patterns.json");
    atomic_write_json_pretty(&patterns_path, &patterns_to_json(&selected))?;

    Ok(CandidateResult {
        out_dir: params.out_dir.clone(),
        candidates_path,
        patterns_path,
        parsed_graphs,
        unique_graphs: db.len(),
        mined_patterns,
        selected_patterns: selected.len(),
        query_graphs: queries.len(),
        total_candidates,
    })
}

#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub path: PathBuf,
    pub stats: DatasetStats,
    pub unique_graphs: usize,
}

pub fn describe_dataset(path: &Path) -> Result<DatasetSummary> {
    if !path.exists() {
        bail!("dataset not found: {}", path.display());
    }
    let graphs = parse_sparse_path(path)?;
    let stats = dataset_stats(&graphs);
    let unique_graphs = dedup_graphs(graphs).len();
    Ok(DatasetSummary {
        path: path.to_path_buf(),
        stats,
        unique_graphs,
    })
}

pub fn convert_dataset(input: &Path, out_dir: &Path, sparse: bool) -> Result<ConvertReport> {
    if !input.exists() {
        bail!("input dataset not found: {}", input.display());
    }
    ensure_dir(out_dir)?;
    let report = if sparse {
        convert_sparse_dataset(input, out_dir)?
    } else {
        convert_block_dataset(input, out_dir)?
    };
    info!(
        "converted {} graphs ({} written) into {}",
        report.parsed_graphs,
        report.written_graphs,
        out_dir.display()
    );
    Ok(report)
}

/// Remove accumulated `run_*` directories under an output root.
pub fn clean_runs(out_root: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !out_root.exists() {
        return Ok(removed);
    }
    for entry in fs::read_dir(out_root)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() && name.starts_with("run_") {
            fs::remove_dir_all(&path)?;
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "sgbench_runner_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ))
    }

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str) {
        fs::write(path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        let mut perms = fs::metadata(path).expect("script metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("make script executable");
    }

    const DATASET: &str = "t # 0\nv 0 1\nv 1 2\nv 2 3\ne 0 1 5\ne 1 2 6\nt # 1\nv 0 9\n";

    #[test]
    fn summary_value_never_mixes_duration_and_marker() {
        let done = ProcessOutcome {
            elapsed: Duration::from_millis(1234),
            timed_out: false,
            exit_code: Some(0),
        };
        assert_eq!(done.summary_value(), "1.23");
        let expired = ProcessOutcome {
            elapsed: Duration::from_secs(3600),
            timed_out: true,
            exit_code: None,
        };
        assert_eq!(expired.summary_value(), TIMEOUT_MARKER);
    }

    #[test]
    fn normalize_supports_sorts_dedups_and_bounds() {
        assert_eq!(normalize_supports(&[50, 5, 50, 10]).expect("ok"), vec![5, 10, 50]);
        assert!(normalize_supports(&[]).is_err());
        assert!(normalize_supports(&[0]).is_err());
        assert!(normalize_supports(&[101]).is_err());
    }

    #[test]
    fn build_summary_has_one_entry_per_pair() {
        let record = |tool: &str, support: u32, value: &str| RunRecord {
            tool: tool.to_string(),
            support,
            value: value.to_string(),
            elapsed: Duration::from_secs(1),
            timed_out: value == TIMEOUT_MARKER,
            exit_code: Some(0),
            log_path: PathBuf::from("log.txt"),
            output_path: PathBuf::from("patterns.out"),
        };
        let records = vec![
            record("gspan", 5, "1.00"),
            record("gspan", 10, TIMEOUT_MARKER),
            record("fsg", 5, "2.50"),
        ];
        let summary = build_summary(&records).expect("summary");
        assert_eq!(summary["gspan"].len(), 2);
        assert_eq!(summary["gspan"]["10"], TIMEOUT_MARKER);
        assert_eq!(summary["fsg"]["5"], "2.50");

        let duplicated = vec![record("gspan", 5, "1.00"), record("gspan", 5, "2.00")];
        assert!(build_summary(&duplicated).is_err());
    }

    #[test]
    fn sweep_lock_is_exclusive_and_released_on_drop() {
        let root = temp_root("lock");
        let lock = acquire_sweep_lock(&root).expect("first lock");
        let err = acquire_sweep_lock(&root).expect_err("second lock must fail");
        assert!(err.to_string().contains("sweep_in_progress"), "{}", err);
        drop(lock);
        let relock = acquire_sweep_lock(&root).expect("lock is re-acquirable");
        drop(relock);
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn run_child_records_exit_code_and_captures_output() {
        let root = temp_root("child");
        ensure_dir(&root).expect("root");
        let script = root.join("tool.sh");
        write_script(&script, "echo out-line\necho err-line 1>&2\nexit 3");
        let outcome = run_child(&Invocation {
            program: script,
            args: vec![],
            log_path: root.join("log.txt"),
            time_limit: Duration::from_secs(10),
        })
        .expect("run child");
        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, Some(3));
        let log = fs::read_to_string(root.join("log.txt")).expect("read log");
        assert!(log.contains("out-line"));
        assert!(log.contains("err-line"));
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn run_child_kills_on_deadline() {
        let root = temp_root("deadline");
        ensure_dir(&root).expect("root");
        let script = root.join("slow.sh");
        write_script(&script, "sleep 30");
        let started = Instant::now();
        let outcome = run_child(&Invocation {
            program: script,
            args: vec![],
            log_path: root.join("log.txt"),
            time_limit: Duration::from_millis(300),
        })
        .expect("run child");
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.summary_value(), TIMEOUT_MARKER);
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "deadline must cut the child short"
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn run_child_fails_fast_on_missing_program() {
        let root = temp_root("missing");
        let err = run_child(&Invocation {
            program: root.join("no_such_tool"),
            args: vec![],
            log_path: root.join("log.txt"),
            time_limit: Duration::from_secs(1),
        })
        .expect_err("must fail");
        assert!(err.to_string().contains("executable not found"), "{}", err);
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn sweep_produces_one_summary_entry_per_pair() {
        let root = temp_root("sweep");
        ensure_dir(&root).expect("root");
        let tool = root.join("fake_tool.sh");
        write_script(&tool, "echo mined");
        let dataset = root.join("db.gspan");
        fs::write(&dataset, DATASET).expect("dataset");

        let params = SweepParams {
            gspan: tool.clone(),
            fsg: tool.clone(),
            gaston: tool.clone(),
            dataset,
            fsg_dataset: None,
            out_root: root.join("out"),
            supports: vec![50, 95],
            time_limit: Duration::from_secs(30),
            plot: None,
        };
        let result = run_sweep(&params).expect("sweep");
        assert_eq!(result.total_graphs, 2);
        assert_eq!(result.records.len(), 6);
        assert!(result.run_dir.join("manifest.json").is_file());

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(&result.summary_path).expect("summary"))
                .expect("summary json");
        for tool_name in ["gspan", "fsg", "gaston"] {
            for support in ["50", "95"] {
                let value = summary[tool_name][support]
                    .as_str()
                    .expect("entry present");
                assert!(
                    value.parse::<f64>().map(|v| v >= 0.0).unwrap_or(false),
                    "expected a non-negative duration, got {}",
                    value
                );
            }
        }
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn sweep_rejects_empty_datasets() {
        let root = temp_root("sweep_empty");
        ensure_dir(&root).expect("root");
        let tool = root.join("fake_tool.sh");
        write_script(&tool, "echo mined");
        let dataset = root.join("empty.gspan");
        fs::write(&dataset, "").expect("dataset");

        let params = SweepParams {
            gspan: tool.clone(),
            fsg: tool.clone(),
            gaston: tool,
            dataset,
            fsg_dataset: None,
            out_root: root.join("out"),
            supports: vec![50],
            time_limit: Duration::from_secs(5),
            plot: None,
        };
        let err = run_sweep(&params).expect_err("must fail");
        assert!(err.to_string().contains("contains no graphs"), "{}", err);
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn candidate_workflow_emits_dominance_candidates() {
        let root = temp_root("candidates");
        ensure_dir(&root).expect("root");
        let dataset = root.join("db.txt");
        fs::write(&dataset, DATASET).expect("dataset");
        let queries = root.join("queries.txt");
        fs::write(&queries, "# q0\nv 0 1\nv 1 2\nv 2 3\ne 0 1 5\ne 1 2 6\n").expect("queries");

        // Stand-in miner: honors -o and emits one two-edge pattern.
        let miner = root.join("fake_gspan.sh");
        write_script(
            &miner,
            "out=\"\"\nwhile [ \"$#\" -gt 0 ]; do\n  if [ \"$1\" = \"-o\" ]; then out=\"$2\"; fi\n  shift\ndone\nprintf 't # 0 * 1\\nv 0 1\\nv 1 2\\nv 2 3\\ne 0 1 5\\ne 1 2 6\\n' > \"$out\"",
        );

        let params = CandidateParams {
            dataset,
            queries,
            out_dir: root.join("out"),
            gspan: miner,
            support: 5.0,
            top_k: 100,
            time_limit: Duration::from_secs(30),
        };
        let result = run_candidate_workflow(&params).expect("workflow");
        assert_eq!(result.parsed_graphs, 2);
        assert_eq!(result.unique_graphs, 2);
        assert_eq!(result.mined_patterns, 1);
        assert_eq!(result.selected_patterns, 1);
        assert_eq!(result.query_graphs, 1);
        // The pattern occurs in db graph 0 only, so only graph 0 dominates.
        assert_eq!(result.total_candidates, 1);
        let rendered = fs::read_to_string(&result.candidates_path).expect("candidates");
        assert_eq!(rendered, "q # 0\nc # 0\n");
        assert!(result.patterns_path.is_file());
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn candidate_workflow_surfaces_miner_failure() {
        let root = temp_root("miner_fail");
        ensure_dir(&root).expect("root");
        let dataset = root.join("db.txt");
        fs::write(&dataset, DATASET).expect("dataset");
        let queries = root.join("queries.txt");
        fs::write(&queries, "# q0\nv 0 1\n").expect("queries");
        let miner = root.join("broken_gspan.sh");
        write_script(&miner, "exit 2");

        let params = CandidateParams {
            dataset,
            queries,
            out_dir: root.join("out"),
            gspan: miner,
            support: 5.0,
            top_k: 10,
            time_limit: Duration::from_secs(5),
        };
        let err = run_candidate_workflow(&params).expect_err("must fail");
        assert!(err.to_string().contains("miner exited"), "{}", err);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn clean_runs_removes_only_run_directories() {
        let root = temp_root("clean");
        ensure_dir(&root.join("run_20250101_000000")).expect("run dir");
        ensure_dir(&root.join("run_20250102_000000")).expect("run dir");
        ensure_dir(&root.join("keep_me")).expect("other dir");
        let removed = clean_runs(&root).expect("clean");
        assert_eq!(removed.len(), 2);
        assert!(root.join("keep_me").is_dir());
        assert!(!root.join("run_20250101_000000").exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn describe_reports_counts_and_unique_graphs() {
        let root = temp_root("describe");
        ensure_dir(&root).expect("root");
        let dataset = root.join("db.txt");
        fs::write(&dataset, "#\nv 0 1\n#\nv 0 1\n#\nv 0 2\n").expect("dataset");
        let summary = describe_dataset(&dataset).expect("describe");
        assert_eq!(summary.stats.graphs, 3);
        assert_eq!(summary.unique_graphs, 2);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn sweep_config_parses_optional_sections() {
        let file: SweepFile =
            serde_yaml::from_str("supports: [5, 25]\ntime_limit_secs: 7200\n").expect("yaml");
        assert_eq!(file.supports, Some(vec![5, 25]));
        assert_eq!(file.time_limit_secs, Some(7200));
        assert!(file.plot.is_none());

        let with_plot: SweepFile = serde_yaml::from_str(
            "plot:\n  script: plots/runtime.py\n  out: plots/runtime.png\n",
        )
        .expect("yaml");
        let plot = with_plot.plot.expect("plot entry");
        assert_eq!(plot.program, "python3");
        assert_eq!(plot.script, PathBuf::from("plots/runtime.py"));
    }
}
