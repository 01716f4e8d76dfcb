use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

use sgbench_runner::{PlotParams, SweepFile, SweepParams};

const DEFAULT_PLOT_TIME_LIMIT_SECS: u64 = 300;

#[derive(Parser)]
#[command(
    name = "sgbench",
    version = "0.2.0",
    about = "Frequent-subgraph mining benchmark harness"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the support-threshold sweep over gSpan, FSG and Gaston.
    Sweep {
        gspan: PathBuf,
        fsg: PathBuf,
        gaston: PathBuf,
        dataset: PathBuf,
        outdir: PathBuf,
        #[arg(long, value_delimiter = ',')]
        supports: Option<Vec<u32>>,
        /// Per-invocation wall-clock budget in seconds.
        #[arg(long)]
        time_limit: Option<u64>,
        /// FSG-format dataset when it differs from the transaction file.
        #[arg(long)]
        fsg_dataset: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        plot_script: Option<PathBuf>,
        #[arg(long, default_value = "python3")]
        plot_program: String,
        #[arg(long)]
        plot_out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Convert a dataset into the miner input formats.
    Convert {
        input: PathBuf,
        outdir: PathBuf,
        /// Input is the sparse `#`/`v`/`e` layout (deduplicated on the way).
        #[arg(long)]
        sparse: bool,
        #[arg(long)]
        json: bool,
    },
    /// Mine discriminative patterns and emit per-query candidate sets.
    Candidates {
        dataset: PathBuf,
        queries: PathBuf,
        outdir: PathBuf,
        #[arg(long)]
        gspan: PathBuf,
        #[arg(long, default_value_t = 5.0)]
        support: f64,
        #[arg(long, default_value_t = 100)]
        top_k: usize,
        #[arg(long, default_value_t = 600)]
        time_limit: u64,
        #[arg(long)]
        json: bool,
    },
    /// Show dataset statistics.
    Describe {
        dataset: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Hand an existing summary to an external plotting script.
    Plot {
        program: String,
        script: PathBuf,
        summary: PathBuf,
        out: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PLOT_TIME_LIMIT_SECS)]
        time_limit: u64,
        #[arg(long)]
        json: bool,
    },
    /// Remove accumulated run directories under an output root.
    Clean {
        outdir: PathBuf,
        #[arg(long)]
        runs: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

fn resolve_sweep_params(
    gspan: PathBuf,
    fsg: PathBuf,
    gaston: PathBuf,
    dataset: PathBuf,
    outdir: PathBuf,
    supports: Option<Vec<u32>>,
    time_limit: Option<u64>,
    fsg_dataset: Option<PathBuf>,
    config: Option<PathBuf>,
    plot_script: Option<PathBuf>,
    plot_program: String,
    plot_out: Option<PathBuf>,
) -> Result<SweepParams> {
    let file = match config {
        Some(path) => sgbench_runner::load_sweep_file(&path)?,
        None => SweepFile::default(),
    };
    let supports = supports
        .or(file.supports)
        .unwrap_or_else(|| sgbench_runner::DEFAULT_SUPPORTS.to_vec());
    let time_limit_secs = time_limit
        .or(file.time_limit_secs)
        .unwrap_or(sgbench_runner::DEFAULT_TIME_LIMIT_SECS);
    let plot = match (plot_script, file.plot) {
        (Some(script), _) => Some(PlotParams {
            program: plot_program,
            script,
            image_path: plot_out.unwrap_or_else(|| outdir.join("runtime.png")),
            time_limit: Duration::from_secs(DEFAULT_PLOT_TIME_LIMIT_SECS),
        }),
        (None, Some(entry)) => Some(PlotParams {
            program: entry.program,
            script: entry.script,
            image_path: entry.out,
            time_limit: Duration::from_secs(
                entry.time_limit_secs.unwrap_or(DEFAULT_PLOT_TIME_LIMIT_SECS),
            ),
        }),
        (None, None) => None,
    };
    Ok(SweepParams {
        gspan,
        fsg,
        gaston,
        dataset,
        fsg_dataset,
        out_root: outdir,
        supports,
        time_limit: Duration::from_secs(time_limit_secs),
        plot,
    })
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Sweep {
            gspan,
            fsg,
            gaston,
            dataset,
            outdir,
            supports,
            time_limit,
            fsg_dataset,
            config,
            plot_script,
            plot_program,
            plot_out,
            json,
        } => {
            let params = resolve_sweep_params(
                gspan,
                fsg,
                gaston,
                dataset,
                outdir,
                supports,
                time_limit,
                fsg_dataset,
                config,
                plot_script,
                plot_program,
                plot_out,
            )?;
            let result = sgbench_runner::run_sweep(&params)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "sweep",
                    "run": {
                        "run_id": result.run_id,
                        "run_dir": result.run_dir.display().to_string(),
                        "summary": result.summary_path.display().to_string(),
                        "total_graphs": result.total_graphs,
                    },
                    "records": result.records.iter().map(record_to_json).collect::<Vec<_>>(),
                    "plot": result.plot.as_ref().map(plot_to_json),
                })));
            }
            println!("run_id: {}", result.run_id);
            println!("run_dir: {}", result.run_dir.display());
            println!("total_graphs: {}", result.total_graphs);
            for record in &result.records {
                println!("{} s{}: {}", record.tool, record.support, record.value);
            }
            println!("summary: {}", result.summary_path.display());
            if let Some(plot) = &result.plot {
                println!("plot: {}", plot.image_path.display());
            }
        }
        Commands::Convert {
            input,
            outdir,
            sparse,
            json,
        } => {
            let report = sgbench_runner::convert_dataset(&input, &outdir, sparse)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "convert",
                    "parsed_graphs": report.parsed_graphs,
                    "written_graphs": report.written_graphs,
                    "label_map": report.label_map,
                    "outputs": report.outputs.iter().map(|(format, path)| json!({
                        "format": format,
                        "path": path.display().to_string(),
                    })).collect::<Vec<_>>(),
                })));
            }
            println!("parsed_graphs: {}", report.parsed_graphs);
            println!("written_graphs: {}", report.written_graphs);
            if !report.label_map.is_empty() {
                println!("node_labels_mapped: {}", report.label_map.len());
            }
            for (format, path) in &report.outputs {
                println!("{}: {}", format, path.display());
            }
        }
        Commands::Candidates {
            dataset,
            queries,
            outdir,
            gspan,
            support,
            top_k,
            time_limit,
            json,
        } => {
            let params = sgbench_runner::CandidateParams {
                dataset,
                queries,
                out_dir: outdir,
                gspan,
                support,
                top_k,
                time_limit: Duration::from_secs(time_limit),
            };
            let result = sgbench_runner::run_candidate_workflow(&params)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "candidates",
                    "out_dir": result.out_dir.display().to_string(),
                    "candidates": result.candidates_path.display().to_string(),
                    "patterns": result.patterns_path.display().to_string(),
                    "parsed_graphs": result.parsed_graphs,
                    "unique_graphs": result.unique_graphs,
                    "mined_patterns": result.mined_patterns,
                    "selected_patterns": result.selected_patterns,
                    "query_graphs": result.query_graphs,
                    "total_candidates": result.total_candidates,
                })));
            }
            println!("parsed_graphs: {}", result.parsed_graphs);
            println!("unique_graphs: {}", result.unique_graphs);
            println!("mined_patterns: {}", result.mined_patterns);
            println!("selected_patterns: {}", result.selected_patterns);
            println!("query_graphs: {}", result.query_graphs);
            println!("total_candidates: {}", result.total_candidates);
            println!("candidates: {}", result.candidates_path.display());
            println!("patterns: {}", result.patterns_path.display());
        }
        Commands::Describe { dataset, json } => {
            let summary = sgbench_runner::describe_dataset(&dataset)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "dataset": summary.path.display().to_string(),
                    "graphs": summary.stats.graphs,
                    "unique_graphs": summary.unique_graphs,
                    "nodes": summary.stats.nodes,
                    "edges": summary.stats.edges,
                    "node_labels": summary.stats.node_labels,
                    "edge_labels": summary.stats.edge_labels,
                })));
            }
            println!("dataset: {}", summary.path.display());
            println!("graphs: {}", summary.stats.graphs);
            println!("unique_graphs: {}", summary.unique_graphs);
            println!("nodes: {}", summary.stats.nodes);
            println!("edges: {}", summary.stats.edges);
            println!("node_labels: {}", summary.stats.node_labels);
            println!("edge_labels: {}", summary.stats.edge_labels);
        }
        Commands::Plot {
            program,
            script,
            summary,
            out,
            time_limit,
            json,
        } => {
            let plot = PlotParams {
                program,
                script,
                image_path: out,
                time_limit: Duration::from_secs(time_limit),
            };
            let work_dir = summary
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            let outcome = sgbench_runner::delegate_plot(&plot, &summary, &work_dir)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "plot",
                    "plot": plot_to_json(&outcome),
                })));
            }
            println!("image: {}", outcome.image_path.display());
            println!(
                "status: {}",
                outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            );
        }
        Commands::Clean { outdir, runs, json } => {
            if !runs {
                if json {
                    return Ok(Some(json!({
                        "ok": true,
                        "command": "clean",
                        "removed": Vec::<String>::new(),
                    })));
                }
                println!("nothing to clean (pass --runs)");
                return Ok(None);
            }
            let removed = sgbench_runner::clean_runs(&outdir)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "clean",
                    "removed": removed.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                })));
            }
            for path in &removed {
                println!("removed: {}", path.display());
            }
            if removed.is_empty() {
                println!("no run directories under {}", outdir.display());
            }
        }
    }
    Ok(None)
}

fn record_to_json(record: &sgbench_runner::RunRecord) -> Value {
    json!({
        "tool": record.tool,
        "support": record.support,
        "value": record.value,
        "timed_out": record.timed_out,
        "exit_code": record.exit_code,
        "log": record.log_path.display().to_string(),
        "output": record.output_path.display().to_string(),
    })
}

fn plot_to_json(plot: &sgbench_runner::PlotOutcome) -> Value {
    json!({
        "image": plot.image_path.display().to_string(),
        "exit_code": plot.exit_code,
        "timed_out": plot.timed_out,
    })
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Sweep { json, .. }
        | Commands::Convert { json, .. }
        | Commands::Candidates { json, .. }
        | Commands::Describe { json, .. }
        | Commands::Plot { json, .. }
        | Commands::Clean { json, .. } => *json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_defaults_apply_without_config() {
        let params = resolve_sweep_params(
            PathBuf::from("gspan"),
            PathBuf::from("fsg"),
            PathBuf::from("gaston"),
            PathBuf::from("db.gspan"),
            PathBuf::from("out"),
            None,
            None,
            None,
            None,
            None,
            "python3".to_string(),
            None,
        )
        .expect("params");
        assert_eq!(params.supports, sgbench_runner::DEFAULT_SUPPORTS.to_vec());
        assert_eq!(
            params.time_limit,
            Duration::from_secs(sgbench_runner::DEFAULT_TIME_LIMIT_SECS)
        );
        assert!(params.plot.is_none());
    }

    #[test]
    fn sweep_flags_win_over_defaults() {
        let params = resolve_sweep_params(
            PathBuf::from("gspan"),
            PathBuf::from("fsg"),
            PathBuf::from("gaston"),
            PathBuf::from("db.gspan"),
            PathBuf::from("out"),
            Some(vec![10, 50]),
            Some(7200),
            None,
            None,
            Some(PathBuf::from("plots/runtime.py")),
            "python3".to_string(),
            None,
        )
        .expect("params");
        assert_eq!(params.supports, vec![10, 50]);
        assert_eq!(params.time_limit, Duration::from_secs(7200));
        let plot = params.plot.expect("plot");
        assert_eq!(plot.image_path, PathBuf::from("out").join("runtime.png"));
    }
}
