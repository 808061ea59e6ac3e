use crate::{
    aggregator,
    chunker,
    config::Config,
    inference::anthropic::AnthropicInferencer,
    pipeline::{JobDirs, Pipeline},
    progress::LogProgress,
    report::{RunReport, RunStatus},
    util::{ensure_dir, hash_file, now_rfc3339, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_NAME: &str = "chat-digest.log";

#[derive(Parser, Debug)]
#[command(name = "chat-digest")]
#[command(about = "Chat-log analyzer (CSV chunking + hosted LLM analysis + combined report)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./chat-digest.toml if present, else defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split the input into chunk files and print the plan.
    Split {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Split, analyze every chunk and combine the results.
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Combine an existing set of chunk results into a final report.
    Combine {
        #[arg(long)]
        results_dir: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print a result or report file (pretty JSON when it parses).
    Show {
        #[arg(long)]
        path: PathBuf,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(p) => Config::load(&p)?,
        None => Config::default(),
    };

    match &args.cmd {
        Command::Split { input, out_dir } => split(&args, &cfg, input, out_dir.as_deref()),
        Command::Run { input, out_dir } => run(&args, &cfg, input, out_dir.as_deref()),
        Command::Combine {
            results_dir,
            out_dir,
        } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            combine(&cfg, results_dir, out_dir.as_deref())
        }
        Command::Show { path } => show(path),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("chat-digest.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

/// Job id: hash of the effective config plus the input contents.
fn job_id(cfg: &Config, input: &Path) -> Result<(String, String)> {
    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    let input_hash =
        hash_file(input).with_context(|| format!("hashing input: {}", input.display()))?;
    let id = sha256_hex(format!("{}:{}", cfg_hash, input_hash).as_bytes());
    Ok((id[..16].to_string(), input_hash))
}

fn job_root(cfg: &Config, out_override: Option<&Path>, job_id: &str) -> PathBuf {
    out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir))
        .join(job_id)
}

fn split(args: &Args, cfg: &Config, input: &Path, out_override: Option<&Path>) -> Result<()> {
    validate_input(cfg, input)?;
    let (job_id, _) = job_id(cfg, input)?;
    let dirs = JobDirs::new(&job_root(cfg, out_override, &job_id));
    dirs.create()?;

    let log_path = resolve_log_path(cfg, Some(&dirs.logs));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;
    warn_if_unlabeled(input);

    let (plan, chunks) = chunker::split_file(cfg, input, &dirs.chunks)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "job_id": job_id,
            "plan": plan,
            "chunks": chunks,
        }))?
    );
    Ok(())
}

fn run(args: &Args, cfg: &Config, input: &Path, out_override: Option<&Path>) -> Result<()> {
    validate_input(cfg, input)?;
    let (job_id, input_hash) = job_id(cfg, input)?;
    let dirs = JobDirs::new(&job_root(cfg, out_override, &job_id));

    if dirs.root.exists() && !cfg.global.resume {
        return Err(anyhow!(
            "job dir already exists and resume=false: {}",
            dirs.root.display()
        ));
    }
    let inferencer = AnthropicInferencer::new(cfg)?;
    dirs.create()?;

    let log_path = resolve_log_path(cfg, Some(&dirs.logs));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;
    warn_if_unlabeled(input);

    info!("job_id={job_id} out={}", dirs.root.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(dirs.root.join("effective-config.toml"), raw)?;
    }

    let pipeline = Pipeline::new(cfg, inferencer);

    let started = now_rfc3339();
    let mut progress = LogProgress;
    let out = pipeline.run_job(input, &dirs, &mut progress);

    let report = RunReport {
        job_id: job_id.clone(),
        input: input.display().to_string(),
        input_sha256: input_hash,
        started,
        finished: now_rfc3339(),
        status: if out.is_done() {
            RunStatus::Done
        } else {
            RunStatus::Failed
        },
        error: out.error.as_ref().map(|e| format!("{e:#}")),
        chunks: out.chunks,
        results: out.results,
        final_report: out.final_report,
    };
    let report_path = dirs.root.join("run.json");
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing run report: {}", report_path.display()))?;

    if let Some(err) = out.error {
        return Err(err);
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": job_id,
                "job_dir": dirs.root,
                "chunks": report.chunks.len(),
                "absent_results": report.absent_results(),
                "final_report": report.final_report.as_ref().map(|r| &r.path),
                "status": "ok"
            }))?
        );
    }

    Ok(())
}

fn combine(cfg: &Config, results_dir: &Path, out_override: Option<&Path>) -> Result<()> {
    let results = aggregator::discover_results(results_dir)?;
    let absent = results.iter().filter(|r| r.is_none()).count();
    if absent > 0 {
        warn!("{absent} of {} chunk results missing in {}", results.len(), results_dir.display());
    }

    let final_dir = out_override.map(PathBuf::from).unwrap_or_else(|| {
        results_dir
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("final")
    });

    let inferencer = AnthropicInferencer::new(cfg)?;
    let pipeline = Pipeline::new(cfg, inferencer);
    let report = pipeline.combine_results(&results, &final_dir)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn show(path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading: {}", path.display()))?;
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(v) => println!("{}", serde_json::to_string_pretty(&v)?),
        Err(_) => println!("{raw}"),
    }
    Ok(())
}

fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.is_file() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    if let Some(ext) = input.extension().and_then(|s| s.to_str())
        && !cfg.input.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext))
    {
        return Err(anyhow!("input is not a delimited text file: {}", input.display()));
    }

    Ok(())
}

/// Call once logging is up.
fn warn_if_unlabeled(input: &Path) {
    if input.extension().is_none() {
        warn!("input has no extension; assuming CSV: {}", input.display());
    }
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

fn resolve_log_path(cfg: &Config, logs_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(logs_dir) = logs_dir {
        return Some(logs_dir.join(LOG_FILE_NAME));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join(LOG_FILE_NAME))
}
