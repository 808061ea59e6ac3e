use crate::{
    aggregator::{self, ReportRef},
    analyzer::{self, ResultRef},
    chunker::{self, ChunkRef},
    config::Config,
    inference::{CancelToken, Inferencer, RetryPolicy, RetryingInferencer, Sleeper},
    progress::{self, Monotonic, ProgressSink},
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Splitting,
    AnalyzingChunks { index: usize, total: usize },
    Aggregating,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Splitting => write!(f, "splitting input"),
            Stage::AnalyzingChunks { index, total } => write!(f, "analyzing chunk {index}/{total}"),
            Stage::Aggregating => write!(f, "combining results"),
            Stage::Done => write!(f, "done"),
            Stage::Failed => write!(f, "failed"),
        }
    }
}

/// Directory layout of one job.
#[derive(Debug, Clone)]
pub struct JobDirs {
    pub root: PathBuf,
    pub chunks: PathBuf,
    pub results: PathBuf,
    pub final_dir: PathBuf,
    pub logs: PathBuf,
}

impl JobDirs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            chunks: root.join("chunks"),
            results: root.join("results"),
            final_dir: root.join("final"),
            logs: root.join("logs"),
        }
    }

    pub fn create(&self) -> Result<()> {
        for d in [&self.root, &self.chunks, &self.results, &self.final_dir, &self.logs] {
            ensure_dir(d)?;
        }
        Ok(())
    }
}

pub struct JobOutput {
    pub stage: Stage,
    pub chunks: Vec<ChunkRef>,
    pub results: Vec<Option<ResultRef>>,
    pub final_report: Option<ReportRef>,
    pub error: Option<anyhow::Error>,
}

impl JobOutput {
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }
}

pub struct Pipeline<I: Inferencer> {
    cfg: Config,
    client: RetryingInferencer<I>,
}

impl<I: Inferencer> Pipeline<I> {
    pub fn new(cfg: &Config, inferencer: I) -> Self {
        Self {
            cfg: cfg.clone(),
            client: RetryingInferencer::new(inferencer, RetryPolicy::from_config(cfg)),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.client = self.client.with_sleeper(sleeper);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.client = self.client.with_cancel_token(cancel);
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.client.cancel_token()
    }

    /// Reads the input and writes its chunks. Fails before any remote call on bad input.
    pub fn split_input(&self, input: &Path, chunks_dir: &Path) -> Result<Vec<ChunkRef>> {
        let (_, chunks) = chunker::split_file(&self.cfg, input, chunks_dir)?;
        Ok(chunks)
    }

    pub fn analyze_chunk(&self, chunk: &ChunkRef, results_dir: &Path) -> Option<ResultRef> {
        analyzer::analyze_chunk(&self.cfg, &self.client, chunk, results_dir)
    }

    pub fn combine_results(
        &self,
        results: &[Option<ResultRef>],
        final_dir: &Path,
    ) -> Result<ReportRef> {
        aggregator::combine(&self.cfg, &self.client, results, final_dir)
    }

    /// Split, analyze each chunk in order, combine. Never panics on remote failure;
    /// the outcome carries the terminal stage and, on failure, the error.
    pub fn run_job(
        &self,
        input: &Path,
        dirs: &JobDirs,
        progress: &mut dyn ProgressSink,
    ) -> JobOutput {
        let started = Instant::now();
        let mut progress = Monotonic::new(progress);
        let mut out = JobOutput {
            stage: Stage::Idle,
            chunks: Vec::new(),
            results: Vec::new(),
            final_report: None,
            error: None,
        };

        if self.cfg.global.max_parallel_chunks > 1 {
            warn!("max_parallel_chunks > 1 is configured, but chunks are analyzed sequentially");
        }

        match self.drive(input, dirs, &mut progress, &mut out) {
            Ok(report) => {
                out.final_report = Some(report);
                enter(&mut out.stage, Stage::Done);
                progress.report(1.0, "analysis complete");
                info!(
                    "run finished in {:.1}s: {} chunks, {} absent results",
                    started.elapsed().as_secs_f64(),
                    out.chunks.len(),
                    out.results.iter().filter(|r| r.is_none()).count()
                );
            }
            Err(err) => {
                let during = out.stage;
                enter(&mut out.stage, Stage::Failed);
                let last = progress.last();
                progress.report(last, &format!("analysis failed while {during}: {err:#}"));
                out.error = Some(err);
            }
        }
        out
    }

    fn drive(
        &self,
        input: &Path,
        dirs: &JobDirs,
        progress: &mut Monotonic<'_>,
        out: &mut JobOutput,
    ) -> Result<ReportRef> {
        self.check_cancelled()?;
        enter(&mut out.stage, Stage::Splitting);
        progress.report(0.0, "splitting input");
        out.chunks = self
            .split_input(input, &dirs.chunks)
            .with_context(|| format!("splitting input: {}", input.display()))?;
        progress.report(
            progress::SPLIT_WEIGHT,
            &format!("split into {} chunks", out.chunks.len()),
        );

        for chunk in &out.chunks {
            self.check_cancelled()?;
            enter(
                &mut out.stage,
                Stage::AnalyzingChunks {
                    index: chunk.index,
                    total: chunk.total,
                },
            );
            out.results.push(self.analyze_chunk(chunk, &dirs.results));
            progress.report(
                progress::chunk_fraction(chunk.index, chunk.total),
                &format!("analyzed chunk {}/{}", chunk.index, chunk.total),
            );
        }

        self.check_cancelled()?;
        enter(&mut out.stage, Stage::Aggregating);
        progress.report(
            progress::SPLIT_WEIGHT + progress::ANALYZE_WEIGHT,
            "combining results",
        );
        self.combine_results(&out.results, &dirs.final_dir)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.client.cancel_token().is_cancelled() {
            return Err(anyhow!("run cancelled"));
        }
        Ok(())
    }
}

fn enter(stage: &mut Stage, next: Stage) {
    info!("stage: {} -> {}", stage, next);
    *stage = next;
}
