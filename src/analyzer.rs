use crate::{
    chunker::ChunkRef,
    config::Config,
    inference::{InferenceRequest, Inferencer, RetryingInferencer},
    prompt,
    util::ensure_dir,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// A persisted per-chunk model response. The content is whatever the model returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRef {
    pub index: usize,
    pub total: usize,
    pub path: PathBuf,
}

pub fn result_file_name(index: usize, total: usize) -> String {
    format!("analysis_chunk_{index}_of_{total}.json")
}

/// Analyzes one chunk. Failures are logged and reported as `None` so the run can go on.
pub fn analyze_chunk<I: Inferencer>(
    cfg: &Config,
    client: &RetryingInferencer<I>,
    chunk: &ChunkRef,
    results_dir: &Path,
) -> Option<ResultRef> {
    match try_analyze(cfg, client, chunk, results_dir) {
        Ok(result) => Some(result),
        Err(err) => {
            error!("chunk {}/{} analysis failed: {:#}", chunk.index, chunk.total, err);
            None
        }
    }
}

fn try_analyze<I: Inferencer>(
    cfg: &Config,
    client: &RetryingInferencer<I>,
    chunk: &ChunkRef,
    results_dir: &Path,
) -> Result<ResultRef> {
    let path = results_dir.join(result_file_name(chunk.index, chunk.total));
    let result = ResultRef {
        index: chunk.index,
        total: chunk.total,
        path,
    };

    if cfg.analysis.reuse_existing_results && result.path.is_file() {
        info!(
            "chunk {}/{} reusing existing result: {}",
            chunk.index,
            chunk.total,
            result.path.display()
        );
        return Ok(result);
    }

    info!(
        "chunk {}/{} analysis started ({} rows): {}",
        chunk.index,
        chunk.total,
        chunk.rows,
        chunk.path.display()
    );

    let content = std::fs::read_to_string(&chunk.path)
        .with_context(|| format!("reading chunk: {}", chunk.path.display()))?;
    let prompt = prompt::chunk_analysis_prompt(cfg, chunk.index, chunk.total, &content);
    let req = InferenceRequest::from_config(cfg, prompt);

    let label = format!("chunk {}/{}", chunk.index, chunk.total);
    let text = client.invoke(&req, &label)?;

    ensure_dir(results_dir)?;
    std::fs::write(&result.path, &text)
        .with_context(|| format!("writing result: {}", result.path.display()))?;

    info!(
        "chunk {}/{} analysis done: {}",
        chunk.index,
        chunk.total,
        result.path.display()
    );
    Ok(result)
}
