use crate::{
    analyzer::ResultRef,
    config::Config,
    inference::{InferenceRequest, Inferencer, RetryingInferencer},
    prompt,
    util::{compact_timestamp, ensure_dir, rfc3339},
};
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```").expect("valid regex")
});

static RESULT_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^analysis_chunk_(\d+)_of_(\d+)\.json$").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRef {
    pub path: PathBuf,
    pub generated_at: String,
}

pub fn report_file_name(at: OffsetDateTime) -> String {
    format!("final_analysis_{}.json", compact_timestamp(at))
}

/// Interprets one model response: JSON when it parses, raw text otherwise.
pub fn interpret_result(cfg: &Config, raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    if cfg.aggregate.unwrap_code_fences
        && let Some(v) = FENCED_JSON
            .captures(raw)
            .and_then(|c| serde_json::from_str::<Value>(&c[1]).ok())
    {
        return v;
    }
    Value::String(raw.to_string())
}

/// Reads every present result in order; absent entries are skipped.
pub fn load_results(cfg: &Config, results: &[Option<ResultRef>]) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for r in results.iter().flatten() {
        if !r.path.is_file() {
            warn!(
                "result {}/{} missing on disk, skipping: {}",
                r.index,
                r.total,
                r.path.display()
            );
            continue;
        }
        let raw = std::fs::read_to_string(&r.path)
            .with_context(|| format!("reading result: {}", r.path.display()))?;
        let value = interpret_result(cfg, &raw);
        if value.is_string() {
            debug!("result {}/{} is not JSON; using raw text", r.index, r.total);
        }
        out.push(value);
    }
    Ok(out)
}

/// Finds `analysis_chunk_{i}_of_{T}.json` files in `dir`. Indices without a file are
/// reported as absent. All files must agree on `T`.
pub fn discover_results(dir: &Path) -> Result<Vec<Option<ResultRef>>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading results dir: {}", dir.display()))?;

    let mut found: BTreeMap<usize, PathBuf> = BTreeMap::new();
    let mut total: Option<usize> = None;

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(caps) = name.to_str().and_then(|n| RESULT_FILE.captures(n)) else {
            continue;
        };
        let index: usize = caps[1].parse()?;
        let t: usize = caps[2].parse()?;
        match total {
            Some(prev) if prev != t => {
                bail!(
                    "results dir mixes runs with different chunk totals ({prev} and {t}): {}",
                    dir.display()
                );
            }
            _ => total = Some(t),
        }
        if index == 0 || index > t {
            warn!("ignoring result with out-of-range index: {}", entry.path().display());
            continue;
        }
        found.insert(index, entry.path());
    }

    let total = total.ok_or_else(|| anyhow!("no chunk results found in {}", dir.display()))?;
    Ok((1..=total)
        .map(|index| {
            found.remove(&index).map(|path| ResultRef { index, total, path })
        })
        .collect())
}

/// Second-stage call over all chunk results. Errors are returned, never absorbed.
pub fn combine<I: Inferencer>(
    cfg: &Config,
    client: &RetryingInferencer<I>,
    results: &[Option<ResultRef>],
    final_dir: &Path,
) -> Result<ReportRef> {
    info!("combining {} chunk results", results.len());

    let values = load_results(cfg, results)?;
    if values.is_empty() {
        warn!("no chunk analyses available; combining an empty set");
    }
    let absent = results.iter().filter(|r| r.is_none()).count();
    if absent > 0 {
        warn!("{absent} of {} chunk results are absent", results.len());
    }

    let prompt = prompt::aggregation_prompt(cfg, &values)?;
    let req = InferenceRequest::from_config(cfg, prompt);
    let text = client
        .invoke(&req, "aggregate")
        .context("aggregation call failed")?;

    let now = OffsetDateTime::now_utc();
    ensure_dir(final_dir)?;
    let path = final_dir.join(report_file_name(now));
    std::fs::write(&path, &text)
        .with_context(|| format!("writing final report: {}", path.display()))?;

    info!("final report written: {}", path.display());
    Ok(ReportRef {
        path,
        generated_at: rfc3339(now),
    })
}
