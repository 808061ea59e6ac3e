use crate::{config::Config, util::ensure_dir};
use anyhow::{Context, Result};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum InputFormatError {
    #[error("input has no header row: {path}")]
    MissingHeader { path: String },

    #[error("input is unreadable: {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Header plus data rows of one chat-log export, in file order.
#[derive(Debug, Clone)]
pub struct InputDataset {
    pub header: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl InputDataset {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub fn read_dataset(path: &Path, delimiter: u8) -> Result<InputDataset, InputFormatError> {
    let unreadable = |source| InputFormatError::Unreadable {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(unreadable)?;

    let header = reader.headers().map_err(unreadable)?.clone();
    if header.is_empty() {
        return Err(InputFormatError::MissingHeader {
            path: path.display().to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record.map_err(unreadable)?);
    }

    Ok(InputDataset { header, rows })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub row_count: usize,
    pub max_rows_per_chunk: usize,
    pub chunks: Vec<RowRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub index: usize,     // 1-based
    pub start_row: usize, // 1-based inclusive, header excluded
    pub end_row: usize,   // 1-based inclusive
}

impl RowRange {
    pub fn len(&self) -> usize {
        self.end_row + 1 - self.start_row
    }

    pub fn is_empty(&self) -> bool {
        self.end_row < self.start_row
    }
}

impl ChunkPlan {
    pub fn from_row_count(cfg: &Config, row_count: usize) -> ChunkPlan {
        Self::with_bound(row_count, cfg.input.max_rows_per_chunk)
    }

    pub fn with_bound(row_count: usize, max_rows_per_chunk: usize) -> ChunkPlan {
        let bound = max_rows_per_chunk.max(1);
        let chunks = (0..row_count.div_ceil(bound))
            .map(|i| RowRange {
                index: i + 1,
                start_row: i * bound + 1,
                end_row: ((i + 1) * bound).min(row_count),
            })
            .collect();

        ChunkPlan {
            row_count,
            max_rows_per_chunk: bound,
            chunks,
        }
    }

    pub fn total(&self) -> usize {
        self.chunks.len()
    }
}

/// A chunk persisted in the chunk store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub index: usize,
    pub total: usize,
    pub rows: usize,
    pub path: PathBuf,
}

pub fn chunk_file_name(index: usize, total: usize) -> String {
    format!("chunk_{index}_of_{total}.csv")
}

/// Writes every planned chunk (header + its rows) to `chunks_dir`.
pub fn write_chunks(
    dataset: &InputDataset,
    plan: &ChunkPlan,
    chunks_dir: &Path,
    delimiter: u8,
) -> Result<Vec<ChunkRef>> {
    ensure_dir(chunks_dir)?;
    let total = plan.total();
    let mut out = Vec::with_capacity(total);

    for range in &plan.chunks {
        let path = chunks_dir.join(chunk_file_name(range.index, total));
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(&path)
            .with_context(|| format!("create chunk file: {}", path.display()))?;

        writer.write_record(&dataset.header)?;
        for row in &dataset.rows[range.start_row - 1..range.end_row] {
            writer.write_record(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("flush chunk file: {}", path.display()))?;

        debug!(
            "chunk {}/{} rows {}-{} -> {}",
            range.index,
            total,
            range.start_row,
            range.end_row,
            path.display()
        );

        out.push(ChunkRef {
            index: range.index,
            total,
            rows: range.len(),
            path,
        });
    }

    info!(
        "split {} rows into {} chunks (max {} rows each)",
        plan.row_count, total, plan.max_rows_per_chunk
    );
    Ok(out)
}

/// Reads `input`, plans chunks under the configured bound and writes them to `chunks_dir`.
/// Fails before writing anything when the input has no header or cannot be read.
pub fn split_file(cfg: &Config, input: &Path, chunks_dir: &Path) -> Result<(ChunkPlan, Vec<ChunkRef>)> {
    let delimiter = cfg.input.delimiter_byte()?;
    let dataset = read_dataset(input, delimiter)?;
    let plan = ChunkPlan::from_row_count(cfg, dataset.row_count());
    let chunks = write_chunks(&dataset, &plan, chunks_dir, delimiter)?;
    Ok((plan, chunks))
}
