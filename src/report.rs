use crate::{aggregator::ReportRef, analyzer::ResultRef, chunker::ChunkRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Failed,
}

/// Summary of one run, written as `run.json` in the job directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub job_id: String,
    pub input: String,
    pub input_sha256: String,
    pub started: String,
    pub finished: String,
    pub status: RunStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub chunks: Vec<ChunkRef>,
    pub results: Vec<Option<ResultRef>>,
    pub final_report: Option<ReportRef>,
}

impl RunReport {
    pub fn absent_results(&self) -> usize {
        self.results.iter().filter(|r| r.is_none()).count()
    }
}
