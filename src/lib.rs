pub mod aggregator;
pub mod analyzer;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod inference;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod report;
pub mod util;
