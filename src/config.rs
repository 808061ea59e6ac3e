use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub input: Input,
    #[serde(default)]
    pub model: Model,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub prompt: Prompt,
    #[serde(default)]
    pub analysis: Analysis,
    #[serde(default)]
    pub aggregate: Aggregate,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.max_rows_per_chunk == 0 {
            return Err(anyhow!("input.max_rows_per_chunk must be at least 1"));
        }
        self.input.delimiter_byte()?;
        if self.retry.max_retries == 0 {
            return Err(anyhow!("retry.max_retries must be at least 1"));
        }
        for (name, secs) in [
            ("retry.retry_delay_seconds", self.retry.retry_delay_seconds),
            ("retry.jitter_max_seconds", self.retry.jitter_max_seconds),
        ] {
            if !secs.is_finite() || !(0.0..=MAX_RETRY_WAIT_SECONDS).contains(&secs) {
                return Err(anyhow!(
                    "{name} must be within [0, {MAX_RETRY_WAIT_SECONDS}]: {secs}"
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.model.temperature) {
            return Err(anyhow!(
                "model.temperature must be within [0, 1]: {}",
                self.model.temperature
            ));
        }
        if self.model.max_tokens == 0 {
            return Err(anyhow!("model.max_tokens must be at least 1"));
        }
        Ok(())
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub resume: bool,
    pub max_parallel_chunks: usize,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            resume: true,
            max_parallel_chunks: 1,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    pub delimiter: String,
    pub max_rows_per_chunk: usize,
    pub allowed_extensions: Vec<String>,
}
impl Default for Input {
    fn default() -> Self {
        Self {
            delimiter: ",".into(),
            max_rows_per_chunk: 1000,
            allowed_extensions: vec!["csv".into(), "tsv".into(), "txt".into()],
        }
    }
}

impl Input {
    pub fn delimiter_byte(&self) -> Result<u8> {
        let d = if self.delimiter == "\\t" {
            "\t"
        } else {
            self.delimiter.as_str()
        };
        match d.as_bytes() {
            [b] => Ok(*b),
            _ => Err(anyhow!(
                "input.delimiter must be a single byte: {:?}",
                self.delimiter
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub base_url: String,
    pub api_key_env: String,
    pub anthropic_version: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_seconds: u64,
}
impl Default for Model {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            anthropic_version: "2023-06-01".into(),
            model_id: "claude-3-5-sonnet-20241022".into(),
            max_tokens: 4000,
            temperature: 0.2,
            request_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retry {
    pub max_retries: usize,
    pub retry_delay_seconds: f64,
    pub jitter_max_seconds: f64,
}
impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_seconds: 30.0,
            jitter_max_seconds: 5.0,
        }
    }
}

impl Retry {
    pub fn delay(&self) -> Duration {
        wait_duration(self.retry_delay_seconds)
    }

    pub fn jitter_max(&self) -> Duration {
        wait_duration(self.jitter_max_seconds)
    }
}

/// Upper bound for a single retry delay or jitter window.
pub const MAX_RETRY_WAIT_SECONDS: f64 = 3600.0;

// NaN and negatives map to zero, anything past the bound (inf included) to the bound.
fn wait_duration(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0).min(MAX_RETRY_WAIT_SECONDS))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub subject: String,
    pub product: String,
}
impl Default for Prompt {
    fn default() -> Self {
        Self {
            subject: "a Discord chat log from the social online game Play Together".into(),
            product: "game".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub reuse_existing_results: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub unwrap_code_fences: bool,
}
impl Default for Aggregate {
    fn default() -> Self {
        Self {
            unwrap_code_fences: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
