use super::{
    Inferencer,
    errors::InferenceError,
    types::{ContentBlock, InferenceRequest, Message, MessagesRequest, MessagesResponse},
};
use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::debug;

/// Blocking client for the Anthropic Messages API.
pub struct AnthropicInferencer {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    timeout_secs: u64,
}

impl AnthropicInferencer {
    /// Reads the API key from the environment variable named by `model.api_key_env`.
    pub fn new(cfg: &Config) -> Result<Self> {
        let var = &cfg.model.api_key_env;
        let api_key = std::env::var(var)
            .map_err(|_| anyhow!("missing API key: environment variable {var} is not set"))?;
        Self::with_api_key(cfg, api_key)
    }

    pub fn with_api_key(cfg: &Config, api_key: String) -> Result<Self> {
        let timeout_secs = cfg.model.request_timeout_seconds;
        let mut builder = Client::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let client = builder
            .build()
            .context("failed to build inference HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", cfg.model.base_url.trim_end_matches('/')),
            api_key: api_key.trim().to_string(),
            api_version: cfg.model.anthropic_version.clone(),
            timeout_secs,
        })
    }

    fn headers(&self) -> Result<HeaderMap, InferenceError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key).map_err(|_| {
            InferenceError::Configuration {
                message: "API key is not a valid header value".into(),
            }
        })?;
        let version = HeaderValue::from_str(&self.api_version).map_err(|_| {
            InferenceError::Configuration {
                message: format!("invalid anthropic_version: {}", self.api_version),
            }
        })?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", version);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl Inferencer for AnthropicInferencer {
    fn invoke(&self, req: &InferenceRequest) -> Result<String, InferenceError> {
        let body = MessagesRequest {
            model: &req.model,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            messages: vec![Message {
                role: "user",
                content: &req.prompt,
            }],
        };

        debug!(
            "POST {} model={} prompt_chars={}",
            self.endpoint,
            req.model,
            req.prompt.chars().count()
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(|e| InferenceError::from_reqwest_error(e, self.timeout_secs))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(InferenceError::from_status_and_body(status.as_u16(), &text));
        }

        let parsed: MessagesResponse = resp.json().map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                InferenceError::InvalidResponse {
                    message: e.to_string(),
                }
            }
        })?;

        extract_text(parsed)
    }
}

fn extract_text(resp: MessagesResponse) -> Result<String, InferenceError> {
    // The first text block carries the answer; later blocks are ignored.
    resp.content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .ok_or_else(|| InferenceError::InvalidResponse {
            message: "response has no text content".into(),
        })
}
