use thiserror::Error;

use super::types::ErrorEnvelope;

/// A failed remote call. `Throttled` is the only variant the retry policy retries.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("throttled by inference endpoint: {message}")]
    Throttled { message: String },

    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("network error: {source}")]
    Network {
        #[source]
        source: reqwest::Error,
    },

    #[error("endpoint returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InferenceError {
    pub fn is_throttling(&self) -> bool {
        matches!(self, InferenceError::Throttled { .. })
    }

    pub fn from_reqwest_error(error: reqwest::Error, timeout_secs: u64) -> Self {
        if error.is_timeout() {
            InferenceError::Timeout { timeout_secs }
        } else {
            InferenceError::Network { source: error }
        }
    }

    /// Maps a non-success HTTP status plus body onto the taxonomy.
    pub fn from_status_and_body(status: u16, body: &str) -> Self {
        let (kind, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(env) => (env.error.kind, env.error.message),
            Err(_) => (String::new(), body.trim().to_string()),
        };

        if status == 429 || kind == "rate_limit_error" || kind == "ThrottlingException" {
            return InferenceError::Throttled { message };
        }

        match status {
            401 | 403 => InferenceError::AuthenticationFailed { message },
            _ => InferenceError::Api { status, message },
        }
    }
}

/// Outcome of a retry-wrapped invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("retry budget exhausted after {attempts} throttled attempts: {last}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        last: InferenceError,
    },

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("invocation cancelled")]
    Cancelled,
}
