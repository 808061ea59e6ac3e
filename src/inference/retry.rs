use super::{InferenceRequest, Inferencer, errors::InvokeError};
use crate::config::Config;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SLEEP_SLICE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed when every attempt is throttled.
    pub max_retries: usize,
    pub delay: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_retries: cfg.retry.max_retries.max(1),
            delay: cfg.retry.delay(),
            jitter_max: cfg.retry.jitter_max(),
        }
    }

    /// Fixed delay plus uniform jitter in `[0, jitter_max]`.
    pub fn backoff(&self) -> Duration {
        if self.jitter_max.is_zero() {
            return self.delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_max.as_secs_f64());
        self.delay + Duration::from_secs_f64(jitter)
    }
}

/// Shared flag checked between attempts, between chunks and during backoff.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Sleeper {
    /// Blocks for `duration`, returning early once `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancelToken);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// The single invocation path for every model call: throttled attempts are retried
/// with backoff, everything else surfaces unchanged.
pub struct RetryingInferencer<I: Inferencer> {
    inner: I,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    cancel: CancelToken,
}

impl<I: Inferencer> RetryingInferencer<I> {
    pub fn new(inner: I, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            sleeper: Box::new(ThreadSleeper),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// `label` only feeds log lines (e.g. "chunk 2/3", "aggregate").
    pub fn invoke(&self, req: &InferenceRequest, label: &str) -> Result<String, InvokeError> {
        let mut attempts = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                return Err(InvokeError::Cancelled);
            }

            attempts += 1;
            let err = match self.inner.invoke(req) {
                Ok(text) => {
                    debug!("{label}: attempt {attempts} ok ({} chars)", text.len());
                    return Ok(text);
                }
                Err(err) => err,
            };

            if !err.is_throttling() {
                return Err(InvokeError::Inference(err));
            }

            if attempts >= self.policy.max_retries {
                return Err(InvokeError::RetryExhausted { attempts, last: err });
            }

            let wait = self.policy.backoff();
            warn!(
                "{label}: throttled ({err}); retry {attempts}/{} in {:.1}s",
                self.policy.max_retries,
                wait.as_secs_f64()
            );
            self.sleeper.sleep(wait, &self.cancel);
        }
    }
}
