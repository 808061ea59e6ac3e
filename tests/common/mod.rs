#![allow(dead_code)]

use chat_digest::{
    config::Config,
    inference::{CancelToken, InferenceError, InferenceRequest, Inferencer, Sleeper},
    progress::ProgressSink,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = dyn Fn(&InferenceRequest, usize) -> Result<String, InferenceError> + Send + Sync;

/// Fake endpoint: answers from a queue first, then from a responder closure.
#[derive(Clone)]
pub struct ScriptedInferencer {
    queue: Arc<Mutex<VecDeque<Result<String, InferenceError>>>>,
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<InferenceRequest>>>,
}

impl ScriptedInferencer {
    pub fn sequence(steps: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(steps.into())),
            responder: Arc::new(
                |_: &InferenceRequest, n: usize| -> Result<String, InferenceError> {
                    Ok(format!("{{\"call\": {n}}}"))
                },
            ),
            calls: Arc::default(),
        }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&InferenceRequest, usize) -> Result<String, InferenceError> + Send + Sync + 'static,
    {
        Self {
            queue: Arc::default(),
            responder: Arc::new(f),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<InferenceRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Inferencer for ScriptedInferencer {
    fn invoke(&self, req: &InferenceRequest) -> Result<String, InferenceError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(req.clone());
            calls.len()
        };
        if let Some(step) = self.queue.lock().unwrap().pop_front() {
            return step;
        }
        (self.responder)(req, n)
    }
}

pub fn throttled() -> Result<String, InferenceError> {
    Err(InferenceError::Throttled {
        message: "Too many requests".into(),
    })
}

/// Records requested sleeps instead of blocking.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, _cancel: &CancelToken) {
        self.slept.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
pub struct ProgressLog {
    pub events: Vec<(f32, String)>,
}

impl ProgressSink for ProgressLog {
    fn report(&mut self, fraction: f32, message: &str) {
        self.events.push((fraction, message.to_string()));
    }
}

pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.retry.retry_delay_seconds = 0.0;
    cfg.retry.jitter_max_seconds = 0.0;
    cfg
}

pub const HEADER: [&str; 3] = ["timestamp", "author", "content"];

pub fn chat_row(i: usize) -> Vec<String> {
    vec![
        format!("2024-05-01T10:{:02}:{:02}", (i / 60) % 60, i % 60),
        format!("user{}", i % 7),
        format!("message number {i}"),
    ]
}

pub fn write_chat_csv(path: &Path, rows: usize) {
    let mut w = csv::Writer::from_path(path).unwrap();
    w.write_record(HEADER).unwrap();
    for i in 0..rows {
        w.write_record(chat_row(i)).unwrap();
    }
    w.flush().unwrap();
}
