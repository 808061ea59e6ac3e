use tracing::info;

pub const SPLIT_WEIGHT: f32 = 0.2;
pub const ANALYZE_WEIGHT: f32 = 0.6;

/// Receives run progress: a fraction in `[0, 1]` and a status message.
pub trait ProgressSink {
    fn report(&mut self, fraction: f32, message: &str);
}

/// Logs progress lines; used by the CLI.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, fraction: f32, message: &str) {
        info!("progress {:>3.0}% {}", fraction * 100.0, message);
    }
}

/// Clamps fractions into `[0, 1]` and never lets them go backwards.
pub(crate) struct Monotonic<'a> {
    sink: &'a mut dyn ProgressSink,
    last: f32,
}

impl<'a> Monotonic<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: 0.0 }
    }

    pub(crate) fn report(&mut self, fraction: f32, message: &str) {
        let f = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = f;
        self.sink.report(f, message);
    }

    pub(crate) fn last(&self) -> f32 {
        self.last
    }
}

pub fn chunk_fraction(index: usize, total: usize) -> f32 {
    if total == 0 {
        return SPLIT_WEIGHT + ANALYZE_WEIGHT;
    }
    SPLIT_WEIGHT + ANALYZE_WEIGHT * (index as f32 / total as f32)
}
