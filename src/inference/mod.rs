pub mod anthropic;
pub mod errors;
pub mod retry;
pub mod types;

pub use errors::{InferenceError, InvokeError};
pub use retry::{CancelToken, RetryPolicy, RetryingInferencer, Sleeper, ThreadSleeper};
pub use types::InferenceRequest;

/// One blocking request/response call to a hosted model.
pub trait Inferencer {
    fn invoke(&self, req: &InferenceRequest) -> Result<String, InferenceError>;
}

impl<T: Inferencer + ?Sized> Inferencer for &T {
    fn invoke(&self, req: &InferenceRequest) -> Result<String, InferenceError> {
        (**self).invoke(req)
    }
}

impl<T: Inferencer + ?Sized> Inferencer for Box<T> {
    fn invoke(&self, req: &InferenceRequest) -> Result<String, InferenceError> {
        (**self).invoke(req)
    }
}
