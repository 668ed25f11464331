pub mod error;
pub mod retry;
pub mod token_estimator;

pub use error::{ApiError, ChatError};
pub use retry::{with_retry, RetryPolicy};
