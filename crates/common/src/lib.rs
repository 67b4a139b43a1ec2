pub mod data;
pub mod error;
pub mod random;
pub mod retry;
pub mod text;

mod log;

pub use log::{LogTarget, default_level, logging, logging_stdout};
pub use random::request_id;
pub use retry::{RetryPolicy, Retryable, retry_with_backoff};
