pub mod limiter;
pub mod signal;
pub mod stream;
