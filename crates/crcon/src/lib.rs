pub mod backoff;
pub mod client;
pub mod connection;
mod error;
pub mod logstream;
pub mod models;
pub mod retry;

pub use backoff::{Backoff, BackoffConfig};
pub use client::{ApiClient, CrconApi};
pub use connection::ServerConnectionDetails;
pub use error::{Error, Result};
pub use logstream::LogStreamClient;
pub use retry::JitterRetry;
