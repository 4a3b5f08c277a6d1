//! HTTP client for the AIPscan aggregator job-status API.

pub mod client;
pub mod decode;
pub mod error;
pub mod source;
pub mod types;

pub use client::AggregatorClient;
pub use decode::decode_status;
pub use error::{ClientError, Result, TransportError};
pub use source::StatusSource;
pub use types::*;
