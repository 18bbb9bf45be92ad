#![forbid(unsafe_code)]

//! # cairn-net
//!
//! HTTP fetch layer for the cairn asset cache.
//!
//! The [`Net`] trait is the fetch contract consumed by higher layers:
//! whole-body ([`Net::get_bytes`]), streaming ([`Net::stream`]), byte-range
//! ([`Net::get_range`]) and header-probe ([`Net::head`]) requests.
//! [`HttpClient`] is the reqwest-backed implementation.
//!
//! Decorators compose via [`NetExt`]:
//! - [`RetryNet`] retries retryable failures with exponential backoff,
//! - [`TimeoutNet`] bounds the request/response phase of each call.
//!
//! Neither decorator is applied implicitly; callers opt in.

mod client;
mod error;
mod retry;
mod timeout;
mod traits;
mod types;

pub use client::HttpClient;
pub use error::{NetError, NetResult};
pub use retry::RetryNet;
pub use timeout::TimeoutNet;
pub use traits::{ByteStream, Net, NetExt};
pub use types::{Headers, NetOptions, RangeSpec, RetryPolicy};

/// Mock support for downstream tests (`mock` feature).
#[cfg(feature = "mock")]
pub mod mock {
    pub use crate::traits::NetMock;
}
