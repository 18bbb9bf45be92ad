#![forbid(unsafe_code)]

use std::{cmp::min, collections::HashMap, time::Duration};

/// Owned request/response header map.
///
/// Keys are kept verbatim (case-sensitive); HTTP servers normalize on their
/// side and [`crate::Net::head`] lowercases response header names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        Self { inner: map }
    }
}

/// Byte range for HTTP Range requests. `end` is inclusive per RFC 9110.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Open-ended range: everything from `start`.
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn to_header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Exponential-backoff retry schedule for [`crate::RetryNet`].
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Delay before the given attempt. Attempt 0 is the initial request.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponential = self.base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1));
        min(exponential, self.max_delay)
    }
}

/// Construction options for [`crate::HttpClient`].
#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Deadline for non-streaming requests (`get_bytes`, `head`).
    pub request_timeout: Duration,
    /// Max idle connections per host. 0 disables pooling.
    pub pool_max_idle_per_host: usize,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::full(0, Some(100), "bytes=0-100")]
    #[case::open_ended(50, None, "bytes=50-")]
    #[case::single_byte(10, Some(10), "bytes=10-10")]
    fn range_spec_header_value(
        #[case] start: u64,
        #[case] end: Option<u64>,
        #[case] expected: &str,
    ) {
        assert_eq!(RangeSpec::new(start, end).to_header_value(), expected);
    }

    #[rstest]
    #[case(0, Duration::ZERO)]
    #[case(1, Duration::from_millis(100))]
    #[case(2, Duration::from_millis(200))]
    #[case(3, Duration::from_millis(400))]
    #[case(10, Duration::from_secs(5))]
    #[case(20, Duration::from_secs(5))]
    fn retry_delay_is_exponential_and_capped(#[case] attempt: u32, #[case] expected: Duration) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(attempt), expected);
    }

    #[rstest]
    fn headers_roundtrip() {
        let mut headers = Headers::new();
        assert!(headers.is_empty());
        headers.insert("Authorization", "Bearer token");
        assert_eq!(headers.get("Authorization"), Some("Bearer token"));
        assert_eq!(headers.get("authorization"), None);
        assert_eq!(headers.iter().count(), 1);
    }
}
