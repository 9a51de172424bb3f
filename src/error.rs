//! Classified errors for upstream fetches.
//!
//! Pipeline plumbing uses `anyhow`; backend calls return [`FetchError`] so
//! callers can tell a rate limit from a transport failure without string
//! matching. "Not found" is absent: the HTTP helpers report a
//! 404 as `Ok(None)`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limit exceeded ({status}), consider configuring an API token")]
    RateLimited { status: u16 },

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// True for 403/429 responses.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}
