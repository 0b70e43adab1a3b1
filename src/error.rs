//! Failure taxonomy for a single refresh attempt.
//!
//! Every variant is recoverable: the coordinator records the failure,
//! arms a retry and hands the error back to whoever drove the attempt.
use std::time::Duration;

use thiserror::Error;

/// Uniform "update failed" signal raised by a refresh attempt.
///
/// The `Display` text is the human-readable reason that ends up in logs.
#[derive(Error, Debug)]
pub enum UpdateFailed {
    /// Transport level failure (connection refused, TLS, bad body, ...).
    #[error("Error communicating with quote endpoint: {0}")]
    Transport(#[from] anyhow::Error),

    /// The fetch did not complete within the bounded request timeout.
    #[error("Timeout fetching quotes after {0:?}")]
    Timeout(Duration),

    /// Fetch returned no payload at all.
    #[error("No data received")]
    NoData,

    /// Payload lacks the top-level `quoteResponse` container.
    #[error("Data invalid, 'quoteResponse' not found.")]
    MissingContainer,

    /// The container carries a non-null upstream `error`.
    #[error("{0}")]
    Upstream(String),

    /// The container has no `result` key.
    #[error("Data invalid, no 'result' found")]
    MissingResult,

    /// `result` is present but null.
    #[error("Data invalid, 'result' is null")]
    NullResult,

    /// `result` is present but not a list.
    #[error("Data invalid, 'result' is not a list")]
    MalformedResult,
}

impl UpdateFailed {
    /// Short stable label, used as a metrics / log key.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateFailed::Transport(_) => "transport",
            UpdateFailed::Timeout(_) => "timeout",
            UpdateFailed::NoData => "no_data",
            UpdateFailed::MissingContainer => "missing_container",
            UpdateFailed::Upstream(_) => "upstream",
            UpdateFailed::MissingResult => "missing_result",
            UpdateFailed::NullResult => "null_result",
            UpdateFailed::MalformedResult => "malformed_result",
        }
    }
}
