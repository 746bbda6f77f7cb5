//! Error types for the collaborator clients

use thiserror::Error;

/// Errors raised by the trace backend, cluster and record clients
///
/// The monitor loop absorbs these (logging and substituting empty results),
/// except for pod resolution which ends the loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("trace backend request failed: {0}")]
    TraceBackend(#[from] reqwest::Error),

    #[error("invalid trace backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("kubernetes api request failed: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
