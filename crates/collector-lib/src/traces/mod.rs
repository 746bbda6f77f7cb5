//! Trace retrieval from the tracing backend
//!
//! This module provides the [`TraceSource`] seam used by the monitor loop and
//! a Zipkin v2 HTTP implementation of it.

mod zipkin;

pub use zipkin::{ZipkinClient, ZipkinConfig, ZipkinQuery};

use crate::error::Result;
use crate::models::Trace;

pub use async_trait::async_trait;

/// Source of recent traces for a service
#[async_trait]
pub trait TraceSource: Send + Sync {
    /// Fetch the traces recorded for `service` within the lookback window
    async fn fetch(&self, service: &str) -> Result<Vec<Trace>>;
}
