//! Collector library for FPS trace sampling
//!
//! This crate provides the core functionality for:
//! - Querying Zipkin for the traces of monitored services
//! - Sampling windows and the aggregation of numeric tag values
//! - Reading workload resource limits from Kubernetes
//! - Appending per-deployment records
//! - The monitor loop that re-samples after resource drift
//! - Health checks and observability

pub mod cluster;
pub mod error;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod record;
pub mod sampling;
pub mod traces;

pub use error::{Error, Result};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
