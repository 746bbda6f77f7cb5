//! Core data models for the collector

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag mapping of a single span
///
/// Keys are kept sorted so that iterating a tag set is deterministic.
pub type TagSet = BTreeMap<String, String>;

/// A trace as returned by Zipkin: spans in fetch order, not causal order
pub type Trace = Vec<Span>;

/// Local endpoint of a span
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEndpoint {
    #[serde(default)]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// One recorded operation within a trace (Zipkin v2 JSON)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<LocalEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
}

/// Resource allocation of the monitored workload at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub replica_count: Option<i32>,
    pub deployment_name: Option<String>,
}

impl ResourceSnapshot {
    /// True when every field needed to persist a record row is present
    pub fn is_complete(&self) -> bool {
        self.cpu_limit.is_some()
            && self.memory_limit.is_some()
            && self.replica_count.is_some()
            && self.deployment_name.is_some()
    }

    /// Whether the allocation changed between `baseline` and `self`
    ///
    /// Only cpu, memory and replicas are compared; the deployment name is not.
    pub fn drifted_from(&self, baseline: &ResourceSnapshot) -> bool {
        self.cpu_limit != baseline.cpu_limit
            || self.memory_limit != baseline.memory_limit
            || self.replica_count != baseline.replica_count
    }
}

/// A classified numeric tag value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    /// A value whose rounded form has no fractional part
    Integer(i64),
    /// A value with a fractional part, or the average of a fractional run
    Fractional(f64),
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Integer(v) => write!(f, "{}", v),
            // Fractional elements always keep a decimal point, e.g. `4.0`
            SampleValue::Fractional(v) if v.fract() == 0.0 => write!(f, "{:.1}", v),
            SampleValue::Fractional(v) => write!(f, "{}", v),
        }
    }
}

/// Bounded, ordered output of one sampling cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedSequence {
    values: Vec<SampleValue>,
}

impl AggregatedSequence {
    pub fn new(values: Vec<SampleValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[SampleValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<SampleValue> {
        self.values
    }
}
