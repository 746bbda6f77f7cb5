//! Monitor loop correlating sampled FPS tags with workload resources
//!
//! The loop samples traces, persists the aggregated sequence with the
//! workload's resource snapshot and then watches the workload. Every change
//! in cpu, memory or replicas is followed by a settling period and a fresh
//! sample.

mod r#loop;


pub use r#loop::{
    MonitorConfig, MonitorLoop, MonitorLoopBuilder, MonitorState, MonitorTarget,
    TerminationReason,
};
