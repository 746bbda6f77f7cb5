//! Sampling windows and tag value aggregation
//!
//! This module provides:
//! - Per-service sampling windows opened by the `FPS` marker tag
//! - A per-cycle context owning every window
//! - The fold that turns collected tag values into a bounded sequence

mod aggregate;
mod window;


pub use aggregate::{
    classify, fold, raw_values, round_fraction, Aggregator, MAX_SEQUENCE_LEN, ROUND_DIGITS,
};
pub use window::{
    Observation, SamplingContext, SamplingWindow, WindowState, DEFAULT_WINDOW_DURATION,
    MARKER_TAG,
};
