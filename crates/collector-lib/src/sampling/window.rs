//! Per-service sampling windows
//!
//! A window opens on the first span carrying the marker tag and collects the
//! tag sets of every span observed until the window duration has elapsed.
//! Elapsed time is measured at observation, so a slow polling pass can close
//! a window before all of its spans were seen.

use crate::models::TagSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Tag key whose presence opens a sampling window
pub const MARKER_TAG: &str = "FPS";

/// Default time a window stays open after onset
pub const DEFAULT_WINDOW_DURATION: Duration = Duration::from_millis(2000);

/// Lifecycle of a sampling window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// No marker tag seen yet in this cycle
    NotStarted,
    /// Collecting since `onset`
    Open { onset: Instant },
    /// Timed out or the polling pass ended
    Closed,
}

/// Outcome of observing one tag set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The window has not started; the tag set was not kept
    Ignored,
    /// The tag set was appended to the collected list
    Collected,
    /// The window is closed; the tag set was dropped
    Discarded,
}

/// Sampling window for one service
#[derive(Debug, Clone)]
pub struct SamplingWindow {
    service: String,
    duration: Duration,
    state: WindowState,
    collected: Vec<TagSet>,
}

impl SamplingWindow {
    pub fn new(service: impl Into<String>, duration: Duration) -> Self {
        Self {
            service: service.into(),
            duration,
            state: WindowState::NotStarted,
            collected: Vec::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Tag sets collected in arrival order
    pub fn collected(&self) -> &[TagSet] {
        &self.collected
    }

    /// Observe the tags of one span at instant `now`
    pub fn observe(&mut self, tags: &TagSet, now: Instant) -> Observation {
        if self.state == WindowState::NotStarted && tags.contains_key(MARKER_TAG) {
            self.state = WindowState::Open { onset: now };
            info!(service = %self.service, "Sampling window opened");
        }

        match self.state {
            WindowState::NotStarted => Observation::Ignored,
            WindowState::Closed => Observation::Discarded,
            WindowState::Open { onset } => {
                let elapsed = now.saturating_duration_since(onset);
                if elapsed <= self.duration {
                    self.collected.push(tags.clone());
                    Observation::Collected
                } else {
                    self.state = WindowState::Closed;
                    info!(
                        service = %self.service,
                        elapsed_ms = elapsed.as_millis() as u64,
                        window_ms = self.duration.as_millis() as u64,
                        "Sampling window timed out"
                    );
                    Observation::Discarded
                }
            }
        }
    }

    /// Close an open window at the end of a polling pass
    pub fn close(&mut self) {
        if let WindowState::Open { .. } = self.state {
            debug!(
                service = %self.service,
                collected = self.collected.len(),
                "Sampling window closed"
            );
            self.state = WindowState::Closed;
        }
    }

    /// Forget the onset and every collected tag set
    pub fn reset(&mut self) {
        self.state = WindowState::NotStarted;
        self.collected.clear();
    }
}

/// Per-cycle sampling state for all monitored services
///
/// Windows are kept in configuration order, which is also the order the
/// aggregator traverses them in.
#[derive(Debug, Clone)]
pub struct SamplingContext {
    windows: Vec<SamplingWindow>,
}

impl SamplingContext {
    /// Create a context for `services`
    ///
    /// Names are trimmed, empty names dropped and duplicates collapsed to
    /// their first occurrence.
    pub fn new<S: AsRef<str>>(services: &[S], duration: Duration) -> Self {
        let mut windows: Vec<SamplingWindow> = Vec::with_capacity(services.len());
        for service in services {
            let name = service.as_ref().trim();
            if name.is_empty() || windows.iter().any(|w| w.service() == name) {
                continue;
            }
            windows.push(SamplingWindow::new(name, duration));
        }
        Self { windows }
    }

    /// Service names in configuration order
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.windows.iter().map(SamplingWindow::service)
    }

    pub fn window(&self, service: &str) -> Option<&SamplingWindow> {
        self.windows.iter().find(|w| w.service() == service)
    }

    pub fn window_mut(&mut self, service: &str) -> Option<&mut SamplingWindow> {
        self.windows.iter_mut().find(|w| w.service() == service)
    }

    pub fn windows(&self) -> &[SamplingWindow] {
        &self.windows
    }

    /// Total number of tag sets collected across all services
    pub fn collected_count(&self) -> usize {
        self.windows.iter().map(|w| w.collected().len()).sum()
    }

    /// Close every open window
    pub fn close_all(&mut self) {
        self.windows.iter_mut().for_each(SamplingWindow::close);
    }

    /// Reset every window to its initial state
    pub fn reset(&mut self) {
        self.windows.iter_mut().for_each(SamplingWindow::reset);
    }
}
