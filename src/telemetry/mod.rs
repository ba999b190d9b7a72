//! Live audio telemetry for renderers
//!
//! While playback is live a [`SamplingSession`] reads the [`TelemetryTap`] at a
//! fixed frame interval and publishes a [`TelemetryFrame`] on a watch channel.
//! The frame is rewritten in place each tick. When the session ends the feed
//! receives exactly one idle frame with a zeroed sample.

mod beat;
mod sample;
mod sampler;
mod tap;

pub use beat::{beat_period, BeatClock, BEATS_PER_BAR};
pub use sample::{level_fraction, TelemetrySample};
pub use sampler::{SamplingSession, TelemetrySampler};
pub use tap::TelemetryTap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryStatus {
    /// Not playing; renderers show a neutral picture
    Idle,
    Live,
}

/// The latest value on the telemetry feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryFrame {
    pub status: TelemetryStatus,
    /// Bumped on every publish, live or idle
    pub sequence: u64,
    pub sample: TelemetrySample,
}
