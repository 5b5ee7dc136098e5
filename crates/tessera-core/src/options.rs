use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-request decode options.
///
/// Only video sources read the timing fields; other kinds ignore them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// Offset of the first sampled frame.
    pub time_offset: Duration,
    /// Distance between sampled frames. Zero samples a single frame.
    pub sample_interval: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            time_offset: Duration::ZERO,
            sample_interval: Duration::from_secs(1),
        }
    }
}

impl SourceOptions {
    #[must_use]
    pub fn with_time_offset(mut self, offset: Duration) -> Self {
        self.time_offset = offset;
        self
    }

    #[must_use]
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Timestamp of the `index`-th sampled frame.
    #[must_use]
    pub fn frame_time(&self, index: u32) -> Duration {
        self.time_offset + self.sample_interval * index
    }
}
