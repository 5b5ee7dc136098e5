use serde::{Deserialize, Serialize};
use tessera_archive::ManifestPolicy;

/// Pipeline tuning.
///
/// Deserializable so hosts can ship it next to their other settings; every
/// field falls back to its default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on rows copied per tick by a patch or crop.
    pub rows_per_tick: usize,
    /// Frames sampled from one video source at most.
    pub max_video_frames: u32,
    /// Manifest versions and features this build accepts.
    pub manifest: ManifestPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rows_per_tick: 64,
            max_video_frames: 120,
            manifest: ManifestPolicy::default(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_rows_per_tick(mut self, rows: usize) -> Self {
        self.rows_per_tick = rows.max(1);
        self
    }

    #[must_use]
    pub fn with_max_video_frames(mut self, frames: u32) -> Self {
        self.max_video_frames = frames;
        self
    }

    #[must_use]
    pub fn with_manifest_policy(mut self, policy: ManifestPolicy) -> Self {
        self.manifest = policy;
        self
    }
}
