use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::foundation::error::{RiterError, RiterResult};

/// Default per-frame interpreter step / wasm fuel budget.
pub const DEFAULT_MAX_STEPS_PER_FRAME: u64 = 5_000_000;

/// Named budget presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderProfile {
    /// Live browser preview: 60 s wall clock, paced at 10 fps.
    Preview,
    /// Physical display: 300 s wall clock, paced at 10 fps.
    Display,
    /// Offline batch: 60 s wall clock, unpaced.
    Batch,
}

impl FromStr for RenderProfile {
    type Err = RiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preview" => Ok(Self::Preview),
            "display" => Ok(Self::Display),
            "batch" => Ok(Self::Batch),
            other => Err(RiterError::configuration(format!(
                "unknown render profile '{other}'"
            ))),
        }
    }
}

/// Budgets and pacing for one render session.
///
/// JSON uses millisecond fields, e.g.
/// `{"wall_clock_ms": 60000, "frame_interval_ms": 100, "max_frames": null}`. Missing fields take
/// the [`RenderConfig::batch`] values.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Total wall-clock budget; `None` means unbounded.
    pub wall_clock_ms: Option<u64>,
    /// Frame ceiling on top of any backend ceiling.
    pub max_frames: Option<u64>,
    /// Minimum spacing between delivered frames; `None` delivers as fast as produced.
    pub frame_interval_ms: Option<u64>,
    /// Interpreter steps or wasm fuel allowed for a single frame.
    pub max_steps_per_frame: u64,
    /// Seed for `random()` in imperative shows.
    pub seed: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::batch()
    }
}

impl RenderConfig {
    /// Preview preset.
    pub fn preview() -> Self {
        Self {
            wall_clock_ms: Some(60_000),
            max_frames: None,
            frame_interval_ms: Some(100),
            max_steps_per_frame: DEFAULT_MAX_STEPS_PER_FRAME,
            seed: 0,
        }
    }

    /// Display preset.
    pub fn display() -> Self {
        Self {
            wall_clock_ms: Some(300_000),
            ..Self::preview()
        }
    }

    /// Batch preset.
    pub fn batch() -> Self {
        Self {
            frame_interval_ms: None,
            ..Self::preview()
        }
    }

    /// The preset for `profile`.
    pub fn for_profile(profile: RenderProfile) -> Self {
        match profile {
            RenderProfile::Preview => Self::preview(),
            RenderProfile::Display => Self::display(),
            RenderProfile::Batch => Self::batch(),
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(s: &str) -> RiterResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| RiterError::configuration(format!("invalid render config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> RiterResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RiterError::configuration(format!("read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Reject budgets that could never produce a frame.
    pub fn validate(&self) -> RiterResult<()> {
        if self.wall_clock_ms == Some(0) {
            return Err(RiterError::configuration("wall_clock_ms must be > 0"));
        }
        if self.max_frames == Some(0) {
            return Err(RiterError::configuration("max_frames must be > 0"));
        }
        if self.max_steps_per_frame == 0 {
            return Err(RiterError::configuration("max_steps_per_frame must be > 0"));
        }
        if self.frame_interval_ms.is_some_and(|ms| ms > 60_000) {
            return Err(RiterError::configuration(
                "frame_interval_ms must be <= 60000",
            ));
        }
        Ok(())
    }

    /// Wall-clock budget as a duration.
    pub fn wall_clock(&self) -> Option<Duration> {
        self.wall_clock_ms.map(Duration::from_millis)
    }

    /// Pacing interval as a duration.
    pub fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval_ms.map(Duration::from_millis)
    }
}
