use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, SpectrumError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub playback: PlaybackConfig,
    pub view: ViewConfig,
}

impl AppConfig {
    /// Parses a JSON document. Missing sections and fields fall back to
    /// their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.analysis.sample_count == 0 {
            return Err(SpectrumError::InvalidConfig(
                "analysis.sample_count must be greater than zero",
            ));
        }
        if self.playback.progress_interval_ms == 0 {
            return Err(SpectrumError::InvalidConfig(
                "playback.progress_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Configuration of the transform engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// PCM frames per analysis pass. Rounded up to a power of two internally.
    pub sample_count: usize,
    pub scale: MagnitudeScale,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_count: 1024,
            scale: MagnitudeScale::Linear,
        }
    }
}

/// How bin magnitudes are compressed before publication.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MagnitudeScale {
    #[default]
    Linear,
    /// Decibels above `floor_db`, clamped at zero.
    Decibel { floor_db: f32 },
}

/// Transport-related settings for the playback coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub progress_interval_ms: u64,
    /// Consecutive load failures tolerated while auto-advancing before the
    /// coordinator gives up and goes idle.
    pub max_failed_advances: usize,
}

impl PlaybackConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 250,
            max_failed_advances: 8,
        }
    }
}

/// Visual options handed to the bar view. Nothing in the core reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub bar_background: String,
    pub bar_fill: String,
    pub column_margin: u16,
    pub column_width: u16,
    /// Draw bars as stacked blocks instead of solid columns.
    pub shows_blocks: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            bar_background: "#202020".to_string(),
            bar_fill: "#3fc1ff".to_string(),
            column_margin: 1,
            column_width: 1,
            shows_blocks: false,
        }
    }
}
