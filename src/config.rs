//! Engine configuration, loadable from JSON

use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strudel_audio::{AnalyserSettings, EngineOptions};

/// Tunables for audio analysis, telemetry cadence and tempo limits
///
/// Every field is optional in the JSON form; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Analysis window length, a power of two
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Number of spectrum bars published per telemetry sample
    pub spectrum_bars: usize,
    pub frame_interval_ms: u64,
    /// Tempos are in cycles per minute
    pub default_tempo: u32,
    pub min_tempo: u32,
    pub max_tempo: u32,
    /// Played when the pattern text is blank
    pub default_pattern: String,
    pub master_gain: f32,
    pub max_voices: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            spectrum_bars: 64,
            frame_interval_ms: 16,
            default_tempo: 120,
            min_tempo: 60,
            max_tempo: 200,
            default_pattern: "bd hh sn hh".to_string(),
            master_gain: 0.8,
            max_voices: 64,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.analyser_settings()
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        if self.spectrum_bars == 0 || self.spectrum_bars > self.fft_size / 2 {
            return Err(EngineError::Config(format!(
                "spectrum_bars must be between 1 and {}, got {}",
                self.fft_size / 2,
                self.spectrum_bars
            )));
        }
        if self.frame_interval_ms == 0 {
            return Err(EngineError::Config(
                "frame_interval_ms must be positive".to_string(),
            ));
        }
        if self.min_tempo == 0 || self.min_tempo > self.max_tempo {
            return Err(EngineError::Config(format!(
                "tempo range {}..={} is empty or starts at zero",
                self.min_tempo, self.max_tempo
            )));
        }
        if !(self.min_tempo..=self.max_tempo).contains(&self.default_tempo) {
            return Err(EngineError::Config(format!(
                "default_tempo {} is outside {}..={}",
                self.default_tempo, self.min_tempo, self.max_tempo
            )));
        }
        if !(0.0..=1.0).contains(&self.master_gain) {
            return Err(EngineError::Config(format!(
                "master_gain must be within [0, 1], got {}",
                self.master_gain
            )));
        }
        if self.max_voices == 0 {
            return Err(EngineError::Config("max_voices must be positive".to_string()));
        }
        if self.default_pattern.trim().is_empty() {
            return Err(EngineError::Config("default_pattern is blank".to_string()));
        }
        Ok(())
    }

    /// Clamp a requested tempo into the configured range.
    ///
    /// An inverted range is clamped to `max_tempo` rather than panicking.
    pub fn clamp_tempo(&self, cpm: u32) -> u32 {
        cpm.max(self.min_tempo).min(self.max_tempo)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn analyser_settings(&self) -> AnalyserSettings {
        AnalyserSettings {
            fft_size: self.fft_size,
            smoothing_time_constant: self.smoothing_time_constant,
            min_decibels: self.min_decibels,
            max_decibels: self.max_decibels,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            sample_rate: None,
            window_size: self.fft_size,
            master_gain: self.master_gain,
        }
    }
}
