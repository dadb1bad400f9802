//! Sweep configuration and on-disk settings snapshot.

use crate::error::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_WINDOW_SECONDS: f32 = 1.05;
pub const DEFAULT_SAMPLE_RATE: f32 = 30_000.0;
/// Display range in microvolts; plots span `[-range, +range]`.
pub const DEFAULT_AMPLITUDE_RANGE: f32 = 250.0;
pub const DEFAULT_SEGMENT_COUNT: usize = 20;
/// Factor applied when display decimation is enabled (1 disables it).
pub const DISPLAY_DECIMATION_FACTOR: usize = 100;

/// Colour scheme hint forwarded to the rendering layer. Carried in the
/// config so it round-trips through settings; nothing in the pipeline
/// depends on it beyond display scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Shared configuration for every channel in a sweep view.
///
/// Changing any field except `theme` invalidates ring capacities and segment
/// boundaries, so updates go through `SweepRouter::reconfigure` which rebuilds
/// all per-channel state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub window_seconds: f32,
    pub sample_rate: f32,
    pub amplitude_range: f32,
    pub segment_count: usize,
    /// Display-only sample thinning; 1 = disabled.
    pub decimation_factor: usize,
    pub highpass_enabled: bool,
    pub theme: Theme,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            amplitude_range: DEFAULT_AMPLITUDE_RANGE,
            segment_count: DEFAULT_SEGMENT_COUNT,
            decimation_factor: 1,
            highpass_enabled: true,
            theme: Theme::Dark,
        }
    }
}

impl SweepConfig {
    /// Checks the invariants every other component assumes. Called before any
    /// state is built from the config; a failing config never reaches the
    /// channels.
    pub fn validate(&self) -> Result<()> {
        if !self.window_seconds.is_finite() || self.window_seconds <= 0.0 {
            return Err(SweepError::InvalidConfig(format!(
                "window_seconds must be positive, got {}",
                self.window_seconds
            )));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(SweepError::InvalidConfig(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !self.amplitude_range.is_finite() || self.amplitude_range <= 0.0 {
            return Err(SweepError::InvalidConfig(format!(
                "amplitude_range must be positive, got {}",
                self.amplitude_range
            )));
        }
        if self.segment_count == 0 {
            return Err(SweepError::InvalidConfig(
                "segment_count must be at least 1".into(),
            ));
        }
        if self.decimation_factor == 0 {
            return Err(SweepError::InvalidConfig(
                "decimation_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Ring length in samples for one channel.
    pub fn capacity(&self) -> usize {
        (self.window_seconds * self.sample_rate).ceil().max(1.0) as usize
    }

    /// Nominal segment length; the last segment absorbs the remainder.
    pub fn samples_per_segment(&self) -> usize {
        self.capacity().div_ceil(self.segment_count.max(1))
    }
}

/// Serialised mirror of [`SweepConfig`] persisted between sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub window_seconds: f32,
    pub sample_rate: f32,
    pub amplitude_range: f32,
    pub segment_count: usize,
    pub decimation_factor: usize,
    pub highpass_enabled: bool,
    pub theme: Theme,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self::from_config(&SweepConfig::default())
    }
}

impl SweepSettings {
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            window_seconds: config.window_seconds,
            sample_rate: config.sample_rate,
            amplitude_range: config.amplitude_range,
            segment_count: config.segment_count,
            decimation_factor: config.decimation_factor,
            highpass_enabled: config.highpass_enabled,
            theme: config.theme,
        }
    }

    pub fn apply_to(&self, config: &mut SweepConfig) {
        config.window_seconds = self.window_seconds;
        config.sample_rate = self.sample_rate;
        config.amplitude_range = self.amplitude_range;
        config.segment_count = self.segment_count;
        config.decimation_factor = self.decimation_factor;
        config.highpass_enabled = self.highpass_enabled;
        config.theme = self.theme;
    }
}

/// Loads settings from `path`, falling back to defaults when the file is
/// missing or unreadable. A malformed file is reported and ignored rather
/// than aborting startup.
pub fn load_settings(path: &Path) -> SweepSettings {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("[config] ignoring malformed settings {}: {err}", path.display());
                SweepSettings::default()
            }
        },
        Err(_) => SweepSettings::default(),
    }
}

/// Persists settings as pretty-printed JSON.
pub fn save_settings(path: &Path, settings: &SweepSettings) -> std::io::Result<()> {
    let serialized = serde_json::to_string_pretty(settings)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    fs::write(path, serialized)
}
