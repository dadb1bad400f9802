//! Causal filtering applied to incoming blocks before buffering.
//!
//! The high-pass is a Butterworth IIR realised as cascaded second-order
//! sections. Coefficients are shared by every channel and recomputed only on
//! reconfiguration; per-channel memory lives in [`FilterState`] and is
//! threaded through each call so continuity survives arbitrary block
//! boundaries.

use super::Reconfigurable;
use crate::config::DEFAULT_SAMPLE_RATE;
use crate::error::{Result, SweepError};

pub const DEFAULT_HIGHPASS_ORDER: usize = 4;
pub const DEFAULT_HIGHPASS_CUTOFF_HZ: f32 = 250.0;

/// Design parameters for the high-pass stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighpassConfig {
    /// Butterworth order; must be even so the filter decomposes into
    /// second-order sections.
    pub order: usize,
    pub cutoff_hz: f32,
    pub sample_rate: f32,
}

impl Default for HighpassConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_HIGHPASS_ORDER,
            cutoff_hz: DEFAULT_HIGHPASS_CUTOFF_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Normalised digital biquad coefficients (`a0` folded in).
#[derive(Debug, Clone, Copy, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    fn from_coefficients(b: [f64; 3], a: [f64; 3]) -> Self {
        debug_assert!(a[0] != 0.0, "digital biquad a0 must be non-zero");
        let inv_a0 = 1.0 / a[0];

        Self {
            b0: b[0] * inv_a0,
            b1: b[1] * inv_a0,
            b2: b[2] * inv_a0,
            a1: a[1] * inv_a0,
            a2: a[2] * inv_a0,
        }
    }

    #[inline]
    fn prewarp(freq_hz: f64, sample_rate: f64) -> f64 {
        (std::f64::consts::PI * freq_hz / sample_rate).tan() * 2.0 * sample_rate
    }

    /// Bilinear transform of an analog section.
    fn new(analog_b: [f64; 3], analog_a: [f64; 3], sample_rate: f32) -> Self {
        let k = 2.0 * sample_rate as f64;
        let k2 = k * k;

        let (a0, a1, a2) = (analog_a[0], analog_a[1], analog_a[2]);
        let (b0, b1, b2) = (analog_b[0], analog_b[1], analog_b[2]);

        let a0d = a0 * k2 + a1 * k + a2;
        let a1d = 2.0 * (a2 - a0 * k2);
        let a2d = a0 * k2 - a1 * k + a2;

        let b0d = b0 * k2 + b1 * k + b2;
        let b1d = 2.0 * (b2 - b0 * k2);
        let b2d = b0 * k2 - b1 * k + b2;

        Self::from_coefficients([b0d, b1d, b2d], [a0d, a1d, a2d])
    }

    /// Response at DC; the pole polynomial never vanishes at z = 1 for a
    /// stable section.
    #[inline]
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    #[inline]
    fn process(&self, state: &mut BiquadState, sample: f32) -> f32 {
        let x = sample as f64;
        let y = x * self.b0 + state.z1;
        state.z1 = x * self.b1 + state.z2 - self.a1 * y;
        state.z2 = x * self.b2 - self.a2 * y;
        y as f32
    }
}

/// Delay memory for one second-order section (transposed direct form II).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

/// Per-channel filter memory. Its shape depends only on the designed section
/// count, never on the channel's ring position.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    sections: Vec<BiquadState>,
}

impl FilterState {
    /// State primed with the cascade's steady-state step response, so a
    /// freshly created channel does not open with a step transient.
    fn steady_state(sections: &[BiquadCoeffs]) -> Self {
        let mut scale = 1.0_f64;
        let states = sections
            .iter()
            .map(|coeffs| {
                let h = coeffs.dc_gain();
                let state = BiquadState {
                    z1: (h - coeffs.b0) * scale,
                    z2: (coeffs.b2 - coeffs.a2 * h) * scale,
                };
                scale *= h;
                state
            })
            .collect();
        Self { sections: states }
    }
}

/// Line-noise rejection stage. The interface is wired through the pipeline
/// but no coefficients exist yet; enabled or not, samples pass through
/// untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombStage {
    enabled: bool,
}

impl CombStage {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process_block(&self, _samples: &mut [f32]) {
        if self.enabled {
            // TODO: comb coefficients for 50/60 Hz line-noise rejection.
        }
    }
}

/// High-pass plus comb filtering shared across channels.
#[derive(Debug, Clone)]
pub struct FilterStage {
    config: HighpassConfig,
    sections: Vec<BiquadCoeffs>,
    highpass_enabled: bool,
    comb: CombStage,
}

impl FilterStage {
    pub fn new(config: HighpassConfig) -> Result<Self> {
        let sections = butterworth_highpass_sections(&config)?;
        Ok(Self {
            config,
            sections,
            highpass_enabled: false,
            comb: CombStage::default(),
        })
    }

    pub fn config(&self) -> HighpassConfig {
        self.config
    }

    pub fn highpass_enabled(&self) -> bool {
        self.highpass_enabled
    }

    /// Toggling leaves per-channel state untouched; while disabled the state
    /// is frozen, and re-enabling resumes from the last active values.
    pub fn set_highpass_enabled(&mut self, enabled: bool) {
        self.highpass_enabled = enabled;
    }

    pub fn comb_enabled(&self) -> bool {
        self.comb.enabled()
    }

    pub fn set_comb_enabled(&mut self, enabled: bool) {
        self.comb.set_enabled(enabled);
    }

    /// Fresh per-channel state for the current design.
    pub fn channel_state(&self) -> FilterState {
        FilterState::steady_state(&self.sections)
    }

    /// Filters `samples` in place, advancing `state` exactly once per sample.
    /// A disabled high-pass leaves both data and state untouched.
    pub fn process_block(&self, state: &mut FilterState, samples: &mut [f32]) {
        if self.highpass_enabled {
            debug_assert_eq!(
                state.sections.len(),
                self.sections.len(),
                "filter state shape must match the designed cascade"
            );
            for sample in samples.iter_mut() {
                let mut value = *sample;
                for (coeffs, section) in self.sections.iter().zip(state.sections.iter_mut()) {
                    value = coeffs.process(section, value);
                }
                *sample = value;
            }
        }
        self.comb.process_block(samples);
    }
}

impl Reconfigurable<HighpassConfig> for FilterStage {
    /// Redesigns the cascade. On error the previous design stays active;
    /// existing [`FilterState`] values remain valid only while the section
    /// count is unchanged, so callers rebuild channel state after a
    /// successful update.
    fn update_config(&mut self, config: HighpassConfig) -> Result<()> {
        let sections = butterworth_highpass_sections(&config)?;
        self.config = config;
        self.sections = sections;
        Ok(())
    }
}

/// Butterworth high-pass as `order / 2` second-order sections: prototype
/// pole pairs `s^2 + 2 sin(pi (2k + 1) / (2 n)) s + 1`, low-pass to
/// high-pass transformed at the prewarped cutoff, then bilinear mapped.
fn butterworth_highpass_sections(config: &HighpassConfig) -> Result<Vec<BiquadCoeffs>> {
    if config.order == 0 || config.order % 2 != 0 {
        return Err(SweepError::InvalidFilterOrder(config.order));
    }
    if !config.sample_rate.is_finite() || config.sample_rate <= 0.0 {
        return Err(SweepError::InvalidConfig(format!(
            "filter sample_rate must be positive, got {}",
            config.sample_rate
        )));
    }
    if !config.cutoff_hz.is_finite() || config.cutoff_hz <= 0.0 {
        return Err(SweepError::InvalidConfig(format!(
            "high-pass cutoff must be positive, got {}",
            config.cutoff_hz
        )));
    }
    let nyquist_hz = config.sample_rate / 2.0;
    if config.cutoff_hz >= nyquist_hz {
        return Err(SweepError::CutoffAboveNyquist {
            cutoff_hz: config.cutoff_hz,
            nyquist_hz,
        });
    }

    let order = config.order;
    let wc = BiquadCoeffs::prewarp(config.cutoff_hz as f64, config.sample_rate as f64);

    let sections = (0..order / 2)
        .map(|k| {
            let damping =
                2.0 * (std::f64::consts::PI * (2 * k + 1) as f64 / (2 * order) as f64).sin();
            BiquadCoeffs::new(
                [1.0, 0.0, 0.0],
                [1.0, damping * wc, wc * wc],
                config.sample_rate,
            )
        })
        .collect();

    Ok(sections)
}
