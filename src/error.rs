//! Error types for the sweep pipeline.

use crate::dsp::ChannelId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Errors surfaced by configuration and channel management operations.
///
/// Streaming-path conditions (unknown channel in a tick batch, oversized
/// blocks, audio under-runs) are policies rather than errors and never
/// produce one of these.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SweepError {
    /// A configuration value failed validation.
    #[error("invalid sweep config: {0}")]
    InvalidConfig(String),

    /// High-pass design would place the cutoff at or above Nyquist.
    #[error("high-pass cutoff {cutoff_hz} Hz must stay below Nyquist ({nyquist_hz} Hz)")]
    CutoffAboveNyquist { cutoff_hz: f32, nyquist_hz: f32 },

    /// High-pass design requested an unrealisable order.
    #[error("high-pass order must be a positive even number, got {0}")]
    InvalidFilterOrder(usize),

    /// An explicit operation addressed a channel that is not displayed.
    #[error("channel {0} is not displayed")]
    UnknownChannel(ChannelId),

    /// A channel was added twice without removing it first.
    #[error("channel {0} is already displayed")]
    DuplicateChannel(ChannelId),
}
