pub mod monitor;

/// Depth of the monitor ring in seconds of audio. Small enough to keep the
/// played stream close to live, large enough to ride out tick jitter.
pub const MONITOR_BUFFER_SECONDS: f32 = 0.030;
