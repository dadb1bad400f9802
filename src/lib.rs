//! Streaming sweep-display and audio-monitor pipeline for multi-channel
//! electrophysiology.
//!
//! Incoming sample blocks roll through a fixed-duration window per channel,
//! conditioned by a causal high-pass and decimated for drawing. The window
//! is partitioned into segments so each tick yields only the ranges that
//! changed. One channel at a time can be routed to an audio monitor ring
//! consumed by a free-running playback callback.
//!
//! # Quick start
//! ```no_run
//! use neurosweep::{ChannelId, DeviceControl, SampleBlock, SweepConfig, SweepRouter};
//!
//! struct NullDevice;
//! impl DeviceControl for NullDevice {
//!     fn channel_threshold(&self, _channel_id: ChannelId) -> Option<i32> {
//!         None
//!     }
//!     fn set_threshold(&mut self, _channel_id: ChannelId, _raw_level: i32) {}
//!     fn monitor_channel(&mut self, _channel_id: Option<ChannelId>) {}
//! }
//!
//! let mut router = SweepRouter::new(SweepConfig::default(), Box::new(NullDevice))?;
//! router.add_channel(ChannelId(1), "dorsal-1")?;
//! router.select_monitor(Some(ChannelId(1)))?;
//!
//! let samples = vec![0.0f32; 1_500];
//! let dirty = router.tick(&[SampleBlock::new(ChannelId(1), &samples, 0)]);
//! for segment in &dirty {
//!     println!("redraw channel {} segment {}", segment.channel_id, segment.segment_index);
//! }
//! # Ok::<(), neurosweep::SweepError>(())
//! ```

pub mod audio;
pub mod config;
pub mod dsp;
pub mod error;
pub mod router;
pub mod util;

pub use audio::monitor::MonitorRing;
pub use config::{SweepConfig, SweepSettings, Theme};
pub use dsp::{ChannelId, DirtySegment, Reconfigurable, SampleBlock};
pub use error::{Result, SweepError};
pub use router::{DeviceControl, MonitorSnapshot, SweepRouter, UNIT_SCALE};
