//! Core types and contracts shared by the sweep pipeline stages.
//!
//! This module provides the block/segment plumbing the router and the
//! individual stages agree on. Stage implementations live in the submodules
//! and can iterate without reshaping this surface.

pub mod decimate;
pub mod filter;
pub mod sweep;

use crate::error::Result;
use std::fmt;

/// Stable identifier for a device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Borrowed block of raw device samples for one channel.
#[derive(Debug, Clone, Copy)]
pub struct SampleBlock<'a> {
    pub channel_id: ChannelId,
    /// Amplitudes in raw device units, oldest first.
    pub samples: &'a [f32],
    /// Monotonic per-channel sequence number; blocks must be applied in this
    /// order within a channel.
    pub arrival_order: u64,
}

impl<'a> SampleBlock<'a> {
    pub fn new(channel_id: ChannelId, samples: &'a [f32], arrival_order: u64) -> Self {
        Self {
            channel_id,
            samples,
            arrival_order,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Rendered data for one segment that changed during a tick. The renderer
/// replaces that segment's curve with exactly these arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct DirtySegment {
    pub channel_id: ChannelId,
    pub segment_index: usize,
    /// Absolute sample indices modulo the ring capacity.
    pub x: Vec<u32>,
    /// Amplitudes in display units, aligned with `x`.
    pub y: Vec<f32>,
}

/// Contract for components whose configuration can be replaced at a
/// well-defined point. Implementations validate the new configuration and
/// keep the previous one on error.
pub trait Reconfigurable<Cfg> {
    fn update_config(&mut self, config: Cfg) -> Result<()>;
}
