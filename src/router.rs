//! Streaming coordinator for the sweep display.
//!
//! The router owns one [`SweepRing`] and one filter state per displayed
//! channel, a shared [`FilterStage`] holding the coefficient design, and the
//! audio [`MonitorRing`]. Each tick it scales incoming blocks to display
//! units, runs the causal filters, writes the sweep rings, feeds the
//! monitored channel's PCM to the audio side, and reports which segments
//! need redrawing.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{info, trace, warn};

use crate::audio::monitor::MonitorRing;
use crate::config::SweepConfig;
use crate::dsp::filter::{FilterStage, FilterState, HighpassConfig};
use crate::dsp::sweep::SweepRing;
use crate::dsp::{ChannelId, DirtySegment, Reconfigurable, SampleBlock};
use crate::error::{Result, SweepError};

/// Raw device units to display microvolts. Applied on ingest before
/// filtering; the inverse applies when pushing thresholds back to the
/// device.
pub const UNIT_SCALE: f32 = 0.25;

/// Full-scale i16 for a sample sitting exactly at the display range edge.
const PCM_FULL_SCALE: f32 = 32_768.0;

/// Control surface of the acquisition device. Thresholds cross this
/// boundary in the device's raw units; the router converts to and from
/// microvolts at the call site.
pub trait DeviceControl {
    /// Configured spike threshold for a channel, in raw device units.
    fn channel_threshold(&self, channel_id: ChannelId) -> Option<i32>;

    /// Pushes a new spike threshold for a channel, in raw device units.
    fn set_threshold(&mut self, channel_id: ChannelId, raw_level: i32);

    /// Routes a channel to the device's hardware audio output. `None`
    /// selects silence.
    fn monitor_channel(&mut self, channel_id: Option<ChannelId>);
}

/// Point-in-time monitor status for interested consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSnapshot {
    pub monitored: Option<ChannelId>,
    pub amplitude_range: f32,
    pub highpass_enabled: bool,
}

struct ChannelState {
    label: String,
    ring: SweepRing,
    filter: FilterState,
    /// Spike threshold in display microvolts.
    threshold: f32,
}

/// Owner of all per-channel streaming state.
pub struct SweepRouter {
    config: SweepConfig,
    channels: FxHashMap<ChannelId, ChannelState>,
    filter: FilterStage,
    monitor: Arc<MonitorRing>,
    monitored: Option<ChannelId>,
    device: Box<dyn DeviceControl>,
    scaled: Vec<f32>,
    pcm: Vec<i16>,
}

impl SweepRouter {
    pub fn new(config: SweepConfig, device: Box<dyn DeviceControl>) -> Result<Self> {
        config.validate()?;
        let mut filter = FilterStage::new(HighpassConfig {
            sample_rate: config.sample_rate,
            ..HighpassConfig::default()
        })?;
        filter.set_highpass_enabled(config.highpass_enabled);

        Ok(Self {
            config,
            channels: FxHashMap::default(),
            filter,
            monitor: Arc::new(MonitorRing::new(config.sample_rate)),
            monitored: None,
            device,
            scaled: Vec::new(),
            pcm: Vec::new(),
        })
    }

    pub fn config(&self) -> SweepConfig {
        self.config
    }

    /// Shared handle for the audio callback side.
    pub fn monitor_ring(&self) -> Arc<MonitorRing> {
        Arc::clone(&self.monitor)
    }

    pub fn monitored(&self) -> Option<ChannelId> {
        self.monitored
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn channel_label(&self, channel_id: ChannelId) -> Option<&str> {
        self.channels
            .get(&channel_id)
            .map(|channel| channel.label.as_str())
    }

    /// Spike threshold in display microvolts.
    pub fn threshold(&self, channel_id: ChannelId) -> Option<f32> {
        self.channels
            .get(&channel_id)
            .map(|channel| channel.threshold)
    }

    pub fn monitor_snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            monitored: self.monitored,
            amplitude_range: self.config.amplitude_range,
            highpass_enabled: self.filter.highpass_enabled(),
        }
    }

    /// Starts displaying a channel: fresh ring, steady-state filter
    /// priming, threshold pulled from the device.
    pub fn add_channel(&mut self, channel_id: ChannelId, label: impl Into<String>) -> Result<()> {
        if self.channels.contains_key(&channel_id) {
            return Err(SweepError::DuplicateChannel(channel_id));
        }

        let label = label.into();
        let threshold = self
            .device
            .channel_threshold(channel_id)
            .map(|raw| raw as f32 * UNIT_SCALE)
            .unwrap_or(0.0);
        info!("[router] channel {channel_id} ({label}) added, threshold {threshold} uV");

        self.channels.insert(
            channel_id,
            ChannelState {
                label,
                ring: self.new_ring(),
                filter: self.filter.channel_state(),
                threshold,
            },
        );
        Ok(())
    }

    /// Stops displaying a channel. A monitored channel falls back to
    /// silence on removal.
    pub fn remove_channel(&mut self, channel_id: ChannelId) -> Result<()> {
        if self.channels.remove(&channel_id).is_none() {
            return Err(SweepError::UnknownChannel(channel_id));
        }

        if self.monitored == Some(channel_id) {
            self.monitored = None;
            self.monitor.reset();
            self.device.monitor_channel(None);
            info!("[router] monitored channel {channel_id} removed; monitor silenced");
        }
        Ok(())
    }

    /// Stores a new threshold and pushes it to the device in raw units.
    pub fn set_threshold(&mut self, channel_id: ChannelId, level: f32) -> Result<()> {
        let Some(channel) = self.channels.get_mut(&channel_id) else {
            return Err(SweepError::UnknownChannel(channel_id));
        };

        channel.threshold = level;
        self.device.set_threshold(channel_id, (level / UNIT_SCALE) as i32);
        Ok(())
    }

    /// Switches the audio monitor to `target`, or to silence for `None`.
    /// The ring is wiped before the switch so the callback never plays a
    /// mix of two channels.
    pub fn select_monitor(&mut self, target: Option<ChannelId>) -> Result<()> {
        if let Some(channel_id) = target
            && !self.channels.contains_key(&channel_id)
        {
            return Err(SweepError::UnknownChannel(channel_id));
        }

        self.monitored = target;
        self.monitor.reset();
        self.device.monitor_channel(target);
        match target {
            Some(channel_id) => info!("[router] monitoring channel {channel_id}"),
            None => info!("[router] monitor silenced"),
        }
        Ok(())
    }

    pub fn set_highpass_enabled(&mut self, enabled: bool) {
        self.config.highpass_enabled = enabled;
        self.filter.set_highpass_enabled(enabled);
    }

    pub fn set_comb_enabled(&mut self, enabled: bool) {
        self.filter.set_comb_enabled(enabled);
    }

    /// Current rendered `(x, y)` pair for one segment of one channel.
    pub fn segment_view(
        &self,
        channel_id: ChannelId,
        segment_index: usize,
    ) -> Option<(&[u32], &[f32])> {
        self.channels
            .get(&channel_id)?
            .ring
            .segment_view(segment_index)
    }

    /// Processes one tick's blocks in arrival order and returns every
    /// segment that changed, ready for redraw.
    ///
    /// A block for a channel that is not displayed is dropped. A block
    /// whose filtered output contains a non-finite value is dropped with
    /// its channel's filter state rolled back, leaving the other channels
    /// untouched.
    pub fn tick(&mut self, blocks: &[SampleBlock<'_>]) -> Vec<DirtySegment> {
        let mut dirty = Vec::new();

        for block in blocks {
            if block.is_empty() {
                continue;
            }
            let Some(channel) = self.channels.get_mut(&block.channel_id) else {
                trace!(
                    "[router] dropping block {} for undisplayed channel {}",
                    block.arrival_order, block.channel_id
                );
                continue;
            };

            self.scaled.clear();
            self.scaled
                .extend(block.samples.iter().map(|&raw| raw * UNIT_SCALE));

            let saved = channel.filter.clone();
            self.filter.process_block(&mut channel.filter, &mut self.scaled);
            if let Some(bad) = self.scaled.iter().find(|value| !value.is_finite()) {
                warn!(
                    "[router] non-finite sample {bad} on channel {}; block dropped",
                    block.channel_id
                );
                channel.filter = saved;
                continue;
            }

            let touched = channel.ring.ingest(&self.scaled);

            if self.monitored == Some(block.channel_id) {
                let gain = PCM_FULL_SCALE / self.config.amplitude_range;
                self.pcm.clear();
                self.pcm
                    .extend(self.scaled.iter().map(|&value| (value * gain) as i16));
                self.monitor.write(&self.pcm);
            }

            for segment_index in touched {
                if let Some((x, y)) = channel.ring.segment_view(segment_index) {
                    dirty.push(DirtySegment {
                        channel_id: block.channel_id,
                        segment_index,
                        x: x.to_vec(),
                        y: y.to_vec(),
                    });
                }
            }
        }

        dirty
    }

    /// Wipes every channel's rendered sweep and re-anchors the write
    /// cursors to `anchor_sample`, the device's current sample count.
    /// Thresholds are re-pulled from the device; filter states keep
    /// running so the next block continues without a transient.
    pub fn clear(&mut self, anchor_sample: u64) {
        for (channel_id, channel) in self.channels.iter_mut() {
            channel.ring.clear(anchor_sample);
            if let Some(raw) = self.device.channel_threshold(*channel_id) {
                channel.threshold = raw as f32 * UNIT_SCALE;
            }
        }
        info!("[router] sweep cleared at sample {anchor_sample}");
    }

    /// Applies a new sweep configuration: filter redesign, ring rebuild,
    /// monitor resize. Validation runs before anything mutates, so an
    /// invalid configuration leaves the router exactly as it was. The
    /// monitor falls back to silence because the old ring's contents are
    /// meaningless at the new geometry.
    pub fn reconfigure(&mut self, config: SweepConfig) -> Result<()> {
        config.validate()?;
        self.filter.update_config(HighpassConfig {
            sample_rate: config.sample_rate,
            ..self.filter.config()
        })?;
        self.filter.set_highpass_enabled(config.highpass_enabled);

        self.config = config;
        for (channel_id, channel) in self.channels.iter_mut() {
            channel.ring = SweepRing::new(
                config.capacity(),
                config.segment_count,
                config.decimation_factor,
            );
            channel.filter = self.filter.channel_state();
            if let Some(raw) = self.device.channel_threshold(*channel_id) {
                channel.threshold = raw as f32 * UNIT_SCALE;
            }
        }

        self.monitored = None;
        self.monitor.reconfigure(config.sample_rate);
        self.device.monitor_channel(None);
        info!(
            "[router] reconfigured: {}s window at {} Hz, {} channels",
            config.window_seconds,
            config.sample_rate,
            self.channels.len()
        );
        Ok(())
    }

    fn new_ring(&self) -> SweepRing {
        SweepRing::new(
            self.config.capacity(),
            self.config.segment_count,
            self.config.decimation_factor,
        )
    }
}

impl Reconfigurable<SweepConfig> for SweepRouter {
    fn update_config(&mut self, config: SweepConfig) -> Result<()> {
        self.reconfigure(config)
    }
}

impl fmt::Debug for SweepRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepRouter")
            .field("config", &self.config)
            .field("channels", &self.channels.len())
            .field("monitored", &self.monitored)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct DeviceLog {
        thresholds: FxHashMap<ChannelId, i32>,
        threshold_writes: Vec<(ChannelId, i32)>,
        monitor_calls: Vec<Option<ChannelId>>,
    }

    #[derive(Clone, Default)]
    struct TestDevice {
        log: Rc<RefCell<DeviceLog>>,
    }

    impl DeviceControl for TestDevice {
        fn channel_threshold(&self, channel_id: ChannelId) -> Option<i32> {
            self.log.borrow().thresholds.get(&channel_id).copied()
        }

        fn set_threshold(&mut self, channel_id: ChannelId, raw_level: i32) {
            let mut log = self.log.borrow_mut();
            log.thresholds.insert(channel_id, raw_level);
            log.threshold_writes.push((channel_id, raw_level));
        }

        fn monitor_channel(&mut self, channel_id: Option<ChannelId>) {
            self.log.borrow_mut().monitor_calls.push(channel_id);
        }
    }

    /// 100-sample ring over 5 segments, with an amplitude range chosen so
    /// the PCM gain is exactly 128.
    fn test_config() -> SweepConfig {
        SweepConfig {
            window_seconds: 0.1,
            sample_rate: 1_000.0,
            amplitude_range: 256.0,
            segment_count: 5,
            decimation_factor: 1,
            ..SweepConfig::default()
        }
    }

    fn test_router() -> (SweepRouter, TestDevice) {
        let device = TestDevice::default();
        let mut router = SweepRouter::new(test_config(), Box::new(device.clone()))
            .expect("config is valid");
        router.add_channel(ChannelId(1), "ch-1").expect("fresh channel");
        router.add_channel(ChannelId(2), "ch-2").expect("fresh channel");
        (router, device)
    }

    #[test]
    fn blocks_for_undisplayed_channels_are_dropped() {
        let (mut router, _device) = test_router();
        let samples = [1.0f32; 16];
        let dirty = router.tick(&[SampleBlock::new(ChannelId(9), &samples, 0)]);

        assert!(dirty.is_empty());
        let (_, y) = router
            .segment_view(ChannelId(1), 0)
            .expect("segment exists");
        assert!(y.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn tick_scales_to_display_units_and_reports_dirty_segments() {
        let (mut router, _device) = test_router();
        router.set_highpass_enabled(false);

        let samples = [4.0f32; 30];
        let dirty = router.tick(&[SampleBlock::new(ChannelId(1), &samples, 0)]);

        let indices: Vec<_> = dirty
            .iter()
            .map(|segment| (segment.channel_id, segment.segment_index))
            .collect();
        assert_eq!(indices, vec![(ChannelId(1), 0), (ChannelId(1), 1)]);

        assert!(dirty[0].y.iter().all(|&v| v == 1.0), "4.0 raw is 1.0 uV");
        assert_eq!(dirty[0].x.len(), 20);
        assert!(dirty[1].y[..10].iter().all(|&v| v == 1.0));
        assert!(dirty[1].y[10..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn duplicate_channel_is_rejected() {
        let (mut router, _device) = test_router();
        let err = router.add_channel(ChannelId(1), "again").unwrap_err();
        assert!(matches!(err, SweepError::DuplicateChannel(ChannelId(1))));
    }

    #[test]
    fn monitored_channel_feeds_scaled_pcm() {
        let (mut router, device) = test_router();
        router.set_highpass_enabled(false);
        router.select_monitor(Some(ChannelId(1))).expect("displayed");
        assert_eq!(device.log.borrow().monitor_calls.last(), Some(&Some(ChannelId(1))));

        let samples = [4.0f32, -4.0, 8.0];
        router.tick(&[SampleBlock::new(ChannelId(1), &samples, 0)]);

        // 1 uV at a 256 uV range is 128 counts.
        let ring = router.monitor_ring();
        let mut pcm = [0i16; 3];
        ring.read(&mut pcm);
        assert_eq!(pcm, [128, -128, 256]);
    }

    #[test]
    fn unmonitored_channels_write_no_audio() {
        let (mut router, _device) = test_router();
        router.select_monitor(Some(ChannelId(2))).expect("displayed");

        let samples = [4.0f32; 8];
        router.tick(&[SampleBlock::new(ChannelId(1), &samples, 0)]);
        assert_eq!(router.monitor_ring().available(), 0);
    }

    #[test]
    fn silence_selection_is_valid() {
        let (mut router, device) = test_router();
        router.select_monitor(Some(ChannelId(1))).expect("displayed");
        router.select_monitor(None).expect("silence is always valid");

        assert_eq!(router.monitored(), None);
        assert_eq!(device.log.borrow().monitor_calls.last(), Some(&None));

        router.tick(&[SampleBlock::new(ChannelId(1), &[4.0f32; 8], 0)]);
        assert_eq!(router.monitor_ring().available(), 0);
    }

    #[test]
    fn monitor_switch_never_plays_the_previous_channel() {
        let (mut router, _device) = test_router();
        router.set_highpass_enabled(false);

        router.select_monitor(Some(ChannelId(1))).expect("displayed");
        router.tick(&[SampleBlock::new(ChannelId(1), &[4.0f32; 8], 0)]);

        // Switch wipes pending audio before the new channel writes.
        router.select_monitor(Some(ChannelId(2))).expect("displayed");
        router.tick(&[SampleBlock::new(ChannelId(2), &[8.0f32; 4], 1)]);

        let mut pcm = [0i16; 8];
        router.monitor_ring().read(&mut pcm);
        assert_eq!(pcm, [256, 256, 256, 256, 0, 0, 0, 0]);
    }

    #[test]
    fn selecting_an_undisplayed_monitor_is_rejected() {
        let (mut router, _device) = test_router();
        let err = router.select_monitor(Some(ChannelId(9))).unwrap_err();
        assert!(matches!(err, SweepError::UnknownChannel(ChannelId(9))));
    }

    #[test]
    fn removing_the_monitored_channel_falls_back_to_silence() {
        let (mut router, device) = test_router();
        router.select_monitor(Some(ChannelId(2))).expect("displayed");

        router.remove_channel(ChannelId(2)).expect("displayed");
        assert_eq!(router.monitored(), None);
        assert_eq!(device.log.borrow().monitor_calls.last(), Some(&None));
    }

    #[test]
    fn non_finite_output_drops_the_block_and_rolls_the_filter_back() {
        let (mut router, _device) = test_router();
        let (mut control, _device2) = test_router();

        let clean_a: Vec<f32> = (0..16).map(|i| (i as f32 * 0.7).sin() * 4.0).collect();
        let clean_b: Vec<f32> = (0..16).map(|i| (i as f32 * 0.3).cos() * 4.0).collect();
        let poisoned = [f32::NAN; 16];

        router.tick(&[SampleBlock::new(ChannelId(1), &clean_a, 0)]);
        let dirty = router.tick(&[SampleBlock::new(ChannelId(1), &poisoned, 1)]);
        assert!(dirty.is_empty(), "poisoned block must not render");
        let after = router.tick(&[SampleBlock::new(ChannelId(1), &clean_b, 2)]);

        control.tick(&[SampleBlock::new(ChannelId(1), &clean_a, 0)]);
        let expected = control.tick(&[SampleBlock::new(ChannelId(1), &clean_b, 1)]);

        // Same filter state as if the poisoned block never arrived.
        assert_eq!(after.len(), expected.len());
        for (got, want) in after.iter().zip(&expected) {
            assert_eq!(got.y, want.y);
        }
    }

    #[test]
    fn poisoned_channel_leaves_others_untouched() {
        let (mut router, _device) = test_router();
        router.set_highpass_enabled(false);

        let poisoned = [f32::NAN; 8];
        let clean = [4.0f32; 8];
        let dirty = router.tick(&[
            SampleBlock::new(ChannelId(1), &poisoned, 0),
            SampleBlock::new(ChannelId(2), &clean, 1),
        ]);

        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].channel_id, ChannelId(2));
        assert!(dirty[0].y[..8].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn threshold_crosses_the_device_boundary_in_raw_units() {
        let device = TestDevice::default();
        device.log.borrow_mut().thresholds.insert(ChannelId(1), 100);

        let mut router =
            SweepRouter::new(test_config(), Box::new(device.clone())).expect("config is valid");
        router.add_channel(ChannelId(1), "ch-1").expect("fresh channel");

        // Pulled threshold arrives in display units.
        assert_eq!(router.threshold(ChannelId(1)), Some(25.0));

        router
            .set_threshold(ChannelId(1), -12.5)
            .expect("displayed channel");
        assert_eq!(router.threshold(ChannelId(1)), Some(-12.5));
        assert_eq!(
            device.log.borrow().threshold_writes.last(),
            Some(&(ChannelId(1), -50))
        );

        let err = router.set_threshold(ChannelId(9), 1.0).unwrap_err();
        assert!(matches!(err, SweepError::UnknownChannel(ChannelId(9))));
    }

    #[test]
    fn clear_zeroes_sweeps_and_repulls_thresholds() {
        let (mut router, device) = test_router();
        router.set_highpass_enabled(false);
        router.tick(&[SampleBlock::new(ChannelId(1), &[4.0f32; 40], 0)]);

        device.log.borrow_mut().thresholds.insert(ChannelId(1), -200);
        router.clear(123);

        let (_, y) = router
            .segment_view(ChannelId(1), 0)
            .expect("segment exists");
        assert!(y.iter().all(|&v| v == 0.0));
        assert_eq!(router.threshold(ChannelId(1)), Some(-50.0));

        // The next block lands at the re-anchored cursor, 123 % 100.
        let dirty = router.tick(&[SampleBlock::new(ChannelId(1), &[4.0f32; 10], 1)]);
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].segment_index, 1);
    }

    #[test]
    fn reconfigure_rebuilds_rings_and_silences_the_monitor() {
        let (mut router, device) = test_router();
        router.set_highpass_enabled(false);
        router.select_monitor(Some(ChannelId(2))).expect("displayed");
        router.tick(&[SampleBlock::new(ChannelId(2), &[4.0f32; 50], 0)]);

        let updated = SweepConfig {
            window_seconds: 0.1,
            sample_rate: 2_000.0,
            amplitude_range: 512.0,
            segment_count: 4,
            decimation_factor: 1,
            ..SweepConfig::default()
        };
        router.update_config(updated).expect("config is valid");

        assert_eq!(router.config().capacity(), 200);
        assert_eq!(router.monitored(), None);
        assert_eq!(device.log.borrow().monitor_calls.last(), Some(&None));
        assert_eq!(router.monitor_ring().capacity(), 64);
        assert_eq!(router.monitor_snapshot().amplitude_range, 512.0);

        let (x, y) = router
            .segment_view(ChannelId(2), 0)
            .expect("segment exists");
        assert_eq!(x.len(), 50, "200 samples over 4 segments");
        assert!(y.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn invalid_reconfigure_changes_nothing() {
        let (mut router, _device) = test_router();
        router.set_highpass_enabled(false);
        router.select_monitor(Some(ChannelId(1))).expect("displayed");
        router.tick(&[SampleBlock::new(ChannelId(1), &[4.0f32; 30], 0)]);

        let mut bad = test_config();
        bad.sample_rate = -1.0;
        assert!(router.reconfigure(bad).is_err());

        let mut expected = test_config();
        expected.highpass_enabled = false;
        assert_eq!(router.config(), expected);
        assert_eq!(router.monitored(), Some(ChannelId(1)));
        let (_, y) = router
            .segment_view(ChannelId(1), 0)
            .expect("segment exists");
        assert!(y.iter().all(|&v| v == 1.0), "sweep survives the rejection");
    }

    #[test]
    fn snapshot_reflects_monitor_and_filter_state() {
        let (mut router, _device) = test_router();
        assert_eq!(
            router.monitor_snapshot(),
            MonitorSnapshot {
                monitored: None,
                amplitude_range: 256.0,
                highpass_enabled: true,
            }
        );

        router.select_monitor(Some(ChannelId(1))).expect("displayed");
        router.set_highpass_enabled(false);
        let snapshot = router.monitor_snapshot();
        assert_eq!(snapshot.monitored, Some(ChannelId(1)));
        assert!(!snapshot.highpass_enabled);
    }

    #[test]
    fn channel_listing_is_sorted_and_labelled() {
        let (router, _device) = test_router();
        assert_eq!(router.channel_ids(), vec![ChannelId(1), ChannelId(2)]);
        assert_eq!(router.channel_label(ChannelId(2)), Some("ch-2"));
        assert_eq!(router.channel_label(ChannelId(9)), None);
    }
}
