use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use neurosweep::config::{load_settings, save_settings};
use neurosweep::util::telemetry;
use neurosweep::{
    ChannelId, DeviceControl, MonitorRing, SampleBlock, SweepConfig, SweepRouter, SweepSettings,
};

const TICK_INTERVAL: Duration = Duration::from_millis(50);
const DEMO_TICKS: u32 = 60;
const PLAYBACK_FRAMES: usize = 1_024;

/// Stand-in acquisition device that logs control traffic instead of talking
/// to hardware.
struct LoggingDevice;

impl DeviceControl for LoggingDevice {
    fn channel_threshold(&self, channel_id: ChannelId) -> Option<i32> {
        Some(100 + channel_id.0 as i32 * 20)
    }

    fn set_threshold(&mut self, channel_id: ChannelId, raw_level: i32) {
        info!("[device] channel {channel_id} threshold set to {raw_level} raw");
    }

    fn monitor_channel(&mut self, channel_id: Option<ChannelId>) {
        match channel_id {
            Some(id) => info!("[device] hardware audio follows channel {id}"),
            None => info!("[device] hardware audio silenced"),
        }
    }
}

/// Synthetic signal per channel: a tone with pseudo-noise on top, in raw
/// device units.
struct ToneSource {
    channel_id: ChannelId,
    tone_hz: f32,
    phase: f32,
    noise: u32,
}

impl ToneSource {
    fn new(channel_id: ChannelId, tone_hz: f32) -> Self {
        Self {
            channel_id,
            tone_hz,
            phase: 0.0,
            noise: 0x9E37_79B9 ^ channel_id.0,
        }
    }

    fn fill(&mut self, out: &mut Vec<f32>, frames: usize, sample_rate: f32) {
        out.clear();
        out.reserve(frames);
        let step = std::f32::consts::TAU * self.tone_hz / sample_rate;
        for _ in 0..frames {
            self.noise ^= self.noise << 13;
            self.noise ^= self.noise >> 17;
            self.noise ^= self.noise << 5;
            let noise = (self.noise >> 8) as f32 / (1 << 24) as f32 - 0.5;
            out.push(self.phase.sin() * 320.0 + noise * 90.0);
            self.phase = (self.phase + step) % std::f32::consts::TAU;
        }
    }
}

/// Free-running consumer standing in for the sound card callback: pulls a
/// fixed frame on its own clock regardless of what the producer is doing.
fn spawn_playback(
    ring: Arc<MonitorRing>,
    sample_rate: f32,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut frame = vec![0_i16; PLAYBACK_FRAMES];
        let cadence = Duration::from_secs_f32(PLAYBACK_FRAMES as f32 / sample_rate);
        let mut peak = 0_i16;
        let mut pulls = 0_u32;

        while running.load(Ordering::Relaxed) {
            ring.read(&mut frame);
            if let Some(top) = frame.iter().map(|s| s.saturating_abs()).max() {
                peak = peak.max(top);
            }
            pulls += 1;
            if pulls % 16 == 0 {
                debug!("[playback] {pulls} pulls, recent peak {peak}");
                peak = 0;
            }
            thread::sleep(cadence);
        }
    })
}

fn main() -> anyhow::Result<()> {
    telemetry::init();
    info!("Neurosweep starting up");

    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("neurosweep-settings.json"));
    let mut config = SweepConfig::default();
    load_settings(&settings_path).apply_to(&mut config);

    let mut router = SweepRouter::new(config, Box::new(LoggingDevice))?;

    let mut sources = Vec::new();
    for (index, (label, tone_hz)) in [
        ("dorsal-1", 220.0),
        ("dorsal-2", 330.0),
        ("ventral-1", 440.0),
        ("ventral-2", 660.0),
    ]
    .into_iter()
    .enumerate()
    {
        let channel_id = ChannelId(index as u32 + 1);
        router.add_channel(channel_id, label)?;
        sources.push(ToneSource::new(channel_id, tone_hz));
    }
    router.select_monitor(Some(ChannelId(1)))?;

    let running = Arc::new(AtomicBool::new(true));
    let playback = spawn_playback(
        router.monitor_ring(),
        config.sample_rate,
        Arc::clone(&running),
    );

    let mut buffers: Vec<Vec<f32>> = (0..sources.len()).map(|_| Vec::new()).collect();
    let mut arrival = 0_u64;
    let mut device_samples = 0_u64;

    for tick_index in 0..DEMO_TICKS {
        let config = router.config();
        let frames = (config.sample_rate * TICK_INTERVAL.as_secs_f32()) as usize;
        for (source, buffer) in sources.iter_mut().zip(buffers.iter_mut()) {
            source.fill(buffer, frames, config.sample_rate);
        }
        let blocks: Vec<SampleBlock<'_>> = sources
            .iter()
            .zip(buffers.iter())
            .map(|(source, buffer)| {
                let block = SampleBlock::new(source.channel_id, buffer, arrival);
                arrival += 1;
                block
            })
            .collect();

        let dirty = router.tick(&blocks);
        device_samples += frames as u64;
        debug!(
            "[demo] tick {tick_index}: {} segments dirty, {} monitor frames queued",
            dirty.len(),
            router.monitor_ring().available()
        );

        match tick_index {
            15 => {
                info!("[demo] raw view: high-pass off");
                router.set_highpass_enabled(false);
            }
            20 => {
                info!("[demo] filtered view: high-pass on");
                router.set_highpass_enabled(true);
            }
            25 => router.select_monitor(Some(ChannelId(3)))?,
            30 => router.set_threshold(ChannelId(2), 55.0)?,
            35 => {
                let updated = SweepConfig {
                    window_seconds: 0.8,
                    ..router.config()
                };
                router.reconfigure(updated)?;
                router.select_monitor(Some(ChannelId(1)))?;
            }
            45 => router.clear(device_samples),
            50 => router.select_monitor(None)?,
            _ => {}
        }

        thread::sleep(TICK_INTERVAL);
    }

    let snapshot = router.monitor_snapshot();
    info!(
        "[demo] done: monitored {:?}, range {} uV, high-pass {}",
        snapshot.monitored, snapshot.amplitude_range, snapshot.highpass_enabled
    );

    running.store(false, Ordering::Relaxed);
    if playback.join().is_err() {
        warn!("[playback] thread panicked");
    }

    let settings = SweepSettings::from_config(&router.config());
    if let Err(err) = save_settings(&settings_path, &settings) {
        warn!(
            "[demo] failed to save settings to {}: {err}",
            settings_path.display()
        );
    } else {
        info!("[demo] settings saved to {}", settings_path.display());
    }
    Ok(())
}
