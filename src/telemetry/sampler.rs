//! The per-frame sampling loop

use super::{BeatClock, TelemetryFrame, TelemetrySample, TelemetryStatus};
use crate::task::TaskGuard;
use crate::{AudioResourceHandle, EngineConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// Owns the telemetry feed and starts sampling sessions against it
pub struct TelemetrySampler {
    feed: Arc<watch::Sender<TelemetryFrame>>,
    frames: Arc<AtomicU64>,
    beat_period_nanos: Arc<AtomicU64>,
    frame_interval: Duration,
}

impl TelemetrySampler {
    pub fn new(config: &EngineConfig) -> Self {
        let (feed, _) = watch::channel(TelemetryFrame {
            status: TelemetryStatus::Idle,
            sequence: 0,
            sample: TelemetrySample::zeroed(config.spectrum_bars, config.fft_size),
        });

        TelemetrySampler {
            feed: Arc::new(feed),
            frames: Arc::new(AtomicU64::new(0)),
            beat_period_nanos: Arc::new(AtomicU64::new(0)),
            frame_interval: config.frame_interval(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetryFrame> {
        self.feed.subscribe()
    }

    /// Total live frames published since creation
    pub fn frames_sampled(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Period of the running beat timer, if a session is live
    pub fn beat_period(&self) -> Option<Duration> {
        match self.beat_period_nanos.load(Ordering::SeqCst) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    /// Begin sampling `handle` until the returned session is dropped
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, handle: Arc<AudioResourceHandle>, cpm: u32) -> SamplingSession {
        let live = Arc::new(AtomicBool::new(true));
        let beat = BeatClock::start(cpm);

        let frames = tokio::spawn(run_frames(
            handle,
            self.feed.clone(),
            live.clone(),
            beat.phase_cell(),
            self.frames.clone(),
            self.frame_interval,
        ));

        let session = SamplingSession {
            live,
            feed: self.feed.clone(),
            beat_period_nanos: self.beat_period_nanos.clone(),
            beat,
            _frames: TaskGuard::new(frames),
        };
        session.publish_period();

        debug!(cpm, interval_ms = self.frame_interval.as_millis() as u64, "Telemetry sampling started");
        session
    }
}

/// A live sampling loop plus its beat timer. Dropping it ends both
pub struct SamplingSession {
    live: Arc<AtomicBool>,
    feed: Arc<watch::Sender<TelemetryFrame>>,
    beat_period_nanos: Arc<AtomicU64>,
    beat: BeatClock,
    _frames: TaskGuard,
}

impl SamplingSession {
    /// Recreate the beat timer at a new tempo; the phase restarts at 0
    ///
    /// The frame loop keeps running.
    pub fn retempo(&mut self, cpm: u32) {
        self.beat = BeatClock::with_phase(self.beat.phase_cell(), cpm);
        self.publish_period();
    }

    pub fn beat_period(&self) -> Duration {
        self.beat.period()
    }

    fn publish_period(&self) {
        let nanos = self.beat.period().as_nanos() as u64;
        self.beat_period_nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Drop for SamplingSession {
    fn drop(&mut self) {
        // Ticks that race with this drop see `live == false` under the feed lock
        self.live.store(false, Ordering::SeqCst);
        self.beat_period_nanos.store(0, Ordering::SeqCst);
        self.feed.send_modify(|frame| {
            frame.status = TelemetryStatus::Idle;
            frame.sequence += 1;
            frame.sample.clear();
        });
        debug!("Telemetry sampling stopped");
    }
}

async fn run_frames(
    handle: Arc<AudioResourceHandle>,
    feed: Arc<watch::Sender<TelemetryFrame>>,
    live: Arc<AtomicBool>,
    beat_phase: Arc<AtomicU8>,
    frames: Arc<AtomicU64>,
    interval: Duration,
) {
    let tap = handle.tap();
    let mut frequency = vec![0u8; tap.frequency_bin_count()];
    let mut waveform = vec![0u8; tap.fft_size()];

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        tap.read_frequency(&mut frequency);
        tap.read_waveform(&mut waveform);

        feed.send_if_modified(|frame| {
            if !live.load(Ordering::SeqCst) {
                return false;
            }
            frame.status = TelemetryStatus::Live;
            frame.sequence += 1;
            frame
                .sample
                .update(&frequency, &waveform, beat_phase.load(Ordering::Relaxed));
            frames.fetch_add(1, Ordering::SeqCst);
            true
        });
    }
}
