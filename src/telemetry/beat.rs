//! Wall-clock beat phase, independent of the audio clock

use crate::task::TaskGuard;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const BEATS_PER_BAR: u8 = 4;

/// Beat period for a tempo in cycles per minute
pub fn beat_period(cpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / cpm.max(1) as f64)
}

/// A running beat timer. Dropping it stops the timer
pub struct BeatClock {
    phase: Arc<AtomicU8>,
    period: Duration,
    _timer: TaskGuard,
}

impl BeatClock {
    /// Start at phase 0; the first advance happens one period from now
    pub fn start(cpm: u32) -> Self {
        Self::with_phase(Arc::new(AtomicU8::new(0)), cpm)
    }

    /// Restart an existing phase cell from 0 at a new tempo
    pub(crate) fn with_phase(phase: Arc<AtomicU8>, cpm: u32) -> Self {
        phase.store(0, Ordering::Relaxed);
        let period = beat_period(cpm);

        let first = Instant::now() + period;
        let timer_phase = phase.clone();
        let timer = tokio::spawn(async move {
            let mut ticker = time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let next = (timer_phase.load(Ordering::Relaxed) + 1) % BEATS_PER_BAR;
                timer_phase.store(next, Ordering::Relaxed);
            }
        });

        BeatClock {
            phase,
            period,
            _timer: TaskGuard::new(timer),
        }
    }

    pub fn phase(&self) -> u8 {
        self.phase.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Shared view of the phase for the sampling loop
    pub(crate) fn phase_cell(&self) -> Arc<AtomicU8> {
        self.phase.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_period() {
        assert_eq!(beat_period(120), Duration::from_millis(500));
        assert_eq!(beat_period(60), Duration::from_secs(1));
        assert_eq!(beat_period(180).as_micros(), 333_333);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_cycles_every_period() {
        let clock = BeatClock::start(120);
        // sample halfway between ticks
        time::sleep(Duration::from_millis(250)).await;
        let mut seen = vec![clock.phase()];
        for _ in 0..5 {
            time::sleep(Duration::from_millis(500)).await;
            seen.push(clock.phase());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_timer() {
        let clock = BeatClock::start(120);
        let phase = clock.phase_cell();
        drop(clock);
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(phase.load(Ordering::Relaxed), 0);
    }
}
