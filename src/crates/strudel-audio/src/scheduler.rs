//! Scheduler for triggering pattern events at sample-accurate times

use crate::{Source, Timbre, Voice};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strudel_mini::{Hap, Pattern};

/// Live-settable tempo in cycles per minute, shared with the audio thread
#[derive(Debug, Clone)]
pub struct TempoHandle(Arc<AtomicU64>);

impl TempoHandle {
    pub fn new(cycles_per_minute: f64) -> Self {
        TempoHandle(Arc::new(AtomicU64::new(cycles_per_minute.to_bits())))
    }

    /// Takes effect at the start of the next rendered block
    pub fn set(&self, cycles_per_minute: f64) {
        self.0.store(cycles_per_minute.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn cycles_per_second(&self) -> f64 {
        self.get() / 60.0
    }
}

/// Counters readable from outside the audio thread
#[derive(Debug, Default)]
struct Counters {
    /// Cycle position stored as f64 bits
    position: AtomicU64,
    triggered: AtomicU64,
}

/// Queries a pattern block by block and plays its events as voices
pub struct Scheduler {
    pattern: Arc<Pattern>,
    tempo: TempoHandle,
    /// Current cycle position
    position: f64,
    voices: Vec<Voice>,
    max_voices: usize,
    /// Reused query buffer
    haps: Vec<Hap>,
    counters: Arc<Counters>,
}

/// Read-only view of a running scheduler
#[derive(Debug, Clone)]
pub struct SchedulerMonitor(Arc<Counters>);

impl SchedulerMonitor {
    /// Cycle position reached by the last rendered block
    pub fn position(&self) -> f64 {
        f64::from_bits(self.0.position.load(Ordering::Relaxed))
    }

    /// Total number of voices started
    pub fn triggered(&self) -> u64 {
        self.0.triggered.load(Ordering::Relaxed)
    }
}

impl Scheduler {
    /// Create a scheduler positioned at cycle zero
    pub fn new(pattern: Arc<Pattern>, tempo: TempoHandle) -> Self {
        Scheduler {
            pattern,
            tempo,
            position: 0.0,
            voices: Vec::with_capacity(64),
            max_voices: 64,
            haps: Vec::with_capacity(64),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Cap the number of simultaneously sounding voices; the oldest is dropped first
    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices.max(1);
        self.voices = Vec::with_capacity(self.max_voices);
        self
    }

    pub fn monitor(&self) -> SchedulerMonitor {
        SchedulerMonitor(self.counters.clone())
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn trigger(&mut self, hap: &Hap, delay: usize, cycles_per_second: f64, sample_rate: u32) {
        let Some(timbre) = Timbre::for_sound(&hap.sound.name, hap.sound.index) else {
            return;
        };

        if self.voices.len() >= self.max_voices {
            self.voices.remove(0);
        }

        let seed = self.counters.triggered.fetch_add(1, Ordering::Relaxed);
        let sustain = (hap.duration / cycles_per_second) as f32;
        let voice = Voice::new(timbre, sample_rate, seed)
            .with_delay(delay)
            .with_sustain(sustain, sample_rate);
        self.voices.push(voice);
    }
}

impl Source for Scheduler {
    fn render(&mut self, out: &mut [f32], channels: usize, sample_rate: u32) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let cycles_per_second = self.tempo.cycles_per_second();

        if frames > 0 && cycles_per_second > 0.0 && sample_rate > 0 {
            let begin = self.position;
            let end = begin + frames as f64 * cycles_per_second / sample_rate as f64;

            let mut haps = std::mem::take(&mut self.haps);
            self.pattern.query_onsets(begin, end, &mut haps);
            for hap in &haps {
                let offset = (hap.onset - begin) / cycles_per_second * sample_rate as f64;
                let delay = (offset.max(0.0) as usize).min(frames - 1);
                self.trigger(hap, delay, cycles_per_second, sample_rate);
            }
            self.haps = haps;
            self.position = end;
        }

        self.voices.retain_mut(|voice| {
            voice.fill_buffer(out, channels, sample_rate);
            voice.is_active()
        });

        self.counters
            .position
            .store(self.position.to_bits(), Ordering::Relaxed);
    }
}
