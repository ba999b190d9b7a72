//! The single mixing point between pattern playback and the output device

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something that can write audio into the bus
pub trait Source: Send {
    /// Add this source's output to `out`, an interleaved buffer `channels` wide
    fn render(&mut self, out: &mut [f32], channels: usize, sample_rate: u32);
}

/// Identifies one `bind` call so a stale owner cannot unbind its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

struct Binding {
    id: BindingId,
    source: Box<dyn Source>,
}

/// Fixed-size ring of the most recent mono output samples
struct SampleWindow {
    samples: Vec<f32>,
    write: usize,
}

impl SampleWindow {
    fn push(&mut self, sample: f32) {
        self.samples[self.write] = sample;
        self.write = (self.write + 1) % self.samples.len();
    }
}

/// Output mixing bus shared by the device callback, the playback side and the analyser
pub struct OutputBus {
    sample_rate: u32,
    master_gain: f32,
    slot: Mutex<Option<Binding>>,
    window: Mutex<SampleWindow>,
    next_id: AtomicU64,
    frames_rendered: AtomicU64,
}

impl OutputBus {
    /// `window_size` is the number of mono samples kept for analysis
    pub fn new(sample_rate: u32, window_size: usize, master_gain: f32) -> Self {
        OutputBus {
            sample_rate,
            master_gain,
            slot: Mutex::new(None),
            window: Mutex::new(SampleWindow {
                samples: vec![0.0; window_size.max(1)],
                write: 0,
            }),
            next_id: AtomicU64::new(1),
            frames_rendered: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window_size(&self) -> usize {
        self.window.lock().samples.len()
    }

    /// Bind `source` as the bus input, replacing whatever was bound before
    pub fn bind(&self, source: Box<dyn Source>) -> BindingId {
        let id = BindingId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let previous = self.slot.lock().replace(Binding { id, source });
        // dropped outside the lock
        drop(previous);
        id
    }

    /// Remove the binding created by `id`. Returns false if it was already replaced or removed
    pub fn unbind(&self, id: BindingId) -> bool {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(binding) if binding.id == id => {
                let removed = slot.take();
                drop(slot);
                drop(removed);
                true
            }
            _ => false,
        }
    }

    pub fn bound(&self) -> Option<BindingId> {
        self.slot.lock().as_ref().map(|binding| binding.id)
    }

    /// Fill an interleaved output buffer. Called from the device callback
    pub fn render(&self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        let channels = channels.max(1);

        if let Some(binding) = self.slot.lock().as_mut() {
            binding.source.render(out, channels, self.sample_rate);
        }

        let mut window = self.window.lock();
        for frame in out.chunks_mut(channels) {
            let mut sum = 0.0;
            for sample in frame.iter_mut() {
                *sample = (*sample * self.master_gain).clamp(-1.0, 1.0);
                sum += *sample;
            }
            window.push(sum / frame.len() as f32);
        }
        drop(window);

        self.frames_rendered
            .fetch_add((out.len() / channels) as u64, Ordering::Relaxed);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Seconds of audio rendered since the bus was created
    pub fn current_time(&self) -> f64 {
        self.frames_rendered() as f64 / self.sample_rate.max(1) as f64
    }

    /// Copy the most recent `dest.len()` samples, oldest first
    pub fn copy_window(&self, dest: &mut [f32]) {
        let window = self.window.lock();
        let len = window.samples.len();
        let count = dest.len().min(len);
        let start = (window.write + len - count) % len;
        for (i, slot) in dest.iter_mut().take(count).enumerate() {
            *slot = window.samples[(start + i) % len];
        }
        dest[count..].fill(0.0);
    }
}
