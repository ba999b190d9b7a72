//! Per-frame values derived from the analysis tap

use serde::Serialize;

/// What renderers draw for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Mean spectrum magnitude in [0, 1]
    pub level: f32,
    /// Normalized magnitudes of the lowest frequency bins, in [0, 1]
    pub spectrum_bars: Vec<f32>,
    /// Waveform in [-1, 1], centred on zero
    pub waveform_points: Vec<f32>,
    /// Beat within the bar, 0 to 3
    pub beat_phase: u8,
}

impl TelemetrySample {
    /// A silent sample with fixed-size storage for later in-place updates
    pub fn zeroed(bars: usize, points: usize) -> Self {
        TelemetrySample {
            level: 0.0,
            spectrum_bars: vec![0.0; bars],
            waveform_points: vec![0.0; points],
            beat_phase: 0,
        }
    }

    /// Recompute from raw tap buffers without reallocating
    pub fn update(&mut self, frequency: &[u8], waveform: &[u8], beat_phase: u8) {
        self.level = level_fraction(frequency);

        for (i, bar) in self.spectrum_bars.iter_mut().enumerate() {
            *bar = frequency.get(i).map_or(0.0, |&v| v as f32 / 255.0);
        }

        for (i, point) in self.waveform_points.iter_mut().enumerate() {
            *point = waveform.get(i).map_or(0.0, |&v| (v as f32 - 128.0) / 128.0);
        }

        self.beat_phase = beat_phase;
    }

    /// Back to the neutral idle picture
    pub fn clear(&mut self) {
        self.level = 0.0;
        self.spectrum_bars.fill(0.0);
        self.waveform_points.fill(0.0);
        self.beat_phase = 0;
    }
}

/// Mean of the magnitude buffer over its maximum representable value
pub fn level_fraction(frequency: &[u8]) -> f32 {
    if frequency.is_empty() {
        return 0.0;
    }
    let sum: u64 = frequency.iter().map(|&v| v as u64).sum();
    sum as f32 / (frequency.len() as f32 * 255.0)
}
