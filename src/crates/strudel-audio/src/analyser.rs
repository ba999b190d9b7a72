//! Spectrum and waveform snapshots of the output bus
//!
//! Mirrors the byte-oriented snapshot model of a browser analyser node:
//! frequency magnitudes are smoothed over time, converted to decibels and
//! mapped onto 0..=255, while the waveform is centred on 128.

use crate::{AudioError, OutputBus, Result};
use parking_lot::Mutex;
use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Analysis parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        AnalyserSettings {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(AudioError::ConfigError(format!(
                "fft size must be a power of two between 32 and 32768, got {}",
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(AudioError::ConfigError(format!(
                "smoothing time constant must be within [0, 1], got {}",
                self.smoothing_time_constant
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(AudioError::ConfigError(format!(
                "min decibels ({}) must be below max decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        Ok(())
    }
}

struct AnalyserState {
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    blackman: Vec<f32>,
    smoothed: Vec<f32>,
    time: Vec<f32>,
}

/// Read-only analysis tap over an [`OutputBus`]
pub struct Analyser {
    bus: Arc<OutputBus>,
    settings: AnalyserSettings,
    state: Mutex<AnalyserState>,
}

impl Analyser {
    pub fn new(bus: Arc<OutputBus>, settings: AnalyserSettings) -> Result<Self> {
        settings.validate()?;
        let size = settings.fft_size;

        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let state = AnalyserState {
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            blackman: (0..size).map(|i| blackman(i, size)).collect(),
            smoothed: vec![0.0; size / 2],
            time: vec![0.0; size],
            plan,
        };

        Ok(Analyser {
            bus,
            settings,
            state: Mutex::new(state),
        })
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    /// Number of frequency bins, half the fft size
    pub fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Fill `out` with the current magnitude spectrum on a 0..=255 scale
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let size = self.settings.fft_size;

        self.bus.copy_window(&mut state.time);
        for ((input, sample), weight) in state
            .input
            .iter_mut()
            .zip(state.time.iter())
            .zip(state.blackman.iter())
        {
            *input = sample * weight;
        }

        if state
            .plan
            .process_with_scratch(&mut state.input, &mut state.spectrum, &mut state.scratch)
            .is_err()
        {
            out.fill(0);
            return;
        }

        let smoothing = self.settings.smoothing_time_constant;
        let range = self.settings.max_decibels - self.settings.min_decibels;
        let scale = 1.0 / size as f32;

        for (i, smoothed) in state.smoothed.iter_mut().enumerate() {
            let magnitude = state.spectrum[i].norm() * scale;
            let value = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
            *smoothed = if value.is_finite() { value } else { 0.0 };

            if let Some(byte) = out.get_mut(i) {
                let db = 20.0 * smoothed.log10();
                let level = 255.0 * (db - self.settings.min_decibels) / range;
                *byte = if level.is_finite() {
                    level.clamp(0.0, 255.0) as u8
                } else {
                    0
                };
            }
        }

        if out.len() > state.smoothed.len() {
            out[state.smoothed.len()..].fill(0);
        }
    }

    /// Fill `out` with the most recent waveform, 128 being silence
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        self.bus.copy_window(&mut state.time);
        let skip = state.time.len().saturating_sub(out.len());
        for (byte, sample) in out.iter_mut().zip(state.time.iter().skip(skip)) {
            *byte = (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }
        if out.len() > state.time.len() {
            let filled = state.time.len();
            out[filled..].fill(128);
        }
    }
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("settings", &self.settings)
            .finish()
    }
}

fn blackman(index: usize, len: usize) -> f32 {
    let x = index as f32 / len as f32;
    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Source;

    struct Sine {
        frequency: f32,
        amplitude: f32,
        phase: f32,
    }

    impl Source for Sine {
        fn render(&mut self, out: &mut [f32], channels: usize, sample_rate: u32) {
            for frame in out.chunks_mut(channels) {
                let value = (2.0 * PI * self.phase).sin() * self.amplitude;
                self.phase = (self.phase + self.frequency / sample_rate as f32).fract();
                for sample in frame {
                    *sample += value;
                }
            }
        }
    }

    fn analyser_for(bus: &Arc<OutputBus>, smoothing: f32) -> Analyser {
        Analyser::new(
            Arc::clone(bus),
            AnalyserSettings {
                fft_size: 256,
                smoothing_time_constant: smoothing,
                ..AnalyserSettings::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_silence_reads_as_floor_and_centre() {
        let bus = Arc::new(OutputBus::new(48_000, 256, 1.0));
        let analyser = analyser_for(&bus, 0.8);

        let mut freq = vec![7u8; analyser.frequency_bin_count()];
        let mut time = vec![7u8; analyser.fft_size()];
        analyser.byte_frequency_data(&mut freq);
        analyser.byte_time_domain_data(&mut time);

        assert!(freq.iter().all(|&b| b == 0));
        assert!(time.iter().all(|&b| b == 128));
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        // 256 point fft at 25.6 kHz: 100 Hz per bin, 2 kHz lands on bin 20
        let bus = Arc::new(OutputBus::new(25_600, 256, 1.0));
        bus.bind(Box::new(Sine {
            frequency: 2_000.0,
            amplitude: 0.01,
            phase: 0.0,
        }));
        let mut out = vec![0.0; 512];
        bus.render(&mut out, 1);

        let analyser = analyser_for(&bus, 0.0);
        let mut freq = vec![0u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&mut freq);

        let peak = freq
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 20);
        assert!(freq[20] > freq[19] && freq[20] > freq[21]);
        assert!(freq[20] > 100);
    }

    #[test]
    fn test_smoothing_decays_gradually() {
        let bus = Arc::new(OutputBus::new(25_600, 256, 1.0));
        let id = bus.bind(Box::new(Sine {
            frequency: 2_000.0,
            amplitude: 0.01,
            phase: 0.0,
        }));
        let mut out = vec![0.0; 256];
        bus.render(&mut out, 1);

        let analyser = analyser_for(&bus, 0.8);
        let mut freq = vec![0u8; analyser.frequency_bin_count()];
        for _ in 0..20 {
            analyser.byte_frequency_data(&mut freq);
        }
        let loud = freq[20];

        bus.unbind(id);
        bus.render(&mut out, 1);
        analyser.byte_frequency_data(&mut freq);
        assert!(freq[20] > 0 && freq[20] < loud);
    }

    #[test]
    fn test_waveform_bytes() {
        let bus = Arc::new(OutputBus::new(48_000, 64, 1.0));
        bus.bind(Box::new(Sine {
            frequency: 12_000.0,
            amplitude: 0.5,
            phase: 0.25,
        }));
        let mut out = vec![0.0; 1];
        bus.render(&mut out, 1);

        let analyser = Analyser::new(
            Arc::clone(&bus),
            AnalyserSettings {
                fft_size: 64,
                ..AnalyserSettings::default()
            },
        )
        .unwrap();
        let mut time = vec![0u8; 64];
        analyser.byte_time_domain_data(&mut time);
        // sin(pi/2) * 0.5 = 0.5 -> 128 * 1.5
        assert_eq!(time[63], 192);
        assert_eq!(time[0], 128);
    }

    #[test]
    fn test_rejects_bad_settings() {
        let bus = Arc::new(OutputBus::new(48_000, 64, 1.0));
        let bad_size = AnalyserSettings {
            fft_size: 1000,
            ..AnalyserSettings::default()
        };
        assert!(Analyser::new(Arc::clone(&bus), bad_size).is_err());

        let bad_range = AnalyserSettings {
            min_decibels: -10.0,
            max_decibels: -20.0,
            ..AnalyserSettings::default()
        };
        assert!(bad_range.validate().is_err());
    }
}
