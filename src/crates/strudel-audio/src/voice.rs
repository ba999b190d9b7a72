//! Voice represents a single synthesized hit or note

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

const NOTE_NAMES: [&str; 12] = ["c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b"];

/// How a voice is synthesized
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timbre {
    Kick,
    Snare,
    ClosedHat,
    OpenHat,
    Clap,
    Rim,
    /// Pitched drum with its resting frequency in Hz
    Tom(f32),
    /// Sustained triangle tone at a frequency in Hz
    Tone(f32),
}

impl Timbre {
    /// Map a pattern sound name onto a synth. Unknown names play nothing
    ///
    /// The variation index detunes drums by a semitone per step.
    pub fn for_sound(name: &str, index: u32) -> Option<Timbre> {
        let detune = 2f32.powf(index as f32 / 12.0);
        let timbre = match name {
            "bd" | "kick" => Timbre::Kick,
            "sd" | "sn" | "snare" => Timbre::Snare,
            "hh" | "ch" => Timbre::ClosedHat,
            "oh" => Timbre::OpenHat,
            "cp" | "clap" => Timbre::Clap,
            "rim" | "rs" => Timbre::Rim,
            "lt" => Timbre::Tom(90.0 * detune),
            "mt" => Timbre::Tom(130.0 * detune),
            "ht" => Timbre::Tom(180.0 * detune),
            other => return note_frequency(other).map(Timbre::Tone),
        };
        Some(timbre)
    }

    /// Default ring-out time in seconds
    fn length(&self) -> f32 {
        match self {
            Timbre::Kick => 0.5,
            Timbre::Snare => 0.3,
            Timbre::ClosedHat => 0.08,
            Timbre::OpenHat => 0.5,
            Timbre::Clap => 0.3,
            Timbre::Rim => 0.06,
            Timbre::Tom(_) => 0.45,
            Timbre::Tone(_) => 1.0,
        }
    }

    fn level(&self) -> f32 {
        match self {
            Timbre::Kick => 0.9,
            Timbre::Snare => 0.6,
            Timbre::ClosedHat | Timbre::OpenHat => 0.35,
            Timbre::Clap => 0.55,
            Timbre::Rim => 0.5,
            Timbre::Tom(_) => 0.7,
            Timbre::Tone(_) => 0.4,
        }
    }
}

/// Frequency of a note name such as `c4`, `a#3`, `eb2`, or a bare midi number
pub fn note_frequency(name: &str) -> Option<f32> {
    if !name.is_ascii() {
        return None;
    }
    let midi = if name.chars().all(|c| c.is_ascii_digit()) {
        name.parse::<i32>().ok().filter(|n| *n <= 127)?
    } else {
        let lower = name.to_ascii_lowercase();
        let split = lower
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(lower.len());
        let (pitch, octave) = lower.split_at(split);
        let octave: i32 = if octave.is_empty() { 3 } else { octave.parse().ok()? };

        let (letter, accidental) = pitch.split_at(pitch.len().min(1));
        let base = NOTE_NAMES.iter().position(|n| *n == letter)? as i32;
        let shift = match accidental {
            "" => 0,
            "#" | "s" => 1,
            "b" | "f" => -1,
            _ => return None,
        };
        (octave + 1) * 12 + base + shift
    };
    Some(440.0 * 2f32.powf((midi - 69) as f32 / 12.0))
}

/// A voice for playing one synthesized event
pub struct Voice {
    timbre: Timbre,
    /// Frames to wait before the onset
    delay: usize,
    /// Frames since the onset
    age: usize,
    /// Total frames the voice sounds for
    length: usize,
    gain: f32,
    phase: f32,
    rng: SmallRng,
    highpass_in: f32,
    highpass_out: f32,
    active: bool,
}

impl Voice {
    pub fn new(timbre: Timbre, sample_rate: u32, seed: u64) -> Self {
        Voice {
            timbre,
            delay: 0,
            age: 0,
            length: (timbre.length() * sample_rate as f32) as usize,
            gain: timbre.level(),
            phase: 0.0,
            rng: SmallRng::seed_from_u64(seed),
            highpass_in: 0.0,
            highpass_out: 0.0,
            active: true,
        }
    }

    /// Start sounding after `frames` frames
    pub fn with_delay(mut self, frames: usize) -> Self {
        self.delay = frames;
        self
    }

    /// Hold a tone for `seconds`; drums ignore it
    pub fn with_sustain(mut self, seconds: f32, sample_rate: u32) -> Self {
        if let Timbre::Tone(_) = self.timbre {
            self.length = (seconds.max(0.02) * sample_rate as f32) as usize;
        }
        self
    }

    /// Set the gain
    pub fn set_gain(mut self, gain: f32) -> Self {
        self.gain = gain.clamp(0.0, 1.0);
        self
    }

    pub fn timbre(&self) -> Timbre {
        self.timbre
    }

    /// Check if this voice is still active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Next mono sample, or None once the voice has finished
    pub fn next_sample(&mut self, sample_rate: u32) -> Option<f32> {
        if !self.active {
            return None;
        }
        if self.delay > 0 {
            self.delay -= 1;
            return Some(0.0);
        }
        if self.age >= self.length {
            self.active = false;
            return None;
        }

        let rate = sample_rate as f32;
        let t = self.age as f32 / rate;
        let value = match self.timbre {
            Timbre::Kick => {
                let frequency = 45.0 + 110.0 * (-t * 30.0).exp();
                self.sine(frequency, rate) * (-t * 7.0).exp()
            }
            Timbre::Snare => {
                let body = self.sine(185.0, rate) * (-t * 20.0).exp() * 0.4;
                let noise = self.noise() * (-t * 14.0).exp() * 0.7;
                body + noise
            }
            Timbre::ClosedHat => self.bright_noise() * (-t * 60.0).exp(),
            Timbre::OpenHat => self.bright_noise() * (-t * 8.0).exp(),
            Timbre::Clap => {
                // three quick bursts, then a short tail
                let burst = if t < 0.03 {
                    (-(t % 0.01) * 300.0).exp()
                } else {
                    (-(t - 0.03) * 18.0).exp()
                };
                self.noise() * burst
            }
            Timbre::Rim => {
                self.sine(1_700.0, rate) * (-t * 80.0).exp() + self.noise() * (-t * 400.0).exp() * 0.3
            }
            Timbre::Tom(frequency) => {
                let frequency = frequency * (1.0 + 0.5 * (-t * 20.0).exp());
                self.sine(frequency, rate) * (-t * 9.0).exp()
            }
            Timbre::Tone(frequency) => {
                self.phase = (self.phase + frequency / rate).fract();
                let triangle = 4.0 * (self.phase - 0.5).abs() - 1.0;
                let attack = (t / 0.005).min(1.0);
                let remaining = (self.length - self.age) as f32 / rate;
                let release = (remaining / 0.02).min(1.0);
                triangle * attack * release * (-t * 2.0).exp()
            }
        };

        self.age += 1;
        Some(value * self.gain)
    }

    /// Mix this voice into an interleaved buffer
    pub fn fill_buffer(&mut self, buffer: &mut [f32], channels: usize, sample_rate: u32) {
        for frame in buffer.chunks_mut(channels.max(1)) {
            match self.next_sample(sample_rate) {
                Some(value) => {
                    for sample in frame {
                        *sample += value;
                    }
                }
                None => break,
            }
        }
    }

    fn sine(&mut self, frequency: f32, rate: f32) -> f32 {
        self.phase = (self.phase + frequency / rate).fract();
        (TAU * self.phase).sin()
    }

    fn noise(&mut self) -> f32 {
        self.rng.gen_range(-1.0..1.0)
    }

    /// One-pole high-passed noise
    fn bright_noise(&mut self) -> f32 {
        let input = self.noise();
        self.highpass_out = 0.6 * (self.highpass_out + input - self.highpass_in);
        self.highpass_in = input;
        self.highpass_out
    }
}
