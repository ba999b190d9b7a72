use std::fmt;
use strudel_audio::Analyser;

/// Read-only analysis tap attached to the output
///
/// Created once per acquired audio resource. Both reads fill caller-owned
/// buffers, so a sampling loop can reuse the same storage every frame.
pub struct TelemetryTap {
    analyser: Analyser,
}

impl TelemetryTap {
    pub(crate) fn new(analyser: Analyser) -> Self {
        TelemetryTap { analyser }
    }

    /// Length of the analysis window
    pub fn fft_size(&self) -> usize {
        self.analyser.fft_size()
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.analyser.frequency_bin_count()
    }

    /// Frequency magnitudes on a 0..=255 scale
    pub fn read_frequency(&self, out: &mut [u8]) {
        self.analyser.byte_frequency_data(out);
    }

    /// Waveform on a 0..=255 scale centred on 128
    pub fn read_waveform(&self, out: &mut [u8]) {
        self.analyser.byte_time_domain_data(out);
    }
}

impl fmt::Debug for TelemetryTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryTap")
            .field("fft_size", &self.fft_size())
            .finish()
    }
}
