//! Audio output engine using cpal
//!
//! The cpal stream lives on a dedicated thread for its whole life. The engine
//! talks to that thread over a control channel, so the engine itself can be
//! shared across threads and async tasks.

use crate::{AudioError, OutputBus, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Whether the output stream is currently pulling audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Suspended,
    Running,
}

/// Options used when opening the output device
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Requested sample rate; the device default when `None`
    pub sample_rate: Option<u32>,
    /// Number of mono samples the bus keeps for analysis
    pub window_size: usize,
    pub master_gain: f32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            sample_rate: None,
            window_size: 2048,
            master_gain: 0.8,
        }
    }
}

enum Control {
    Play(mpsc::Sender<Result<()>>),
    Pause(mpsc::Sender<Result<()>>),
    Shutdown,
}

/// Format negotiated with the device
struct Opened {
    sample_rate: u32,
    channels: usize,
    bus: Arc<OutputBus>,
}

/// Audio output engine
pub struct AudioEngine {
    bus: Arc<OutputBus>,
    sample_rate: u32,
    channels: usize,
    state: Mutex<EngineState>,
    control: Mutex<mpsc::Sender<Control>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AudioEngine {
    /// Open the default output device. The stream is built but left suspended
    ///
    /// Blocks until the device thread has either built the stream or failed.
    pub fn open(options: EngineOptions) -> Result<Self> {
        let (control_tx, control_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("strudel-audio".to_string())
            .spawn(move || device_thread(options, ready_tx, control_rx))?;

        let opened = match ready_rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                let _ = thread.join();
                return Err(AudioError::DeviceError(
                    "Audio thread exited before opening the device".to_string(),
                ));
            }
        };

        info!(
            sample_rate = opened.sample_rate,
            channels = opened.channels,
            "Audio output opened"
        );

        Ok(AudioEngine {
            bus: opened.bus,
            sample_rate: opened.sample_rate,
            channels: opened.channels,
            state: Mutex::new(EngineState::Suspended),
            control: Mutex::new(control_tx),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// The bus this engine plays
    pub fn bus(&self) -> &Arc<OutputBus> {
        &self.bus
    }

    /// Get the sample rate of the output device
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Start pulling audio from the bus
    pub fn resume(&self) -> Result<()> {
        self.request(Control::Play)?;
        *self.state.lock() = EngineState::Running;
        Ok(())
    }

    /// Pause the stream without tearing it down
    pub fn suspend(&self) -> Result<()> {
        self.request(Control::Pause)?;
        *self.state.lock() = EngineState::Suspended;
        Ok(())
    }

    fn request(&self, make: fn(mpsc::Sender<Result<()>>) -> Control) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.control
            .lock()
            .send(make(reply_tx))
            .map_err(|_| AudioError::DeviceError("Audio thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::DeviceError("Audio thread did not reply".to_string()))?
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.control.lock().send(Control::Shutdown);
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                warn!("Audio thread panicked during shutdown");
            }
        }
    }
}

fn device_thread(
    options: EngineOptions,
    ready: mpsc::Sender<Result<Opened>>,
    control: mpsc::Receiver<Control>,
) {
    let (stream, opened) = match build_stream(&options) {
        Ok(built) => built,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Some hosts start streams as soon as they are built
    if let Err(e) = stream.pause() {
        debug!("Could not pause freshly built stream: {}", e);
    }

    if ready.send(Ok(opened)).is_err() {
        return;
    }

    while let Ok(command) = control.recv() {
        match command {
            Control::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| AudioError::DeviceError(format!("Failed to play stream: {}", e)));
                let _ = reply.send(result);
            }
            Control::Pause(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| AudioError::DeviceError(format!("Failed to pause stream: {}", e)));
                let _ = reply.send(result);
            }
            Control::Shutdown => break,
        }
    }

    debug!("Audio thread shutting down");
}

fn build_stream(options: &EngineOptions) -> Result<(cpal::Stream, Opened)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceError("No output device available".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceError(format!("Failed to get default config: {}", e)))?;

    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(AudioError::ConfigError(format!(
            "Unsupported sample format {:?}, only f32 output is supported",
            supported.sample_format()
        )));
    }

    let mut config: cpal::StreamConfig = supported.into();
    if let Some(rate) = options.sample_rate {
        config.sample_rate = cpal::SampleRate(rate);
    }

    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    let bus = Arc::new(OutputBus::new(
        sample_rate,
        options.window_size,
        options.master_gain,
    ));

    let callback_bus = bus.clone();
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback_bus.render(data, channels);
            },
            |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::DeviceError(format!("Failed to build stream: {}", e)))?;

    Ok((
        stream,
        Opened {
            sample_rate,
            channels,
            bus,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = EngineOptions::default();
        assert_eq!(options.sample_rate, None);
        assert_eq!(options.window_size, 2048);
    }

    #[test]
    #[ignore] // Requires an audio output device
    fn test_open_starts_suspended() {
        let engine = AudioEngine::open(EngineOptions::default()).unwrap();
        assert_eq!(engine.state(), EngineState::Suspended);
        assert!(engine.sample_rate() > 0);
        assert_eq!(engine.bus().sample_rate(), engine.sample_rate());
    }

    #[test]
    #[ignore] // Requires an audio output device
    fn test_resume_and_suspend() {
        let engine = AudioEngine::open(EngineOptions::default()).unwrap();
        engine.resume().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(engine.bus().frames_rendered() > 0);
        engine.suspend().unwrap();
        assert_eq!(engine.state(), EngineState::Suspended);
    }
}
