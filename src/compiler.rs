//! Pattern compiler seam and the mini-notation implementation

use crate::{EngineError, OutputPort, Result};
use async_trait::async_trait;
use std::sync::Arc;
use strudel_audio::{BindingId, Scheduler, TempoHandle};
use strudel_mini::Pattern;
use tracing::debug;

/// Turns pattern text into something playable
#[async_trait]
pub trait PatternCompiler: Send + Sync {
    /// Fails with [`EngineError::Parse`] when the text is rejected
    async fn compile(&self, text: &str) -> Result<Box<dyn CompiledPattern>>;
}

/// A compiled, tempo-parameterized pattern
///
/// `stop` must be safe to call at any point, including before `start` and
/// more than once.
#[async_trait]
pub trait CompiledPattern: Send + Sync {
    /// Set the tempo in cycles per minute
    fn bind_tempo(&mut self, cpm: u32);

    /// Whether `bind_tempo` takes effect on a pattern that is already playing
    fn supports_live_tempo(&self) -> bool {
        false
    }

    async fn start(&mut self, output: &OutputPort) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

/// Compiles mini notation with `strudel-mini` and plays it with synthesized voices
#[derive(Debug, Clone)]
pub struct MiniCompiler {
    max_voices: usize,
}

impl MiniCompiler {
    pub fn new(max_voices: usize) -> Self {
        MiniCompiler { max_voices }
    }
}

impl Default for MiniCompiler {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl PatternCompiler for MiniCompiler {
    async fn compile(&self, text: &str) -> Result<Box<dyn CompiledPattern>> {
        let pattern = strudel_mini::compile(text)?;
        debug!(pattern = text, "Compiled pattern");
        Ok(Box::new(MiniPattern {
            pattern: Arc::new(pattern),
            tempo: TempoHandle::new(0.0),
            max_voices: self.max_voices,
            binding: None,
        }))
    }
}

struct MiniPattern {
    pattern: Arc<Pattern>,
    tempo: TempoHandle,
    max_voices: usize,
    binding: Option<(OutputPort, BindingId)>,
}

#[async_trait]
impl CompiledPattern for MiniPattern {
    fn bind_tempo(&mut self, cpm: u32) {
        self.tempo.set(cpm as f64);
    }

    fn supports_live_tempo(&self) -> bool {
        true
    }

    async fn start(&mut self, output: &OutputPort) -> Result<()> {
        if self.tempo.get() <= 0.0 {
            return Err(EngineError::Playback("tempo was never bound".to_string()));
        }
        self.stop()?;

        let scheduler = Scheduler::new(self.pattern.clone(), self.tempo.clone())
            .with_max_voices(self.max_voices);
        let id = output.bind(Box::new(scheduler));
        self.binding = Some((output.clone(), id));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some((output, id)) = self.binding.take() {
            output.unbind(id);
        }
        Ok(())
    }
}

impl Drop for MiniPattern {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
