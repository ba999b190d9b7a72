use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strudel_live::{
    AudioResourceManager, EngineConfig, MiniCompiler, PlaybackScheduler, PlaygroundSession,
    TelemetryFrame, TelemetryStatus,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play a Strudel pattern and print live audio telemetry", long_about = None)]
struct Cli {
    /// Pattern in mini notation
    #[arg(short, long)]
    pattern: Option<String>,

    /// Tempo in cycles per minute
    #[arg(short, long)]
    tempo: Option<u32>,

    /// How long to play before stopping
    #[arg(short, long, default_value_t = 8.0)]
    seconds: f64,

    /// JSON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let resources = AudioResourceManager::init_global(config.clone());
    let compiler = Arc::new(MiniCompiler::new(config.max_voices));
    let scheduler = Arc::new(PlaybackScheduler::new(resources, compiler));
    let session = PlaygroundSession::new(scheduler);

    if let Some(pattern) = cli.pattern {
        session.set_pattern_text(pattern);
    }
    if let Some(tempo) = cli.tempo {
        session.set_tempo(tempo);
    }

    let snapshot = session.snapshot();
    info!(pattern = %snapshot.pattern_text, tempo = snapshot.tempo, "Starting");

    session.toggle_play();
    session.flush().await;

    let snapshot = session.snapshot();
    if !snapshot.is_playing {
        let reason = snapshot.last_error.unwrap_or_else(|| "unknown".to_string());
        return Err(anyhow::anyhow!(reason)).context("Playback did not start");
    }

    let mut telemetry = session.telemetry();
    let mut report = tokio::time::interval(Duration::from_millis(250));
    let deadline = tokio::time::sleep(Duration::from_secs_f64(cli.seconds.max(0.0)));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            _ = report.tick() => {
                let frame = telemetry.borrow_and_update();
                println!("{}", render_line(&frame));
            }
        }
    }

    session.toggle_play();
    session.flush().await;
    info!("Stopped");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// One status line: level meter, beat indicator and a coarse spectrum
fn render_line(frame: &TelemetryFrame) -> String {
    if frame.status == TelemetryStatus::Idle {
        return "[idle]".to_string();
    }

    let sample = &frame.sample;
    let level = (sample.level * 20.0).round() as usize;
    let meter: String = (0..20).map(|i| if i < level { '#' } else { '.' }).collect();

    let beat: String = (0..4)
        .map(|i| if i == sample.beat_phase { 'o' } else { '-' })
        .collect();

    const SHADES: [char; 5] = [' ', '.', ':', '*', '#'];
    let spectrum: String = sample
        .spectrum_bars
        .chunks(4)
        .map(|chunk| {
            let peak = chunk.iter().cloned().fold(0.0f32, f32::max);
            SHADES[((peak * 4.0).round() as usize).min(4)]
        })
        .collect();

    format!("[{}] {} |{}|", meter, beat, spectrum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strudel_live::TelemetrySample;

    #[test]
    fn test_idle_line() {
        let frame = TelemetryFrame {
            status: TelemetryStatus::Idle,
            sequence: 3,
            sample: TelemetrySample::zeroed(8, 8),
        };
        assert_eq!(render_line(&frame), "[idle]");
    }

    #[test]
    fn test_live_line() {
        let mut sample = TelemetrySample::zeroed(8, 8);
        sample.level = 0.5;
        sample.beat_phase = 2;
        sample.spectrum_bars = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.25];
        let frame = TelemetryFrame {
            status: TelemetryStatus::Live,
            sequence: 1,
            sample,
        };
        assert_eq!(
            render_line(&frame),
            "[##########..........] --o- |#.|"
        );
    }
}
