use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use spectrum_player_core::{
    AppConfig, MediaLocator, PcmBuffer, PlaybackCoordinator, PlayerEvent, SpectrumEngine,
    SpectrumError, TransportState,
};
use tracing_subscriber::EnvFilter;

mod playlist;
mod tone;
mod view;

use playlist::Playlist;
use tone::ToneBackend;
use view::BarView;

const RENDER_SAMPLE_RATE: u32 = 48_000;
const BAR_COLUMNS: usize = 32;

fn main() -> spectrum_player_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Play { locators, repeat } => run_play(&config, locators, repeat),
        Commands::Analyze {
            frequency,
            sample_rate,
            amplitude,
        } => run_analyze(&config, frequency, sample_rate, amplitude),
    }
}

fn load_config(path: Option<&Path>) -> spectrum_player_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::from_json_file(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn run_play(
    config: &AppConfig,
    locators: Vec<String>,
    repeat: bool,
) -> spectrum_player_core::Result<()> {
    let playlist = Playlist::new(
        locators.into_iter().map(MediaLocator::from).collect(),
        repeat,
    );
    let first = playlist
        .first()
        .cloned()
        .ok_or_else(|| SpectrumError::msg("nothing to play"))?;

    let backend = ToneBackend::new(RENDER_SAMPLE_RATE, config.analysis.sample_count);
    let mut coordinator = PlaybackCoordinator::new(config, backend, playlist)?;
    let events = coordinator.subscribe();
    let view = BarView::new(config.view.clone(), BAR_COLUMNS, 0.5);

    tracing::info!(%first, "starting playback");
    coordinator.set_file_to_play(first, false);

    while coordinator.state() != TransportState::Idle {
        coordinator.run_once(Duration::from_millis(50));

        for event in events.try_iter() {
            match event {
                PlayerEvent::DidStartPlay { item, locator } => {
                    tracing::info!(%item, %locator, "playing");
                }
                PlayerEvent::DidChangeProgress(progress) => {
                    tracing::debug!(progress, "progress");
                }
                PlayerEvent::DidChangeMix { from, to } => {
                    tracing::debug!(?from, %to, "mix changing");
                }
                PlayerEvent::DidStop(reason) => {
                    tracing::info!(%reason, "stopped");
                }
                PlayerEvent::DidChangeSpectrum { spectrum, .. } => {
                    println!("|{}|", view.render(spectrum.magnitudes()));
                }
            }
        }
    }

    let (processed, superseded) = coordinator.worker_stats().snapshot();
    tracing::info!(processed, superseded, "playlist finished");
    Ok(())
}

fn run_analyze(
    config: &AppConfig,
    frequency: f32,
    sample_rate: u32,
    amplitude: f32,
) -> spectrum_player_core::Result<()> {
    let mut engine =
        SpectrumEngine::with_sample_count(config.analysis.sample_count, config.analysis.scale)?;
    let samples: Vec<f32> = (0..config.analysis.sample_count)
        .map(|n| amplitude * (2.0 * PI * frequency * n as f32 / sample_rate as f32).sin())
        .collect();

    let spectrum = engine.compute_spectrum(&PcmBuffer::mono(&samples, sample_rate));
    let peak = spectrum.peak_bin();
    let summary = serde_json::json!({
        "sample_count": config.analysis.sample_count,
        "transform_size": engine.transform_size(),
        "bins": spectrum.len(),
        "peak_bin": peak,
        "peak_frequency": peak.map(|bin| spectrum.bin_frequency(bin)),
        "peak_magnitude": peak.map(|bin| spectrum.magnitudes()[bin]),
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio player with a live spectrum analyzer", long_about = None)]
struct Cli {
    /// Optional JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a list of synthetic tones and draw their spectrum.
    Play {
        /// Locators such as `tone:440` or `tone:880:2.5`.
        #[arg(required = true)]
        locators: Vec<String>,
        /// Start over after the last item.
        #[arg(short, long)]
        repeat: bool,
    },
    /// Compute one spectrum of a generated sine and print a JSON summary.
    Analyze {
        /// Sine frequency in Hz.
        #[arg(short, long, default_value_t = 1_000.0)]
        frequency: f32,
        #[arg(short, long, default_value_t = 48_000)]
        sample_rate: u32,
        #[arg(short, long, default_value_t = 1.0)]
        amplitude: f32,
    },
}
