use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use corner_pin_player::config::Configuration;
use corner_pin_player::input::InputController;
use corner_pin_player::render::viewer;
use corner_pin_player::scan::discover_frames;
use corner_pin_player::settings::{FileSlot, SettingsStore};

#[derive(Debug, Parser)]
#[command(
    name = "corner-pin-player",
    version,
    about = "Loop a clip with keystone correction for projection"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,
    /// Directory of frames to play, overriding clip-path
    #[arg(long, value_name = "DIR")]
    clip: Option<PathBuf>,
    /// Where adjustments are persisted, overriding settings-path
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,
    /// Open borderless fullscreen
    #[arg(long)]
    fullscreen: bool,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("corner_pin_player={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        clip,
        settings,
        fullscreen,
        verbose,
    } = Args::parse();
    init_tracing(verbose)?;

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?;
    if let Some(clip) = clip {
        cfg.clip_path = clip;
    }
    if let Some(settings) = settings {
        cfg.settings_path = settings;
    }
    cfg.start_fullscreen |= fullscreen;
    let cfg = cfg.validated().context("invalid configuration values")?;
    tracing::debug!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    let frames = discover_frames(&cfg.clip_path)
        .with_context(|| format!("failed to open clip {}", cfg.clip_path.display()))?;
    info!(
        count = frames.len(),
        clip = %cfg.clip_path.display(),
        "discovered clip frames"
    );

    let slot = Arc::new(FileSlot::new(cfg.settings_path.clone()));
    let store = SettingsStore::new(slot, cfg.persist_debounce, Handle::current());
    let restored = store.load();
    info!(
        settings = %cfg.settings_path.display(),
        debounce = %humantime::format_duration(cfg.persist_debounce),
        "settings store ready"
    );
    let controller = InputController::new(restored, cfg.controls.clone());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    // Blocks the main thread until the window closes or cancellation occurs
    let result = viewer::run_windowed(cfg, frames, controller, store, cancel.clone())
        .context("viewer failed");
    cancel.cancel();
    result
}
