// camview Command Line Interface
// Probe cameras, stream through the processing pipeline and drive a session interactively

mod console;
mod presenter;
mod snapshot;

use anyhow::{bail, Context};
use camview_core::{CameraBackendKind, CameraSettings, CamviewConfig, SessionState};
use camview_eye::CaptureSession;
use clap::{Args, Parser, Subcommand};
use presenter::TerminalPresenter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "camview")]
#[command(about = "camview - live camera viewer with mirror, detection overlay and grid", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<String>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for a usable camera and print its resolution
    Probe {
        #[command(flatten)]
        camera: CameraArgs,
    },

    /// Stream from the camera through the pipeline
    Run {
        #[command(flatten)]
        camera: CameraArgs,

        /// Mirror frames horizontally
        #[arg(long)]
        mirror: bool,

        /// Draw object detections
        #[arg(long)]
        detect: bool,

        /// Draw the composition grid
        #[arg(long)]
        grid: bool,

        /// Stop after this many seconds (default: until Ctrl+C)
        #[arg(long, short)]
        duration: Option<u64>,

        /// Write the last frame to this file on exit (png/jpg)
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Interactive console controlling a session
    Console {
        #[command(flatten)]
        camera: CameraArgs,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show {
        #[command(flatten)]
        camera: CameraArgs,
    },
}

/// Flags overriding the camera and detection sections of the configuration
#[derive(Args, Clone, Debug, Default)]
struct CameraArgs {
    /// Use the built-in test pattern instead of a physical camera
    #[arg(long)]
    synthetic: bool,

    /// Camera device index
    #[arg(long)]
    device: Option<u32>,

    /// Requested frame width
    #[arg(long)]
    width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    height: Option<u32>,

    /// ONNX detection model
    #[arg(long)]
    model: Option<PathBuf>,
}

impl CameraArgs {
    fn apply(&self, config: &mut CamviewConfig) {
        if self.synthetic {
            config.camera.backend = CameraBackendKind::Synthetic;
        }
        if let Some(device) = self.device {
            config.camera.device_index = device;
        }
        let current = config.camera.resolution;
        config.camera.resolution = CameraSettings::new(
            self.width.unwrap_or(current.width),
            self.height.unwrap_or(current.height),
        );
        if let Some(model) = &self.model {
            config.detection.model_path = Some(model.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { camera } => {
            let config = load_config(cli.config.as_deref(), &camera)?;
            probe_camera(config).await?;
        }
        Commands::Run { camera, mirror, detect, grid, duration, snapshot } => {
            let mut config = load_config(cli.config.as_deref(), &camera)?;
            config.pipeline.mirror |= mirror;
            config.pipeline.detect |= detect;
            config.pipeline.grid |= grid;
            run_session(config, duration.map(Duration::from_secs), snapshot).await?;
        }
        Commands::Console { camera } => {
            let config = load_config(cli.config.as_deref(), &camera)?;
            run_console(config).await?;
        }
        Commands::Config(ConfigCommands::Show { camera }) => {
            let config = load_config(cli.config.as_deref(), &camera)?;
            println!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// File (or defaults), then `CAMVIEW_*` variables, then flags
fn load_config(path: Option<&str>, camera: &CameraArgs) -> anyhow::Result<CamviewConfig> {
    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            let mut config = CamviewConfig::from_file(path)
                .with_context(|| format!("invalid configuration {}", path))?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => CamviewConfig::from_env(),
    };
    camera.apply(&mut config);
    config.validate()?;
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

async fn open_session(
    config: CamviewConfig,
    presenter: Arc<TerminalPresenter>,
) -> anyhow::Result<Arc<CaptureSession>> {
    let session = tokio::task::spawn_blocking(move || {
        let session = CaptureSession::from_config(&config, presenter)?;
        session.join_probe();
        Ok::<_, camview_eye::VisionError>(session)
    })
    .await??;
    Ok(Arc::new(session))
}

async fn probe_camera(config: CamviewConfig) -> anyhow::Result<()> {
    let backend = config.camera.backend;
    let device = config.camera.device_index;
    let session = open_session(config, TerminalPresenter::quiet()).await?;

    match session.state() {
        SessionState::Ready => {
            println!("✅ Camera {} ({:?}) ready at {}", device, backend, session.settings());
            println!(
                "   Detection: {}",
                if session.detection_available() { "available" } else { "unavailable" }
            );
            Ok(())
        }
        state => {
            let reason = session.last_error().unwrap_or_else(|| state.to_string());
            bail!("camera {} ({:?}) not usable: {}", device, backend, reason)
        }
    }
}

async fn run_session(
    config: CamviewConfig,
    duration: Option<Duration>,
    snapshot_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let presenter = TerminalPresenter::new();
    let session = open_session(config, presenter.clone()).await?;
    if session.state() != SessionState::Ready {
        bail!(
            "no camera: {}",
            session.last_error().unwrap_or_else(|| session.state().to_string())
        );
    }

    let settings = session.start()?;
    println!("🎥 Streaming at {} (Ctrl+C to stop)", settings);

    stream_until(&session, tokio::signal::ctrl_c(), duration).await;

    let stopping = session.clone();
    tokio::task::spawn_blocking(move || stopping.stop()).await?;

    let stats = session.stats();
    println!(
        "⏹  Stopped after {} frames ({} dropped)",
        stats.frames_published, stats.frames_dropped
    );

    if let Some(path) = snapshot_path {
        match presenter.last_frame() {
            Some(frame) => {
                snapshot::save_snapshot(&frame, &path)?;
                println!("📸 Saved {}", path.display());
            }
            None => warn!("No frame was published; {} not written", path.display()),
        }
    }
    Ok(())
}

/// Why a streaming run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    Interrupted,
    Elapsed,
    LeftRunning,
}

/// Wait until `shutdown` resolves, `duration` passes or the session stops running
async fn stream_until<F>(session: &CaptureSession, shutdown: F, duration: Option<Duration>) -> StopCause
where
    F: std::future::Future,
{
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted");
                return StopCause::Interrupted;
            }
            _ = &mut deadline => return StopCause::Elapsed,
            _ = ticker.tick() => {
                if session.state() != SessionState::Running {
                    warn!("Session left the running state: {}", session.state());
                    return StopCause::LeftRunning;
                }
            }
        }
    }
}

async fn run_console(config: CamviewConfig) -> anyhow::Result<()> {
    let presenter = TerminalPresenter::new();
    let session = open_session(config, presenter.clone()).await?;
    let mut console = console::InteractiveConsole::new(session, presenter);
    tokio::task::spawn_blocking(move || console.run()).await??;
    Ok(())
}
