// camview Interactive Console
// Line-oriented control surface for a capture session

use crate::presenter::TerminalPresenter;
use crate::snapshot::save_snapshot;
use anyhow::Result;
use camview_core::{CameraSettings, PipelineOptions};
use camview_eye::CaptureSession;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Pipeline stage named by a toggle command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Mirror,
    Detect,
    Grid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    Resolution(CameraSettings),
    Toggle(Stage, bool),
    Status,
    Snapshot(PathBuf),
    History,
    Help,
    Exit,
}

impl Command {
    /// Parse one console line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> std::result::Result<Option<Command>, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = parts.first() else {
            return Ok(None);
        };

        let command = match first.to_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "reset" => Command::Reset,
            "status" | "st" => Command::Status,
            "history" => Command::History,
            "help" | "?" => Command::Help,
            "exit" | "quit" | "q" => Command::Exit,
            "res" | "resolution" => {
                let arg = parts.get(1).ok_or("Usage: res <width>x<height>")?;
                let settings = arg.parse::<CameraSettings>().map_err(|e| e.to_string())?;
                Command::Resolution(settings)
            }
            "snapshot" | "snap" => {
                let arg = parts.get(1).ok_or("Usage: snapshot <path.png|path.jpg>")?;
                Command::Snapshot(PathBuf::from(arg))
            }
            name @ ("mirror" | "detect" | "grid") => {
                let stage = match name {
                    "mirror" => Stage::Mirror,
                    "detect" => Stage::Detect,
                    _ => Stage::Grid,
                };
                let enabled = match parts.get(1).map(|s| s.to_lowercase()).as_deref() {
                    Some("on") => true,
                    Some("off") => false,
                    _ => return Err(format!("Usage: {} on|off", name)),
                };
                Command::Toggle(stage, enabled)
            }
            other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
        };
        Ok(Some(command))
    }
}

pub struct InteractiveConsole {
    session: Arc<CaptureSession>,
    presenter: Arc<TerminalPresenter>,
    history: Vec<String>,
}

impl InteractiveConsole {
    pub fn new(session: Arc<CaptureSession>, presenter: Arc<TerminalPresenter>) -> Self {
        Self {
            session,
            presenter,
            history: Vec::new(),
        }
    }

    /// Read commands from stdin until `exit` or end of input
    pub fn run(&mut self) -> Result<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut stdin = BufReader::new(stdin.lock());

        loop {
            print!("camview[{}]> ", self.session.state());
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim().to_string();

            match Command::parse(&line) {
                Ok(None) => continue,
                Ok(Some(Command::Exit)) => break,
                Ok(Some(command)) => {
                    self.history.push(line);
                    match self.execute(command) {
                        Ok(output) if !output.is_empty() => println!("{}", output),
                        Ok(_) => {}
                        Err(e) => println!("❌ Error: {}", e),
                    }
                }
                Err(msg) => println!("❌ {}", msg),
            }
        }

        self.session.stop();
        println!("\n👋 Goodbye!");
        Ok(())
    }

    /// Run one command against the session and describe the result
    pub fn execute(&mut self, command: Command) -> Result<String> {
        let output = match command {
            Command::Start => {
                let settings = self.session.start()?;
                format!("✅ Streaming at {}", settings)
            }
            Command::Stop => {
                self.session.stop();
                "✅ Stopped".to_string()
            }
            Command::Reset => {
                self.session.reset_camera()?;
                self.session.join_probe();
                format!("✅ Camera reset, now {}", self.session.state())
            }
            Command::Resolution(requested) => {
                let negotiated = self.session.reconfigure(requested)?;
                if negotiated.is_substituted() {
                    format!("⚠️  {} not supported, using {}", requested, negotiated.effective)
                } else {
                    format!("✅ Resolution {}", negotiated.effective)
                }
            }
            Command::Toggle(stage, enabled) => {
                let mut options = self.session.options();
                match stage {
                    Stage::Mirror => options.mirror = enabled,
                    Stage::Detect => options.detect = enabled,
                    Stage::Grid => options.grid = enabled,
                }
                self.session.set_options(options);
                describe_options(&options)
            }
            Command::Status => self.status(),
            Command::Snapshot(path) => {
                let frame = self
                    .presenter
                    .last_frame()
                    .ok_or_else(|| anyhow::anyhow!("no frame has been published yet"))?;
                save_snapshot(&frame, &path)?;
                format!("✅ Saved {}x{} frame to {}", frame.width(), frame.height(), path.display())
            }
            Command::History => self
                .history
                .iter()
                .enumerate()
                .map(|(i, cmd)| format!("  {}: {}", i + 1, cmd))
                .collect::<Vec<_>>()
                .join("\n"),
            Command::Help => {
                self.print_help();
                String::new()
            }
            Command::Exit => String::new(),
        };
        Ok(output)
    }

    fn status(&self) -> String {
        let mut output = format!(
            "State:      {}\nResolution: {}\nOptions:    {}\nDetection:  {}\n",
            self.session.state(),
            self.session.settings(),
            describe_options(&self.session.options()),
            if self.session.detection_available() { "available" } else { "unavailable" },
        );
        if let Some(reason) = self.session.last_error() {
            output.push_str(&format!("Last error: {}\n", reason));
        }
        output.push_str(&serde_json::to_string_pretty(&self.session.stats()).unwrap_or_default());
        output
    }

    fn print_banner(&self) {
        println!("\n╔═══════════════════════════════════════════════╗");
        println!("║             camview Interactive Console       ║");
        println!("╚═══════════════════════════════════════════════╝");
        println!();
        println!("Camera state: {}", self.session.state());
        println!("Type 'help' for available commands, 'exit' to quit");
        println!();
    }

    fn print_help(&self) {
        println!("📚 Available Commands:");
        println!("  start                   - Open the camera and stream");
        println!("  stop                    - Stop streaming and release the camera");
        println!("  reset                   - Probe for a camera again");
        println!("  res <W>x<H>             - Request a resolution");
        println!("  mirror|detect|grid on|off - Toggle a pipeline stage");
        println!("  status, st              - Show session state and counters");
        println!("  snapshot <path>         - Save the last frame (png/jpg)");
        println!("  history                 - Show command history");
        println!("  help, ?                 - Show this help message");
        println!("  exit, quit, q           - Exit the console");
        println!();
    }
}

fn describe_options(options: &PipelineOptions) -> String {
    let flag = |on: bool| if on { "on" } else { "off" };
    format!(
        "mirror {}, detect {}, grid {}",
        flag(options.mirror),
        flag(options.detect),
        flag(options.grid)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use camview_core::SessionState;
    use camview_eye::{FrameSource, SyntheticDevice};
    use std::time::{Duration, Instant};

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), Ok(None));
        assert_eq!(Command::parse("START"), Ok(Some(Command::Start)));
        assert_eq!(
            Command::parse("res 1280x720"),
            Ok(Some(Command::Resolution(CameraSettings::new(1280, 720))))
        );
        assert_eq!(
            Command::parse("grid on"),
            Ok(Some(Command::Toggle(Stage::Grid, true)))
        );
        assert_eq!(
            Command::parse("mirror OFF"),
            Ok(Some(Command::Toggle(Stage::Mirror, false)))
        );
        assert_eq!(
            Command::parse("snapshot out.png"),
            Ok(Some(Command::Snapshot(PathBuf::from("out.png"))))
        );
        assert_eq!(Command::parse("q"), Ok(Some(Command::Exit)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("res").is_err());
        assert!(Command::parse("res big").is_err());
        assert!(Command::parse("detect maybe").is_err());
        assert!(Command::parse("snapshot").is_err());
        assert!(Command::parse("launch").is_err());
    }

    #[test]
    fn test_execute_against_synthetic_session() {
        let device = SyntheticDevice::default();
        let presenter = TerminalPresenter::quiet();
        let source = FrameSource::new(Box::new(device.camera())).with_warmup_frames(0);
        let session = Arc::new(CaptureSession::new(source, presenter.clone()).unwrap());
        session.join_probe();
        assert_eq!(session.state(), SessionState::Ready);

        let mut console = InteractiveConsole::new(session.clone(), presenter.clone());
        console.execute(Command::Toggle(Stage::Mirror, true)).unwrap();
        assert!(session.options().mirror);

        console.execute(Command::Start).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while presenter.last_frame().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        console.execute(Command::Stop).unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!device.is_claimed());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last.png");
        console.execute(Command::Snapshot(path.clone())).unwrap();
        assert!(path.exists());

        assert!(console.execute(Command::Status).unwrap().contains("stopped"));
    }
}
