// CLI module - Run a program behind a log relay

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::logs::{capture_output, ChannelTail, LogRelay, Rotation, TailStream};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Subscriber id used for the terminal echo
const CONSOLE_TAIL: &str = "console";

/// logrelay - relay a process's output to a log file and live tails
#[derive(Parser)]
#[command(name = "logrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program and relay its output
    Run {
        /// Relay configuration file (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log file to persist output to (overrides the config file)
        #[arg(short, long)]
        output: Option<String>,

        /// Number of recent lines kept in memory
        #[arg(long)]
        capacity: Option<usize>,

        /// Do not echo output to the terminal
        #[arg(short, long)]
        quiet: bool,

        /// Program to run followed by its arguments
        #[arg(last = true, required = true)]
        program: Vec<String>,
    },

    /// Validate a relay configuration file
    Check {
        /// Configuration file to validate
        config: PathBuf,
    },
}

impl Cli {
    /// Run the CLI application, returning the process exit code
    pub async fn run() -> Result<i32> {
        let cli = Cli::parse();
        cli.execute().await
    }

    /// Execute the parsed command
    async fn execute(&self) -> Result<i32> {
        match &self.command {
            Commands::Run {
                config,
                output,
                capacity,
                quiet,
                program,
            } => {
                let config = build_config(config.as_deref(), output.clone(), *capacity)?;
                run_program(&config, program, *quiet).await
            }

            Commands::Check { config } => {
                let config = RelayConfig::from_file(config)?;
                println!("✓ Configuration is valid");
                println!("{}", describe(&config));
                Ok(0)
            }
        }
    }
}

/// Merge the optional config file with command-line overrides
fn build_config(
    path: Option<&std::path::Path>,
    output: Option<String>,
    capacity: Option<usize>,
) -> Result<RelayConfig> {
    let mut config = match path {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };

    if let Some(output) = output {
        config.destination = output;
    }
    if let Some(capacity) = capacity {
        config.capacity = capacity;
    }

    config.validate()?;
    Ok(config)
}

/// Spawn `program`, relay its output until it exits, and return its exit code
async fn run_program(config: &RelayConfig, program: &[String], quiet: bool) -> Result<i32> {
    let (executable, args) = program
        .split_first()
        .ok_or_else(|| RelayError::MissingConfigField("program".to_string()))?;

    let relay = Arc::new(LogRelay::from_config(config)?);

    let console = if quiet {
        None
    } else {
        let (tail, stream) = ChannelTail::pair(config.tail_queue);
        relay.register(CONSOLE_TAIL, tail, 0)?;
        Some(tokio::spawn(echo_to_stdout(stream)))
    };

    let mut child = Command::new(executable)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RelayError::CaptureError(format!("Failed to spawn {}: {}", executable, e)))?;

    tracing::info!(pid = ?child.id(), "Started {}", executable);
    let capture = capture_output(Arc::clone(&relay), &mut child)?;

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping {}", executable);
            child.kill().await?;
            child.wait().await?
        }
    };

    let lines = capture.wait().await?;
    tracing::info!("{} exited with {} after {} lines", executable, status, lines);

    relay.unregister(CONSOLE_TAIL);
    if let Some(console) = console {
        let _ = console.await;
    }

    if let Err(e) = relay.close() {
        tracing::warn!("{}", e);
    }

    Ok(status.code().unwrap_or(1))
}

/// Print tail lines to stdout until the tail is unregistered
async fn echo_to_stdout(mut stream: TailStream) {
    let mut stdout = tokio::io::stdout();
    while let Some(item) = stream.next().await {
        if stdout.write_all(item.line.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

/// Human-readable summary of a configuration
fn describe(config: &RelayConfig) -> String {
    let destination = if config.destination.is_empty() {
        "(none)".to_string()
    } else {
        config.destination.clone()
    };
    let rotation = match config.rotation {
        Rotation::Never => "never".to_string(),
        Rotation::Size { max_bytes } => format!("every {} bytes", max_bytes),
        Rotation::Daily => "daily".to_string(),
    };

    format!(
        "  capacity:    {}\n  destination: {}\n  rotation:    {}\n  timestamps:  {}\n  tail queue:  {}",
        config.capacity, destination, rotation, config.timestamps, config.tail_queue
    )
}
