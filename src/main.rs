//! Straylight CLI entry point.
//!
//! Provides `serve`, `apply`, `send`, and `check-config` subcommands for
//! running the agent, replaying a command script offline, talking to a
//! running agent, or validating configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use straylight::agent::Agent;
use straylight::config::StraylightConfig;
use straylight::hooks::DispatchTable;
use straylight::protocol::Response;
use straylight::{device, logging, server};

/// Straylight: resident policy agent.
#[derive(Parser)]
#[command(name = "straylight", version, about)]
struct Cli {
    /// Config file (default: `$STRAYLIGHT_CONFIG_PATH` or the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the agent and serve the device channel on a Unix socket.
    Serve {
        /// Socket path (overrides config).
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Replay protocol lines against a fresh registry and print the snapshot.
    Apply {
        /// Script file; reads stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Print status and entries as JSON instead of the snapshot text.
        #[arg(long)]
        json: bool,
        /// Submit lines through the records-only channel; `CMD:` lines are rejected.
        #[arg(long)]
        records_only: bool,
    },
    /// Send protocol lines to a running agent.
    Send {
        /// Socket path (overrides config).
        #[arg(long)]
        socket: Option<PathBuf>,
        /// Read the snapshot after sending.
        #[arg(long)]
        read: bool,
        /// Lines to send, in order.
        lines: Vec<String>,
    },
    /// Load and validate configuration, then print it.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = StraylightConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Command::Serve { socket } => handle_serve(config, socket).await,
        Command::Apply {
            file,
            json,
            records_only,
        } => handle_apply(&config, file.as_deref(), json, records_only),
        Command::Send {
            socket,
            read,
            lines,
        } => handle_send(&config, socket, read, &lines).await,
        Command::CheckConfig => handle_check_config(&config),
    }
}

/// Run the agent until Ctrl-C.
async fn handle_serve(config: StraylightConfig, socket: Option<PathBuf>) -> anyhow::Result<()> {
    let _logging_guard = logging::init_production(&config.logging.dir, &config.logging.level)?;
    let socket_path = socket.unwrap_or(config.server.socket_path);

    let agent = Agent::new();
    let backend = DispatchTable::new();
    agent.start(&backend);

    let listener = server::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "straylight agent listening");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
    };
    let served = server::serve(
        listener,
        agent.device().clone(),
        config.channel.read_buffer_size,
        shutdown,
    )
    .await;

    agent.shutdown(&backend);
    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!(error = %e, socket = %socket_path.display(), "failed to remove socket file");
    }
    served
}

/// Replay a script offline.
fn handle_apply(
    config: &StraylightConfig,
    file: Option<&Path>,
    json: bool,
    records_only: bool,
) -> anyhow::Result<()> {
    logging::init_cli(&config.logging.level);

    let script: Box<dyn BufRead> = match file {
        Some(path) => Box::new(std::io::BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(std::io::stdin().lock()),
    };

    let agent = Agent::new();
    let mut handle = agent.device().open();
    let mut failures = 0_usize;

    for (number, line) in script.lines().enumerate() {
        let line = line.context("failed to read script")?;
        if line.trim().is_empty() {
            continue;
        }
        let number = number.saturating_add(1);
        if records_only {
            match agent.device().ingest_record(line.as_bytes()) {
                Ok((index, kind)) => eprintln!("line {number}: added {kind} at index {index}"),
                Err(errno) => {
                    failures = failures.saturating_add(1);
                    eprintln!("line {number}: {} ({errno})", errno.name());
                }
            }
            continue;
        }
        match handle.write_line(line.as_bytes()) {
            Ok(outcome) => match outcome.response {
                Response::Added { index, kind } => {
                    eprintln!("line {number}: added {kind} at index {index}");
                }
                Response::Report(lines) => {
                    for reported in lines {
                        eprintln!("line {number}: {reported}");
                    }
                }
            },
            Err(errno) => {
                failures = failures.saturating_add(1);
                eprintln!("line {number}: {} ({errno})", errno.name());
            }
        }
    }

    let mut stdout = std::io::stdout().lock();
    if json {
        let registry = agent.registry();
        let entries: Vec<serde_json::Value> = registry
            .entries()
            .context("registry not initialized")?
            .into_iter()
            .map(|(index, entry)| serde_json::json!({ "index": index, "entry": entry }))
            .collect();
        let report = serde_json::json!({ "status": registry.status(), "entries": entries });
        serde_json::to_writer_pretty(&mut stdout, &report).context("failed to write JSON")?;
        writeln!(stdout)?;
    } else {
        let mut buf = vec![0_u8; config.channel.read_buffer_size];
        let n = handle
            .read(&mut buf)
            .map_err(|errno| anyhow::anyhow!("snapshot read failed: {}", errno.name()))?;
        stdout.write_all(buf.get(..n).unwrap_or_default())?;
    }
    stdout.flush()?;

    if failures > 0 {
        anyhow::bail!("{failures} line(s) rejected");
    }
    Ok(())
}

/// Send lines to a running agent and print each reply.
async fn handle_send(
    config: &StraylightConfig,
    socket: Option<PathBuf>,
    read: bool,
    lines: &[String],
) -> anyhow::Result<()> {
    logging::init_cli(&config.logging.level);
    let socket_path = socket.unwrap_or_else(|| config.server.socket_path.clone());

    let stream = tokio::net::UnixStream::connect(&socket_path)
        .await
        .with_context(|| format!("failed to connect to {}", socket_path.display()))?;
    let (reader, mut writer) = stream.into_split();
    let mut replies = BufReader::new(reader);
    let mut reply = String::new();

    for line in lines.iter().filter(|l| !l.is_empty()) {
        if line.len() > device::MAX_WRITE_LEN {
            warn!(len = line.len(), "line exceeds write limit and will be truncated");
        }
        writer.write_all(format!("{line}\n").as_bytes()).await?;
        reply.clear();
        replies.read_line(&mut reply).await?;
        print!("{reply}");
    }

    if read {
        writer.write_all(b"\n").await?;
        reply.clear();
        replies.read_line(&mut reply).await?;
        match reply.trim_end().strip_prefix("DATA ") {
            Some(len) => {
                let len: usize = len.parse().context("malformed DATA header")?;
                let mut body = vec![0_u8; len];
                replies.read_exact(&mut body).await?;
                std::io::stdout().write_all(&body)?;
            }
            None => print!("{reply}"),
        }
    }
    Ok(())
}

/// Print the effective configuration.
fn handle_check_config(config: &StraylightConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render config")?;
    println!("{rendered}");
    println!("configuration OK");
    Ok(())
}
