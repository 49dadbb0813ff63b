mod console;
mod ws;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use console::{parse_command, Command, Console, HELP};
use pendant_core::config::default_config_path;
use pendant_core::{ClientConfig, LoggingConfig, Overrides, Session, SessionError, Transport};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};
use ws::WsTransport;

#[derive(Parser, Debug)]
#[command(name = "pendant", about = "Line console for a remote serial device")]
struct Args {
    /// Config file; defaults to $PENDANT_CONFIG or ~/.config/pendant/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "")]
    url: String,
    #[arg(long, default_value = "")]
    log_level: String,
    #[arg(long, default_value = "")]
    log_dir: String,
    /// Keep log lines off stderr.
    #[arg(long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        let non_empty = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };
        Overrides {
            url: non_empty(&self.url),
            log_level: non_empty(&self.log_level),
            log_dir: non_empty(&self.log_dir),
            log_stderr: self.quiet.then_some(false),
        }
    }
}

struct LogGuard {
    file: Option<Arc<StdMutex<std::fs::File>>>,
}

struct MultiWriter {
    stderr_enabled: bool,
    file: Option<Arc<StdMutex<std::fs::File>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;
    let _log_guard = init_logging(&config.logging);
    let options = config
        .session_options()
        .context("invalid websocket settings")?;

    info!(
        event = "startup",
        url = %options.url,
        reconnect_ms = options.reconnect_interval.num_milliseconds(),
        max_frame_bytes = options.max_frame_bytes
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(options, WsTransport::new(event_tx));
    let mut console = Console::new();
    let mut stdout = io::stdout();
    session.start();

    let mut clock = tokio::time::interval(config.clock_interval());
    clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = clock.tick() => {
                session.on_clock(Utc::now());
            }
            Some(event) = event_rx.recv() => {
                match session.on_transport(event) {
                    Ok(effect) => trace!(event = "transport_effect", ?effect),
                    // Already logged and raised as a notice by the session.
                    Err(_) => {}
                }
                console.render(&session.view(), &mut stdout)?;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    info!(event = "stdin_closed");
                    break;
                };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => writeln!(stdout, "{HELP}")?,
                    Ok(Some(Command::Status)) => console.status(&session.view(), &mut stdout)?,
                    Ok(Some(Command::Dismiss)) => {
                        if session.dismiss_notice().is_none() {
                            writeln!(stdout, "no notice")?;
                        }
                    }
                    Ok(Some(Command::Submit(request))) => {
                        let echo = request.raw_value().map(str::to_string);
                        match session.submit(request) {
                            Ok(tick) => {
                                if let Some(value) = echo {
                                    writeln!(stdout, "~ [{tick}] {value}")?;
                                }
                            }
                            Err(SessionError::TransportUnavailable) => {
                                writeln!(stdout, "not connected; request not sent")?;
                            }
                            Err(err) => writeln!(stdout, "request failed: {err}")?,
                        }
                        console.render(&session.view(), &mut stdout)?;
                    }
                    Err(message) => writeln!(stdout, "{message}")?,
                }
            }
        }
        stdout.flush()?;
    }

    session.transport_mut().close();
    info!(event = "shutdown", pending = session.view().pending_count());
    Ok(())
}

fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = ClientConfig::load(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    config.apply(&Overrides::from_env());
    config.apply(&args.overrides());
    Ok(config)
}

fn init_logging(config: &LoggingConfig) -> Option<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let writer = match open_log_file(&config.dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let stderr_enabled = config.stderr;
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone(), stderr_enabled));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_ansi(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

impl MultiWriter {
    fn new(file: Option<Arc<StdMutex<std::fs::File>>>, stderr_enabled: bool) -> Self {
        Self {
            stderr_enabled,
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stderr_enabled {
            let _ = io::stderr().write_all(buf);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.stderr_enabled {
            let _ = io::stderr().flush();
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("pendant-{}.log", std::process::id()));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(LogGuard {
        file: Some(Arc::new(StdMutex::new(file))),
    })
}
