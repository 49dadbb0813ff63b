use pendant_core::{
    ClientRequest, ConnectionState, HistoryEntry, IntentTag, RequestStatus, SessionView,
};
use std::io::{self, Write};

pub const HELP: &str = "\
commands:
  raw <text>              send text to the serial device
  config <device> <baud>  open the serial port with the given settings
  retry                   ask the service to retry the serial port
  close                   close the serial port
  status                  show connection and request state
  dismiss                 clear the current notice
  help                    show this list
  quit                    exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(ClientRequest),
    Status,
    Dismiss,
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim_start();
    if trimmed.trim().is_empty() {
        return Ok(None);
    }
    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest),
        None => (trimmed, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "raw" | "send" => {
            let payload = rest.trim();
            if payload.is_empty() {
                return Err("usage: raw <text>".to_string());
            }
            Command::Submit(ClientRequest::raw(payload))
        }
        "config" | "configure" => {
            let mut parts = rest.split_whitespace();
            let (Some(device), Some(baud), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err("usage: config <device> <baud>".to_string());
            };
            let baud = baud
                .parse::<u32>()
                .map_err(|_| format!("invalid baud rate '{baud}'"))?;
            Command::Submit(ClientRequest::configuration(device, baud))
        }
        "retry" => Command::Submit(ClientRequest::RetrySerial),
        "close" => Command::Submit(ClientRequest::CloseSerial),
        "status" => Command::Status,
        "dismiss" => Command::Dismiss,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(command))
}

pub fn format_entry(entry: &HistoryEntry) -> String {
    match entry {
        HistoryEntry::SentCommand { tick, request } => match request {
            ClientRequest::RawSerial { value } => format!("> [{tick}] {value}"),
            ClientRequest::Configuration(config) => {
                format!("> [{tick}] configure {} @ {}", config.device, config.baud)
            }
            ClientRequest::RetrySerial => format!("> [{tick}] retry serial"),
            ClientRequest::CloseSerial => format!("> [{tick}] close serial"),
        },
        HistoryEntry::ReceivedData { content } => format!("< {content}"),
    }
}

fn intent_label(intent: IntentTag) -> &'static str {
    match intent {
        IntentTag::SubmitConfiguration => "configuration",
        IntentTag::SendRawPayload => "raw",
        IntentTag::RetrySerial => "retry",
        IntentTag::CloseSerial => "close",
    }
}

/// Prints what changed in the session since the last call.
#[derive(Debug, Default)]
pub struct Console {
    connection: ConnectionState,
    history: Vec<HistoryEntry>,
    statuses: Vec<(IntentTag, RequestStatus)>,
    notice: Option<String>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render<W: Write>(&mut self, view: &SessionView<'_>, out: &mut W) -> io::Result<()> {
        if view.connection() != self.connection {
            self.connection = view.connection();
            writeln!(out, "-- {}", self.connection)?;
        }

        let history = view.history();
        let fresh = if history.starts_with(&self.history) {
            &history[self.history.len()..]
        } else {
            history
        };
        for entry in fresh {
            writeln!(out, "{}", format_entry(entry))?;
        }
        if history != self.history.as_slice() {
            self.history = history.to_vec();
        }

        let statuses: Vec<_> = view.statuses().collect();
        for (intent, status) in &statuses {
            let previous = self
                .statuses
                .iter()
                .find(|(known, _)| known == intent)
                .map(|(_, status)| *status)
                .unwrap_or_default();
            if previous != *status && *status != RequestStatus::NotAsked {
                writeln!(out, "-- {}: {status}", intent_label(*intent))?;
            }
        }
        self.statuses = statuses;

        let notice = view.notice().map(|notice| notice.message.clone());
        if notice != self.notice {
            if let Some(message) = notice.as_ref() {
                writeln!(out, "!! {message} (type 'dismiss' to clear)")?;
            }
            self.notice = notice;
        }
        Ok(())
    }

    pub fn status<W: Write>(&self, view: &SessionView<'_>, out: &mut W) -> io::Result<()> {
        writeln!(out, "connection: {} ({})", view.connection(), view.generation())?;
        match view.last_config() {
            Some(config) => writeln!(out, "serial: {} @ {}", config.device, config.baud)?,
            None => writeln!(out, "serial: unconfigured")?,
        }
        if let Some(tick) = view.server_tick() {
            writeln!(out, "service tick: {tick}")?;
        }
        for (intent, status) in view.statuses() {
            writeln!(out, "{:<14} {status}", intent_label(intent))?;
        }
        if view.awaiting_configuration() {
            writeln!(out, "configuration acknowledged, waiting for state")?;
        }
        for request in view.pending() {
            writeln!(out, "pending [{}] {}", request.tick, request.intent)?;
        }
        for echo in view.pending_echoes() {
            writeln!(out, "unconfirmed [{}] {}", echo.tick, echo.value)?;
        }
        if let Some(notice) = view.notice() {
            writeln!(
                out,
                "notice ({}): {}",
                notice.raised_at.format("%H:%M:%S"),
                notice.message
            )?;
        }
        Ok(())
    }
}
