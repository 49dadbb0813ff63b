use crate::connection::ConnectionState;
use crate::ledger::{IntentTag, PendingRequest};
use crate::tick::Tick;
use crate::transport::Generation;
use crate::wire::{HistoryEntry, SerialConfiguration};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    NotAsked,
    Pending,
    Done {
        ok: bool,
    },
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::NotAsked => f.write_str("not asked"),
            RequestStatus::Pending => f.write_str("pending"),
            RequestStatus::Done { ok: true } => f.write_str("done"),
            RequestStatus::Done { ok: false } => f.write_str("failed"),
        }
    }
}

/// Transient error shown to the user until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// A raw payload sent but not yet confirmed by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Echo<'a> {
    pub tick: Tick,
    pub value: &'a str,
}

/// Read-only window onto the session for the rendering layer.
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub(crate) connection: ConnectionState,
    pub(crate) generation: Generation,
    pub(crate) history: &'a [HistoryEntry],
    pub(crate) statuses: &'a BTreeMap<IntentTag, RequestStatus>,
    pub(crate) pending: &'a crate::ledger::PendingLedger,
    pub(crate) echoes: &'a BTreeMap<Tick, String>,
    pub(crate) notice: Option<&'a Notice>,
    pub(crate) last_config: Option<&'a SerialConfiguration>,
    pub(crate) server_tick: Option<Tick>,
    pub(crate) awaiting_configuration: bool,
}

impl<'a> SessionView<'a> {
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn history(&self) -> &'a [HistoryEntry] {
        self.history
    }

    pub fn status(&self, intent: IntentTag) -> RequestStatus {
        self.statuses.get(&intent).copied().unwrap_or_default()
    }

    pub fn statuses(&self) -> impl Iterator<Item = (IntentTag, RequestStatus)> + '_ {
        IntentTag::ALL
            .into_iter()
            .map(|intent| (intent, self.status(intent)))
    }

    pub fn pending(&self) -> impl Iterator<Item = PendingRequest> + 'a {
        self.pending.pending()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_echoes(&self) -> impl Iterator<Item = Echo<'a>> + 'a {
        self.echoes.iter().map(|(tick, value)| Echo {
            tick: *tick,
            value: value.as_str(),
        })
    }

    pub fn notice(&self) -> Option<&'a Notice> {
        self.notice
    }

    pub fn last_config(&self) -> Option<&'a SerialConfiguration> {
        self.last_config
    }

    pub fn server_tick(&self) -> Option<Tick> {
        self.server_tick
    }

    /// A configuration was acknowledged and the confirming snapshot has not
    /// arrived yet.
    pub fn awaiting_configuration(&self) -> bool {
        self.awaiting_configuration
    }
}
