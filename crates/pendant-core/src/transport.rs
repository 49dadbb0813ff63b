//! Boundary to the duplex channel that carries text frames.
//!
//! Implementations are fire-and-forget: `open` returns immediately and reports
//! the outcome later as a [`TransportEvent`] stamped with the generation it
//! was opened under.

use std::fmt;
use thiserror::Error;
use url::Url;

/// Identifies one channel instance. Bumped before every open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no channel is open")]
    NotOpen,
    #[error("channel closed")]
    ChannelClosed,
}

pub trait Transport {
    fn open(&mut self, url: &Url, generation: Generation);
    fn send(&mut self, text: String) -> Result<(), TransportError>;
    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Closed,
    Errored(String),
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: Generation,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(generation: Generation, kind: TransportEventKind) -> Self {
        Self { generation, kind }
    }

    pub fn opened(generation: Generation) -> Self {
        Self::new(generation, TransportEventKind::Opened)
    }

    pub fn closed(generation: Generation) -> Self {
        Self::new(generation, TransportEventKind::Closed)
    }

    pub fn errored(generation: Generation, reason: impl Into<String>) -> Self {
        Self::new(generation, TransportEventKind::Errored(reason.into()))
    }

    pub fn message(generation: Generation, text: impl Into<String>) -> Self {
        Self::new(generation, TransportEventKind::Message(text.into()))
    }
}
