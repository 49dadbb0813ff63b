use crate::connection::{ControlSignal, Transition};
use crate::ledger::IntentTag;
use crate::tick::Tick;
use crate::transport::{TransportEvent, TransportEventKind};
use crate::wire::{decode_server_message, ResponseMessage, ServerMessage, StateSnapshot, WireError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] WireError),
}

/// An inbound event after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Control(ControlSignal),
    Snapshot(StateSnapshot),
    Response(ResponseMessage),
}

/// What a single inbound event did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Event belonged to a superseded channel, or changed nothing.
    Ignored,
    Connection(Transition),
    SnapshotApplied {
        transition: Transition,
        entries: usize,
        configuration_settled: bool,
    },
    Resolved {
        tick: Tick,
        intent: IntentTag,
        ok: bool,
    },
    /// Response for a tick the ledger does not hold.
    Discarded { tick: Tick },
}

pub fn classify_payload(raw: &str, max_frame_bytes: usize) -> Result<Inbound, CorrelationError> {
    let message = decode_server_message(raw, max_frame_bytes)?;
    Ok(match message {
        ServerMessage::State(snapshot) => Inbound::Snapshot(snapshot),
        ServerMessage::Response(response) => Inbound::Response(response),
    })
}

pub fn classify_event(
    event: &TransportEvent,
    max_frame_bytes: usize,
) -> Result<Inbound, CorrelationError> {
    match &event.kind {
        TransportEventKind::Opened => Ok(Inbound::Control(ControlSignal::Opened)),
        TransportEventKind::Closed => Ok(Inbound::Control(ControlSignal::Closed)),
        TransportEventKind::Errored(_) => Ok(Inbound::Control(ControlSignal::Errored)),
        TransportEventKind::Message(text) => classify_payload(text, max_frame_bytes),
    }
}
