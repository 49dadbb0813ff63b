//! JSON text frames exchanged with the device-control service.
//!
//! Outbound frames are [`ClientMessage`] envelopes carrying a tick and a
//! kind-tagged [`ClientRequest`]. Inbound frames are [`ServerMessage`]s,
//! discriminated by their `kind` field. Unknown tags fail to decode.

use crate::ledger::IntentTag;
use crate::tick::Tick;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;
pub const STATUS_OK: &str = "ok";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerialConfiguration {
    pub device: String,
    pub baud: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientRequest {
    RawSerial { value: String },
    Configuration(SerialConfiguration),
    RetrySerial,
    CloseSerial,
}

impl ClientRequest {
    pub fn raw(value: impl Into<String>) -> Self {
        Self::RawSerial {
            value: value.into(),
        }
    }

    pub fn configuration(device: impl Into<String>, baud: u32) -> Self {
        Self::Configuration(SerialConfiguration {
            device: device.into(),
            baud,
        })
    }

    pub fn intent(&self) -> IntentTag {
        match self {
            ClientRequest::RawSerial { .. } => IntentTag::SendRawPayload,
            ClientRequest::Configuration(_) => IntentTag::SubmitConfiguration,
            ClientRequest::RetrySerial => IntentTag::RetrySerial,
            ClientRequest::CloseSerial => IntentTag::CloseSerial,
        }
    }

    pub fn raw_value(&self) -> Option<&str> {
        match self {
            ClientRequest::RawSerial { value } => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientRequest::RawSerial { .. } => "raw_serial",
            ClientRequest::Configuration(_) => "configuration",
            ClientRequest::RetrySerial => "retry_serial",
            ClientRequest::CloseSerial => "close_serial",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientMessage {
    pub tick: Tick,
    pub request: ClientRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "history_kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    SentCommand { tick: Tick, request: ClientRequest },
    ReceivedData { content: String },
}

impl HistoryEntry {
    pub fn sent_tick(&self) -> Option<Tick> {
        match self {
            HistoryEntry::SentCommand { tick, .. } => Some(*tick),
            HistoryEntry::ReceivedData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Last tick the service observed from this client. Informational only.
    pub tick: Tick,
    pub serial_available: bool,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_config: Option<SerialConfiguration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseMessage {
    pub status: String,
    pub tick: Tick,
}

impl ResponseMessage {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    State(StateSnapshot),
    Response(ResponseMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("frame exceeds max size: {size} > {max}")]
    Oversized { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

pub fn encode_text<T: Serialize>(value: &T, max_frame_bytes: usize) -> Result<String, WireError> {
    let encoded = serde_json::to_string(value).map_err(|err| WireError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(WireError::Oversized {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}

pub fn decode_text<T: DeserializeOwned>(
    text: &str,
    max_frame_bytes: usize,
) -> Result<T, WireError> {
    let raw = text.trim_end_matches(['\r', '\n']);
    if raw.len() > max_frame_bytes {
        return Err(WireError::Oversized {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_str(raw).map_err(|err| WireError::Decode(err.to_string()))
}

pub fn encode_client_message(
    message: &ClientMessage,
    max_frame_bytes: usize,
) -> Result<String, WireError> {
    encode_text(message, max_frame_bytes)
}

pub fn decode_server_message(
    text: &str,
    max_frame_bytes: usize,
) -> Result<ServerMessage, WireError> {
    decode_text(text, max_frame_bytes)
}
