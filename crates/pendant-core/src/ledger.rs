use crate::tick::Tick;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The UI-level purpose behind an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    SubmitConfiguration,
    SendRawPayload,
    RetrySerial,
    CloseSerial,
}

impl IntentTag {
    pub const ALL: [IntentTag; 4] = [
        IntentTag::SubmitConfiguration,
        IntentTag::SendRawPayload,
        IntentTag::RetrySerial,
        IntentTag::CloseSerial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentTag::SubmitConfiguration => "submit_configuration",
            IntentTag::SendRawPayload => "send_raw_payload",
            IntentTag::RetrySerial => "retry_serial",
            IntentTag::CloseSerial => "close_serial",
        }
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub tick: Tick,
    pub intent: IntentTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("tick {0} is already pending")]
    DuplicateTick(Tick),
}

/// Outstanding requests keyed by tick. Entries leave only through
/// [`PendingLedger::resolve`]; there is no expiry.
#[derive(Debug, Default)]
pub struct PendingLedger {
    pending: BTreeMap<Tick, IntentTag>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, tick: Tick, intent: IntentTag) -> Result<(), LedgerError> {
        if self.pending.contains_key(&tick) {
            return Err(LedgerError::DuplicateTick(tick));
        }
        self.pending.insert(tick, intent);
        Ok(())
    }

    pub fn resolve(&mut self, tick: Tick) -> Option<IntentTag> {
        self.pending.remove(&tick)
    }

    pub fn contains(&self, tick: Tick) -> bool {
        self.pending.contains_key(&tick)
    }

    pub fn has_pending(&self, intent: IntentTag) -> bool {
        self.pending.values().any(|tracked| *tracked == intent)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = PendingRequest> + '_ {
        self.pending
            .iter()
            .map(|(tick, intent)| PendingRequest {
                tick: *tick,
                intent: *intent,
            })
    }
}
