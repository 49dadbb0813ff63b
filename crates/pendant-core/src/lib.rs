//! Client-side protocol core for driving a remote serial device over a
//! WebSocket: tick allocation, pending-request correlation, connection
//! state and reconnect scheduling. No I/O happens here; the transport is a
//! trait the binary implements.

pub mod config;
pub mod connection;
pub mod correlator;
pub mod ledger;
pub mod reconnect;
pub mod session;
pub mod tick;
pub mod transport;
pub mod view;
pub mod wire;

pub use config::{ClientConfig, ConfigError, LoggingConfig, Overrides, SessionOptions};
pub use connection::{ConnectionState, ControlSignal, Transition};
pub use correlator::{CorrelationError, Effect, Inbound};
pub use ledger::{IntentTag, LedgerError, PendingLedger, PendingRequest};
pub use reconnect::{ReconnectDecision, ReconnectScheduler};
pub use session::{Session, SessionError};
pub use tick::{Tick, TickAllocator};
pub use transport::{Generation, Transport, TransportError, TransportEvent, TransportEventKind};
pub use view::{Echo, Notice, RequestStatus, SessionView};
pub use wire::{
    ClientMessage, ClientRequest, HistoryEntry, ResponseMessage, SerialConfiguration,
    ServerMessage, StateSnapshot, WireError,
};
