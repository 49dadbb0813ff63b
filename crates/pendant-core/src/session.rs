//! The owned protocol context: every ledger, connection and history mutation
//! happens through a `Session`, one event at a time.

use crate::config::SessionOptions;
use crate::connection::{ConnectionMachine, ControlSignal, Transition};
use crate::correlator::{classify_event, classify_payload, CorrelationError, Effect, Inbound};
use crate::ledger::{IntentTag, LedgerError, PendingLedger};
use crate::reconnect::{ReconnectDecision, ReconnectScheduler};
use crate::tick::{Tick, TickAllocator};
use crate::transport::{Generation, Transport, TransportEvent, TransportEventKind};
use crate::view::{Notice, RequestStatus, SessionView};
use crate::wire::{
    encode_client_message, ClientMessage, ClientRequest, HistoryEntry, ResponseMessage,
    SerialConfiguration, StateSnapshot, WireError,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("transport unavailable; request not sent")]
    TransportUnavailable,
    #[error("request encode failed: {0}")]
    Encode(#[from] WireError),
    #[error("ledger invariant violated: {0}")]
    Invariant(#[from] LedgerError),
}

pub struct Session<T> {
    options: SessionOptions,
    transport: T,
    generation: Generation,
    channel_live: bool,
    ticks: TickAllocator,
    ledger: PendingLedger,
    connection: ConnectionMachine,
    reconnect: ReconnectScheduler,
    history: Vec<HistoryEntry>,
    last_config: Option<SerialConfiguration>,
    server_tick: Option<Tick>,
    statuses: BTreeMap<IntentTag, RequestStatus>,
    configuration_ack: Option<Tick>,
    /// Highest configuration tick answered so far, with its outcome.
    configuration_latest: Option<(Tick, bool)>,
    echoes: BTreeMap<Tick, String>,
    notice: Option<Notice>,
}

impl<T: Transport> Session<T> {
    pub fn new(options: SessionOptions, transport: T) -> Self {
        let reconnect = ReconnectScheduler::new(options.reconnect_interval);
        Self {
            options,
            transport,
            generation: Generation::default(),
            channel_live: false,
            ticks: TickAllocator::new(),
            ledger: PendingLedger::new(),
            connection: ConnectionMachine::new(),
            reconnect,
            history: Vec::new(),
            last_config: None,
            server_tick: None,
            statuses: BTreeMap::new(),
            configuration_ack: None,
            configuration_latest: None,
            echoes: BTreeMap::new(),
            notice: None,
        }
    }

    /// Issues the first connect. Later attempts come from [`Session::on_clock`].
    pub fn start(&mut self) {
        self.connect();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            connection: self.connection.state(),
            generation: self.generation,
            history: &self.history,
            statuses: &self.statuses,
            pending: &self.ledger,
            echoes: &self.echoes,
            notice: self.notice.as_ref(),
            last_config: self.last_config.as_ref(),
            server_tick: self.server_tick,
            awaiting_configuration: self.configuration_ack.is_some(),
        }
    }

    pub fn dismiss_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    pub fn submit(&mut self, request: ClientRequest) -> Result<Tick, SessionError> {
        let intent = request.intent();
        if !self.connection.state().is_open() {
            warn!(
                event = "request_refused",
                reason = "disconnected",
                intent = intent.as_str()
            );
            return Err(SessionError::TransportUnavailable);
        }

        let tick = self.ticks.next();
        let message = ClientMessage { tick, request };
        let text = encode_client_message(&message, self.options.max_frame_bytes)?;

        if let Err(err) = self.ledger.track(tick, intent) {
            error!(event = "ledger_invariant", %tick, "{err}");
            return Err(err.into());
        }
        if let Err(err) = self.transport.send(text) {
            self.ledger.resolve(tick);
            warn!(event = "request_send_failed", %tick, intent = intent.as_str(), "{err}");
            return Err(SessionError::TransportUnavailable);
        }

        if let ClientRequest::RawSerial { value } = message.request {
            self.echoes.insert(tick, value);
        }
        self.statuses.insert(intent, RequestStatus::Pending);
        info!(
            event = "request_sent",
            %tick,
            intent = intent.as_str(),
            pending = self.ledger.len()
        );
        Ok(tick)
    }

    pub fn on_clock(&mut self, now: DateTime<Utc>) -> ReconnectDecision {
        let decision = self.reconnect.on_clock(self.connection.state(), now);
        match decision {
            ReconnectDecision::Connect => self.connect(),
            ReconnectDecision::Armed => {
                debug!(
                    event = "reconnect_armed",
                    interval_ms = self.reconnect.interval().num_milliseconds()
                );
            }
            ReconnectDecision::Idle | ReconnectDecision::Waiting => {}
        }
        decision
    }

    pub fn on_transport(&mut self, event: TransportEvent) -> Result<Effect, CorrelationError> {
        if event.generation != self.generation {
            debug!(
                event = "stale_transport_event",
                generation = %event.generation,
                current = %self.generation
            );
            return Ok(Effect::Ignored);
        }

        if let TransportEventKind::Errored(reason) = &event.kind {
            warn!(event = "transport_error", generation = %self.generation, %reason);
        }
        match classify_event(&event, self.options.max_frame_bytes) {
            Ok(inbound) => Ok(self.apply(inbound)),
            Err(err) => Err(self.malformed(&event.kind, err)),
        }
    }

    /// Classifies and applies one inbound data payload. A malformed payload
    /// raises a notice and leaves ledger and connection untouched.
    pub fn handle(&mut self, raw: &str) -> Result<Effect, CorrelationError> {
        match classify_payload(raw, self.options.max_frame_bytes) {
            Ok(inbound) => Ok(self.apply(inbound)),
            Err(err) => {
                warn!(event = "malformed_payload", bytes = raw.len(), "{err}");
                Err(self.raise_notice(err))
            }
        }
    }

    fn apply(&mut self, inbound: Inbound) -> Effect {
        match inbound {
            Inbound::Control(signal) => self.apply_control(signal),
            Inbound::Snapshot(snapshot) => self.apply_snapshot(snapshot),
            Inbound::Response(response) => self.apply_response(response),
        }
    }

    fn malformed(&mut self, kind: &TransportEventKind, err: CorrelationError) -> CorrelationError {
        let bytes = match kind {
            TransportEventKind::Message(text) => text.len(),
            _ => 0,
        };
        warn!(event = "malformed_payload", bytes, "{err}");
        self.raise_notice(err)
    }

    fn raise_notice(&mut self, err: CorrelationError) -> CorrelationError {
        self.notice = Some(Notice {
            message: err.to_string(),
            raised_at: Utc::now(),
        });
        err
    }

    fn connect(&mut self) {
        if self.channel_live {
            self.transport.close();
        }
        self.generation = self.generation.next();
        self.channel_live = true;
        info!(event = "connect_attempt", generation = %self.generation, url = %self.options.url);
        self.transport.open(&self.options.url, self.generation);
    }

    fn apply_control(&mut self, signal: ControlSignal) -> Effect {
        let transition = self.connection.apply_control(signal);
        match signal {
            ControlSignal::Opened => {
                info!(event = "connection_opened", generation = %self.generation);
            }
            ControlSignal::Closed | ControlSignal::Errored => {
                self.channel_live = false;
                if transition.lost() {
                    self.history.clear();
                    self.echoes.clear();
                    warn!(
                        event = "connection_lost",
                        generation = %self.generation,
                        abandoned = self.ledger.len()
                    );
                } else {
                    warn!(event = "connect_failed", generation = %self.generation);
                }
            }
        }
        if transition.changed() {
            Effect::Connection(transition)
        } else {
            Effect::Ignored
        }
    }

    fn apply_snapshot(&mut self, snapshot: StateSnapshot) -> Effect {
        let transition: Transition = self.connection.apply_snapshot(snapshot.serial_available);
        if transition.changed() {
            info!(event = "serial_readiness", ready = transition.to.serial_ready());
        }

        let confirmed: HashSet<Tick> = snapshot
            .history
            .iter()
            .filter_map(HistoryEntry::sent_tick)
            .collect();
        self.echoes.retain(|tick, _| !confirmed.contains(tick));

        self.history = snapshot.history;
        self.last_config = snapshot.last_config;
        let snapshot_tick = snapshot.tick;
        self.server_tick = Some(snapshot_tick);

        let configuration_settled = match self.configuration_ack.take() {
            Some(tick) => {
                debug!(event = "configuration_settled", %tick);
                self.settle(IntentTag::SubmitConfiguration, true);
                true
            }
            None => false,
        };

        debug!(
            event = "snapshot_applied",
            server_tick = %snapshot_tick,
            entries = self.history.len(),
            serial_ready = transition.to.serial_ready()
        );
        Effect::SnapshotApplied {
            transition,
            entries: self.history.len(),
            configuration_settled,
        }
    }

    fn apply_response(&mut self, response: ResponseMessage) -> Effect {
        let tick = response.tick;
        let Some(intent) = self.ledger.resolve(tick) else {
            if tick == Tick::UNPARSEABLE && !response.is_ok() {
                warn!(
                    event = "request_rejected",
                    status = %response.status,
                    "service could not parse a request"
                );
            } else {
                debug!(event = "response_discarded", %tick, status = %response.status);
            }
            return Effect::Discarded { tick };
        };

        let ok = response.is_ok();
        if !ok {
            self.echoes.remove(&tick);
        }
        info!(event = "response_resolved", %tick, intent = intent.as_str(), ok);

        if intent == IntentTag::SubmitConfiguration {
            self.resolve_configuration(tick, ok);
        } else {
            self.settle(intent, ok);
        }

        Effect::Resolved { tick, intent, ok }
    }

    /// Only the newest answered configuration decides the status. An ok
    /// answer waits for the next snapshot; a failure supersedes any older ack.
    fn resolve_configuration(&mut self, tick: Tick, ok: bool) {
        if let Some((latest, latest_ok)) = self.configuration_latest {
            if latest > tick {
                debug!(event = "configuration_superseded", %tick, ok, %latest);
                // The newer outcome may have been held back by this request.
                if !latest_ok {
                    self.settle(IntentTag::SubmitConfiguration, false);
                } else if self.configuration_ack.is_none() {
                    self.settle(IntentTag::SubmitConfiguration, true);
                }
                return;
            }
        }
        self.configuration_latest = Some((tick, ok));
        if ok {
            self.configuration_ack = Some(tick);
        } else {
            self.configuration_ack = None;
            self.settle(IntentTag::SubmitConfiguration, false);
        }
    }

    /// A newer request of the same intent still in flight keeps it pending.
    fn settle(&mut self, intent: IntentTag, ok: bool) {
        let status = if self.ledger.has_pending(intent) {
            RequestStatus::Pending
        } else {
            RequestStatus::Done { ok }
        };
        self.statuses.insert(intent, status);
    }
}
