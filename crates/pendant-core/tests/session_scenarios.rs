use chrono::{DateTime, Duration, TimeZone, Utc};
use pendant_core::{
    ClientRequest, ConnectionState, Effect, Generation, HistoryEntry, IntentTag,
    ReconnectDecision, RequestStatus, Session, SessionError, SessionOptions, Tick, Transport,
    TransportError, TransportEvent,
};
use serde_json::{json, Value};
use url::Url;

#[derive(Debug, Default)]
struct LoopbackTransport {
    opened: Vec<Generation>,
    closes: usize,
    outbound: Vec<String>,
}

impl LoopbackTransport {
    fn outbound_json(&self) -> Vec<Value> {
        self.outbound
            .iter()
            .map(|text| serde_json::from_str(text).expect("outbound json"))
            .collect()
    }
}

impl Transport for LoopbackTransport {
    fn open(&mut self, _url: &Url, generation: Generation) {
        self.opened.push(generation);
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound.push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

fn ts(offset_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_760_000_000_000 + offset_ms)
        .single()
        .expect("valid timestamp")
}

fn new_session() -> Session<LoopbackTransport> {
    let options = SessionOptions {
        url: Url::parse("ws://machine.local:8080/ws").expect("url"),
        max_frame_bytes: pendant_core::wire::DEFAULT_MAX_FRAME_BYTES,
        reconnect_interval: Duration::milliseconds(2_000),
    };
    Session::new(options, LoopbackTransport::default())
}

fn current(session: &Session<LoopbackTransport>) -> Generation {
    session.view().generation()
}

fn push(session: &mut Session<LoopbackTransport>, payload: Value) -> Effect {
    let generation = current(session);
    session
        .on_transport(TransportEvent::message(generation, payload.to_string()))
        .expect("payload applies")
}

fn snapshot(serial_available: bool, history: Value) -> Value {
    json!({
        "kind": "state",
        "tick": 0,
        "serial_available": serial_available,
        "history": history,
    })
}

fn response(status: &str, tick: u32) -> Value {
    json!({"kind": "response", "status": status, "tick": tick})
}

/// Connects and waits for the service to report a usable serial port.
fn ready_session() -> Session<LoopbackTransport> {
    let mut session = new_session();
    session.start();
    let generation = current(&session);
    session
        .on_transport(TransportEvent::opened(generation))
        .expect("opened");
    push(&mut session, snapshot(true, json!([])));
    assert_eq!(
        session.view().connection(),
        ConnectionState::Open { serial_ready: true }
    );
    session
}

#[test]
fn raw_payload_round_trip_marks_intent_done() {
    let mut session = ready_session();

    let tick = session.submit(ClientRequest::raw("G28")).expect("submit");
    assert_eq!(tick, Tick(1));
    let pending: Vec<_> = session.view().pending().collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tick, Tick(1));
    assert_eq!(pending[0].intent, IntentTag::SendRawPayload);
    assert_eq!(
        session.transport().outbound,
        vec![r#"{"tick":1,"request":{"kind":"raw_serial","value":"G28"}}"#.to_string()]
    );

    let effect = push(&mut session, response("ok", 1));
    assert_eq!(
        effect,
        Effect::Resolved {
            tick: Tick(1),
            intent: IntentTag::SendRawPayload,
            ok: true
        }
    );
    assert_eq!(session.view().pending_count(), 0);
    assert_eq!(
        session.view().status(IntentTag::SendRawPayload),
        RequestStatus::Done { ok: true }
    );
}

#[test]
fn close_abandons_history_but_keeps_pending_configuration() {
    let mut session = ready_session();
    for _ in 0..4 {
        session.submit(ClientRequest::RetrySerial).expect("filler");
        let tick = session.view().pending().last().expect("pending").tick;
        push(&mut session, response("ok", tick.get()));
    }
    push(
        &mut session,
        snapshot(true, json!([{"history_kind": "received_data", "content": "ok"}])),
    );
    assert_eq!(session.view().history().len(), 1);

    let tick = session
        .submit(ClientRequest::configuration("/dev/ttyACM0", 250_000))
        .expect("configure");
    assert_eq!(tick, Tick(5));

    let generation = current(&session);
    session
        .on_transport(TransportEvent::closed(generation))
        .expect("closed");

    let view = session.view();
    assert_eq!(view.connection(), ConnectionState::Disconnected);
    assert!(view.history().is_empty());
    let pending: Vec<_> = view.pending().map(|entry| (entry.tick, entry.intent)).collect();
    assert_eq!(pending, vec![(Tick(5), IntentTag::SubmitConfiguration)]);
    assert_eq!(
        view.status(IntentTag::SubmitConfiguration),
        RequestStatus::Pending
    );

    // A late answer on the next channel still resolves.
    assert_eq!(session.on_clock(ts(0)), ReconnectDecision::Armed);
    assert_eq!(session.on_clock(ts(2_000)), ReconnectDecision::Connect);
    let generation = current(&session);
    session
        .on_transport(TransportEvent::opened(generation))
        .expect("reopened");
    let effect = push(&mut session, response("ok", 5));
    assert!(matches!(effect, Effect::Resolved { tick: Tick(5), ok: true, .. }));
    assert!(session.view().awaiting_configuration());

    push(&mut session, snapshot(true, json!([])));
    assert_eq!(
        session.view().status(IntentTag::SubmitConfiguration),
        RequestStatus::Done { ok: true }
    );
}

#[test]
fn unknown_tick_is_discarded_without_side_effects() {
    let mut session = ready_session();
    session.submit(ClientRequest::raw("G0 X10")).expect("first");
    session.submit(ClientRequest::CloseSerial).expect("second");

    let effect = push(&mut session, response("ok", 99));
    assert_eq!(effect, Effect::Discarded { tick: Tick(99) });
    let view = session.view();
    assert_eq!(view.pending_count(), 2);
    assert!(view.notice().is_none());
    assert_eq!(view.status(IntentTag::SendRawPayload), RequestStatus::Pending);
    assert_eq!(view.status(IntentTag::CloseSerial), RequestStatus::Pending);
}

#[test]
fn open_then_close_then_open_wipes_history() {
    let mut session = ready_session();
    push(
        &mut session,
        snapshot(
            false,
            json!([
                {"history_kind": "sent_command", "tick": 3, "request": {"kind": "close_serial"}},
                {"history_kind": "received_data", "content": "closed"}
            ]),
        ),
    );
    assert_eq!(session.view().history().len(), 2);
    assert_eq!(
        session.view().connection(),
        ConnectionState::Open { serial_ready: false }
    );

    let generation = current(&session);
    session
        .on_transport(TransportEvent::closed(generation))
        .expect("closed");
    session.on_clock(ts(0));
    session.on_clock(ts(2_000));
    let generation = current(&session);
    session
        .on_transport(TransportEvent::opened(generation))
        .expect("reopened");

    assert!(session.view().history().is_empty());
    assert_eq!(
        session.view().connection(),
        ConnectionState::Open { serial_ready: false }
    );
}

#[test]
fn snapshot_replaces_history_wholesale() {
    let mut session = ready_session();
    push(
        &mut session,
        snapshot(true, json!([{"history_kind": "received_data", "content": "a"}])),
    );
    push(
        &mut session,
        snapshot(true, json!([{"history_kind": "received_data", "content": "b"}])),
    );
    assert_eq!(
        session.view().history(),
        &[HistoryEntry::ReceivedData {
            content: "b".to_string()
        }]
    );
}

#[test]
fn events_from_a_superseded_channel_are_ignored() {
    let mut session = new_session();
    session.start();
    let stale = current(&session);

    // The first attempt never reports back; the scheduler retries.
    session.on_clock(ts(0));
    session.on_clock(ts(2_500));
    assert_eq!(session.transport().closes, 1);
    assert_ne!(current(&session), stale);

    let effect = session
        .on_transport(TransportEvent::opened(stale))
        .expect("stale open");
    assert_eq!(effect, Effect::Ignored);
    assert_eq!(session.view().connection(), ConnectionState::Disconnected);

    let generation = current(&session);
    session
        .on_transport(TransportEvent::opened(generation))
        .expect("open");
    let effect = session
        .on_transport(TransportEvent::message(stale, response("ok", 1).to_string()))
        .expect("stale message");
    assert_eq!(effect, Effect::Ignored);
}

#[test]
fn requests_are_refused_until_open() {
    let mut session = new_session();
    session.start();
    assert_eq!(
        session.submit(ClientRequest::RetrySerial),
        Err(SessionError::TransportUnavailable)
    );
    assert!(session.transport().outbound.is_empty());

    let generation = current(&session);
    session
        .on_transport(TransportEvent::opened(generation))
        .expect("open");
    assert_eq!(session.submit(ClientRequest::RetrySerial), Ok(Tick(1)));
}

#[test]
fn ticks_keep_climbing_across_reconnects() {
    let mut session = ready_session();
    session.submit(ClientRequest::raw("M105")).expect("first");

    let generation = current(&session);
    session
        .on_transport(TransportEvent::errored(generation, "reset by peer"))
        .expect("errored");
    session.on_clock(ts(0));
    session.on_clock(ts(2_000));
    let generation = current(&session);
    session
        .on_transport(TransportEvent::opened(generation))
        .expect("reopened");

    assert_eq!(session.submit(ClientRequest::raw("M105")), Ok(Tick(2)));
    let ticks: Vec<u64> = session
        .transport()
        .outbound_json()
        .iter()
        .filter_map(|frame| frame["tick"].as_u64())
        .collect();
    assert_eq!(ticks, vec![1, 2]);
}

#[test]
fn raw_payload_echo_lasts_until_snapshot_confirms_it() {
    let mut session = ready_session();
    let tick = session.submit(ClientRequest::raw("$H")).expect("submit");
    push(&mut session, response("ok", tick.get()));

    let echoes: Vec<_> = session
        .view()
        .pending_echoes()
        .map(|echo| echo.value.to_string())
        .collect();
    assert_eq!(echoes, vec!["$H".to_string()]);
    assert!(session.view().history().is_empty());

    push(
        &mut session,
        snapshot(
            true,
            json!([{
                "history_kind": "sent_command",
                "tick": tick.get(),
                "request": {"kind": "raw_serial", "value": "$H"}
            }]),
        ),
    );
    assert_eq!(session.view().pending_echoes().count(), 0);
    assert_eq!(session.view().history().len(), 1);
}

#[test]
fn rejected_unparseable_request_is_discarded() {
    let mut session = ready_session();
    session.submit(ClientRequest::RetrySerial).expect("submit");

    let effect = push(&mut session, response("failed", 0));
    assert_eq!(effect, Effect::Discarded { tick: Tick(0) });
    assert_eq!(session.view().pending_count(), 1);
}
