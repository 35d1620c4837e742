#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Session driver integration tests.
//!
//! Drives `SessionDriver` over a scripted in-memory transport and checks the
//! state path, the frames sent and the ticks delivered.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use ctrader_spot_stream::infrastructure::ctrader::HeartbeatConfig;
use ctrader_spot_stream::{
    AccountSelection, Credentials, DriverConfig, HandshakeStep, Session, SessionDriver,
    SessionError, SessionOutcome, SessionState, SpotEvent, Transport, TransportError,
};
use serde_json::{Value, json};
use test_case::test_case;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Scripted Transport
// =============================================================================

enum Scripted {
    Frame(String),
    Close,
    Fail(TransportError),
}

struct ScriptedTransport {
    inbound: VecDeque<Scripted>,
    sent: Vec<String>,
    hang_when_empty: bool,
    closed: bool,
}

impl ScriptedTransport {
    fn new(inbound: Vec<Scripted>) -> Self {
        Self {
            inbound: inbound.into(),
            sent: Vec::new(),
            hang_when_empty: false,
            closed: false,
        }
    }

    fn hanging(inbound: Vec<Scripted>) -> Self {
        Self {
            hang_when_empty: true,
            ..Self::new(inbound)
        }
    }

    fn sent_types(&self) -> Vec<u64> {
        self.sent
            .iter()
            .map(|f| {
                serde_json::from_str::<Value>(f).unwrap()["payloadType"]
                    .as_u64()
                    .unwrap()
            })
            .collect()
    }

    fn sent_payload(&self, index: usize) -> Value {
        serde_json::from_str::<Value>(&self.sent[index]).unwrap()["payload"].clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sent.push(frame);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.pop_front() {
            Some(Scripted::Frame(frame)) => Ok(Some(frame)),
            Some(Scripted::Close) => Ok(None),
            Some(Scripted::Fail(e)) => Err(e),
            None if self.hang_when_empty => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const ACCOUNT_ID: i64 = 45_211_659;

fn frame(payload_type: u32, payload: Value) -> Scripted {
    Scripted::Frame(
        json!({"clientMsgId": "srv", "payloadType": payload_type, "payload": payload}).to_string(),
    )
}

fn app_auth_ok() -> Scripted {
    frame(2101, json!({}))
}

fn accounts() -> Scripted {
    frame(
        2150,
        json!({"ctidTraderAccount": [{"ctidTraderAccountId": ACCOUNT_ID, "isLive": false}]}),
    )
}

fn account_auth_ok() -> Scripted {
    frame(2103, json!({"ctidTraderAccountId": ACCOUNT_ID}))
}

fn symbols() -> Scripted {
    frame(
        2115,
        json!({"ctidTraderAccountId": ACCOUNT_ID, "symbol": [
            {"symbolId": 2, "symbolName": "GBPUSD"},
            {"symbolId": 1, "symbolName": "EURUSD"}
        ]}),
    )
}

fn subscribe_ok() -> Scripted {
    frame(2128, json!({"ctidTraderAccountId": ACCOUNT_ID}))
}

fn spot() -> Scripted {
    frame(
        2131,
        json!({
            "ctidTraderAccountId": ACCOUNT_ID,
            "symbolId": 1,
            "bid": 115_920,
            "ask": 115_920,
            "timestamp": 1_762_887_809_806_i64
        }),
    )
}

fn expected_spot() -> SpotEvent {
    SpotEvent {
        symbol_id: 1,
        bid: Some(115_920),
        ask: Some(115_920),
        timestamp_millis: Some(1_762_887_809_806),
    }
}

fn handshake() -> Vec<Scripted> {
    vec![app_auth_ok(), accounts(), account_auth_ok(), symbols()]
}

fn quiet_config() -> DriverConfig {
    DriverConfig {
        step_timeout: Some(Duration::from_secs(15)),
        heartbeat: HeartbeatConfig::disabled(),
    }
}

type Driver = SessionDriver<ScriptedTransport, Vec<SpotEvent>>;

fn driver(transport: ScriptedTransport, symbol: &str, config: DriverConfig) -> Driver {
    let credentials = Credentials::new("A".to_string(), "B".to_string(), "token".to_string());
    let session = Session::new(credentials, symbol, AccountSelection::First);
    SessionDriver::new(session, transport, Vec::new(), config)
}

async fn run(script: Vec<Scripted>) -> (Result<SessionOutcome, SessionError>, Driver) {
    let mut driver = driver(ScriptedTransport::new(script), "EURUSD", quiet_config());
    let result = driver.run(CancellationToken::new()).await;
    (result, driver)
}

// =============================================================================
// Successful Handshake
// =============================================================================

#[tokio::test]
async fn scripted_handshake_streams_one_spot_event() {
    let mut script = handshake();
    script.extend([subscribe_ok(), spot()]);

    let (result, driver) = run(script).await;

    assert_eq!(result.unwrap(), SessionOutcome::ConnectionClosed);
    assert_eq!(driver.session().state(), SessionState::Streaming);
    assert_eq!(driver.sink(), &[expected_spot()]);
    assert_eq!(driver.session().history(), SessionState::HANDSHAKE_ORDER);
    assert_eq!(
        driver.transport().sent_types(),
        [2100, 2149, 2102, 2114, 2127]
    );
}

#[tokio::test]
async fn requests_carry_resolved_ids() {
    let mut script = handshake();
    script.push(subscribe_ok());

    let (_, driver) = run(script).await;
    let transport = driver.transport();

    assert_eq!(
        transport.sent_payload(0),
        json!({"clientId": "A", "clientSecret": "B"})
    );
    assert_eq!(transport.sent_payload(1), json!({"accessToken": "token"}));
    assert_eq!(
        transport.sent_payload(2),
        json!({"ctidTraderAccountId": ACCOUNT_ID, "accessToken": "token"})
    );
    assert_eq!(
        transport.sent_payload(3),
        json!({"ctidTraderAccountId": ACCOUNT_ID, "includeArchivedSymbols": false})
    );
    assert_eq!(
        transport.sent_payload(4),
        json!({
            "ctidTraderAccountId": ACCOUNT_ID,
            "symbolId": [1],
            "subscribeToSpotTimestamp": true
        })
    );
}

#[tokio::test]
async fn confirmation_and_event_orderings_agree() {
    let mut confirm_first = handshake();
    confirm_first.extend([subscribe_ok(), spot()]);
    let mut event_first = handshake();
    event_first.extend([spot(), subscribe_ok()]);

    let (a, driver_a) = run(confirm_first).await;
    let (b, driver_b) = run(event_first).await;

    assert_eq!(a.unwrap(), SessionOutcome::ConnectionClosed);
    assert_eq!(b.unwrap(), SessionOutcome::ConnectionClosed);
    for driver in [&driver_a, &driver_b] {
        assert_eq!(driver.session().state(), SessionState::Streaming);
        assert!(driver.session().subscription_confirmed());
        assert_eq!(driver.session().history(), SessionState::HANDSHAKE_ORDER);
    }
    assert_eq!(driver_a.sink(), driver_b.sink());
    assert_eq!(driver_a.sink(), &[expected_spot()]);
}

#[tokio::test]
async fn duplicate_confirmation_changes_nothing() {
    let mut script = handshake();
    script.extend([subscribe_ok(), subscribe_ok(), spot(), subscribe_ok()]);

    let (result, driver) = run(script).await;

    assert!(result.is_ok());
    assert_eq!(driver.sink().len(), 1);
    assert_eq!(driver.session().history(), SessionState::HANDSHAKE_ORDER);
}

#[tokio::test]
async fn extraneous_messages_do_not_disturb_the_handshake() {
    let noise = || {
        vec![
            frame(51, json!({})),
            frame(2126, json!({"unmodelled": true})),
            frame(2131, json!({"symbolId": 99, "bid": 1})),
            frame(2130, json!({})),
        ]
    };

    let mut script = Vec::new();
    for response in [app_auth_ok(), accounts(), account_auth_ok(), symbols(), subscribe_ok()] {
        script.extend(noise());
        script.push(response);
    }
    script.push(spot());

    let (result, driver) = run(script).await;

    assert!(result.is_ok());
    assert_eq!(driver.session().history(), SessionState::HANDSHAKE_ORDER);
    assert_eq!(driver.sink(), &[expected_spot()]);
    assert_eq!(driver.transport().sent_types().len(), 5);
}

#[tokio::test]
async fn streaming_survives_errors_and_bad_frames() {
    let mut script = handshake();
    script.extend([
        subscribe_ok(),
        frame(2142, json!({"errorCode": "INTERNAL", "description": "hiccup"})),
        Scripted::Frame("{not json".to_string()),
        frame(2131, json!({"bid": 1})),
        spot(),
    ]);

    let (result, driver) = run(script).await;

    assert_eq!(result.unwrap(), SessionOutcome::ConnectionClosed);
    assert_eq!(driver.sink(), &[expected_spot()]);
    assert_eq!(driver.session().state(), SessionState::Streaming);
}

#[tokio::test]
async fn ticks_without_prices_are_delivered() {
    let mut script = handshake();
    script.extend([subscribe_ok(), frame(2131, json!({"symbolId": "1"}))]);

    let (_, driver) = run(script).await;

    assert_eq!(
        driver.sink(),
        &[SpotEvent {
            symbol_id: 1,
            bid: None,
            ask: None,
            timestamp_millis: None,
        }]
    );
}

// =============================================================================
// Handshake Failures
// =============================================================================

#[tokio::test]
async fn empty_accounts_stop_the_handshake() {
    let script = vec![
        app_auth_ok(),
        frame(2150, json!({"ctidTraderAccount": []})),
        account_auth_ok(),
        symbols(),
    ];

    let (result, driver) = run(script).await;

    let err = result.unwrap_err();
    assert!(matches!(
        &err,
        SessionError::NoAccounts {
            step: HandshakeStep::AccountsLookup,
            payload_type: 2150,
            raw,
            ..
        } if raw.contains("ctidTraderAccount")
    ));
    assert!(err.to_string().contains("accounts_lookup"));
    assert!(err.hint().is_some());
    assert_eq!(driver.session().state(), SessionState::Failed);
    assert_eq!(driver.transport().sent_types(), [2100, 2149]);
}

#[tokio::test]
async fn missing_symbol_stops_the_handshake() {
    let mut transport_script = vec![app_auth_ok(), accounts(), account_auth_ok(), symbols()];
    transport_script.push(subscribe_ok());
    let mut driver = driver(
        ScriptedTransport::new(transport_script),
        "XAUUSD",
        quiet_config(),
    );

    let err = driver.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        &err,
        SessionError::SymbolNotFound {
            step: HandshakeStep::SymbolsLookup,
            payload_type: 2115,
            symbol,
            available: 2,
            raw,
        } if symbol == "XAUUSD" && raw.contains("GBPUSD")
    ));
    assert_eq!(driver.transport().sent_types(), [2100, 2149, 2102, 2114]);
}

#[test_case(0, HandshakeStep::ApplicationAuth ; "application auth")]
#[test_case(1, HandshakeStep::AccountsLookup ; "accounts lookup")]
#[test_case(2, HandshakeStep::AccountAuth ; "account auth")]
#[test_case(3, HandshakeStep::SymbolsLookup ; "symbols lookup")]
#[test_case(4, HandshakeStep::Subscribe ; "subscribe")]
#[tokio::test]
async fn error_response_fails_the_step(answered: usize, expected: HandshakeStep) {
    let mut script: Vec<Scripted> = handshake().into_iter().take(answered).collect();
    script.push(frame(
        2142,
        json!({"errorCode": "CH_ACCESS_TOKEN_INVALID", "description": "Invalid token"}),
    ));

    let (result, driver) = run(script).await;

    match result.unwrap_err() {
        SessionError::Protocol {
            step,
            payload_type,
            error_code,
            raw,
            ..
        } => {
            assert_eq!(step, Some(expected));
            assert_eq!(payload_type, 2142);
            assert_eq!(error_code, "CH_ACCESS_TOKEN_INVALID");
            assert!(raw.contains("Invalid token"));
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert_eq!(driver.session().state(), SessionState::Failed);
    assert_eq!(driver.transport().sent.len(), answered + 1);
}

#[tokio::test]
async fn common_error_fails_the_handshake() {
    let script = vec![frame(50, json!({"errorCode": "UNSUPPORTED_MESSAGE"}))];
    let (result, _) = run(script).await;
    assert!(matches!(
        result,
        Err(SessionError::Protocol {
            payload_type: 50,
            ..
        })
    ));
}

#[tokio::test]
async fn malformed_frame_fails_the_handshake() {
    let script = vec![app_auth_ok(), Scripted::Frame("not json".to_string())];

    let (result, _) = run(script).await;

    match result.unwrap_err() {
        SessionError::Decode { step, raw, .. } => {
            assert_eq!(step, Some(HandshakeStep::AccountsLookup));
            assert_eq!(raw, "not json");
        }
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn close_before_streaming_is_a_transport_error() {
    let script = vec![app_auth_ok(), Scripted::Close];
    let (result, driver) = run(script).await;
    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::Closed))
    ));
    assert_eq!(driver.session().state(), SessionState::Failed);
}

#[tokio::test]
async fn transport_fault_is_fatal() {
    let script = vec![Scripted::Fail(TransportError::WebSocket("reset".to_string()))];
    let (result, _) = run(script).await;
    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::WebSocket(_)))
    ));
}

#[tokio::test]
async fn run_twice_is_rejected() {
    let mut script = handshake();
    script.push(subscribe_ok());
    let (_, mut driver) = run(script).await;

    assert!(matches!(
        driver.run(CancellationToken::new()).await,
        Err(SessionError::UnexpectedState { .. })
    ));
}

// =============================================================================
// Timers and Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn silent_step_times_out() {
    let transport = ScriptedTransport::hanging(vec![app_auth_ok()]);
    let mut driver = driver(transport, "EURUSD", quiet_config());

    let err = driver.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::HandshakeTimeout {
            step: HandshakeStep::AccountsLookup,
            timeout,
        } if timeout == Duration::from_secs(15)
    ));
    assert_eq!(driver.session().state(), SessionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_are_sent_while_waiting() {
    let config = DriverConfig {
        step_timeout: Some(Duration::from_secs(12)),
        heartbeat: HeartbeatConfig::new(Duration::from_secs(5), Duration::ZERO),
    };
    let mut driver = driver(ScriptedTransport::hanging(Vec::new()), "EURUSD", config);

    let err = driver.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::HandshakeTimeout {
            step: HandshakeStep::ApplicationAuth,
            ..
        }
    ));
    assert_eq!(driver.transport().sent_types(), [2100, 51, 51]);
}

#[tokio::test(start_paused = true)]
async fn streaming_has_no_step_timeout() {
    let mut script = handshake();
    script.push(subscribe_ok());
    let mut driver = driver(ScriptedTransport::hanging(script), "EURUSD", quiet_config());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        trigger.cancel();
    });

    let outcome = driver.run(cancel).await.unwrap();

    assert_eq!(outcome, SessionOutcome::Interrupted);
    assert_eq!(driver.session().state(), SessionState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn interrupt_while_streaming_unsubscribes_and_closes() {
    let mut script = handshake();
    script.extend([subscribe_ok(), spot()]);
    let mut driver = driver(ScriptedTransport::hanging(script), "EURUSD", quiet_config());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let outcome = driver.run(cancel).await.unwrap();

    assert_eq!(outcome, SessionOutcome::Interrupted);
    let transport = driver.transport();
    assert_eq!(transport.sent_types().last(), Some(&2129));
    assert_eq!(
        transport.sent_payload(transport.sent.len() - 1),
        json!({"ctidTraderAccountId": ACCOUNT_ID, "symbolId": [1]})
    );
    assert!(transport.closed);
}

#[tokio::test]
async fn interrupt_during_handshake_sends_nothing_more() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut driver = driver(ScriptedTransport::hanging(handshake()), "EURUSD", quiet_config());

    let outcome = driver.run(cancel).await.unwrap();

    assert_eq!(outcome, SessionOutcome::Interrupted);
    assert_eq!(driver.transport().sent_types(), [2100]);
    assert!(driver.transport().closed);
}
