// Session tests: the client runs over an in-memory duplex stream and the
// test plays the panel on the other end.

use std::sync::Arc;

use qolsys_iq_client::{
    Action, AlarmEvent, ArmingEvent, ClientConfig, ClientEvent, DisconnectReason, ErrorEvent,
    Event, PanelClient, PanelError, PanelListener, SecureArmInfo, SummaryInfo, ZoneActiveEvent,
    ZoneAddEvent, ZoneUpdateEvent,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep, timeout};

/// The panel's side of the connection.
struct Peer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    write: WriteHalf<DuplexStream>,
}

impl Peer {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.next_line().await.unwrap()
    }

    async fn expect_line(&mut self) -> String {
        self.next_line().await.expect("client closed the connection")
    }

    async fn send(&mut self, line: &str) {
        self.write.write_all(line.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
    }

    async fn ack(&mut self) {
        self.send("ACK").await;
    }
}

/// Attach `client` to a fresh duplex and ACK the initial probe.
async fn connect(client: &PanelClient) -> Peer {
    let (ours, theirs) = tokio::io::duplex(64 * 1024);
    let (read, write) = tokio::io::split(theirs);
    let mut peer = Peer {
        lines: BufReader::new(read).lines(),
        write,
    };

    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect_with(ours).await })
    };
    assert_eq!(peer.expect_line().await, "");
    peer.ack().await;
    connecting.await.unwrap().unwrap();
    peer
}

fn config() -> ClientConfig {
    ClientConfig::builder().host("panel.test").name("test").build()
}

/// Records which callback fired, in order.
struct Recorder {
    tx: mpsc::UnboundedSender<String>,
}

impl Recorder {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn record(&self, name: &str) {
        let _ = self.tx.send(name.to_string());
    }
}

impl PanelListener for Recorder {
    fn alarm_event(&self, _event: &AlarmEvent) {
        self.record("alarm");
    }
    fn arming_event(&self, _event: &ArmingEvent) {
        self.record("arming");
    }
    fn error_event(&self, _event: &ErrorEvent) {
        self.record("error");
    }
    fn summary_info_event(&self, _event: &SummaryInfo) {
        self.record("summary");
    }
    fn secure_arm_info_event(&self, _event: &SecureArmInfo) {
        self.record("secure_arm");
    }
    fn zone_active_event(&self, _event: &ZoneActiveEvent) {
        self.record("zone_active");
    }
    fn zone_update_event(&self, _event: &ZoneUpdateEvent) {
        self.record("zone_update");
    }
    fn zone_add_event(&self, _event: &ZoneAddEvent) {
        self.record("zone_add");
    }
    fn disconnected(&self, reason: &DisconnectReason) {
        self.record(&format!("disconnected: {reason}"));
    }
}

async fn next_panel_event(rx: &mut qolsys_iq_client::EventReceiver) -> Event {
    loop {
        match rx.recv().await.unwrap() {
            ClientEvent::Panel(event) => return event,
            ClientEvent::Disconnected(reason) => panic!("unexpected disconnect: {reason}"),
        }
    }
}

// =========================================================================
// Connect
// =========================================================================

#[tokio::test]
async fn test_connect_sends_probe_and_marks_connected() {
    let client = PanelClient::new(config());
    assert!(!client.is_connected());
    let _peer = connect(&client).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_connect_while_connected_is_noop() {
    let client = PanelClient::new(config());
    let _peer = connect(&client).await;

    let (ours, theirs) = tokio::io::duplex(1024);
    client.connect_with(ours).await.unwrap();

    // The second stream was never used
    let mut theirs = BufReader::new(theirs);
    let mut line = String::new();
    assert_eq!(theirs.read_line(&mut line).await.unwrap(), 0);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_probe_fails_connect() {
    let client = PanelClient::new(config());
    let (recorder, mut calls) = Recorder::new();
    client.subscribe(recorder);

    let (ours, theirs) = tokio::io::duplex(1024);
    let err = client.connect_with(ours).await.unwrap_err();
    assert!(matches!(err, PanelError::AckTimeout { .. }), "unexpected {err:?}");
    assert!(!client.is_connected());

    // A session that never came up is not reported as lost
    sleep(Duration::from_secs(60)).await;
    assert!(calls.try_recv().is_err());
    drop(theirs);
}

// =========================================================================
// Send
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_send_acknowledged_within_two_seconds() {
    let client = PanelClient::new(config());
    let mut peer = connect(&client).await;

    let sending = {
        let client = client.clone();
        tokio::spawn(async move { client.send(&Action::summary("secret")).await })
    };

    let frame: Value = serde_json::from_str(&peer.expect_line().await).unwrap();
    assert_eq!(frame["action"], "INFO");
    assert_eq!(frame["info_type"], "SUMMARY");
    assert_eq!(frame["token"], "secret");
    assert_eq!(frame["source"], "C4");

    sleep(Duration::from_secs(2)).await;
    peer.ack().await;
    sending.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ack_timeout_leaves_session_connected() {
    let client = PanelClient::new(config());
    let mut peer = connect(&client).await;

    let started = Instant::now();
    let sending = {
        let client = client.clone();
        tokio::spawn(async move { client.send(&Action::summary("secret")).await })
    };
    peer.expect_line().await;

    let err = sending.await.unwrap().unwrap_err();
    assert!(matches!(err, PanelError::AckTimeout { ref command } if command == "INFO"));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(client.is_connected());

    // The session still works
    let sending = {
        let client = client.clone();
        tokio::spawn(async move { client.send(&Action::summary("secret")).await })
    };
    peer.expect_line().await;
    peer.ack().await;
    sending.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sends_are_serialized() {
    const SENDS: usize = 10;
    let client = PanelClient::new(config());
    let mut peer = connect(&client).await;

    let mut senders = Vec::new();
    for partition in 0..SENDS as u32 {
        let client = client.clone();
        senders.push(tokio::spawn(async move {
            client
                .send(&Action::alarm(
                    "secret",
                    qolsys_iq_client::AlarmCommandType::Police,
                    partition,
                ))
                .await
        }));
    }

    let mut partitions = Vec::new();
    for _ in 0..SENDS {
        let line = peer.expect_line().await;
        let frame: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(frame["action"], "ALARM");
        partitions.push(frame["partition_id"].as_u64().unwrap());

        // Nothing else is written until this frame is acknowledged
        assert!(
            timeout(Duration::from_millis(500), peer.next_line())
                .await
                .is_err()
        );
        peer.ack().await;
    }

    for sender in senders {
        sender.await.unwrap().unwrap();
    }
    partitions.sort_unstable();
    assert_eq!(partitions, (0..SENDS as u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_send_while_disconnected_writes_nothing() {
    let client = PanelClient::new(config());
    let mut peer = connect(&client).await;
    client.disconnect().await;

    let err = client.send(&Action::summary("secret")).await.unwrap_err();
    assert!(matches!(err, PanelError::NotConnected));

    // The peer only ever sees EOF
    assert_eq!(peer.next_line().await, None);
}

// =========================================================================
// Events
// =========================================================================

#[tokio::test]
async fn test_alarm_arming_error_decoded() {
    let client = PanelClient::new(config());
    let mut events = client.subscribe_events();
    let mut peer = connect(&client).await;

    peer.send(r#"{"event":"ALARM","alarm_type":"FIRE","partition_id":0,"version":1}"#)
        .await;
    peer.send(r#"{"event":"ARMING","arming_type":"EXIT_DELAY","partition_id":1,"delay":30}"#)
        .await;
    peer.send(
        r#"{"event":"ERROR","error_type":"usercode","partition_id":0,"description":"Invalid usercode"}"#,
    )
    .await;

    match next_panel_event(&mut events).await {
        Event::Alarm(e) => {
            assert_eq!(e.alarm_type, qolsys_iq_client::AlarmType::Fire);
            assert_eq!(e.partition_id, 0);
        }
        other => panic!("unexpected {other:?}"),
    }
    match next_panel_event(&mut events).await {
        Event::Arming(e) => {
            assert_eq!(e.arming_type, qolsys_iq_client::PartitionStatus::ExitDelay);
            assert_eq!(e.partition_id, 1);
            assert_eq!(e.delay, Some(30));
        }
        other => panic!("unexpected {other:?}"),
    }
    match next_panel_event(&mut events).await {
        Event::Error(e) => {
            assert_eq!(e.error_type, "usercode");
            assert_eq!(e.description, "Invalid usercode");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_info_type_yields_no_event() {
    let client = PanelClient::new(config());
    let mut events = client.subscribe_events();
    let mut peer = connect(&client).await;

    peer.send(r#"{"event":"INFO","info_type":"SOMETHING_NEW"}"#).await;
    peer.send(r#"{"event":"INFO"}"#).await;
    peer.send("not json").await;
    peer.send(r#"{"event":"INFO","info_type":"SECURE_ARM","partition_id":0,"value":true}"#)
        .await;

    // Only the well-formed frame gets through
    match next_panel_event(&mut events).await {
        Event::SecureArm(e) => assert!(e.value),
        other => panic!("unexpected {other:?}"),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_zone_add_fires_only_zone_add() {
    let client = PanelClient::new(config());
    let (recorder, mut calls) = Recorder::new();
    client.subscribe(recorder);
    let mut peer = connect(&client).await;

    peer.send(
        r#"{"event":"ZONE_EVENT","zone_event_type":"ZONE_ADD","zone":{"id":"1-3","type":"Door_Window","name":"Back Door","group":"entryexitdelay","status":"Closed","state":"0","zone_id":3,"zone_physical_type":1,"zone_alarm_type":3,"zone_type":1,"partition_id":0}}"#,
    )
    .await;
    // Marker frame
    peer.send(r#"{"event":"ALARM","alarm_type":"","partition_id":0}"#).await;

    assert_eq!(calls.recv().await.unwrap(), "zone_add");
    assert_eq!(calls.recv().await.unwrap(), "alarm");
}

#[tokio::test]
async fn test_unsubscribed_listener_stops_receiving() {
    let client = PanelClient::new(config());
    let (recorder, mut calls) = Recorder::new();
    let handle: Arc<dyn PanelListener> = recorder;
    client.subscribe(handle.clone());
    let mut events = client.subscribe_events();
    let mut peer = connect(&client).await;

    peer.send(r#"{"event":"ZONE_EVENT","zone_event_type":"ZONE_ACTIVE","zone":{"zone_id":3,"status":"Open"}}"#)
        .await;
    next_panel_event(&mut events).await;
    assert_eq!(calls.recv().await.unwrap(), "zone_active");

    assert!(client.unsubscribe(&handle));
    peer.send(r#"{"event":"ZONE_EVENT","zone_event_type":"ZONE_ACTIVE","zone":{"zone_id":3,"status":"Closed"}}"#)
        .await;
    next_panel_event(&mut events).await;
    assert!(calls.try_recv().is_err());
}

// =========================================================================
// Disconnects
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_silent_panel_disconnects_once() {
    let client = PanelClient::new(
        ClientConfig::builder()
            .host("panel.test")
            .heartbeat_secs(1)
            .build(),
    );
    let (recorder, mut calls) = Recorder::new();
    client.subscribe(recorder);
    let mut peer = connect(&client).await;
    let started = Instant::now();

    // Read (and ignore) whatever the client sends
    let drain = tokio::spawn(async move { while peer.next_line().await.is_some() {} });

    let call = calls.recv().await.unwrap();
    assert!(call.starts_with("disconnected"), "unexpected {call}");
    assert!(started.elapsed() <= Duration::from_secs(1 + 5 + 1));
    assert!(!client.is_connected());

    sleep(Duration::from_secs(60)).await;
    assert!(calls.try_recv().is_err());
    drain.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_eof_during_heartbeat_timeout_notifies_once() {
    let client = PanelClient::new(
        ClientConfig::builder()
            .host("panel.test")
            .heartbeat_secs(1)
            .build(),
    );
    let (recorder, mut calls) = Recorder::new();
    client.subscribe(recorder);
    let mut peer = connect(&client).await;

    // Leave the heartbeat unanswered, then hang up the instant its ACK
    // wait runs out
    assert_eq!(peer.expect_line().await, "");
    tokio::time::sleep_until(Instant::now() + Duration::from_secs(5)).await;
    drop(peer);

    let call = calls.recv().await.unwrap();
    assert!(call.starts_with("disconnected"), "unexpected {call}");
    assert!(!client.is_connected());

    sleep(Duration::from_secs(60)).await;
    assert!(calls.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_silence_past_grace_expires_session() {
    let client = PanelClient::new(
        ClientConfig::builder()
            .host("panel.test")
            .heartbeat_secs(1)
            .ack_timeout_ms(60_000)
            .build(),
    );
    let (recorder, mut calls) = Recorder::new();
    client.subscribe(recorder);
    let mut events = client.subscribe_events();
    let peer = connect(&client).await;
    let started = Instant::now();

    let call = calls.recv().await.unwrap();
    assert!(call.starts_with("disconnected: no data from panel"), "unexpected {call}");
    assert!(started.elapsed() <= Duration::from_secs(1 + 5 + 1));
    assert!(!client.is_connected());
    match events.recv().await.unwrap() {
        ClientEvent::Disconnected(DisconnectReason::HeartbeatExpired { silent_for }) => {
            assert!(silent_for >= Duration::from_secs(6));
        }
        other => panic!("unexpected {other:?}"),
    }

    sleep(Duration::from_secs(60)).await;
    assert!(calls.try_recv().is_err());
    drop(peer);
}

#[tokio::test]
async fn test_invalid_utf8_line_keeps_session() {
    let client = PanelClient::new(config());
    let mut events = client.subscribe_events();
    let mut peer = connect(&client).await;

    peer.write.write_all(b"\xff\xfe garbage\n").await.unwrap();
    peer.send(r#"{"event":"INFO","info_type":"SECURE_ARM","partition_id":0,"value":false}"#)
        .await;
    assert!(matches!(
        next_panel_event(&mut events).await,
        Event::SecureArm(_)
    ));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_panel_eof_reports_connection_closed() {
    let client = PanelClient::new(config());
    let mut events = client.subscribe_events();
    let peer = connect(&client).await;
    drop(peer);

    match events.recv().await.unwrap() {
        ClientEvent::Disconnected(reason) => assert_eq!(reason, DisconnectReason::ConnectionClosed),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!client.is_connected());

    // A later explicit disconnect has nothing left to report
    client.disconnect().await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_disconnect_then_eof_notifies_once() {
    let client = PanelClient::new(config());
    let (recorder, mut calls) = Recorder::new();
    client.subscribe(recorder);
    let peer = connect(&client).await;

    client.disconnect().await;
    drop(peer);
    client.disconnect().await;

    assert_eq!(calls.recv().await.unwrap(), "disconnected: disconnect requested");
    sleep(Duration::from_millis(100)).await;
    assert!(calls.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_wakes_pending_send() {
    let client = PanelClient::new(config());
    let mut peer = connect(&client).await;

    let sending = {
        let client = client.clone();
        tokio::spawn(async move { client.send(&Action::summary("secret")).await })
    };
    peer.expect_line().await;

    client.disconnect().await;
    let err = sending.await.unwrap().unwrap_err();
    assert!(matches!(err, PanelError::Disconnected));
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let client = PanelClient::new(config());
    let mut events = client.subscribe_events();
    let peer = connect(&client).await;
    drop(peer);

    assert!(matches!(
        events.recv().await.unwrap(),
        ClientEvent::Disconnected(DisconnectReason::ConnectionClosed)
    ));

    let mut peer = connect(&client).await;
    assert!(client.is_connected());
    peer.send(r#"{"event":"INFO","info_type":"SECURE_ARM","partition_id":0,"value":false}"#)
        .await;
    assert!(matches!(
        next_panel_event(&mut events).await,
        Event::SecureArm(_)
    ));
}
