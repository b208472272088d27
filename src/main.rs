// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use qolsys_iq_client::constants::{DEFAULT_HEARTBEAT_SECS, DEFAULT_PORT};
use qolsys_iq_client::protocol::encode_event_value;
use qolsys_iq_client::{
    Action, AlarmCommandType, ArmingType, ClientConfig, ClientEvent, DisconnectReason,
    EventReceiver, PanelClient, TrustPolicy,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "qolsys2mqtt")]
#[command(about = "Bridge between a Qolsys IQ alarm panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    host: String,
    #[serde(default = "default_panel_port")]
    port: u16,
    /// Access token from the panel's third-party connection settings
    token: String,
    /// Default user code for arming commands
    #[serde(default)]
    usercode: Option<String>,
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    /// PEM file holding the panel's certificate. When set, only that exact
    /// certificate is accepted.
    #[serde(default)]
    pinned_certificate: Option<String>,
}

fn default_panel_port() -> u16 {
    DEFAULT_PORT
}
fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_SECS
}
fn default_reconnect_delay() -> u64 {
    10000
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
}

fn default_client_id() -> String {
    "qolsys-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "qolsys/cmd".to_string()
}
fn default_publish_topic() -> String {
    "qolsys".to_string()
}

fn build_client_config(toml: &PanelToml) -> Result<ClientConfig> {
    let trust = match &toml.pinned_certificate {
        Some(path) => TrustPolicy::pinned_from_pem_file(path)
            .with_context(|| format!("Failed to load pinned certificate {path}"))?,
        None => TrustPolicy::AcceptAny,
    };
    Ok(ClientConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .heartbeat_secs(toml.heartbeat_secs)
        .name("qolsys2mqtt")
        .trust(trust)
        .build())
}

/// What command handling needs from the panel config.
#[derive(Debug, Clone)]
struct PanelCredentials {
    token: String,
    usercode: Option<String>,
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages all share a flat {now, op, ...} structure

// Panel events: {now, op, event}
#[derive(Serialize)]
struct MqttPanelEvent {
    now: u64,
    op: String,
    event: serde_json::Value,
}

// DISCONNECTED: {now, op, reason}
#[derive(Serialize)]
struct MqttDisconnected {
    now: u64,
    op: String,
    reason: String,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
}

// Simple event with just {now, op}
#[derive(Serialize)]
struct MqttSimpleEvent {
    now: u64,
    op: String,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    #[allow(dead_code)]
    op_id: Option<String>,
    #[serde(default)]
    partition: Option<u32>,
    #[serde(default)]
    usercode: Option<String>,
    #[serde(default)]
    alarm_type: Option<AlarmCommandType>,
    #[serde(default)]
    delay: Option<u32>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_simple_event(client: &AsyncClient, topic: &str, op: &str) {
    let msg = MqttSimpleEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_disconnected(client: &AsyncClient, topic: &str, reason: &DisconnectReason) {
    let msg = MqttDisconnected {
        now: now_epoch_ms(),
        op: "DISCONNECTED".to_string(),
        reason: reason.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    success: bool,
    src: Option<serde_json::Value>,
) {
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success,
        src,
    };
    publish_json(client, topic, &msg, false).await;
}

/// Announce the session and ask the panel for a full summary.
async fn on_connected(
    panel: &PanelClient,
    client: &AsyncClient,
    topic: &str,
    creds: &PanelCredentials,
) {
    publish_simple_event(client, topic, "CONNECTED").await;
    if let Err(e) = panel.send(&Action::summary(&creds.token)).await {
        warn!("Summary request failed: {e}");
    }
}

/// Retry `connect` indefinitely with exponential backoff.
async fn connect_with_backoff(panel: &PanelClient, reconnect_delay_ms: u64) {
    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            let delay_ms = reconnect_delay_ms * (1u64 << (attempt - 1).min(4));
            error!(
                "Connection attempt {attempt} failed. Retrying in {:.1}s...",
                delay_ms as f64 / 1000.0
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        attempt += 1;
        info!("Attempting panel connection (attempt {attempt})...");
        match panel.connect().await {
            Ok(()) => return,
            Err(e) if e.is_retryable() => warn!("Connection error: {e}"),
            Err(e) => error!("Connection error (check configuration): {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Panel event → MQTT
// ---------------------------------------------------------------------------

async fn handle_panel_event(event: &qolsys_iq_client::Event, client: &AsyncClient, topic: &str) {
    match event.partition_id() {
        Some(id) => info!("Panel event {} (partition {id})", event.name()),
        None => info!("Panel event {}", event.name()),
    }
    match encode_event_value(event) {
        Ok(frame) => {
            let msg = MqttPanelEvent {
                now: now_epoch_ms(),
                op: event.name().to_string(),
                event: frame,
            };
            publish_json(client, topic, &msg, false).await;
        }
        Err(e) => error!("Failed to encode {} event: {e}", event.name()),
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

/// Execute a panel send and log the result. Returns `true` on success.
async fn exec_panel_cmd(
    op: &str,
    label: &str,
    fut: impl std::future::Future<Output = qolsys_iq_client::Result<()>>,
) -> bool {
    match fut.await {
        Ok(()) => {
            info!("{op} {label}: acknowledged");
            true
        }
        Err(e) => {
            error!("{op} {label} failed: {e}");
            false
        }
    }
}

async fn handle_command(
    payload_str: &str,
    cmd: MqttCommand,
    client: &AsyncClient,
    topic: &str,
    panel: &PanelClient,
    creds: &PanelCredentials,
) {
    // Parse the raw payload as a JSON value for the CMD_ACK src field
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();

    match cmd.op.as_str() {
        "SUMMARY" => {
            debug!("Command: SUMMARY");
            let success =
                exec_panel_cmd("SUMMARY", "panel", panel.send(&Action::summary(&creds.token)))
                    .await;
            publish_cmd_ack(client, topic, success, src_json).await;
        }
        "PING" => {
            info!("Command: PING");
            publish_cmd_ack(client, topic, true, src_json).await;
        }
        "ARM_AWAY" | "ARM_STAY" | "DISARM" => {
            let op = cmd.op.as_str();
            let arming_type = match op {
                "ARM_AWAY" => ArmingType::ArmAway,
                "ARM_STAY" => ArmingType::ArmStay,
                _ => ArmingType::Disarm,
            };
            let id = cmd.partition.unwrap_or(0);
            info!("Command: {op} partition {id}");
            let usercode = cmd.usercode.or_else(|| creds.usercode.clone());
            let mut action = Action::arming(&creds.token, arming_type, id, usercode);
            if let Some(delay) = cmd.delay {
                action = action.with_delay(delay);
            }
            let label = format!("partition {id}");
            let success = exec_panel_cmd(op, &label, panel.send(&action)).await;
            publish_cmd_ack(client, topic, success, src_json).await;
        }
        "ALARM" => {
            let id = cmd.partition.unwrap_or(0);
            let Some(alarm_type) = cmd.alarm_type else {
                warn!("ALARM: missing alarm_type");
                publish_cmd_ack(client, topic, false, src_json).await;
                return;
            };
            info!("Command: ALARM {alarm_type:?} partition {id}");
            let label = format!("partition {id}");
            let action = Action::alarm(&creds.token, alarm_type, id);
            let success = exec_panel_cmd("ALARM", &label, panel.send(&action)).await;
            publish_cmd_ack(client, topic, success, src_json).await;
        }
        other => {
            warn!("Unknown command: {other}");
            publish_cmd_ack(client, topic, false, src_json).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Forward panel events and disconnects to MQTT, reconnecting the panel
/// after any disconnect the bridge didn't ask for.
fn spawn_event_forwarder(
    panel: PanelClient,
    mut rx: EventReceiver,
    mqtt: AsyncClient,
    topic: String,
    creds: Arc<PanelCredentials>,
    reconnect_delay_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ClientEvent::Panel(event)) => handle_panel_event(&event, &mqtt, &topic).await,
                Ok(ClientEvent::Disconnected(DisconnectReason::Requested)) => {
                    info!("Panel disconnected on request");
                }
                Ok(ClientEvent::Disconnected(reason)) => {
                    warn!("Panel disconnected ({reason}), reconnecting");
                    publish_disconnected(&mqtt, &topic, &reason).await;
                    connect_with_backoff(&panel, reconnect_delay_ms).await;
                    on_connected(&panel, &mqtt, &topic, &creds).await;
                }
                Err(RecvError::Lagged(n)) => warn!("Event receiver lagged, missed {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Drive the MQTT connection and run every command published on
/// `sub_topic` against the panel.
fn spawn_command_loop(
    panel: PanelClient,
    mut eventloop: EventLoop,
    mqtt: AsyncClient,
    sub_topic: String,
    pub_topic: String,
    creds: Arc<PanelCredentials>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let packet = match eventloop.poll().await {
                Ok(Event::Incoming(packet)) => packet,
                Ok(Event::Outgoing(_)) => continue,
                Err(e) => {
                    error!("MQTT event loop error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };
            match packet {
                // rumqttc does not resubscribe after a broker reconnect
                Packet::ConnAck(_) => {
                    info!("MQTT: connected, subscribing to {sub_topic}");
                    if let Err(e) = mqtt.subscribe(&sub_topic, QoS::AtLeastOnce).await {
                        error!("Failed to subscribe to {sub_topic}: {e}");
                    }
                }
                Packet::Publish(msg) if msg.topic == sub_topic => {
                    let payload = String::from_utf8_lossy(&msg.payload);
                    let cmd = match serde_json::from_str::<MqttCommand>(&payload) {
                        Ok(cmd) => cmd,
                        Err(e) => {
                            warn!("Ignoring malformed MQTT command: {e}");
                            continue;
                        }
                    };
                    debug!("MQTT command received: {payload}");
                    handle_command(&payload, cmd, &mqtt, &pub_topic, &panel, &creds).await;
                }
                _ => {}
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=qolsys_iq_client=trace).
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let client_config = build_client_config(&config.panel)?;
    let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
    let creds = Arc::new(PanelCredentials {
        token: config.panel.token.clone(),
        usercode: config.panel.usercode.clone(),
    });
    let MqttToml {
        client_id,
        subscribe_topic,
        publish_topic,
        ..
    } = config.mqtt;

    let mut mqtt_opts = MqttOptions::new(client_id, mqtt_host, mqtt_port);
    mqtt_opts.set_keep_alive(Duration::from_secs(30));
    let (mqtt, eventloop) = AsyncClient::new(mqtt_opts, 256);

    info!(
        "Connecting to Qolsys panel at {}:{}",
        client_config.host, client_config.port
    );
    let panel = PanelClient::new(client_config);
    let event_rx = panel.subscribe_events();
    connect_with_backoff(&panel, config.panel.reconnect_delay_ms).await;

    // The command loop subscribes on every ConnAck
    let commands = spawn_command_loop(
        panel.clone(),
        eventloop,
        mqtt.clone(),
        subscribe_topic,
        publish_topic.clone(),
        Arc::clone(&creds),
    );
    on_connected(&panel, &mqtt, &publish_topic, &creds).await;
    let events = spawn_event_forwarder(
        panel.clone(),
        event_rx,
        mqtt.clone(),
        publish_topic.clone(),
        Arc::clone(&creds),
        config.panel.reconnect_delay_ms,
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    info!("MQTT bridge running");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
    }

    events.abort();
    panel.disconnect().await;
    publish_disconnected(&mqtt, &publish_topic, &DisconnectReason::Requested).await;
    commands.abort();
    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

/// Split `mqtt://host[:port]` (or `tcp://`) into host and port. The port
/// defaults to 1883.
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let rest = ["mqtt://", "tcp://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .unwrap_or(url);
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().context("Invalid MQTT port number")?),
        None => (rest, 1883),
    };
    anyhow::ensure!(!host.is_empty(), "MQTT URL has no host: {url}");
    Ok((host.to_string(), port))
}
