//! Telemetry wire format and MQTT publishing.
//!
//! The wire contract is fixed and deliberately small. Topic `person` carries
//! `{"count": N}` on every frame and `{"total": N}` when people enter; topic
//! `person/duration` carries `{"duration": secs}` when they leave. Downstream
//! consumers parse these payloads as-is, so they stay compact single-key
//! JSON objects.
//!
//! [`MqttPublisher`] is the production sink. [`MemorySink`] records events
//! in memory for tests and dry runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Event, MqttOptions};
use serde_json::json;

/// Topic for per-frame counts and running totals.
pub const PERSON_TOPIC: &str = "person";
/// Topic for dwell durations on exit.
pub const PERSON_DURATION_TOPIC: &str = "person/duration";

/// One event produced by the occupancy tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// People visible this frame. Published every frame.
    CountUpdate { count: u32 },
    /// Running total of entries. Published on a rising edge.
    TotalUpdate { total: u64 },
    /// Whole seconds the last dwell window stayed open. Published on a
    /// falling edge.
    DurationUpdate { duration: u64 },
}

impl TelemetryEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            TelemetryEvent::DurationUpdate { .. } => PERSON_DURATION_TOPIC,
            TelemetryEvent::CountUpdate { .. } | TelemetryEvent::TotalUpdate { .. } => PERSON_TOPIC,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        let value = match self {
            TelemetryEvent::CountUpdate { count } => json!({ "count": count }),
            TelemetryEvent::TotalUpdate { total } => json!({ "total": total }),
            TelemetryEvent::DurationUpdate { duration } => json!({ "duration": duration }),
        };
        value.to_string().into_bytes()
    }
}

/// Where telemetry goes. The pipeline driver publishes through this and
/// disconnects on every exit path.
pub trait TelemetrySink {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
}

/// Broker connection parameters.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// `host:port`, IPv6 hosts in brackets.
    pub broker_addr: String,
    pub client_id: String,
    pub keepalive: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            broker_addr: "127.0.0.1:3001".to_string(),
            client_id: "people-counter".to_string(),
            keepalive: Duration::from_secs(60),
        }
    }
}

// ----------------------------------------------------------------------------
// MQTT sink
// ----------------------------------------------------------------------------

/// Publishes events to an MQTT broker at QoS 0.
///
/// The connection is polled by a background thread; `disconnect` tears the
/// link down and joins that thread.
pub struct MqttPublisher {
    client: Client,
    connection_handle: Option<thread::JoinHandle<()>>,
}

impl MqttPublisher {
    pub fn connect(config: &TelemetryConfig) -> Result<Self> {
        let (host, port) = split_host_port(&config.broker_addr)?;
        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(config.keepalive);
        options.set_clean_start(true);
        let (client, mut connection) = Client::new(options, 10);
        // Publishes only go out while the connection is polled.
        let handle = thread::spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        log::warn!("MQTT connection error: {}", e);
                        break;
                    }
                }
            }
        });
        log::info!("Connected to MQTT broker at {}", config.broker_addr);
        Ok(Self {
            client,
            connection_handle: Some(handle),
        })
    }
}

impl TelemetrySink for MqttPublisher {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<()> {
        self.client
            .publish(event.topic(), QoS::AtMostOnce, false, event.payload())
            .with_context(|| format!("publishing to {}", event.topic()))?;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(handle) = self.connection_handle.take() {
            let result = self.client.disconnect();
            let _ = handle.join();
            result.context("MQTT disconnect")?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// In-memory sink
// ----------------------------------------------------------------------------

/// Records published events instead of sending them anywhere.
///
/// Clones share the same record store, so a test can keep a handle while the
/// pipeline owns and consumes the sink itself.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    disconnected: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(topic, payload)` pairs published so far, in publish order.
    pub fn records(&self) -> Vec<(String, Vec<u8>)> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

impl TelemetrySink for MemorySink {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((event.topic().to_string(), event.payload()));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Address parsing
// ----------------------------------------------------------------------------

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
