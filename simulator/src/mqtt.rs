use crate::config::Config;
use crate::errors::{Error, Result};
use crate::generator::{is_anomalous, ValueGenerator};
use crate::metrics::{
    self, ANOMALIES_TOTAL, CYCLES_TOTAL, PUBLISH_ACKS_TOTAL, PUBLISH_FAILURES_TOTAL,
    PUBLISH_REQUESTS_TOTAL,
};
use crate::sensor::{SensorKind, SensorSet};
use crate::telemetry::{Clock, Envelope};
use rand::Rng;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const KEEP_ALIVE_SECS: u64 = 60;
const REQUEST_CAPACITY: usize = 100;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const SUMMARY_EVERY_CYCLES: u64 = 12;

const MAX_CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Notifications from the network task to the publish loop
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    ConnectFailed { attempt: u32, reason: String },
    ConnectAbandoned { attempts: u32 },
    PublishSent(u16),
    PublishAcked(u16),
    ConnectionLost(String),
    Disconnected,
}

/// Outbound side of a broker session
pub trait Transport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
}

pub struct MqttTransport {
    client: AsyncClient,
}

impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Owns the broker session and drives periodic publication of the sensor set.
pub struct ConnectionManager<T = MqttTransport> {
    transport: T,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    io_task: Option<JoinHandle<()>>,
    broker: String,
    state: ConnectionState,
    in_flight: HashSet<u16>,
    clock: Clock,
}

impl ConnectionManager<MqttTransport> {
    /// Opens the session and spawns the task that services the network.
    pub fn start(config: &Config) -> Self {
        info!("🔌 Connecting to {}...", config.broker_addr());

        let mut mqtt_options =
            MqttOptions::new(&config.client_id, &config.mqtt_host, config.mqtt_port);
        mqtt_options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        mqtt_options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::unbounded_channel();
        let io_task = tokio::spawn(service_event_loop(eventloop, tx));

        let mut manager = Self::new(MqttTransport { client }, rx, config.broker_addr());
        manager.io_task = Some(io_task);
        manager
    }
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        transport: T,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        broker: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            events,
            io_task: None,
            broker: broker.into(),
            state: ConnectionState::Disconnected,
            in_flight: HashSet::new(),
            clock: Clock::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Publishes one reading per sensor, in set order.
    pub async fn run_cycle<R: Rng>(
        &mut self,
        sensors: &SensorSet,
        generator: &mut ValueGenerator<R>,
    ) -> Result<()> {
        self.drain_events()?;
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        for (_, sensor) in sensors.iter() {
            let value = generator.generate_value(sensor);
            let envelope = Envelope::new(sensor, value, self.clock.now());
            let payload = envelope.to_payload()?;

            if let Err(e) = self.transport.publish(&sensor.topic, payload).await {
                PUBLISH_FAILURES_TOTAL.inc();
                warn!("Failed to publish {} to {}: {}", sensor.device_id, sensor.topic, e);
                continue;
            }
            PUBLISH_REQUESTS_TOTAL.inc();

            if is_anomalous(sensor.kind, value) {
                ANOMALIES_TOTAL.inc();
            }
            info!(
                "{} {} {} → {}",
                status_marker(sensor.kind, value),
                sensor.kind.field_name().to_uppercase(),
                envelope.reading.value(),
                sensor.topic
            );
        }

        CYCLES_TOTAL.inc();
        Ok(())
    }

    /// Waits for the session, then runs a cycle every `interval` until `stop` resolves.
    ///
    /// `stop` is only observed while waiting for the connection or sleeping between
    /// cycles; a cycle in progress always completes. Returns `Ok(())` when stopped and
    /// an error when the session fails.
    pub async fn run_forever<R: Rng, F: Future<Output = ()>>(
        &mut self,
        sensors: &SensorSet,
        generator: &mut ValueGenerator<R>,
        interval: Duration,
        stop: F,
    ) -> Result<()> {
        tokio::pin!(stop);

        while self.state != ConnectionState::Connected {
            tokio::select! {
                _ = &mut stop => {
                    info!("⏹️  Simulator stopped before connecting");
                    return Ok(());
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event)?,
                    None => {
                        return Err(Error::ConnectFailed(format!(
                            "network task for {} exited",
                            self.broker
                        )));
                    }
                },
            }
        }

        info!(
            "🤖 Simulator started. Publishing {} sensors every {}s",
            sensors.len(),
            interval.as_secs()
        );

        let mut cycles: u64 = 0;
        loop {
            self.run_cycle(sensors, generator).await?;

            cycles += 1;
            if summary_due(cycles) {
                info!("📊 {} cycles so far: {}", cycles, metrics::summary());
            }

            let pause = tokio::time::sleep(interval);
            tokio::pin!(pause);

            loop {
                tokio::select! {
                    _ = &mut stop => {
                        info!("⏹️  Simulator stopped by user");
                        return Ok(());
                    }
                    _ = &mut pause => break,
                    Some(event) = self.events.recv() => self.handle_event(event)?,
                }
            }
        }
    }

    /// Runs until stopped or failed, then shuts down on either path.
    pub async fn run<R: Rng, F: Future<Output = ()>>(
        mut self,
        sensors: &SensorSet,
        generator: &mut ValueGenerator<R>,
        interval: Duration,
        stop: F,
    ) -> Result<()> {
        let outcome = self.run_forever(sensors, generator, interval, stop).await;
        if let Err(e) = &outcome {
            error!("❌ Error: {}", e);
        }

        self.shutdown().await;
        outcome
    }

    /// Closes the session. Consumes the manager so it runs once.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!("Disconnect request not delivered: {}", e);
        }

        if let Some(mut io_task) = self.io_task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut io_task).await.is_err() {
                warn!(
                    "Network task still running after {:?}, aborting",
                    SHUTDOWN_GRACE
                );
                io_task.abort();
            }
        }

        while let Ok(event) = self.events.try_recv() {
            if let Err(e) = self.handle_event(event) {
                debug!("Ignoring event during shutdown: {}", e);
            }
        }
        self.state = ConnectionState::Disconnected;

        if !self.in_flight.is_empty() {
            warn!(
                "{} message(s) were not acknowledged by the broker",
                self.in_flight.len()
            );
        }
        info!("👋 Disconnected from broker {}", self.broker);
    }

    fn drain_events(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Connected => {
                self.state = ConnectionState::Connected;
                info!("✅ Connected to MQTT broker at {}", self.broker);
            }
            TransportEvent::ConnectFailed { attempt, reason } => {
                error!(
                    "❌ Connection attempt {}/{} to {} failed: {}",
                    attempt, MAX_CONNECT_ATTEMPTS, self.broker, reason
                );
            }
            TransportEvent::ConnectAbandoned { attempts } => {
                return Err(Error::ConnectFailed(format!(
                    "gave up on {} after {} attempts",
                    self.broker, attempts
                )));
            }
            TransportEvent::PublishSent(pkid) => {
                self.in_flight.insert(pkid);
            }
            TransportEvent::PublishAcked(pkid) => {
                self.in_flight.remove(&pkid);
                PUBLISH_ACKS_TOTAL.inc();
                info!("📤 Message acknowledged (pkid: {})", pkid);
            }
            TransportEvent::ConnectionLost(reason) => {
                self.state = ConnectionState::Disconnected;
                return Err(Error::ConnectionLost(reason));
            }
            TransportEvent::Disconnected => {
                self.state = ConnectionState::Disconnected;
                debug!("Session with {} closed", self.broker);
            }
        }
        Ok(())
    }
}

fn summary_due(cycles: u64) -> bool {
    cycles % SUMMARY_EVERY_CYCLES == 0
}

fn status_marker(kind: SensorKind, value: f64) -> &'static str {
    if is_anomalous(kind, value) {
        return "🔥";
    }
    match kind {
        SensorKind::Temperature => "✅",
        SensorKind::Humidity => "💧",
    }
}

/// Polls the rumqttc event loop and forwards what the publish loop cares about.
///
/// The initial connection is retried with exponential backoff. Once a session has
/// been established, losing it ends the task; there is no reconnect.
async fn service_event_loop(
    mut eventloop: EventLoop,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut connected = false;
    let mut attempt = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected = true;
                TransportEvent::Connected
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => TransportEvent::PublishAcked(ack.pkid),
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => TransportEvent::PublishSent(pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                let _ = events.send(TransportEvent::Disconnected);
                break;
            }
            Ok(_) => continue,
            Err(e) if connected => {
                let _ = events.send(TransportEvent::ConnectionLost(e.to_string()));
                break;
            }
            Err(e) => {
                attempt += 1;
                let failed = TransportEvent::ConnectFailed {
                    attempt,
                    reason: describe(&e),
                };
                if events.send(failed).is_err() {
                    break;
                }

                if attempt >= MAX_CONNECT_ATTEMPTS {
                    let _ = events.send(TransportEvent::ConnectAbandoned { attempts: attempt });
                    break;
                }

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                continue;
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }

    debug!("MQTT network task stopped");
}

fn describe(error: &ConnectionError) -> String {
    match error {
        ConnectionError::ConnectionRefused(code) => {
            format!("broker refused connection ({:?})", code)
        }
        other => other.to_string(),
    }
}
