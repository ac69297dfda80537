use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, Incoming, LastWill, MqttOptions, QoS};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::session::{self, Delivery, EventReceiver, EventSender, SessionEvent};
use relay_common::{
    config::{BoardConfig, NetworkConfig},
    AssociationStatus, ChannelRegistry, InboundMessage, Platform, RelayMode, RelayOutput,
    Restart, RuntimeConfig, SessionOptions, SupervisorError, SwitchInput, Supervisor,
    TelemetryClient, TransportFault,
};

const DEFAULT_CONFIG_PATH: &str = "./.relay-board/runtime.json";
const REQUEST_CAPACITY: usize = 64;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = config_path();
    let runtime = Handle::current();

    loop {
        let mut config = load_runtime_config(&config_path).await.unwrap_or_else(|err| {
            warn!(
                "failed to load runtime config from {}: {err:#}",
                config_path.display()
            );
            RuntimeConfig::default()
        });
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        config.sanitize();

        info!(
            "starting {} with {} channel(s), broker {}:{}",
            config.device.name,
            config.board.channels.len(),
            config.network.mqtt_host,
            config.network.mqtt_port
        );

        let handle = runtime.clone();
        let outcome = tokio::task::spawn_blocking(move || run_session(handle, &config))
            .await
            .context("supervisor task panicked")?;

        let restart = outcome.context("network association failed")?;
        info!("restarting after fault: {}", restart.fault);
    }
}

/// One power cycle: fresh pins, fresh registry, fresh session.
fn run_session(runtime: Handle, config: &RuntimeConfig) -> Result<Restart, SupervisorError> {
    let registry = build_registry(&config.board);
    let platform = HostPlatform::new(runtime, config.network.clone(), config.device.name.clone());
    Supervisor::new(platform, registry, config).run()
}

fn build_registry(board: &BoardConfig) -> ChannelRegistry<SimulatedRelay, SimulatedSwitch> {
    ChannelRegistry::new(board.channels.iter().map(|pins| {
        (
            SimulatedRelay::new(pins.relay_pin),
            SimulatedSwitch::new(pins.switch_pin),
        )
    }))
}

fn config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    let network = &mut config.network;
    if let Some(host) = lookup("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = lookup("MQTT_PORT") {
        match port.parse::<u16>() {
            Ok(port) => network.mqtt_port = port,
            Err(_) => warn!("ignoring invalid MQTT_PORT `{port}`"),
        }
    }
    if let Some(user) = lookup("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
    if let Some(name) = lookup("DEVICE_NAME") {
        config.device.name = name;
    }
}

/// Relay output with no hardware behind it; the driven level is the state.
#[derive(Debug)]
struct SimulatedRelay {
    pin: i32,
    level: RelayMode,
}

impl SimulatedRelay {
    fn new(pin: i32) -> Self {
        Self {
            pin,
            level: RelayMode::Off,
        }
    }
}

impl RelayOutput for SimulatedRelay {
    fn drive(&mut self, mode: RelayMode) {
        debug!("gpio {} <- {}", self.pin, mode.as_payload());
        self.level = mode;
    }

    fn observed(&self) -> RelayMode {
        self.level
    }
}

#[derive(Debug)]
struct SimulatedSwitch {
    _pin: i32,
}

impl SimulatedSwitch {
    fn new(pin: i32) -> Self {
        Self { _pin: pin }
    }
}

impl SwitchInput for SimulatedSwitch {
    fn is_closed(&self) -> bool {
        false
    }
}

/// Desktop stand-in for the board: the network link is the host's, the broker
/// session is a rumqttc client driven on the tokio runtime.
struct HostPlatform {
    runtime: Handle,
    network: NetworkConfig,
    device_name: String,
}

impl HostPlatform {
    fn new(runtime: Handle, network: NetworkConfig, device_name: String) -> Self {
        Self {
            runtime,
            network,
            device_name,
        }
    }

    fn mqtt_options(&self, options: &SessionOptions) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(
            options.client_id.clone(),
            self.network.mqtt_host.clone(),
            self.network.mqtt_port,
        );
        mqtt_options.set_keep_alive(options.keep_alive);
        mqtt_options.set_last_will(LastWill::new(
            options.last_will.topic.clone(),
            options.last_will.payload.clone(),
            QoS::AtMostOnce,
            options.last_will.retain,
        ));
        if !self.network.mqtt_user.is_empty() {
            mqtt_options.set_credentials(
                self.network.mqtt_user.clone(),
                self.network.mqtt_pass.clone(),
            );
        }
        mqtt_options
    }
}

impl Platform for HostPlatform {
    type Client = HostClient;

    fn hardware_id(&self) -> Vec<u8> {
        self.device_name.as_bytes().to_vec()
    }

    fn begin_association(&mut self) -> Result<(), TransportFault> {
        debug!("host build uses the existing network link");
        Ok(())
    }

    fn association_status(&mut self) -> AssociationStatus {
        AssociationStatus::Associated
    }

    fn open_session(&mut self, options: &SessionOptions) -> Result<Self::Client, TransportFault> {
        let (client, eventloop) = AsyncClient::new(self.mqtt_options(options), REQUEST_CAPACITY);
        let (tx, rx) = session::channel(session::MESSAGE_QUEUE_DEPTH);
        let task = self.runtime.spawn(pump_events(eventloop, tx));

        match rx.wait_for_connack(options.connect_timeout) {
            Ok(()) => Ok(HostClient { client, events: rx, task }),
            Err(fault) => {
                task.abort();
                Err(fault)
            }
        }
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Drives the rumqttc event loop and forwards what the tick loop cares about.
/// Stops at the first error; reconnecting is the supervisor's job.
async fn pump_events(mut eventloop: rumqttc::EventLoop, tx: EventSender) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::Publish(message))) => SessionEvent::Message(
                InboundMessage::new(message.topic, message.payload.to_vec()),
            ),
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("mqtt connected");
                    SessionEvent::Connected
                } else {
                    SessionEvent::Fault(format!("broker refused connection: {:?}", ack.code))
                }
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                SessionEvent::Fault("broker sent DISCONNECT".to_string())
            }
            Ok(_) => continue,
            Err(err) => {
                warn!("mqtt poll error: {err}");
                tx.send(SessionEvent::Fault(err.to_string()));
                return;
            }
        };

        let stop = matches!(event, SessionEvent::Fault(_));
        match tx.send(event) {
            Delivery::Queued => {}
            Delivery::Dropped(message) => {
                warn!("inbound queue full, dropping message on {}", message.topic);
            }
            Delivery::Closed => return,
        }
        if stop {
            return;
        }
    }
}

struct HostClient {
    client: AsyncClient,
    events: EventReceiver,
    task: JoinHandle<()>,
}

impl Drop for HostClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TelemetryClient for HostClient {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportFault> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
            .map_err(|err| TransportFault::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }

    fn subscribe(&mut self, filter: &str) -> Result<(), TransportFault> {
        self.client
            .try_subscribe(filter, QoS::AtMostOnce)
            .map_err(|err| TransportFault::Subscribe {
                topic: filter.to_string(),
                reason: err.to_string(),
            })
    }

    fn poll_message(&mut self) -> Result<Option<InboundMessage>, TransportFault> {
        self.events.next_message()
    }
}
