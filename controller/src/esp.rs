use std::{
    ffi::CString,
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use embedded_svc::{
    mqtt::client::{Details, EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin, Input, Output, PinDriver};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::prelude::Peripherals,
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, LwtConfiguration, MqttClientConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::EspWifi,
};
use log::{info, warn};

use crate::session::{self, Delivery, EventReceiver, EventSender, SessionEvent};
use relay_common::{
    config::{BoardConfig, NetworkConfig},
    AssociationStatus, ChannelRegistry, InboundMessage, Platform, RelayMode, RelayOutput,
    RuntimeConfig, SessionOptions, Supervisor, SwitchInput, TelemetryClient, TransportFault,
};

const NVS_NAMESPACE: &str = "relayboard";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut config = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    config.sanitize();
    ensure_wifi_defaults(&mut config);

    info!(
        "NVS config loaded: device=`{}`, ssid=`{}`, mqtt=`{}:{}`, {} channel(s)",
        config.device.name,
        config.network.wifi_ssid,
        config.network.mqtt_host,
        config.network.mqtt_port,
        config.board.channels.len(),
    );

    let Peripherals { modem, .. } = Peripherals::take()?;
    let wifi = EspWifi::new(modem, sys_loop, Some(nvs_partition))?;
    let registry = build_registry(&config.board)?;
    let platform = EspPlatform::new(wifi, config.network.clone());

    let restart = Supervisor::new(platform, registry, &config)
        .run()
        .context("network association failed")?;

    warn!("restarting after fault: {}", restart.fault);
    unsafe { esp_idf_svc::sys::esp_restart() }
}

fn ensure_wifi_defaults(config: &mut RuntimeConfig) {
    if config.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            config.network.wifi_ssid = ssid.to_string();
        }
    }

    if config.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            config.network.wifi_pass = pass.to_string();
        }
    }
}

fn build_registry(board: &BoardConfig) -> anyhow::Result<ChannelRegistry<EspRelay, EspSwitch>> {
    let mut pins = Vec::with_capacity(board.channels.len());
    for (index, channel) in board.channels.iter().enumerate() {
        let mut relay = unsafe { PinDriver::output(AnyOutputPin::new(channel.relay_pin)) }
            .with_context(|| {
                format!("relay GPIO{} for channel {}", channel.relay_pin, index + 1)
            })?;
        if let Err(err) = relay.set_low() {
            warn!("failed to drive relay on GPIO{} low: {err}", channel.relay_pin);
        }
        let switch = unsafe { PinDriver::input(AnyInputPin::new(channel.switch_pin)) }
            .with_context(|| {
                format!("switch GPIO{} for channel {}", channel.switch_pin, index + 1)
            })?;

        pins.push((
            EspRelay {
                pin: relay,
                gpio: channel.relay_pin,
            },
            EspSwitch { pin: switch },
        ));
    }
    Ok(ChannelRegistry::new(pins))
}

struct EspRelay {
    pin: PinDriver<'static, AnyOutputPin, Output>,
    gpio: i32,
}

impl RelayOutput for EspRelay {
    fn drive(&mut self, mode: RelayMode) {
        let result = if mode.is_on() {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(err) = result {
            warn!("failed to drive relay on GPIO{}: {err}", self.gpio);
        }
    }

    fn observed(&self) -> RelayMode {
        RelayMode::from_level(self.pin.is_set_high())
    }
}

struct EspSwitch {
    pin: PinDriver<'static, AnyInputPin, Input>,
}

impl SwitchInput for EspSwitch {
    fn is_closed(&self) -> bool {
        self.pin.is_high()
    }
}

struct EspPlatform {
    wifi: EspWifi<'static>,
    network: NetworkConfig,
    power_save_disabled: bool,
}

impl EspPlatform {
    fn new(wifi: EspWifi<'static>, network: NetworkConfig) -> Self {
        Self {
            wifi,
            network,
            power_save_disabled: false,
        }
    }

    fn start_station(&mut self) -> anyhow::Result<()> {
        if !has_station_credentials(&self.network) {
            bail!("wifi credentials missing");
        }

        let auth_method = if self.network.wifi_pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: self
                    .network
                    .wifi_ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi ssid too long"))?,
                password: self
                    .network
                    .wifi_pass
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi password too long"))?,
                auth_method,
                ..Default::default()
            }))?;

        self.wifi.start()?;
        set_wifi_country(&self.network.wifi_country);
        self.wifi.connect()?;
        info!("wifi started, connecting to `{}`", self.network.wifi_ssid);
        Ok(())
    }
}

impl Platform for EspPlatform {
    type Client = EspClient;

    fn hardware_id(&self) -> Vec<u8> {
        let mut mac = [0u8; 6];
        let rc = unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
        if rc != esp_idf_svc::sys::ESP_OK {
            warn!("failed to read factory MAC: esp_err_t={rc}");
        }
        mac.to_vec()
    }

    fn begin_association(&mut self) -> Result<(), TransportFault> {
        self.start_station()
            .map_err(|err| TransportFault::Association(format!("{err:#}")))
    }

    fn association_status(&mut self) -> AssociationStatus {
        let connected = self.wifi.is_connected();
        let netif_up = self.wifi.sta_netif().is_up();
        match (connected, netif_up) {
            (Ok(true), Ok(true)) => {
                if !self.power_save_disabled {
                    disable_wifi_power_save();
                    self.power_save_disabled = true;
                }
                AssociationStatus::Associated
            }
            (Err(err), _) | (_, Err(err)) => AssociationStatus::Failed(err.to_string()),
            _ => AssociationStatus::Pending,
        }
    }

    fn open_session(&mut self, options: &SessionOptions) -> Result<Self::Client, TransportFault> {
        let url = format!("mqtt://{}:{}", self.network.mqtt_host, self.network.mqtt_port);
        let conf = MqttClientConfiguration {
            client_id: Some(options.client_id.as_str()),
            keep_alive_interval: Some(options.keep_alive),
            lwt: Some(LwtConfiguration {
                topic: options.last_will.topic.as_str(),
                payload: options.last_will.payload.as_bytes(),
                qos: QoS::AtMostOnce,
                retain: options.last_will.retain,
            }),
            username: if self.network.mqtt_user.is_empty() {
                None
            } else {
                Some(self.network.mqtt_user.as_str())
            },
            password: if self.network.mqtt_pass.is_empty() {
                None
            } else {
                Some(self.network.mqtt_pass.as_str())
            },
            ..Default::default()
        };

        let (client, conn) = EspMqttClient::new(url.as_str(), &conf)
            .map_err(|err| TransportFault::Connect(err.to_string()))?;
        let (tx, rx) = session::channel(session::MESSAGE_QUEUE_DEPTH);
        spawn_mqtt_receiver(conn, tx)
            .map_err(|err| TransportFault::Connect(format!("mqtt receiver thread: {err}")))?;

        rx.wait_for_connack(options.connect_timeout)?;
        info!("mqtt connected to {url}");
        Ok(EspClient { client, events: rx })
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Forwards connection events until the client is dropped.
fn spawn_mqtt_receiver(
    mut conn: EspMqttConnection,
    tx: EventSender,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            while let Ok(event) = conn.next() {
                let forwarded = match event.payload() {
                    EventPayload::Connected(_) => SessionEvent::Connected,
                    EventPayload::Disconnected => {
                        SessionEvent::Fault("broker connection lost".to_string())
                    }
                    EventPayload::Error(err) => SessionEvent::Fault(format!("{err:?}")),
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details: Details::Complete,
                        ..
                    } => {
                        if data.len() > MAX_MQTT_PAYLOAD_BYTES {
                            warn!(
                                "dropping oversized MQTT payload on topic {} ({} bytes)",
                                topic,
                                data.len()
                            );
                            continue;
                        }
                        SessionEvent::Message(InboundMessage::new(topic, data))
                    }
                    _ => continue,
                };

                match tx.send(forwarded) {
                    Delivery::Queued => {}
                    Delivery::Dropped(message) => {
                        warn!("inbound queue full, dropping message on {}", message.topic);
                    }
                    Delivery::Closed => break,
                }
            }
            info!("mqtt receiver stopped");
        })
        .map(|_| ())
}

struct EspClient {
    client: EspMqttClient<'static>,
    events: EventReceiver,
}

impl TelemetryClient for EspClient {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportFault> {
        self.client
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .map(|_| ())
            .map_err(|err| TransportFault::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }

    fn subscribe(&mut self, filter: &str) -> Result<(), TransportFault> {
        self.client
            .subscribe(filter, QoS::AtMostOnce)
            .map(|_| ())
            .map_err(|err| TransportFault::Subscribe {
                topic: filter.to_string(),
                reason: err.to_string(),
            })
    }

    fn poll_message(&mut self) -> Result<Option<InboundMessage>, TransportFault> {
        self.events.next_message()
    }
}

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

fn has_station_credentials(network: &NetworkConfig) -> bool {
    let ssid = network.wifi_ssid.trim();
    !ssid.is_empty() && ssid != "CHANGE_ME"
}

fn set_wifi_country(code: &str) {
    let Ok(country) = CString::new(code) else {
        warn!("invalid wifi country code `{code}`");
        return;
    };
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_country_code(country.as_ptr(), true) };
    if rc != esp_idf_svc::sys::ESP_OK {
        warn!("failed to set wifi country `{code}`: esp_err_t={rc}");
    }
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}
