use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DEVICE_NAME: &str = "picoRelay";
pub const MAX_CHANNELS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub unique_id: Option<String>,
    pub manufacturer: String,
    pub model: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            unique_id: None,
            manufacturer: "Waveshare".to_string(),
            model: "Pico Relay B".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub wifi_country: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            wifi_country: "GB".to_string(),
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelPins {
    pub relay_pin: i32,
    pub switch_pin: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoardConfig {
    /// Channel ids are assigned 1..=N in list order.
    pub channels: Vec<ChannelPins>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        // Relay pins are fixed by the board layout; switch pins are free GPIOs.
        const WIRING: [(i32, i32); 8] = [
            (21, 12),
            (20, 11),
            (19, 10),
            (18, 9),
            (17, 8),
            (16, 7),
            (15, 5),
            (14, 4),
        ];

        Self {
            channels: WIRING
                .iter()
                .map(|&(relay_pin, switch_pin)| ChannelPins {
                    relay_pin,
                    switch_pin,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    pub tick_interval_ms: u64,
    pub heartbeat_threshold: u32,
    pub association_attempts: u32,
    pub association_poll_ms: u64,
    pub fault_backoff_ms: u64,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            heartbeat_threshold: 30,
            association_attempts: 10,
            association_poll_ms: 1_000,
            fault_backoff_ms: 5_000,
            keep_alive_secs: 10,
            connect_timeout_ms: 10_000,
        }
    }
}

impl LoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn association_poll(&self) -> Duration {
        Duration::from_millis(self.association_poll_ms)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.fault_backoff_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.max(10);
        self.heartbeat_threshold = self.heartbeat_threshold.max(1);
        self.association_attempts = self.association_attempts.max(1);
        self.keep_alive_secs = self.keep_alive_secs.max(1);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub timing: LoopConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.device.sanitize();
        self.board.sanitize();
        self.timing.sanitize();
    }
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        let trimmed = self.name.trim();
        self.name = if trimmed.is_empty() {
            DEFAULT_DEVICE_NAME.to_string()
        } else {
            trimmed.to_string()
        };

        if self
            .unique_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            self.unique_id = None;
        }
    }
}

impl BoardConfig {
    pub fn sanitize(&mut self) {
        self.channels.truncate(MAX_CHANNELS);
        if self.channels.is_empty() {
            *self = Self::default();
        }
    }
}
