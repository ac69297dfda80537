use crate::types::ChannelId;

pub const DISCOVERY_PREFIX: &str = "homeassistant";
pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Topic layout for one device, rooted at the device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    device: String,
    unique_id: String,
    status: String,
}

impl Topics {
    pub fn new(device: impl Into<String>, unique_id: impl Into<String>) -> Self {
        let device = device.into();
        let status = format!("{device}/status");
        Self {
            device,
            unique_id: unique_id.into(),
            status,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Liveness topic; also the prefix for per-channel state.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn command_filter(&self) -> String {
        format!("{}/command/relay/#", self.device)
    }

    pub fn command(&self, channel: ChannelId) -> String {
        format!("{}/command/relay/{channel}", self.device)
    }

    pub fn relay_state(&self, channel: ChannelId) -> String {
        relay_state_topic(&self.status, channel)
    }

    pub fn discovery(&self, channel: ChannelId) -> String {
        format!(
            "{DISCOVERY_PREFIX}/switch/{}/switch/{channel}/config",
            self.unique_id
        )
    }
}

pub fn relay_state_topic(status_prefix: &str, channel: ChannelId) -> String {
    format!("{status_prefix}/relay/{channel}")
}

/// Discovery node id: the configured value, or `0x00` followed by the hex of
/// the board's hardware id.
pub fn device_unique_id(configured: Option<&str>, hardware_id: &[u8]) -> String {
    if let Some(id) = configured {
        return id.to_string();
    }
    let hex: String = hardware_id.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("0x00{hex}")
}
