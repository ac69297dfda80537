//! Home Assistant MQTT discovery descriptors, one retained `switch` per channel.

use serde::Serialize;

use crate::{
    config::DeviceConfig,
    topics::Topics,
    types::{ChannelId, RelayMode},
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Availability {
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub identifiers: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SwitchDescriptor {
    pub name: String,
    pub unique_id: String,
    pub command_topic: String,
    pub state_topic: String,
    pub availability: Vec<Availability>,
    pub payload_on: &'static str,
    pub payload_off: &'static str,
    pub device: DeviceDescriptor,
}

pub fn switch_descriptor(
    device: &DeviceConfig,
    topics: &Topics,
    channel: ChannelId,
) -> SwitchDescriptor {
    let name = topics.device();
    SwitchDescriptor {
        name: format!("{name}_ch_{channel}"),
        unique_id: format!("{name}_relay_{channel}_pico"),
        command_topic: topics.command(channel),
        state_topic: topics.relay_state(channel),
        availability: vec![Availability {
            topic: topics.status().to_string(),
        }],
        payload_on: RelayMode::On.as_payload(),
        payload_off: RelayMode::Off.as_payload(),
        device: DeviceDescriptor {
            identifiers: vec![name.to_string()],
            manufacturer: device.manufacturer.clone(),
            model: device.model.clone(),
            name: name.to_string(),
        },
    }
}

pub fn switch_payload(
    device: &DeviceConfig,
    topics: &Topics,
    channel: ChannelId,
) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&switch_descriptor(device, topics, channel))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_is_a_single_valid_object() {
        let device = DeviceConfig::default();
        let topics = Topics::new("picoRelay", "0x00e6614103");

        let raw = switch_payload(&device, &topics, 2).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(
            value,
            json!({
                "name": "picoRelay_ch_2",
                "unique_id": "picoRelay_relay_2_pico",
                "command_topic": "picoRelay/command/relay/2",
                "state_topic": "picoRelay/status/relay/2",
                "availability": [{ "topic": "picoRelay/status" }],
                "payload_on": "1",
                "payload_off": "0",
                "device": {
                    "identifiers": ["picoRelay"],
                    "manufacturer": "Waveshare",
                    "model": "Pico Relay B",
                    "name": "picoRelay"
                }
            })
        );
    }

    #[test]
    fn availability_uses_default_online_offline_payloads() {
        let topics = Topics::new("picoRelay", "0x00ab");

        let raw = switch_payload(&DeviceConfig::default(), &topics, 1).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(value["availability"][0]["topic"], "picoRelay/status");
        assert!(value.get("payload_available").is_none());
        assert!(value.get("payload_not_available").is_none());
    }

    #[test]
    fn device_strings_are_escaped() {
        let device = DeviceConfig {
            manufacturer: "Acme \"Relays\"".to_string(),
            ..DeviceConfig::default()
        };
        let topics = Topics::new("picoRelay", "0x00ab");

        let raw = switch_payload(&device, &topics, 1).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(value["device"]["manufacturer"], "Acme \"Relays\"");
    }
}
