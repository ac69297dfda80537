use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

pub type ChannelId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayMode {
    Off,
    On,
}

impl RelayMode {
    pub fn from_level(high: bool) -> Self {
        if high {
            Self::On
        } else {
            Self::Off
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Wire form used on both the command and the status topics.
    pub fn as_payload(self) -> &'static str {
        match self {
            Self::Off => "0",
            Self::On => "1",
        }
    }
}

impl TryFrom<u8> for RelayMode {
    type Error = RegistryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::On),
            other => Err(RegistryError::InvalidMode(other)),
        }
    }
}

impl From<RelayMode> for u8 {
    fn from(mode: RelayMode) -> Self {
        match mode {
            RelayMode::Off => 0,
            RelayMode::On => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCommand {
    pub channel: ChannelId,
    pub mode: RelayMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationStatus {
    Pending,
    Associated,
    Failed(String),
}
