use std::num::IntErrorKind;

use tracing::{info, warn};

use crate::{
    error::CommandError,
    registry::{ChannelRegistry, RelayOutput, SwitchInput},
    types::{ChannelId, InboundMessage, RelayCommand, RelayMode},
};

/// Decodes `<device>/command/relay/<id>` + `0|1` into a relay command.
///
/// The channel id comes from the last topic segment; the payload must be the
/// integer 0 or 1, surrounding ASCII whitespace allowed. Any integer id
/// outside `1..=channel_count`, negative or huge ones included, is rejected
/// as unknown.
pub fn decode(
    topic: &str,
    payload: &[u8],
    channel_count: usize,
) -> Result<RelayCommand, CommandError> {
    let malformed = |reason: &'static str| CommandError::Malformed {
        topic: topic.to_string(),
        reason,
    };

    let segment = topic.rsplit('/').next().unwrap_or_default();
    let id = match segment.parse::<i64>() {
        Ok(id) => Some(id),
        // Too large for i64: still an integer, never a configured channel.
        Err(err)
            if matches!(
                err.kind(),
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
            ) =>
        {
            None
        }
        Err(_) => return Err(malformed("channel id is not an integer")),
    };

    let text = std::str::from_utf8(payload).map_err(|_| malformed("payload is not utf-8"))?;
    let mode = match text.trim().parse::<i64>() {
        Ok(0) => RelayMode::Off,
        Ok(1) => RelayMode::On,
        Ok(_) => return Err(malformed("mode must be 0 or 1")),
        Err(_) => return Err(malformed("mode is not an integer")),
    };

    let channel = id
        .and_then(|id| ChannelId::try_from(id).ok())
        .filter(|channel| (1..=channel_count).contains(&usize::from(*channel)))
        .ok_or_else(|| CommandError::UnknownChannel(segment.to_string()))?;

    Ok(RelayCommand { channel, mode })
}

/// Applies one inbound command to the registry. Bad commands are logged and
/// dropped; nothing here is fatal and nothing is published.
pub fn dispatch<R: RelayOutput, S: SwitchInput>(
    registry: &mut ChannelRegistry<R, S>,
    message: &InboundMessage,
) -> Option<RelayCommand> {
    let command = match decode(&message.topic, &message.payload, registry.len()) {
        Ok(command) => command,
        Err(err) => {
            warn!(
                "dropping command on {} (payload {:?}): {err}",
                message.topic,
                String::from_utf8_lossy(&message.payload)
            );
            return None;
        }
    };

    match registry.set_mode(command.channel, command.mode.into()) {
        Ok(()) => {
            info!("Channel {}: {}", command.channel, command.mode.as_str());
            Some(command)
        }
        Err(err) => {
            warn!("Channel {}: ERR ({err})", command.channel);
            None
        }
    }
}
