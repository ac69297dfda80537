use tracing::debug;

use crate::{
    error::RegistryError,
    types::{ChannelId, RelayMode},
};

/// A driven relay output. Reading it back returns the level the pin is
/// actually driving, which is treated as ground truth for telemetry.
pub trait RelayOutput {
    fn drive(&mut self, mode: RelayMode);
    fn observed(&self) -> RelayMode;
}

/// Manual override switch wired next to each relay.
pub trait SwitchInput {
    fn is_closed(&self) -> bool;
}

#[derive(Debug)]
pub struct Channel<R, S> {
    id: ChannelId,
    relay: R,
    switch: S,
    last_published: Option<RelayMode>,
}

impl<R: RelayOutput, S: SwitchInput> Channel<R, S> {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn relay_state(&self) -> RelayMode {
        self.relay.observed()
    }

    pub fn switch_closed(&self) -> bool {
        self.switch.is_closed()
    }

    pub fn last_published(&self) -> Option<RelayMode> {
        self.last_published
    }

    pub(crate) fn mark_published(&mut self, mode: RelayMode) {
        self.last_published = Some(mode);
    }
}

/// Fixed set of channels, built once at startup and mutated in place.
#[derive(Debug)]
pub struct ChannelRegistry<R, S> {
    channels: Vec<Channel<R, S>>,
}

impl<R: RelayOutput, S: SwitchInput> ChannelRegistry<R, S> {
    /// Assigns ids 1..=N in iteration order. Pairs beyond `u8::MAX` are ignored.
    pub fn new(pins: impl IntoIterator<Item = (R, S)>) -> Self {
        let channels = pins
            .into_iter()
            .zip(1..=ChannelId::MAX)
            .map(|((relay, switch), id)| Channel {
                id,
                relay,
                switch,
                last_published: None,
            })
            .collect();
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().map(|channel| channel.id)
    }

    pub fn get(&self, id: ChannelId) -> Result<&Channel<R, S>, RegistryError> {
        self.index_of(id)
            .map(|index| &self.channels[index])
            .ok_or(RegistryError::OutOfRange(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel<R, S>> {
        self.channels.iter()
    }

    /// Ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel<R, S>> {
        self.channels.iter_mut()
    }

    pub fn set_mode(&mut self, id: ChannelId, mode: u8) -> Result<(), RegistryError> {
        let index = self.index_of(id).ok_or(RegistryError::OutOfRange(id))?;
        let mode = RelayMode::try_from(mode)?;

        let channel = &mut self.channels[index];
        channel.relay.drive(mode);
        debug!("relay {id} driven {}", mode.as_str());
        Ok(())
    }

    fn index_of(&self, id: ChannelId) -> Option<usize> {
        // Ids are dense and 1-based.
        let index = usize::from(id).checked_sub(1)?;
        (index < self.channels.len()).then_some(index)
    }
}
