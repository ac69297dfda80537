use tracing::{debug, info, warn};

use crate::{
    config::DeviceConfig,
    discovery,
    dispatch::dispatch,
    error::TransportFault,
    heartbeat::Heartbeat,
    reconcile::reconcile,
    registry::{ChannelRegistry, RelayOutput, SwitchInput},
    telemetry::TelemetryClient,
    topics::{Topics, PAYLOAD_ONLINE},
    types::RelayCommand,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub command: Option<RelayCommand>,
    pub published: usize,
    pub heartbeat: bool,
}

/// Everything one session mutates: the channels, the heartbeat counter and the
/// topic layout. Rebuilt from scratch on every restart.
#[derive(Debug)]
pub struct DeviceContext<R, S> {
    registry: ChannelRegistry<R, S>,
    heartbeat: Heartbeat,
    topics: Topics,
    device: DeviceConfig,
}

impl<R: RelayOutput, S: SwitchInput> DeviceContext<R, S> {
    pub fn new(
        registry: ChannelRegistry<R, S>,
        device: DeviceConfig,
        topics: Topics,
        heartbeat_threshold: u32,
    ) -> Self {
        Self {
            registry,
            heartbeat: Heartbeat::new(heartbeat_threshold),
            topics,
            device,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry<R, S> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ChannelRegistry<R, S> {
        &mut self.registry
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    /// Session setup after connect: command subscription, retained discovery
    /// descriptors and the first `online`.
    pub fn announce<C: TelemetryClient + ?Sized>(
        &self,
        client: &mut C,
    ) -> Result<(), TransportFault> {
        let filter = self.topics.command_filter();
        client.subscribe(&filter)?;
        info!("subscribed to {filter}");

        for id in self.registry.ids() {
            let topic = self.topics.discovery(id);
            match discovery::switch_payload(&self.device, &self.topics, id) {
                Ok(payload) => client.publish(&topic, &payload, true)?,
                Err(err) => warn!("discovery payload for channel {id} failed to encode: {err}"),
            }
        }
        info!("published discovery for {} channel(s)", self.registry.len());

        self.publish_online(client)
    }

    /// One pass of the control loop: at most one inbound command, then the
    /// reconciliation scan, then the heartbeat.
    pub fn tick<C: TelemetryClient + ?Sized>(
        &mut self,
        client: &mut C,
    ) -> Result<TickReport, TransportFault> {
        let mut report = TickReport::default();

        if let Some(message) = client.poll_message()? {
            debug!("inbound message on {}", message.topic);
            report.command = dispatch(&mut self.registry, &message);
        }

        report.published = reconcile(&mut self.registry, client, self.topics.status())?;

        if self.heartbeat.tick() {
            self.publish_online(client)?;
            report.heartbeat = true;
        }

        Ok(report)
    }

    fn publish_online<C: TelemetryClient + ?Sized>(
        &self,
        client: &mut C,
    ) -> Result<(), TransportFault> {
        client.publish(self.topics.status(), PAYLOAD_ONLINE.as_bytes(), false)
    }
}
