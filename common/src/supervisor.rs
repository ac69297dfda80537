//! Recovery supervisor: associate, connect, run the tick loop until the
//! transport faults, back off once and hand the restart to the caller.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    config::{LoopConfig, RuntimeConfig},
    context::DeviceContext,
    error::{SupervisorError, TransportFault},
    registry::{ChannelRegistry, RelayOutput, SwitchInput},
    telemetry::{LastWill, SessionOptions, TelemetryClient},
    topics::{device_unique_id, Topics, PAYLOAD_OFFLINE},
    types::AssociationStatus,
};

/// Network link, broker session factory and clock of the board.
pub trait Platform {
    type Client: TelemetryClient;

    /// Stable per-board bytes used to derive the discovery node id.
    fn hardware_id(&self) -> Vec<u8>;
    fn begin_association(&mut self) -> Result<(), TransportFault>;
    fn association_status(&mut self) -> AssociationStatus;
    /// Connects to the broker with the last-will registered. Returns once the
    /// session is usable.
    fn open_session(&mut self, options: &SessionOptions) -> Result<Self::Client, TransportFault>;
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Associating,
    Connected,
    Fault,
}

/// Returned after the post-fault backoff. The caller restarts the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restart {
    pub fault: TransportFault,
}

pub struct Supervisor<P, R, S> {
    platform: P,
    context: DeviceContext<R, S>,
    timing: LoopConfig,
    client_id: String,
    state: SupervisorState,
}

impl<P, R, S> Supervisor<P, R, S>
where
    P: Platform,
    R: RelayOutput,
    S: SwitchInput,
{
    pub fn new(platform: P, registry: ChannelRegistry<R, S>, config: &RuntimeConfig) -> Self {
        let device = config.device.clone();
        let unique_id = device_unique_id(device.unique_id.as_deref(), &platform.hardware_id());
        let topics = Topics::new(device.name.clone(), unique_id);
        let client_id = device.name.clone();
        let context =
            DeviceContext::new(registry, device, topics, config.timing.heartbeat_threshold);

        Self {
            platform,
            context,
            timing: config.timing.clone(),
            client_id,
            state: SupervisorState::Disconnected,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn context(&self) -> &DeviceContext<R, S> {
        &self.context
    }

    /// Runs one session from association to the post-fault backoff.
    ///
    /// Association failure is fatal and returned as an error; any transport
    /// fault after that ends in `Ok(Restart)` once the backoff has elapsed.
    pub fn run(&mut self) -> Result<Restart, SupervisorError> {
        self.enter(SupervisorState::Associating);
        self.associate()?;

        let fault = match self.connect() {
            Ok(mut client) => {
                self.enter(SupervisorState::Connected);
                self.serve(&mut client)
            }
            Err(fault) => fault,
        };

        self.enter(SupervisorState::Fault);
        let backoff = self.timing.fault_backoff();
        warn!("transport fault: {fault}; restarting in {}ms", backoff.as_millis());
        self.platform.sleep(backoff);

        Ok(Restart { fault })
    }

    fn enter(&mut self, next: SupervisorState) {
        debug!("supervisor {:?} -> {next:?}", self.state);
        self.state = next;
    }

    fn associate(&mut self) -> Result<(), SupervisorError> {
        let attempts = self.timing.association_attempts;
        let poll = self.timing.association_poll();

        self.platform
            .begin_association()
            .map_err(|fault| SupervisorError::AssociationFailed(fault.to_string()))?;

        for attempt in 1..=attempts {
            match self.platform.association_status() {
                AssociationStatus::Associated => {
                    info!("network associated after {attempt} check(s)");
                    return Ok(());
                }
                AssociationStatus::Failed(reason) => {
                    return Err(SupervisorError::AssociationFailed(reason));
                }
                AssociationStatus::Pending => {
                    info!("waiting for network ({attempt}/{attempts})");
                    self.platform.sleep(poll);
                }
            }
        }

        match self.platform.association_status() {
            AssociationStatus::Associated => {
                info!("network associated");
                Ok(())
            }
            AssociationStatus::Failed(reason) => Err(SupervisorError::AssociationFailed(reason)),
            AssociationStatus::Pending => Err(SupervisorError::AssociationTimeout { attempts }),
        }
    }

    fn connect(&mut self) -> Result<P::Client, TransportFault> {
        let topics = self.context.topics();
        let options = SessionOptions {
            client_id: self.client_id.clone(),
            keep_alive: self.timing.keep_alive(),
            connect_timeout: self.timing.connect_timeout(),
            last_will: LastWill {
                topic: topics.status().to_string(),
                payload: PAYLOAD_OFFLINE.to_string(),
                retain: false,
            },
        };

        let mut client = self.platform.open_session(&options)?;
        info!("connected to broker as {}", options.client_id);
        self.context.announce(&mut client)?;
        Ok(client)
    }

    fn serve(&mut self, client: &mut P::Client) -> TransportFault {
        let interval = self.timing.tick_interval();
        loop {
            if let Err(fault) = self.context.tick(client) {
                return fault;
            }
            self.platform.sleep(interval);
        }
    }
}
