pub mod config;
pub mod context;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod reconcile;
pub mod registry;
pub mod supervisor;
pub mod telemetry;
pub mod topics;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{BoardConfig, ChannelPins, DeviceConfig, LoopConfig, NetworkConfig, RuntimeConfig};
pub use context::{DeviceContext, TickReport};
pub use error::{CommandError, RegistryError, SupervisorError, TransportFault};
pub use heartbeat::Heartbeat;
pub use registry::{Channel, ChannelRegistry, RelayOutput, SwitchInput};
pub use supervisor::{Platform, Restart, Supervisor, SupervisorState};
pub use telemetry::{LastWill, SessionOptions, TelemetryClient};
pub use topics::*;
pub use types::{AssociationStatus, ChannelId, InboundMessage, RelayCommand, RelayMode};
