use std::time::Duration;

use crate::{error::TransportFault, types::InboundMessage};

/// Broker session as seen by the tick loop. Publishes are fire-and-forget and
/// `poll_message` never blocks.
pub trait TelemetryClient {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportFault>;
    fn subscribe(&mut self, filter: &str) -> Result<(), TransportFault>;
    fn poll_message(&mut self) -> Result<Option<InboundMessage>, TransportFault>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub last_will: LastWill,
}
