use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("channel {0} is not configured")]
    OutOfRange(u8),
    #[error("relay mode {0} is not 0 or 1")]
    InvalidMode(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("malformed command on `{topic}`: {reason}")]
    Malformed { topic: String, reason: &'static str },
    #[error("command for unknown channel {0}")]
    UnknownChannel(String),
}

/// Anything the broker session or the network link reports. Never retried in
/// place: the supervisor backs off and restarts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFault {
    #[error("network association lost: {0}")]
    Association(String),
    #[error("broker connect failed: {0}")]
    Connect(String),
    #[error("subscribe to `{topic}` failed: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("publish to `{topic}` failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("message receive failed: {0}")]
    Receive(String),
    #[error("broker session closed: {0}")]
    Disconnected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("network not associated after {attempts} attempts")]
    AssociationTimeout { attempts: u32 },
    #[error("network association failed: {0}")]
    AssociationFailed(String),
}
