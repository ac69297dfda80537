//! Hand-off between a broker client's connection thread or task and the
//! synchronous tick loop.
//!
//! Inbound messages go through a bounded queue; the tick loop drains one per
//! tick, so a flood of commands is dropped at the queue instead of growing
//! memory. Connection events use their own channel and are never dropped.

use std::{
    sync::mpsc::{
        self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError,
    },
    time::Duration,
};

use relay_common::{InboundMessage, TransportFault};

/// Inbound messages buffered between ticks.
pub const MESSAGE_QUEUE_DEPTH: usize = 16;

#[derive(Debug)]
pub enum SessionEvent {
    Connected,
    Message(InboundMessage),
    Fault(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The message queue was full; the message is handed back for logging.
    Dropped(InboundMessage),
    /// The tick loop is gone.
    Closed,
}

pub fn channel(depth: usize) -> (EventSender, EventReceiver) {
    let (message_tx, message_rx) = mpsc::sync_channel(depth);
    let (control_tx, control_rx) = mpsc::channel();
    (
        EventSender {
            messages: message_tx,
            control: control_tx,
        },
        EventReceiver {
            messages: message_rx,
            control: control_rx,
        },
    )
}

pub struct EventSender {
    messages: SyncSender<InboundMessage>,
    control: Sender<SessionEvent>,
}

impl EventSender {
    /// Never blocks.
    pub fn send(&self, event: SessionEvent) -> Delivery {
        match event {
            SessionEvent::Message(message) => match self.messages.try_send(message) {
                Ok(()) => Delivery::Queued,
                Err(TrySendError::Full(message)) => Delivery::Dropped(message),
                Err(TrySendError::Disconnected(_)) => Delivery::Closed,
            },
            control => match self.control.send(control) {
                Ok(()) => Delivery::Queued,
                Err(_) => Delivery::Closed,
            },
        }
    }
}

pub struct EventReceiver {
    messages: Receiver<InboundMessage>,
    control: Receiver<SessionEvent>,
}

impl EventReceiver {
    /// Blocks until the broker acknowledges the connection.
    pub fn wait_for_connack(&self, timeout: Duration) -> Result<(), TransportFault> {
        loop {
            match self.control.recv_timeout(timeout) {
                Ok(SessionEvent::Connected) => return Ok(()),
                Ok(SessionEvent::Message(_)) => continue,
                Ok(SessionEvent::Fault(reason)) => return Err(TransportFault::Connect(reason)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TransportFault::Connect(format!(
                        "no CONNACK within {}ms",
                        timeout.as_millis()
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportFault::Connect("connection closed".to_string()));
                }
            }
        }
    }

    /// Non-blocking receive of at most one inbound message. A pending fault
    /// wins over queued messages.
    pub fn next_message(&self) -> Result<Option<InboundMessage>, TransportFault> {
        loop {
            match self.control.try_recv() {
                Ok(SessionEvent::Fault(reason)) => {
                    return Err(TransportFault::Disconnected(reason));
                }
                Ok(_) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        match self.messages.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(TransportFault::Receive("connection closed".to_string()))
            }
        }
    }
}
