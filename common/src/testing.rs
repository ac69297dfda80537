//! In-memory stand-ins for pins, the broker client and the platform.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    time::Duration,
};

use crate::{
    error::TransportFault,
    registry::{ChannelRegistry, RelayOutput, SwitchInput},
    supervisor::Platform,
    telemetry::{SessionOptions, TelemetryClient},
    types::{AssociationStatus, InboundMessage, RelayMode},
};

#[derive(Debug, Clone, Default)]
pub struct FakeRelay {
    high: Rc<Cell<bool>>,
}

impl FakeRelay {
    pub fn level(&self) -> RelayMode {
        RelayMode::from_level(self.high.get())
    }

    /// Changes the output behind the registry's back.
    pub fn force(&self, mode: RelayMode) {
        self.high.set(mode.is_on());
    }
}

impl RelayOutput for FakeRelay {
    fn drive(&mut self, mode: RelayMode) {
        self.high.set(mode.is_on());
    }

    fn observed(&self) -> RelayMode {
        self.level()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSwitch {
    closed: Rc<Cell<bool>>,
}

impl SwitchInput for FakeSwitch {
    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

pub type FakeRegistry = ChannelRegistry<FakeRelay, FakeSwitch>;

pub fn board(channels: usize) -> (FakeRegistry, Vec<FakeRelay>) {
    let relays: Vec<FakeRelay> = (0..channels).map(|_| FakeRelay::default()).collect();
    let registry =
        ChannelRegistry::new(relays.iter().cloned().map(|relay| (relay, FakeSwitch::default())));
    (registry, relays)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl Published {
    pub fn new(topic: &str, payload: &str, retain: bool) -> Self {
        Self {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        }
    }
}

#[derive(Debug, Default)]
struct ClientLog {
    published: Vec<Published>,
    subscriptions: Vec<String>,
    inbound: VecDeque<InboundMessage>,
    publish_attempts: usize,
    polls: usize,
    fail_publish_at: Option<usize>,
    fail_poll_at: Option<usize>,
    fail_subscribe: bool,
}

/// Records everything sent to the broker. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    log: Rc<RefCell<ClientLog>>,
}

impl FakeClient {
    pub fn published(&self) -> Vec<Published> {
        self.log.borrow().published.clone()
    }

    pub fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut self.log.borrow_mut().published)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.log.borrow().subscriptions.clone()
    }

    pub fn polls(&self) -> usize {
        self.log.borrow().polls
    }

    pub fn push_inbound(&self, topic: &str, payload: &str) {
        self.log
            .borrow_mut()
            .inbound
            .push_back(InboundMessage::new(topic, payload.as_bytes()));
    }

    /// Fails the n-th publish attempt (1-based) and every one after it.
    pub fn fail_publish_at(&self, attempt: usize) {
        self.log.borrow_mut().fail_publish_at = Some(attempt);
    }

    /// Fails the n-th poll (1-based) and every one after it.
    pub fn fail_poll_at(&self, poll: usize) {
        self.log.borrow_mut().fail_poll_at = Some(poll);
    }

    pub fn fail_subscribe(&self) {
        self.log.borrow_mut().fail_subscribe = true;
    }
}

impl TelemetryClient for FakeClient {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportFault> {
        let mut log = self.log.borrow_mut();
        log.publish_attempts += 1;
        let attempts = log.publish_attempts;
        if log.fail_publish_at.is_some_and(|attempt| attempts >= attempt) {
            return Err(TransportFault::Publish {
                topic: topic.to_string(),
                reason: "socket closed".to_string(),
            });
        }

        log.published.push(Published {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            retain,
        });
        Ok(())
    }

    fn subscribe(&mut self, filter: &str) -> Result<(), TransportFault> {
        let mut log = self.log.borrow_mut();
        if log.fail_subscribe {
            return Err(TransportFault::Subscribe {
                topic: filter.to_string(),
                reason: "not authorized".to_string(),
            });
        }
        log.subscriptions.push(filter.to_string());
        Ok(())
    }

    fn poll_message(&mut self) -> Result<Option<InboundMessage>, TransportFault> {
        let mut log = self.log.borrow_mut();
        log.polls += 1;
        let polls = log.polls;
        if log.fail_poll_at.is_some_and(|poll| polls >= poll) {
            return Err(TransportFault::Receive("connection reset".to_string()));
        }
        Ok(log.inbound.pop_front())
    }
}

/// Scripted platform. Association statuses are consumed in order; once the
/// script runs out the last entry repeats.
#[derive(Debug)]
pub struct FakePlatform {
    pub client: FakeClient,
    pub association_script: VecDeque<AssociationStatus>,
    pub association_begun: usize,
    pub association_polls: usize,
    pub connect_error: Option<TransportFault>,
    pub sessions: Vec<SessionOptions>,
    pub sleeps: Vec<Duration>,
}

impl FakePlatform {
    pub fn associated() -> Self {
        Self::with_association([AssociationStatus::Associated])
    }

    pub fn with_association(script: impl IntoIterator<Item = AssociationStatus>) -> Self {
        Self {
            client: FakeClient::default(),
            association_script: script.into_iter().collect(),
            association_begun: 0,
            association_polls: 0,
            connect_error: None,
            sessions: Vec::new(),
            sleeps: Vec::new(),
        }
    }

    pub fn sleeps_of(&self, duration: Duration) -> usize {
        self.sleeps.iter().filter(|slept| **slept == duration).count()
    }
}

impl Platform for FakePlatform {
    type Client = FakeClient;

    fn hardware_id(&self) -> Vec<u8> {
        vec![0xe6, 0x61]
    }

    fn begin_association(&mut self) -> Result<(), TransportFault> {
        self.association_begun += 1;
        Ok(())
    }

    fn association_status(&mut self) -> AssociationStatus {
        self.association_polls += 1;
        if self.association_script.len() > 1 {
            self.association_script
                .pop_front()
                .unwrap_or(AssociationStatus::Pending)
        } else {
            self.association_script
                .front()
                .cloned()
                .unwrap_or(AssociationStatus::Pending)
        }
    }

    fn open_session(&mut self, options: &SessionOptions) -> Result<Self::Client, TransportFault> {
        self.sessions.push(options.clone());
        match self.connect_error.clone() {
            Some(err) => Err(err),
            None => Ok(self.client.clone()),
        }
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}
