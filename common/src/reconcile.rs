use tracing::debug;

use crate::{
    error::TransportFault,
    registry::{ChannelRegistry, RelayOutput, SwitchInput},
    telemetry::TelemetryClient,
    topics::relay_state_topic,
};

/// Publishes `<prefix>/relay/<id>` for every channel whose observed relay
/// level differs from what was last published, and for every channel that has
/// never been published. Returns the number of publishes.
///
/// `last_published` only moves after the client accepted the publish, so a
/// failed publish is retried on the next pass after recovery.
pub fn reconcile<R, S, C>(
    registry: &mut ChannelRegistry<R, S>,
    client: &mut C,
    status_prefix: &str,
) -> Result<usize, TransportFault>
where
    R: RelayOutput,
    S: SwitchInput,
    C: TelemetryClient + ?Sized,
{
    let mut published = 0;

    for channel in registry.iter_mut() {
        let observed = channel.relay_state();
        if channel.last_published() == Some(observed) {
            continue;
        }

        let topic = relay_state_topic(status_prefix, channel.id());
        client.publish(&topic, observed.as_payload().as_bytes(), false)?;
        channel.mark_published(observed);
        published += 1;

        debug!("published {topic} = {}", observed.as_payload());
    }

    Ok(published)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        testing::{board, FakeClient, Published},
        types::RelayMode,
    };

    const PREFIX: &str = "picoRelay/status";

    #[test]
    fn first_pass_publishes_every_channel_once() {
        let (mut registry, relays) = board(8);
        relays[4].force(RelayMode::On);
        let mut client = FakeClient::default();

        let count = reconcile(&mut registry, &mut client, PREFIX).unwrap();

        assert_eq!(count, 8);
        let expected: Vec<Published> = (1..=8)
            .map(|id| {
                let payload = if id == 5 { "1" } else { "0" };
                Published::new(&format!("{PREFIX}/relay/{id}"), payload, false)
            })
            .collect();
        assert_eq!(client.published(), expected);
        for (channel, relay) in registry.iter().zip(&relays) {
            assert_eq!(channel.last_published(), Some(relay.level()));
        }
    }

    #[test]
    fn unchanged_outputs_publish_nothing() {
        let (mut registry, _) = board(8);
        let mut client = FakeClient::default();
        reconcile(&mut registry, &mut client, PREFIX).unwrap();
        client.take_published();

        let count = reconcile(&mut registry, &mut client, PREFIX).unwrap();

        assert_eq!(count, 0);
        assert!(client.published().is_empty());
    }

    #[test]
    fn publishes_only_changed_channel() {
        let (mut registry, relays) = board(8);
        let mut client = FakeClient::default();
        reconcile(&mut registry, &mut client, PREFIX).unwrap();
        client.take_published();

        relays[6].force(RelayMode::On);
        reconcile(&mut registry, &mut client, PREFIX).unwrap();

        assert_eq!(
            client.take_published(),
            vec![Published::new("picoRelay/status/relay/7", "1", false)]
        );
    }

    #[test]
    fn command_is_visible_in_same_tick() {
        let (mut registry, _) = board(8);
        let mut client = FakeClient::default();
        reconcile(&mut registry, &mut client, PREFIX).unwrap();
        client.take_published();

        registry.set_mode(3, 1).unwrap();
        reconcile(&mut registry, &mut client, PREFIX).unwrap();
        assert_eq!(
            client.take_published(),
            vec![Published::new("picoRelay/status/relay/3", "1", false)]
        );

        reconcile(&mut registry, &mut client, PREFIX).unwrap();
        assert!(client.published().is_empty());
    }

    #[test]
    fn toggling_back_before_a_pass_publishes_nothing() {
        let (mut registry, relays) = board(2);
        let mut client = FakeClient::default();
        reconcile(&mut registry, &mut client, PREFIX).unwrap();
        client.take_published();

        relays[0].force(RelayMode::On);
        relays[0].force(RelayMode::Off);
        reconcile(&mut registry, &mut client, PREFIX).unwrap();

        assert!(client.published().is_empty());
    }

    #[test]
    fn failed_publish_leaves_channel_unpublished() {
        let (mut registry, _) = board(8);
        let mut client = FakeClient::default();
        client.fail_publish_at(3);

        let err = reconcile(&mut registry, &mut client, PREFIX).unwrap_err();

        assert!(matches!(err, TransportFault::Publish { ref topic, .. } if topic == "picoRelay/status/relay/3"));
        assert_eq!(client.published().len(), 2);
        assert_eq!(registry.get(2).unwrap().last_published(), Some(RelayMode::Off));
        assert_eq!(registry.get(3).unwrap().last_published(), None);
    }
}
