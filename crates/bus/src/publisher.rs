use crate::{BusEndpoint, BusError};
use rumqttc::{Client, Connection, Event, Outgoing, Packet, QoS, RecvTimeoutError};
use std::time::{Duration, Instant};

const REQUEST_CAPACITY: usize = 10;
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// Destination for serialized result messages.
pub trait ResultSink {
    fn send(&self, payload: &[u8]) -> Result<(), BusError>;

    /// Human-readable destination for log lines.
    fn destination(&self) -> String;
}

/// Publishes each payload over its own short-lived connection.
///
/// Every [`ResultSink::send`] connects, publishes with QoS 1, waits for the
/// PUBACK and disconnects, so a broken publish never leaves state behind
/// for the next one.
pub struct MqttPublisher {
    endpoint: BusEndpoint,
    topic: String,
    timeout: Duration,
}

impl MqttPublisher {
    pub fn new(endpoint: BusEndpoint, timeout: Duration) -> Self {
        let topic = endpoint.topic();
        Self {
            endpoint,
            topic,
            timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl ResultSink for MqttPublisher {
    fn send(&self, payload: &[u8]) -> Result<(), BusError> {
        // Publishes never reuse the receive session, even for a named queue.
        let (client_id, _) = BusEndpoint {
            queue: String::new(),
            ..self.endpoint.clone()
        }
        .session("classifier-tx");

        let options = self.endpoint.mqtt_options(client_id, true);
        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);

        client.try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload.to_vec())?;

        let deadline = Instant::now() + self.timeout;
        wait_for(&mut connection, deadline, self.timeout, |event| {
            matches!(event, Event::Incoming(Packet::PubAck(_)))
        })?;

        tracing::trace!(topic = %self.topic, bytes = payload.len(), "Publish acknowledged");

        client.try_disconnect()?;
        // The message is already acknowledged; a failed DISCONNECT flush is harmless.
        let _ = wait_for(
            &mut connection,
            Instant::now() + DISCONNECT_GRACE,
            DISCONNECT_GRACE,
            |event| matches!(event, Event::Outgoing(Outgoing::Disconnect)),
        );

        Ok(())
    }

    fn destination(&self) -> String {
        format!("{}/{}", self.endpoint.address(), self.topic)
    }
}

/// Drives the event loop until `done` matches an event, an error surfaces
/// or the deadline passes.
fn wait_for(
    connection: &mut Connection,
    deadline: Instant,
    budget: Duration,
    done: impl Fn(&Event) -> bool,
) -> Result<(), BusError> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(BusError::Timeout(budget));
        }

        match connection.recv_timeout(remaining) {
            Ok(Ok(event)) if done(&event) => return Ok(()),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(RecvTimeoutError::Timeout) => return Err(BusError::Timeout(budget)),
            Err(RecvTimeoutError::Disconnected) => return Err(BusError::Disconnected),
        }
    }
}
