use crate::BusEndpoint;
use common::retry::Backoff;
use rumqttc::{Client, Connection, Event, Packet, QoS, RecvTimeoutError};
use std::time::{Duration, Instant};

const REQUEST_CAPACITY: usize = 10;

/// A message taken off the inbound subscription.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Anything that yields inbound deliveries one at a time.
pub trait DeliverySource {
    /// Waits up to `timeout`; `None` means nothing is ready yet.
    fn next_delivery(&mut self, timeout: Duration) -> Option<Delivery>;
}

/// Long-lived subscription on the inbound topic.
///
/// Deliveries use QoS 0: the broker considers a message handled as soon as
/// it is sent, so a crash mid-processing loses it (at-most-once). The
/// subscription is (re)issued after every CONNACK and connection errors are
/// retried with exponential backoff.
pub struct MqttSubscriber {
    client: Client,
    connection: Connection,
    topic: String,
    address: String,
    backoff: Backoff,
    reconnect_attempts: u32,
    retry_at: Option<Instant>,
}

impl MqttSubscriber {
    pub fn connect(endpoint: &BusEndpoint) -> Self {
        let (client_id, clean_session) = endpoint.session("classifier-rx");
        let options = endpoint.mqtt_options(client_id.clone(), clean_session);
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let topic = endpoint.topic();

        tracing::info!(
            broker = %endpoint.address(),
            topic = %topic,
            client_id = %client_id,
            clean_session,
            "MQTT subscriber initialized"
        );

        Self {
            client,
            connection,
            topic,
            address: endpoint.address(),
            backoff: Backoff::RECONNECT,
            reconnect_attempts: 0,
            retry_at: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits up to `timeout` for the next delivery.
    ///
    /// Returns `None` when nothing arrived in time, including while waiting
    /// out a reconnect backoff, so callers can check for shutdown between
    /// calls.
    pub fn recv(&mut self, timeout: Duration) -> Option<Delivery> {
        let deadline = Instant::now() + timeout;

        if let Some(retry_at) = self.retry_at {
            let now = Instant::now();
            if retry_at > now {
                std::thread::sleep((retry_at - now).min(timeout));
                if Instant::now() < retry_at {
                    return None;
                }
            }
            self.retry_at = None;
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }

            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    return Some(Delivery {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    self.reconnect_attempts = 0;
                    tracing::info!(
                        broker = %self.address,
                        session_present = ack.session_present,
                        "MQTT connected to broker"
                    );
                    if let Err(e) = self.client.try_subscribe(self.topic.as_str(), QoS::AtMostOnce)
                    {
                        tracing::error!(error = %e, topic = %self.topic, "Failed to request subscription");
                    }
                }
                Ok(Ok(Event::Incoming(Packet::SubAck(_)))) => {
                    tracing::info!(topic = %self.topic, "Listening for messages");
                }
                Ok(Ok(Event::Incoming(Packet::PingResp))) => {
                    tracing::trace!("MQTT ping response received");
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
                    let backoff = self.backoff.delay(self.reconnect_attempts);
                    tracing::warn!(
                        error = %e,
                        attempt = self.reconnect_attempts,
                        backoff_ms = backoff.as_millis(),
                        "MQTT connection lost, reconnecting"
                    );
                    self.retry_at = Some(Instant::now() + backoff);
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::error!("MQTT request channel closed");
                    return None;
                }
            }
        }
    }
}

impl DeliverySource for MqttSubscriber {
    fn next_delivery(&mut self, timeout: Duration) -> Option<Delivery> {
        self.recv(timeout)
    }
}
