use rumqttc::MqttOptions;
use std::fmt;
use std::time::Duration;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// One side of the topic-based broker: where to connect and which
/// exchange/routing key the traffic flows through.
///
/// The exchange/routing-key model maps onto MQTT topics as
/// `[vdir/]exchange/routing/key`, see [`topic_for`]. A non-empty `queue`
/// names a persistent session; an empty one gets an anonymous clean session
/// that the broker discards on disconnect.
#[derive(Clone, PartialEq)]
pub struct BusEndpoint {
    pub host: String,
    pub port: u16,
    pub vdir: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
    pub max_packet_bytes: usize,
}

impl BusEndpoint {
    pub fn topic(&self) -> String {
        topic_for(&self.vdir, &self.exchange, &self.routing_key)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Client id and clean-session flag for a connection made on behalf of `role`.
    pub(crate) fn session(&self, role: &str) -> (String, bool) {
        if self.queue.is_empty() {
            (format!("{}-{:08x}", role, fastrand::u32(..)), true)
        } else {
            (self.queue.clone(), false)
        }
    }

    pub(crate) fn mqtt_options(&self, client_id: String, clean_session: bool) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(clean_session);
        options.set_max_packet_size(self.max_packet_bytes, self.max_packet_bytes);

        if let Some(user) = &self.user {
            options.set_credentials(user.clone(), self.password.clone().unwrap_or_default());
        }

        options
    }
}

impl fmt::Debug for BusEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vdir", &self.vdir)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("queue", &self.queue)
            .field("max_packet_bytes", &self.max_packet_bytes)
            .finish()
    }
}

/// Translates an exchange + dotted routing key into an MQTT topic (filter).
///
/// Routing-key words become topic levels, `*` becomes `+` and `#` is kept.
/// The virtual directory, when not `/`, prefixes the topic.
pub fn topic_for(vdir: &str, exchange: &str, routing_key: &str) -> String {
    let vdir = vdir.trim_matches('/');
    let exchange = exchange.trim_matches('/');

    let mut levels: Vec<&str> = Vec::new();
    if !vdir.is_empty() {
        levels.push(vdir);
    }
    if !exchange.is_empty() {
        levels.push(exchange);
    }
    levels.extend(
        routing_key
            .split('.')
            .filter(|word| !word.is_empty())
            .map(|word| if word == "*" { "+" } else { word }),
    );

    levels.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(queue: &str) -> BusEndpoint {
        BusEndpoint {
            host: "broker".into(),
            port: 1883,
            vdir: "/".into(),
            user: Some("worker".into()),
            password: Some("hunter2".into()),
            exchange: "knightware.cameraImages".into(),
            routing_key: "actions.write.image".into(),
            queue: queue.into(),
            max_packet_bytes: 1024,
        }
    }

    #[test]
    fn test_root_vdir_adds_no_prefix() {
        assert_eq!(
            topic_for("/", "knightware.cameraImages", "actions.write.image"),
            "knightware.cameraImages/actions/write/image"
        );
        assert_eq!(topic_for("", "ex", "a"), "ex/a");
    }

    #[test]
    fn test_named_vdir_prefixes_topic() {
        assert_eq!(topic_for("/plant1/", "ex", "a.b"), "plant1/ex/a/b");
    }

    #[test]
    fn test_routing_key_wildcards_are_translated() {
        assert_eq!(topic_for("/", "ex", "actions.*.image"), "ex/actions/+/image");
        assert_eq!(topic_for("/", "ex", "actions.#"), "ex/actions/#");
    }

    #[test]
    fn test_empty_queue_gets_anonymous_clean_session() {
        let (id, clean) = endpoint("").session("classifier-rx");
        assert!(id.starts_with("classifier-rx-"));
        assert_eq!(id.len(), "classifier-rx-".len() + 8);
        assert!(clean);
    }

    #[test]
    fn test_named_queue_is_persistent_session() {
        let (id, clean) = endpoint("classifier-queue").session("classifier-rx");
        assert_eq!(id, "classifier-queue");
        assert!(!clean);
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let rendered = format!("{:?}", endpoint(""));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_address_joins_host_and_port() {
        assert_eq!(endpoint("").address(), "broker:1883");
    }
}
