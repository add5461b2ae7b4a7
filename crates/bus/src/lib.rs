pub mod endpoint;
pub mod errors;
pub mod publisher;
pub mod subscriber;

pub use endpoint::{BusEndpoint, topic_for};
pub use errors::BusError;
pub use publisher::{MqttPublisher, ResultSink};
pub use subscriber::{Delivery, DeliverySource, MqttSubscriber};
