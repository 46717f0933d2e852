pub mod engine;
pub mod message;
pub mod topic;

pub use engine::{Broker, DeliveryReport};
pub use message::{Message, MessageKind};
pub use topic::{SubscriberId, Topic, TopicRegistry};
