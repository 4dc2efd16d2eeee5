pub mod dal;
pub mod message_bus;
pub mod protocol;

pub use dal::{Dal, DalError};
pub use message_bus::{Message, MessageBus, MessageBusStats, SubscriptionId};
pub use protocol::{Failure, SyncSnapshot, VersionedWrite};
