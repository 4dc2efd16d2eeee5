//! Storage adapters answering DAL requests on a message bus.

pub mod local;
pub mod remote;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::core::message_bus::{MessageBus, SubscriptionId};
use crate::core::protocol::{Failure, FAILURE, SUCCESS};
use crate::core::Dal;
use crate::db::KvStore;

pub use local::LocalAdapter;
pub use remote::RemoteAdapter;

/// Subscribes an async handler for one request name. Each request is served
/// on its own task and answered with `:success` or `:failure`.
pub(crate) fn serve<F, Fut>(bus: &Arc<MessageBus>, name: &'static str, handler: F) -> SubscriptionId
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
{
    let weak = Arc::downgrade(bus);
    bus.subscribe(name, move |request| {
        let Some(bus) = weak.upgrade() else {
            return;
        };
        let request = request.clone();
        let pending = handler(request.payload.clone());
        tokio::spawn(async move {
            let reply = match pending.await {
                Ok(payload) => request.reply(SUCCESS, payload),
                Err(failure) => {
                    warn!(name, error = %failure.error, "request failed");
                    request.reply(FAILURE, failure.to_value())
                }
            };
            bus.publish_message(reply);
        });
    })
}

/// The local DAL, plus a remote DAL when a sync endpoint is configured.
/// Each DAL has its own bus so the two adapters never answer each other's
/// requests.
#[derive(Clone)]
pub struct DataLayer {
    store: Arc<dyn KvStore>,
    local: Dal,
    remote: Option<Dal>,
}

impl DataLayer {
    pub fn new(store: Arc<dyn KvStore>, timeout: Option<Duration>) -> Self {
        let bus = Arc::new(MessageBus::new());
        LocalAdapter::new(Arc::clone(&store)).attach(&bus);
        Self {
            store,
            local: Dal::new(bus, timeout),
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<RemoteAdapter>, timeout: Option<Duration>) -> Self {
        let bus = Arc::new(MessageBus::new());
        remote.attach(&bus);
        self.remote = Some(Dal::new(bus, timeout));
        self
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn local(&self) -> &Dal {
        &self.local
    }

    pub fn remote(&self) -> Option<&Dal> {
        self.remote.as_ref()
    }
}
