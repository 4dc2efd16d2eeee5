use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// A published message. Replies carry the request's correlation id.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub name: String,
    pub correlation_id: Option<Uuid>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            correlation_id: None,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// `<name>:<outcome>` with the same correlation id.
    pub fn reply(&self, outcome: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("{}:{outcome}", self.name),
            correlation_id: self.correlation_id,
            payload,
            created_at: Utc::now(),
        }
    }
}

pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    /// Pattern ending in a single `*`.
    Prefix(String),
    /// Literal segments around interior `*`s.
    Glob(Vec<String>),
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        match pattern.find('*') {
            None => Pattern::Exact(pattern.to_string()),
            Some(pos) if pos + 1 == pattern.len() => Pattern::Prefix(pattern[..pos].to_string()),
            Some(_) => Pattern::Glob(pattern.split('*').map(str::to_string).collect()),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Exact(exact) => exact == name,
            Pattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Pattern::Glob(segments) => glob_matches(segments, name),
        }
    }
}

fn glob_matches(segments: &[String], name: &str) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return name.is_empty();
    };
    let Some(mut remaining) = name.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for segment in middle {
        match remaining.find(segment.as_str()) {
            Some(at) => remaining = &remaining[at + segment.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

struct Subscriber {
    id: SubscriptionId,
    pattern: Pattern,
    handler: Handler,
}

/// In-process publish/subscribe keyed by message name.
///
/// Handlers run synchronously inside `publish`, in registration order, and
/// may publish again themselves. Long work belongs on a spawned task.
pub struct MessageBus {
    subscribers: RwLock<Vec<Subscriber>>,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.write().push(Subscriber {
            id,
            pattern: Pattern::parse(pattern),
            handler: Arc::new(handler),
        });
        debug!(pattern, "subscription added");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    pub fn publish(&self, name: &str, payload: Value) -> usize {
        self.publish_message(Message::new(name, payload))
    }

    /// Delivers to every matching subscriber and returns how many matched.
    pub fn publish_message(&self, message: Message) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let handlers: Vec<Handler> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.pattern.matches(&message.name))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in &handlers {
            handler(&message);
        }

        self.delivered.fetch_add(handlers.len() as u64, Ordering::Relaxed);
        debug!(
            name = %message.name,
            correlation_id = ?message.correlation_id,
            sent_to = handlers.len(),
            "message published"
        );
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn stats(&self) -> MessageBusStats {
        MessageBusStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            subscriber_count: self.subscriber_count(),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageBusStats {
    pub published: u64,
    pub delivered: u64,
    pub subscriber_count: usize,
}
