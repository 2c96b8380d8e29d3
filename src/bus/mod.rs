//! Message bus access: the `MessageBus` seam, a STOMP client, and an
//! in-process bus used by tests.

pub mod frame;
pub mod memory;
pub mod stomp;
pub mod topics;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use frame::FrameError;
pub use memory::InMemoryBus;
pub use stomp::{ConnectOptions, StompBus};

/// Errors raised by bus clients.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("broker rejected connection: {0}")]
    Rejected(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("connection closed")]
    Closed,

    #[error("timed out after {0:?} waiting for a reply from {1}")]
    Timeout(Duration, String),

    #[error("failed to encode message body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no responder registered for {0}")]
    NoResponder(String),
}

/// A message received on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Destination the message was published to.
    pub destination: String,
    /// Transport headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Decoded JSON body; non-JSON text arrives as a JSON string.
    pub body: Value,
}

impl Delivery {
    /// Returns the first value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Receiving end of a bus subscription.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    destination: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            receiver,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Waits for the next delivery; `None` once the bus drops the route.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// Publish/subscribe and request/response access to the platform bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribes to a topic or queue.
    async fn subscribe(&self, destination: &str) -> Result<Subscription, BusError>;

    /// Cancels a subscription; pending deliveries are discarded.
    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), BusError>;

    /// Publishes a JSON message.
    async fn send(&self, destination: &str, body: &Value) -> Result<(), BusError>;

    /// Sends a JSON request and waits for the single reply.
    async fn request(
        &self,
        destination: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, BusError>;
}

/// Addresses bare platform topic names as queues.
///
/// Destinations already carrying a `/topic/`, `/queue/`, or `/temp-queue/`
/// prefix are returned unchanged.
pub fn normalize_destination(destination: &str) -> String {
    if ["/topic/", "/queue/", "/temp-queue/"]
        .iter()
        .any(|prefix| destination.starts_with(prefix))
    {
        destination.to_string()
    } else {
        format!("/queue/{destination}")
    }
}

/// Decodes a message body as JSON, keeping non-JSON text as a string.
pub fn decode_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Unwraps a reply whose JSON document arrived as an encoded string.
pub fn unwrap_json_string(value: Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
