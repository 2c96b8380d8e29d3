//! In-process message bus for tests and offline runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{BusError, Delivery, MessageBus, Subscription, normalize_destination};

#[derive(Default)]
struct Inner {
    next_id: u64,
    /// Subscription id -> (destination, sender).
    routes: HashMap<String, (String, mpsc::UnboundedSender<Delivery>)>,
    /// Destination -> canned reply.
    responders: HashMap<String, Value>,
    /// Every `send` and `request` in call order.
    sent: Vec<(String, Value)>,
}

/// Bus that routes messages between subscribers in the same process.
///
/// Requests are answered from replies registered with
/// [`InMemoryBus::respond_with`].
#[derive(Default)]
pub struct InMemoryBus {
    inner: Mutex<Inner>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the reply returned for requests to `destination`.
    pub fn respond_with(&self, destination: &str, reply: Value) {
        self.inner
            .lock()
            .responders
            .insert(normalize_destination(destination), reply);
    }

    /// Delivers a message to subscribers as if it came from the broker.
    ///
    /// Returns the number of subscribers reached.
    pub fn deliver(&self, destination: &str, body: Value) -> usize {
        let destination = normalize_destination(destination);
        let inner = self.inner.lock();
        let mut reached = 0;
        for (route_destination, tx) in inner.routes.values() {
            if *route_destination != destination {
                continue;
            }
            let delivery = Delivery {
                destination: destination.clone(),
                headers: vec![("destination".to_string(), destination.clone())],
                body: body.clone(),
            };
            if tx.send(delivery).is_ok() {
                reached += 1;
            }
        }
        reached
    }

    /// Drops every route, closing all open subscriptions.
    pub fn close(&self) {
        self.inner.lock().routes.clear();
    }

    /// All messages sent so far, in order.
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.inner.lock().sent.clone()
    }

    /// Bodies sent to one destination, in order.
    pub fn sent_to(&self, destination: &str) -> Vec<Value> {
        let destination = normalize_destination(destination);
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|(d, _)| *d == destination)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Number of open subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().routes.len()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn subscribe(&self, destination: &str) -> Result<Subscription, BusError> {
        let destination = normalize_destination(destination);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = format!("mem-{}", inner.next_id);
        inner.next_id += 1;
        inner.routes.insert(id.clone(), (destination.clone(), tx));
        Ok(Subscription::new(id, destination, rx))
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), BusError> {
        self.inner.lock().routes.remove(subscription.id());
        Ok(())
    }

    async fn send(&self, destination: &str, body: &Value) -> Result<(), BusError> {
        let destination = normalize_destination(destination);
        self.inner
            .lock()
            .sent
            .push((destination.clone(), body.clone()));
        self.deliver(&destination, body.clone());
        Ok(())
    }

    async fn request(
        &self,
        destination: &str,
        body: &Value,
        _timeout: Duration,
    ) -> Result<Value, BusError> {
        let destination = normalize_destination(destination);
        let mut inner = self.inner.lock();
        inner.sent.push((destination.clone(), body.clone()));
        inner
            .responders
            .get(&destination)
            .cloned()
            .ok_or(BusError::NoResponder(destination))
    }
}
