//! STOMP 1.2 client over TCP.
//!
//! One connection carries every subscription. A background reader task
//! routes MESSAGE frames to per-subscription channels by their
//! `subscription` header; writes go through a shared sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::frame::{Command, Frame, StompCodec};
use super::{BusError, Delivery, MessageBus, Subscription, decode_body, normalize_destination};
use crate::config::GridappsdConfig;

type Transport = Framed<TcpStream, StompCodec>;
type Routes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>>;

/// Broker address and credentials.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub passcode: String,
}

impl From<&GridappsdConfig> for ConnectOptions {
    fn from(cfg: &GridappsdConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            login: cfg.username.clone(),
            passcode: cfg.password.clone(),
        }
    }
}

/// STOMP connection to the platform broker.
pub struct StompBus {
    sink: tokio::sync::Mutex<SplitSink<Transport, Frame>>,
    routes: Routes,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl StompBus {
    /// Opens a TCP connection and completes the CONNECT handshake.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Rejected` if the broker answers with an ERROR
    /// frame, or an I/O error if the socket cannot be opened.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, BusError> {
        let stream = TcpStream::connect((options.host.as_str(), options.port)).await?;
        stream.set_nodelay(true)?;
        let mut transport = Framed::new(stream, StompCodec);

        transport
            .send(Frame::connect(
                &options.host,
                &options.login,
                &options.passcode,
            ))
            .await?;

        match transport.next().await {
            Some(Ok(frame)) if frame.command == Command::Connected => {
                info!(
                    host = %options.host,
                    port = options.port,
                    version = frame.header("version").unwrap_or("1.0"),
                    "connected to broker"
                );
            }
            Some(Ok(frame)) if frame.command == Command::Error => {
                return Err(BusError::Rejected(frame.error_message()));
            }
            Some(Ok(frame)) => {
                return Err(BusError::Broker(format!(
                    "unexpected {} frame during handshake",
                    frame.command
                )));
            }
            Some(Err(err)) => return Err(err.into()),
            None => return Err(BusError::Closed),
        }

        let (sink, stream) = transport.split();
        let routes: Routes = Arc::default();
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&routes)));

        Ok(Self {
            sink: tokio::sync::Mutex::new(sink),
            routes,
            next_id: AtomicU64::new(0),
            reader,
        })
    }

    /// Sends DISCONNECT and stops routing deliveries.
    pub async fn disconnect(&self) -> Result<(), BusError> {
        let result = self.write(Frame::new(Command::Disconnect)).await;
        self.routes.lock().clear();
        self.reader.abort();
        result
    }

    async fn write(&self, frame: Frame) -> Result<(), BusError> {
        trace!(command = %frame.command, "sending frame");
        self.sink.lock().await.send(frame).await?;
        Ok(())
    }
}

impl Drop for StompBus {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl MessageBus for StompBus {
    async fn subscribe(&self, destination: &str) -> Result<Subscription, BusError> {
        let destination = normalize_destination(destination);
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(id.clone(), tx);

        if let Err(err) = self.write(Frame::subscribe(&id, &destination)).await {
            self.routes.lock().remove(&id);
            return Err(err);
        }
        debug!(%id, %destination, "subscribed");
        Ok(Subscription::new(id, destination, rx))
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), BusError> {
        self.routes.lock().remove(subscription.id());
        self.write(Frame::unsubscribe(subscription.id())).await?;
        debug!(id = subscription.id(), "unsubscribed");
        Ok(())
    }

    async fn send(&self, destination: &str, body: &Value) -> Result<(), BusError> {
        let destination = normalize_destination(destination);
        let payload = serde_json::to_vec(body)?;
        self.write(Frame::send(&destination, payload)).await
    }

    async fn request(
        &self,
        destination: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        let destination = normalize_destination(destination);
        let reply_to = format!("/temp-queue/response.{}", Uuid::new_v4());
        let mut reply = self.subscribe(&reply_to).await?;

        let payload = serde_json::to_vec(body)?;
        let frame = Frame::send(&destination, payload).with_header("reply-to", reply_to.as_str());
        if let Err(err) = self.write(frame).await {
            self.routes.lock().remove(reply.id());
            return Err(err);
        }
        debug!(%destination, %reply_to, "request sent");

        let outcome = tokio::time::timeout(timeout, reply.recv()).await;
        if let Err(err) = self.unsubscribe(&reply).await {
            warn!(%err, %reply_to, "failed to release reply subscription");
        }

        match outcome {
            Ok(Some(delivery)) => Ok(delivery.body),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout(timeout, destination)),
        }
    }
}

async fn read_loop(mut stream: SplitStream<Transport>, routes: Routes) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(frame) => dispatch(frame, &routes),
            Err(err) => {
                error!(%err, "failed to decode frame from broker");
                break;
            }
        }
    }
    // Dropping the senders closes every open subscription.
    routes.lock().clear();
    info!("broker connection closed");
}

fn dispatch(frame: Frame, routes: &Routes) {
    match frame.command {
        Command::Message => {
            let Some(subscription) = frame.header("subscription").map(str::to_string) else {
                warn!("MESSAGE frame without subscription header");
                return;
            };
            let delivery = Delivery {
                destination: frame.header("destination").unwrap_or_default().to_string(),
                body: decode_body(&frame.body),
                headers: frame.headers,
            };
            let routes = routes.lock();
            match routes.get(&subscription) {
                Some(tx) => {
                    if tx.send(delivery).is_err() {
                        debug!(%subscription, "subscriber dropped its receiver");
                    }
                }
                None => debug!(%subscription, "message for unknown subscription"),
            }
        }
        Command::Error => error!(message = %frame.error_message(), "broker reported an error"),
        Command::Receipt => trace!(receipt = frame.header("receipt-id"), "receipt"),
        other => debug!(command = %other, "ignoring unexpected frame"),
    }
}
