//! Line-delimited JSON bridge between TCP clients and the in-process bus.
//!
//! Every client frame is one JSON object on its own line:
//!
//! ```text
//! {"op":"publish","topic":"fleet/spawn","payload":{"cmd":"spawn","truck_id":"T1"}}
//! {"op":"subscribe","filter":"truck/+/telemetry"}
//! {"op":"unsubscribe","filter":"truck/+/telemetry"}
//! ```
//!
//! The gateway answers with `{"topic":..,"payload":..}` frames for every bus
//! message matching one of the connection's filters.

use crate::bus::{BroadcastBus, Message, TopicFilter};
use crate::protocol::{Topic, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed by peer")]
    Closed,
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    Publish {
        topic: String,
        #[serde(default)]
        payload: Value,
    },
    Subscribe {
        filter: String,
    },
    Unsubscribe {
        filter: String,
    },
}

/// A bus message as delivered to a subscribed client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFrame {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Serialize)]
struct ErrorFrame<'a> {
    error: &'a str,
}

/// Payloads are text on the bus. JSON strings travel verbatim, anything
/// else is re-encoded.
fn payload_text(payload: Value) -> String {
    match payload {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub struct Gateway {
    bus: BroadcastBus,
    inbound: mpsc::Sender<Message>,
}

impl Gateway {
    pub fn new(bus: BroadcastBus, inbound: mpsc::Sender<Message>) -> Self {
        Self { bus, inbound }
    }

    /// Injects a message as if a client had published it. Inbound topics are
    /// queued for the dispatcher; every message is also mirrored on the bus.
    pub async fn publish(&self, message: Message) {
        let inbound = Topic::parse(&message.topic)
            .map(|topic| topic.is_inbound())
            .unwrap_or(false);
        if inbound && self.inbound.send(message.clone()).await.is_err() {
            warn!(topic = %message.topic, "dispatcher gone, dropping inbound message");
        }
        self.bus.send(message);
    }

    /// Accepts clients until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), GatewayError> {
        info!(addr = %listener.local_addr()?, "gateway listening");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!(%addr, "client connected");
                    let gateway = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = gateway.handle_client(stream, addr).await {
                            warn!(%addr, error = %e, "client error");
                        }
                        info!(%addr, "client disconnected");
                    });
                }
                Err(e) => error!(error = %e, "failed to accept connection"),
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), GatewayError> {
        let (reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let filters: Arc<RwLock<HashSet<TopicFilter>>> = Arc::default();

        let forwarder = tokio::spawn(forward(
            self.bus.subscribe(),
            Arc::clone(&filters),
            Arc::clone(&writer),
            addr,
        ));

        let mut lines = BufReader::new(reader).lines();
        let result = self.read_frames(&mut lines, &filters, &writer, addr).await;

        forwarder.abort();
        result
    }

    async fn read_frames(
        &self,
        lines: &mut Lines<BufReader<OwnedReadHalf>>,
        filters: &RwLock<HashSet<TopicFilter>>,
        writer: &Mutex<OwnedWriteHalf>,
        addr: SocketAddr,
    ) -> Result<(), GatewayError> {
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.len() > MAX_PAYLOAD_SIZE * 2 {
                reply_error(writer, "frame too large").await?;
                continue;
            }

            let frame = match serde_json::from_str::<ClientFrame>(line) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(%addr, error = %e, "malformed frame");
                    reply_error(writer, &format!("invalid frame: {e}")).await?;
                    continue;
                }
            };

            match frame {
                ClientFrame::Publish { topic, payload } => {
                    if topic.is_empty() || topic.contains(['+', '#']) {
                        reply_error(writer, &format!("invalid topic `{topic}`")).await?;
                        continue;
                    }
                    debug!(%addr, %topic, "client publish");
                    self.publish(Message::new(topic, payload_text(payload))).await;
                }
                ClientFrame::Subscribe { filter } => match TopicFilter::new(filter.as_str()) {
                    Some(filter) => {
                        debug!(%addr, filter = filter.as_str(), "client subscribed");
                        filters.write().unwrap_or_else(PoisonError::into_inner).insert(filter);
                    }
                    None => reply_error(writer, &format!("invalid filter `{filter}`")).await?,
                },
                ClientFrame::Unsubscribe { filter } => {
                    if let Some(filter) = TopicFilter::new(filter) {
                        filters.write().unwrap_or_else(PoisonError::into_inner).remove(&filter);
                    }
                }
            }
        }
        Ok(())
    }
}

async fn forward(
    mut rx: tokio::sync::broadcast::Receiver<Message>,
    filters: Arc<RwLock<HashSet<TopicFilter>>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    addr: SocketAddr,
) {
    loop {
        let message = match rx.recv().await {
            Ok(message) => message,
            Err(RecvError::Lagged(skipped)) => {
                warn!(%addr, skipped, "client lagging, messages skipped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let wanted = filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|filter| filter.matches(&message.topic));
        if !wanted {
            continue;
        }

        let frame = ServerFrame {
            topic: message.topic,
            payload: message.payload,
        };
        let mut writer = writer.lock().await;
        if let Err(e) = write_frame(&mut *writer, &frame).await {
            warn!(%addr, error = %e, "failed to forward message");
            break;
        }
    }
}

async fn reply_error(writer: &Mutex<OwnedWriteHalf>, error: &str) -> Result<(), GatewayError> {
    let mut writer = writer.lock().await;
    write_frame(&mut *writer, &ErrorFrame { error }).await
}

async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), GatewayError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

/// Client side of the gateway protocol, used by `fleetctl` and tests.
pub struct GatewayClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl GatewayClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, GatewayError> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    pub async fn publish(&mut self, topic: &str, payload: Value) -> Result<(), GatewayError> {
        let frame = ClientFrame::Publish {
            topic: topic.to_string(),
            payload,
        };
        write_frame(&mut self.writer, &frame).await
    }

    pub async fn subscribe(&mut self, filter: &str) -> Result<(), GatewayError> {
        let frame = ClientFrame::Subscribe {
            filter: filter.to_string(),
        };
        write_frame(&mut self.writer, &frame).await
    }

    pub async fn unsubscribe(&mut self, filter: &str) -> Result<(), GatewayError> {
        let frame = ClientFrame::Unsubscribe {
            filter: filter.to_string(),
        };
        write_frame(&mut self.writer, &frame).await
    }

    /// Next raw line from the gateway, decoded as JSON.
    pub async fn next_value(&mut self) -> Result<Value, GatewayError> {
        loop {
            let line = self.lines.next_line().await?.ok_or(GatewayError::Closed)?;
            if !line.trim().is_empty() {
                return Ok(serde_json::from_str(&line)?);
            }
        }
    }

    /// Next delivered bus message. Error frames are logged and skipped.
    pub async fn next_message(&mut self) -> Result<ServerFrame, GatewayError> {
        loop {
            let value = self.next_value().await?;
            if let Some(error) = value.get("error") {
                warn!(%error, "gateway rejected a frame");
                continue;
            }
            return Ok(serde_json::from_value(value)?);
        }
    }

    /// Waits for the first message on `topic`, giving up after `timeout`.
    pub async fn wait_for(&mut self, topic: &str, timeout: Duration) -> Result<ServerFrame, GatewayError> {
        tokio::time::timeout(timeout, async {
            loop {
                let frame = self.next_message().await?;
                if frame.topic == topic {
                    return Ok::<_, GatewayError>(frame);
                }
            }
        })
        .await
        .map_err(|_| GatewayError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_frame_parsing() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"op":"publish","topic":"fleet/spawn","payload":{"truck_id":"T1"}}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Publish {
                topic: "fleet/spawn".to_string(),
                payload: json!({"truck_id": "T1"}),
            }
        );

        let frame: ClientFrame = serde_json::from_str(r#"{"op":"subscribe","filter":"truck/#"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Subscribe { filter: "truck/#".to_string() });

        assert!(serde_json::from_str::<ClientFrame>(r#"{"op":"shout"}"#).is_err());
    }

    #[test]
    fn test_payload_text() {
        assert_eq!(payload_text(json!("{\"cmd\":\"stop\"}")), "{\"cmd\":\"stop\"}");
        assert_eq!(payload_text(json!({"cmd": "stop"})), "{\"cmd\":\"stop\"}");
        assert_eq!(payload_text(Value::Null), "");
        assert_eq!(payload_text(json!(42)), "42");
    }

    #[tokio::test]
    async fn test_publish_routes_inbound_only() {
        let bus = BroadcastBus::new(16);
        let mut observer = bus.subscribe();
        let (tx, mut rx) = mpsc::channel(16);
        let gateway = Gateway::new(bus.clone(), tx);

        gateway.publish(Message::new("fleet/spawn", "{}")).await;
        gateway.publish(Message::new("truck/T1/telemetry", "{}")).await;

        assert_eq!(rx.recv().await.unwrap().topic, "fleet/spawn");
        assert!(rx.try_recv().is_err());
        assert_eq!(observer.recv().await.unwrap().topic, "fleet/spawn");
        assert_eq!(observer.recv().await.unwrap().topic, "truck/T1/telemetry");
    }
}
