//! Channel subscriptions.
//!
//! A `Subscriber` owns a dedicated connection (never a pooled one, since a
//! subscribed connection can no longer run ordinary commands) and forwards each
//! published message to an in-process channel until closed.

use crate::error::{KvError, KvResult};
use crate::store::{Connector, RespValue, TcpConnection};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A message published on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

/// Receives messages for a fixed set of channels.
#[derive(Debug)]
pub struct Subscriber {
    channels: Vec<String>,
    receiver: mpsc::UnboundedReceiver<ChannelMessage>,
    reader: Option<JoinHandle<()>>,
}

impl Subscriber {
    pub(crate) async fn open(connector: &Connector, channels: Vec<String>) -> KvResult<Self> {
        if channels.is_empty() {
            return Err(KvError::invalid_argument("At least one channel is required"));
        }
        if channels.iter().any(|c| c.is_empty()) {
            return Err(KvError::invalid_argument("Channel names cannot be empty"));
        }

        match connector {
            Connector::Memory(store) => Ok(Self {
                receiver: store.subscribe(&channels),
                channels,
                reader: None,
            }),
            Connector::Tcp {
                address,
                password,
                client_name,
                timeout,
            } => {
                let mut conn = TcpConnection::connect(
                    address,
                    password.as_deref(),
                    client_name.as_deref(),
                    *timeout,
                )
                .await?;

                let mut args = vec![b"SUBSCRIBE".to_vec()];
                args.extend(channels.iter().map(|c| c.as_bytes().to_vec()));
                let confirm = async {
                    conn.send(&args).await?;
                    for _ in &channels {
                        conn.read_frame().await?.into_result()?;
                    }
                    Ok::<_, KvError>(())
                };
                tokio::time::timeout(*timeout, confirm)
                    .await
                    .map_err(|_| {
                        KvError::connection(
                            format!("SUBSCRIBE not confirmed within {}ms", timeout.as_millis()),
                            "Check store server load or raise `timeout`",
                        )
                    })??;

                let (tx, rx) = mpsc::unbounded_channel();
                let reader = tokio::spawn(forward_messages(conn, tx));
                debug!(channels = ?channels, "Subscribed");

                Ok(Self {
                    channels,
                    receiver: rx,
                    reader: Some(reader),
                })
            }
        }
    }

    /// Channels this subscriber listens on.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Wait for the next message. `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.receiver.recv().await
    }

    /// Stop listening. Buffered messages are discarded.
    pub fn close(&mut self) {
        self.receiver.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn forward_messages(mut conn: TcpConnection, tx: mpsc::UnboundedSender<ChannelMessage>) {
    loop {
        let frame = match conn.read_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Subscription connection lost");
                return;
            }
        };

        let Some(message) = parse_message(frame) else {
            continue;
        };
        if tx.send(message).is_err() {
            return;
        }
    }
}

/// `["message", channel, payload]` pushes; other pushes are ignored.
fn parse_message(frame: RespValue) -> Option<ChannelMessage> {
    let RespValue::Array(parts) = frame else {
        return None;
    };
    let mut parts = parts
        .into_iter()
        .map(|part| part.into_optional_string().ok().flatten());
    match (parts.next()??.as_str(), parts.next()?, parts.next()?) {
        ("message", Some(channel), Some(payload)) => Some(ChannelMessage { channel, payload }),
        _ => None,
    }
}
