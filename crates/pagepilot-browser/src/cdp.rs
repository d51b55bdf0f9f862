//! Low-level Chrome DevTools Protocol client.
//!
//! One [`CdpClient`] owns one WebSocket channel to one target. Commands
//! get monotonically increasing ids; a background reader task demultiplexes
//! inbound frames back to the callers awaiting them. Many tasks may send
//! commands concurrently; responses may arrive in any order.
//!
//! Channel lifecycle: `Disconnected → Connecting → Connected → Closing →
//! Closed`. Once closed, a client cannot be reused; drop it and connect a
//! new one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::BrowserError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Closing => "closing",
            ChannelState::Closed => "closed",
        }
    }
}

/// An outbound command frame.
#[derive(Debug, Clone, Serialize)]
struct Command {
    id: u64,
    method: String,
    params: Value,
}

/// Error object inside a response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// An inbound response frame, correlated to a command by `id`.
///
/// `send_command` hands this back as received: an `error` here means the
/// *remote* rejected the command, which is the caller's concern, not a
/// transport failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CommandError>,
}

/// Classification of one inbound frame.
#[derive(Debug)]
pub(crate) enum InboundFrame {
    /// Frame with an `id`: a response to a command we sent.
    Response(ResponseEnvelope),
    /// Frame without an `id`: an unsolicited protocol event. The
    /// correlation map ignores these; they are expected, not errors.
    Event { method: String },
}

/// Parse one frame of text. A parse failure here is fatal for the channel.
pub(crate) fn classify_frame(text: &str) -> Result<InboundFrame, serde_json::Error> {
    let json: Value = serde_json::from_str(text)?;
    if json.get("id").is_some() {
        let envelope: ResponseEnvelope = serde_json::from_value(json)?;
        Ok(InboundFrame::Response(envelope))
    } else {
        let method = json
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("<unknown>")
            .to_string();
        Ok(InboundFrame::Event { method })
    }
}

/// Shared between the client handle and the reader task.
struct Shared {
    next_id: AtomicU64,
    state: Mutex<ChannelState>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ResponseEnvelope>>>,
    writer: Mutex<Option<WsSink>>,
}

impl Shared {
    /// Mark the channel closed and wake every still-pending caller.
    ///
    /// Dropping a pending oneshot sender resolves its receiver with a
    /// recv error, which `send_command` reports as `ChannelClosed`; no
    /// caller is left hanging.
    async fn shutdown(&self) {
        *self.state.lock().await = ChannelState::Closed;
        self.writer.lock().await.take();
        let drained: Vec<u64> = self.pending.lock().await.drain().map(|(id, _)| id).collect();
        if !drained.is_empty() {
            tracing::warn!(count = drained.len(), "channel closed with commands still pending");
        }
    }
}

/// CDP client for a single target.
///
/// Cheap operations (`state`) aside, every method suspends: `connect`
/// until the WebSocket handshake finishes, `send_command` until the
/// matching response arrives or the deadline passes, `close` until the
/// socket is torn down.
pub struct CdpClient {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl CdpClient {
    /// Connect to a target's WebSocket debugger URL and start the reader.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            state: Mutex::new(ChannelState::Connecting),
            pending: Mutex::new(HashMap::new()),
            writer: Mutex::new(None),
        });

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url).await.map_err(|e| {
            BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let (sink, source) = ws_stream.split();
        *shared.writer.lock().await = Some(sink);
        *shared.state.lock().await = ChannelState::Connected;

        let reader_shared = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            read_loop(source, &reader_shared).await;
            reader_shared.shutdown().await;
        });

        tracing::info!(url = ws_url, "CDP channel established");

        Ok(Self {
            shared,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ChannelState {
        *self.shared.state.lock().await
    }

    /// Send a command and await its response.
    ///
    /// On timeout the pending slot is removed and the response, should it
    /// arrive later, is discarded by the reader as an unknown id; the
    /// channel itself stays open. Identifiers are never reused, so a late
    /// response can never be misattributed to a newer command.
    pub async fn send_command(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, BrowserError> {
        {
            let state = *self.shared.state.lock().await;
            if state != ChannelState::Connected {
                return Err(BrowserError::NotConnected {
                    state: state.as_str(),
                });
            }
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let cmd = Command {
            id,
            method: method.to_string(),
            params,
        };
        let frame = serde_json::to_string(&cmd).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to serialize command: {e}"),
        })?;

        // Slot goes in before the frame goes out, so the reader can never
        // see a response for an id it does not know about yet.
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(id, tx);

        tracing::debug!(id, method, "sending command");

        let send_result = {
            let mut writer = self.shared.writer.lock().await;
            match writer.as_mut() {
                Some(sink) => sink.send(Message::Text(frame.into())).await,
                None => {
                    drop(writer);
                    self.shared.pending.lock().await.remove(&id);
                    return Err(BrowserError::ChannelClosed {
                        method: method.to_string(),
                    });
                }
            }
        };
        if let Err(e) = send_result {
            self.shared.pending.lock().await.remove(&id);
            return Err(BrowserError::Protocol {
                detail: format!("failed to send frame: {e}"),
            });
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(BrowserError::ChannelClosed {
                method: method.to_string(),
            }),
            Err(_) => {
                self.shared.pending.lock().await.remove(&id);
                tracing::warn!(id, method, ?timeout, "command timed out");
                Err(BrowserError::Timeout {
                    method: method.to_string(),
                    duration: timeout,
                })
            }
        }
    }

    /// Close the channel. Idempotent; resolves every pending command with
    /// a channel-closed failure.
    pub async fn close(&self) {
        {
            let mut state = self.shared.state.lock().await;
            match *state {
                ChannelState::Closing | ChannelState::Closed => return,
                _ => *state = ChannelState::Closing,
            }
        }

        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }

        if let Some(mut sink) = self.shared.writer.lock().await.take() {
            let _ = sink.close().await;
        }

        self.shared.shutdown().await;
        tracing::info!("CDP channel closed");
    }
}

/// Reader task body: demultiplex inbound frames until the channel dies.
async fn read_loop(mut source: WsSource, shared: &Shared) {
    while let Some(msg_result) = source.next().await {
        let msg = match msg_result {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket read error, closing channel");
                return;
            }
        };

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(b) => match String::from_utf8(b.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    tracing::warn!("non-UTF-8 binary frame, closing channel");
                    return;
                }
            },
            Message::Close(_) => {
                tracing::info!("WebSocket closed by remote");
                return;
            }
            // Ping/pong are handled by tungstenite itself.
            _ => continue,
        };

        match classify_frame(&text) {
            Ok(InboundFrame::Response(envelope)) => {
                let slot = shared.pending.lock().await.remove(&envelope.id);
                match slot {
                    Some(tx) => {
                        // Receiver may have timed out between our map
                        // lookup and this send; that is fine.
                        let _ = tx.send(envelope);
                    }
                    None => {
                        // Expected under the timeout-discard policy.
                        tracing::debug!(id = envelope.id, "response for unknown id, dropping");
                    }
                }
            }
            Ok(InboundFrame::Event { method }) => {
                tracing::debug!(method, "ignoring unsolicited event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "unparseable frame, closing channel");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_response_with_result() {
        let frame = classify_frame(r#"{"id": 3, "result": {"value": 7}}"#).unwrap();
        match frame {
            InboundFrame::Response(env) => {
                assert_eq!(env.id, 3);
                assert_eq!(env.result.unwrap()["value"], 7);
                assert!(env.error.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classify_response_with_error() {
        let frame =
            classify_frame(r#"{"id": 9, "error": {"code": -32601, "message": "Method not found"}}"#)
                .unwrap();
        match frame {
            InboundFrame::Response(env) => {
                assert_eq!(env.id, 9);
                assert!(env.result.is_none());
                let err = env.error.unwrap();
                assert_eq!(err.code, -32601);
                assert_eq!(err.message, "Method not found");
                assert!(err.data.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classify_event_frame() {
        let frame = classify_frame(
            r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.5}}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Event { method } => assert_eq!(method, "Page.loadEventFired"),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn classify_garbage_is_an_error() {
        assert!(classify_frame("not json at all").is_err());
    }

    #[test]
    fn classify_frame_with_non_integer_id_is_an_error() {
        // An `id` that is not a u64 breaks correlation; treat as fatal.
        assert!(classify_frame(r#"{"id": "abc", "result": {}}"#).is_err());
    }

    #[test]
    fn command_serializes_to_wire_shape() {
        let cmd = Command {
            id: 12,
            method: "Runtime.evaluate".into(),
            params: serde_json::json!({"expression": "1 + 1"}),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["id"], 12);
        assert_eq!(json["method"], "Runtime.evaluate");
        assert_eq!(json["params"]["expression"], "1 + 1");
    }

    #[test]
    fn state_names() {
        assert_eq!(ChannelState::Connected.as_str(), "connected");
        assert_eq!(ChannelState::Closed.as_str(), "closed");
    }
}
