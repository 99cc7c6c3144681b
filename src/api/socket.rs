use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::call::capture::FrameSink;
use crate::call::router::AiResponse;

pub const EVENT_VIDEO_FRAME: &str = "video_frame";
pub const EVENT_AI_RESPONSE: &str = "ai_response";

/// Commands sent from the main thread to the WebSocket write task.
enum ClientCommand {
    SendFrame(String),
    Close,
}

/// Events sent from the WebSocket read task back to the winit event loop.
#[derive(Debug)]
pub enum SocketEvent {
    Response(AiResponse),
    Closed(String),
    Error(String),
}

/// `{"event": name, "data": data}` text frame.
pub fn envelope(event: &str, data: Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

/// Call-server WebSocket client.
///
/// Spawns a read and a write task and talks to them over channels. Sends are
/// non-blocking and fire-and-forget; once the socket is closed they are
/// silently dropped.
#[derive(Debug)]
pub struct CallSocket {
    cmd_tx: mpsc::UnboundedSender<ClientCommand>,
    open: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
}

impl std::fmt::Debug for ClientCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientCommand::SendFrame(data) => write!(f, "SendFrame({} bytes)", data.len()),
            ClientCommand::Close => write!(f, "Close"),
        }
    }
}

impl CallSocket {
    /// Connect and start the read/write tasks. Parsed server events are
    /// delivered on `event_tx`.
    pub async fn connect(
        url: &str,
        event_tx: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<Self, String> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(16 * 1024 * 1024);
        ws_config.max_frame_size = Some(16 * 1024 * 1024);

        let (ws_stream, _response) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), true)
                .await
                .map_err(|e| format!("WebSocket connect failed: {}", e))?;

        log::info!("[Socket] Connected to {}", url);

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let open = Arc::new(AtomicBool::new(true));
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<ClientCommand>();

        // Write task: frames out
        let write_open = open.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                if !write_open.load(Ordering::Relaxed) {
                    break;
                }

                let text = match cmd {
                    ClientCommand::SendFrame(data_url) => {
                        envelope(EVENT_VIDEO_FRAME, Value::String(data_url))
                    }
                    ClientCommand::Close => {
                        write_open.store(false, Ordering::Relaxed);
                        let _ = ws_write.close().await;
                        break;
                    }
                };

                if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                    log::error!("[Socket] Write error: {}", e);
                    write_open.store(false, Ordering::Relaxed);
                    break;
                }
            }

            log::info!("[Socket] Write task exiting");
        });

        // Read task: responses in
        let read_open = open.clone();
        tokio::spawn(async move {
            while let Some(msg_result) = ws_read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        Self::parse_server_message(&text, &event_tx);
                    }
                    Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                        Ok(text) => Self::parse_server_message(text, &event_tx),
                        Err(_) => {
                            log::warn!("[Socket] Non-UTF8 binary frame ({} bytes)", data.len());
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| format!("code={}, reason={}", f.code, f.reason))
                            .unwrap_or_else(|| "no frame".to_string());
                        log::info!("[Socket] Closed by server: {}", reason);
                        read_open.store(false, Ordering::Relaxed);
                        let _ = event_tx.send(SocketEvent::Closed(reason));
                        break;
                    }
                    Err(e) => {
                        log::error!("[Socket] Read error: {}", e);
                        read_open.store(false, Ordering::Relaxed);
                        let _ = event_tx.send(SocketEvent::Error(e.to_string()));
                        break;
                    }
                    _ => {} // Ping/Pong handled by tungstenite
                }
            }

            read_open.store(false, Ordering::Relaxed);
            log::info!("[Socket] Read task exiting");
        });

        Ok(Self {
            cmd_tx,
            open,
            frames_sent: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Parse one server envelope and emit the matching event.
    fn parse_server_message(text: &str, tx: &mpsc::UnboundedSender<SocketEvent>) {
        let msg: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[Socket] Malformed server message: {}", e);
                return;
            }
        };

        let event = msg.get("event").and_then(|v| v.as_str()).unwrap_or_default();
        match event {
            EVENT_AI_RESPONSE => {
                let data = msg.get("data").cloned().unwrap_or(Value::Null);
                let _ = tx.send(SocketEvent::Response(AiResponse::from_value(&data)));
            }
            other => {
                log::debug!("[Socket] Ignoring event {:?}", other);
            }
        }
    }

    /// Queue one encoded frame for the server.
    pub fn send_frame(&self, data_url: String) {
        if self.open.load(Ordering::Relaxed) {
            let count = self.frames_sent.fetch_add(1, Ordering::Relaxed);
            if count == 0 || count % 100 == 0 {
                log::info!("[Socket] Frames sent: {}", count + 1);
            }
            let _ = self.cmd_tx.send(ClientCommand::SendFrame(data_url));
        }
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
        let _ = self.cmd_tx.send(ClientCommand::Close);
    }
}

impl FrameSink for CallSocket {
    fn send_frame(&mut self, payload: String) {
        CallSocket::send_frame(self, payload);
    }
}

/// Frames captured while disconnected are dropped.
impl FrameSink for Option<CallSocket> {
    fn send_frame(&mut self, payload: String) {
        if let Some(socket) = self.as_mut() {
            FrameSink::send_frame(socket, payload);
        }
    }
}

impl Drop for CallSocket {
    fn drop(&mut self) {
        self.close();
    }
}
