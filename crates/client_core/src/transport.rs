//! WebSocket host channel for running the front-end next to a bot relay
//! instead of inside the chat platform.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::InboundPayload;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

use crate::{HostChannel, LaunchContext};

const INBOUND_BUFFER: usize = 64;
const PLATFORM_NAME: &str = "websocket";

pub struct WebSocketHostChannel {
    url: Url,
    outbound: mpsc::UnboundedSender<String>,
    inbound: broadcast::Sender<InboundPayload>,
    connected: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl WebSocketHostChannel {
    pub async fn connect(host_url: &str) -> Result<Self> {
        let url = websocket_url(host_url)?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound, _) = broadcast::channel(INBOUND_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));

        let writer_connected = Arc::clone(&connected);
        let writer_task = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(error = %err, "host: websocket write failed");
                    writer_connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let reader_inbound = inbound.clone();
        let reader_connected = Arc::clone(&connected);
        let reader_url = url.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        // No subscriber yet is not an error for a broadcast host.
                        let _ = reader_inbound.send(InboundPayload::Text(text));
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "host: websocket read failed");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            info!(url = %reader_url, "host: websocket closed");
        });

        info!(url = %url, "host: websocket connected");
        Ok(Self {
            url,
            outbound,
            inbound,
            connected,
            reader_task,
            writer_task,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketHostChannel {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

#[async_trait]
impl HostChannel for WebSocketHostChannel {
    async fn send(&self, message: String) -> Result<()> {
        if !self.is_connected() {
            bail!("websocket host {} is closed", self.url);
        }
        self.outbound
            .send(message)
            .map_err(|_| anyhow!("websocket writer for {} has stopped", self.url))
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundPayload> {
        self.inbound.subscribe()
    }

    fn launch_context(&self) -> Result<LaunchContext> {
        if !self.is_connected() {
            bail!("websocket host {} is closed", self.url);
        }
        Ok(LaunchContext {
            platform: PLATFORM_NAME.to_string(),
            handoff: None,
        })
    }
}

/// Accepts `ws(s)://` as is and rewrites `http(s)://` to the matching socket scheme.
pub fn websocket_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).with_context(|| format!("invalid host url '{raw}'"))?;
    let rewritten = match url.scheme() {
        "ws" | "wss" => None,
        "http" => Some("ws"),
        "https" => Some("wss"),
        other => bail!("host url must use ws://, wss://, http:// or https://, got '{other}://'"),
    };
    if let Some(scheme) = rewritten {
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot rewrite scheme of host url '{raw}'"))?;
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
