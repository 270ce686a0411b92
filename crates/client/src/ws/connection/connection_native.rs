//! Native WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{Connection, Transport, TransportError};

/// Opens presence streams over WebSocket.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, _response) =
            connect_async(url)
                .await
                .map_err(|e| TransportError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(msg_result) = self.stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    crate::log_info!("Presence stream received close frame: {:?}", frame);
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    crate::log_warn!("Ignoring {}-byte binary frame", data.len());
                }
                Ok(_) => {
                    // Ping/pong are answered by tungstenite itself.
                }
                Err(e) => return Some(Err(TransportError::Stream(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            crate::log_debug!("Close handshake failed: {}", e);
        }
    }
}
