//! WebSocket Transport
//!
//! [`Transport`] over `tokio-tungstenite` with rustls. Text frames are passed
//! through untouched; protocol-level pings are answered here so the session
//! never sees them.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Transport, TransportError};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to one Open API endpoint.
pub struct WebSocketTransport {
    url: String,
    stream: Stream,
    closed: bool,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Open a connection.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        tracing::info!(url = %url, "Connecting to cTrader Open API");

        let (stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket connected");

        Ok(Self {
            url: url.to_string(),
            stream,
            closed: false,
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn map_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::WebSocket(other.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(map_error)
    }

    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        if self.closed {
            return Ok(None);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map(Some)
                        .map_err(|e| TransportError::InvalidFrame(e.to_string()));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(map_error)?;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(frame = ?frame, "Server sent close frame");
                    self.closed = true;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return match map_error(e) {
                        TransportError::Closed => {
                            self.closed = true;
                            Ok(None)
                        }
                        other => Err(other),
                    };
                }
                None => {
                    tracing::info!("WebSocket stream ended");
                    self.closed = true;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(e) => match map_error(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}
