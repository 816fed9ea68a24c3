//! WebSocket transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use campus_core::config::RealtimeConfig;
use campus_core::{AppError, AppResult};

use crate::connection::key::ScopeKey;
use crate::message::Envelope;

use super::{Transport, TransportLink};

/// Opens WebSocket links to the configured realtime endpoint.
///
/// The token travels both as a bearer header and in the `authenticate`
/// frame sent right after the upgrade.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    /// Create a transport for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Create a transport from realtime configuration.
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.url.clone())
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, key: &ScopeKey) -> AppResult<Box<dyn TransportLink>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| AppError::configuration(format!("Invalid realtime URL: {e}")))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", key.token.expose()))
            .map_err(|e| AppError::validation(format!("Token is not a valid header value: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| AppError::transport(format!("WebSocket connect failed: {e}")))?;
        debug!(status = %response.status(), "WebSocket upgraded");

        let mut link = WsLink { stream };
        link.send(Envelope::authenticate(key)).await?;
        Ok(Box::new(link))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportLink for WsLink {
    async fn send(&mut self, frame: Envelope) -> AppResult<()> {
        let text = frame.encode()?;
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| AppError::transport(format!("WebSocket send failed: {e}")))
    }

    async fn recv(&mut self) -> Option<AppResult<Envelope>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match Envelope::decode(text.as_str()) {
                    Ok(envelope) => return Some(Ok(envelope)),
                    Err(e) => warn!(error = %e, "Skipping malformed realtime frame"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "WebSocket closed by server");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(AppError::transport(format!(
                        "WebSocket receive failed: {e}"
                    ))));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close did not complete cleanly");
        }
    }
}
