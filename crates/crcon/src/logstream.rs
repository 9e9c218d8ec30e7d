//! Durable websocket consumer for the CRCON log stream.
//!
//! Connects to `<base>/ws/logs`, sends an init frame, and forwards decoded
//! log objects onto a bounded queue. Reconnects with escalating delays;
//! sustained failures escalate while isolated ones do not, because the
//! delay chain is dropped after any healthy receive cycle.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::backoff::{Backoff, BackoffConfig};
use crate::connection::ServerConnectionDetails;
use crate::models::{LogMessageType, LogStreamInit, LogStreamObject, LogStreamResponse};
use crate::{Error, Result};

/// Log frames can be bulky; allow up to ~1 GB.
const MAX_MESSAGE_SIZE: usize = 1_000_000_000;

/// Initial handshakes against a busy CRCON can be very slow.
const OPEN_TIMEOUT: Duration = Duration::from_secs(600);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A client for the CRCON log stream.
///
/// `run` reads frames and forwards each log object into the queue, blocking
/// when the queue is full. Reconnects indefinitely unless a permanent error
/// occurs or the configured attempt bound is reached.
pub struct LogStreamClient {
    details: ServerConnectionDetails,
    queue: mpsc::Sender<LogStreamObject>,
    websocket_url: Url,
    backoff_config: BackoffConfig,
    /// Server-side action filter sent in the init frame. None means all.
    pub log_types: Option<Vec<LogMessageType>>,
    last_seen_id: Option<String>,
    first_connection: bool,
}

impl LogStreamClient {
    pub fn new(
        details: ServerConnectionDetails,
        queue: mpsc::Sender<LogStreamObject>,
        backoff_config: BackoffConfig,
    ) -> Self {
        let websocket_url = details.websocket_endpoint("ws/logs");
        Self {
            details,
            queue,
            websocket_url,
            backoff_config,
            log_types: None,
            last_seen_id: None,
            first_connection: true,
        }
    }

    pub fn last_seen_id(&self) -> Option<&str> {
        self.last_seen_id.as_deref()
    }

    /// Continually reads the log stream, reconnecting on transient failures.
    ///
    /// Returns Ok on cancellation or queue shutdown; Err on permanent
    /// failures (DNS misconfiguration on the first attempt, the server
    /// denying the connection, or the reconnect budget running out).
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let mut delays: Option<Backoff> = None;
        loop {
            if cancel.is_cancelled() {
                info!("cancellation received, stopping");
                return Ok(());
            }

            let first_attempt = self.first_connection;
            let connected = self.connect(&cancel).await;
            self.first_connection = false;

            match connected {
                Ok(None) => return Ok(()),
                Ok(Some(socket)) => {
                    info!(url = %self.websocket_url, "connected to CRCON websocket");
                    match self.stream_logs(socket, &cancel, &mut delays).await {
                        Ok(()) => return Ok(()),
                        Err(Error::QueueClosed) => {
                            info!("log queue closed, stopping");
                            return Ok(());
                        }
                        Err(e) if is_retryable_stream_error(&e) => {
                            warn!(error = %e, "log stream interrupted");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => {
                    if is_fatal_connect_error(&e, first_attempt) {
                        error!(error = %e, "connection error, check API key and user permissions");
                        return Err(e);
                    }
                    warn!(error = %e, "connect failed");
                }
            }

            let chain = delays.get_or_insert_with(|| Backoff::new(self.backoff_config.clone()));
            let Some(delay) = chain.next() else {
                info!("maximum reconnection attempts reached, stopping");
                return Err(Error::ReconnectExhausted);
            };
            info!("reconnecting in {:.1} seconds", delay.as_secs_f64());
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }

    /// Opens the websocket. Ok(None) means cancellation fired mid-connect.
    async fn connect(&mut self, cancel: &CancellationToken) -> Result<Option<WsStream>> {
        info!(url = %self.websocket_url, "connecting");
        self.resolve_host().await?;

        let request = self.build_request()?;
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(MAX_MESSAGE_SIZE);
        config.max_frame_size = Some(MAX_MESSAGE_SIZE);

        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            attempt = timeout(OPEN_TIMEOUT, connect_async_with_config(request, Some(config), false)) => {
                match attempt {
                    Err(_) => Err(Error::Timeout(OPEN_TIMEOUT)),
                    Ok(Ok((socket, _response))) => Ok(Some(socket)),
                    Ok(Err(tungstenite::Error::Http(response))) => {
                        let status = response.status().as_u16();
                        if matches!(status, 500 | 502 | 503 | 504) {
                            Err(Error::Status(status))
                        } else {
                            Err(Error::ConnectionRefused(format!(
                                "server rejected upgrade with status {status}"
                            )))
                        }
                    }
                    Ok(Err(e)) => Err(Error::Websocket(e)),
                }
            }
        }
    }

    /// Resolves the stream host up front so DNS failures stay
    /// distinguishable from handshake errors.
    async fn resolve_host(&self) -> Result<()> {
        let host = self
            .websocket_url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl("websocket url has no host".to_string()))?;
        let port = self.websocket_url.port_or_known_default().unwrap_or(80);
        match tokio::net::lookup_host((host, port)).await {
            Ok(mut addrs) => {
                if addrs.next().is_some() {
                    Ok(())
                } else {
                    Err(Error::Dns {
                        host: host.to_string(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "no addresses returned",
                        ),
                    })
                }
            }
            Err(e) => Err(Error::Dns {
                host: host.to_string(),
                source: e,
            }),
        }
    }

    fn build_request(&self) -> Result<tungstenite::handshake::client::Request> {
        let mut request = self
            .websocket_url
            .as_str()
            .into_client_request()
            .map_err(Error::Websocket)?;
        let headers = request.headers_mut();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.details.api_key()))
            .map_err(|e| Error::Http(e.to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        if let Some(extra) = self.details.rcon_headers() {
            for (name, value) in extra {
                let name: HeaderName = name
                    .parse()
                    .map_err(|_| Error::Http(format!("invalid header name {name}")))?;
                let value =
                    HeaderValue::from_str(value).map_err(|e| Error::Http(e.to_string()))?;
                headers.insert(name, value);
            }
        }
        Ok(request)
    }

    async fn stream_logs(
        &mut self,
        mut socket: WsStream,
        cancel: &CancellationToken,
        delays: &mut Option<Backoff>,
    ) -> Result<()> {
        self.send_init_message(&mut socket).await?;

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancellation received, closing log stream");
                    let _ = socket.close(None).await;
                    return Ok(());
                }
                message = socket.next() => message,
            };

            match message {
                None => return Err(Error::Websocket(tungstenite::Error::ConnectionClosed)),
                Some(Err(e)) => return Err(Error::Websocket(e)),
                Some(Ok(Message::Text(text))) => {
                    self.handle_incoming_message(&text).await?;
                    // a healthy receive cycle resets the reconnect escalation
                    *delays = None;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "connection closed by server");
                    return Err(Error::Websocket(tungstenite::Error::ConnectionClosed));
                }
                Some(Ok(_)) => {}
            }
        }
    }

    async fn send_init_message(&mut self, socket: &mut WsStream) -> Result<()> {
        let init = LogStreamInit {
            actions: self.log_types.clone(),
            last_seen_id: self.last_seen_id.clone(),
        };
        let body = serde_json::to_string(&init)?;
        debug!(init = %body, "sending init message");
        socket.send(Message::Text(body)).await?;
        Ok(())
    }

    async fn handle_incoming_message(&mut self, text: &str) -> Result<()> {
        let response: LogStreamResponse = match serde_json::from_str(text) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "error decoding log stream frame");
                debug!(frame = text, "failed frame");
                return Ok(());
            }
        };

        if let Some(message) = response.error.filter(|e| !e.is_empty()) {
            debug!(error = %message, "server reported stream error");
            return Err(Error::LogStreamMessage(message));
        }

        self.last_seen_id = response.last_seen_id;
        for log in response.logs {
            if self.queue.send(log).await.is_err() {
                return Err(Error::QueueClosed);
            }
        }
        Ok(())
    }
}

/// DNS failures are fatal only on the first attempt, when they most likely
/// indicate misconfiguration; a denied upgrade is always fatal.
fn is_fatal_connect_error(error: &Error, first_attempt: bool) -> bool {
    match error {
        Error::Dns { .. } => first_attempt,
        Error::ConnectionRefused(_) => true,
        _ => false,
    }
}

fn is_retryable_stream_error(error: &Error) -> bool {
    matches!(
        error,
        Error::LogStreamMessage(_) | Error::Websocket(_) | Error::Timeout(_)
    )
}
