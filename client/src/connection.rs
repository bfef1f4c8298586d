//! Connection Supervisor
//!
//! Owns the socket: one select loop pumping frames in and out, and the
//! reconnect policy around it. Pacing is linear: every attempt waits
//! the configured interval; the attempt counter resets to zero on each
//! successful connect.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beacon_proto::SignalingMessage;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::client::{ClientConfig, ConnectionStatus, Handlers};
use crate::error::ClientError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial and upgrade, attaching the bearer token, under the handshake
/// deadline.
pub(crate) async fn connect_ws(
    url: &str,
    token: Option<&str>,
    handshake_timeout: Duration,
) -> Result<WsStream, ClientError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| ClientError::Connect(e.to_string()))?;

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    match tokio::time::timeout(handshake_timeout, connect_async(request)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(ClientError::Connect(e.to_string())),
        Err(_elapsed) => Err(ClientError::HandshakeTimeout(handshake_timeout)),
    }
}

/// Why a live connection ended.
#[derive(Debug, PartialEq, Eq)]
enum ExitReason {
    /// Explicit close; never reconnect.
    Shutdown,
    /// Anything else; the supervisor may redial.
    Transport,
}

/// Supervisor body. Runs until an explicit close or until the attempt
/// budget is exhausted.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn connection_loop(
    url: String,
    config: ClientConfig,
    handlers: Arc<Handlers>,
    status: Arc<RwLock<ConnectionStatus>>,
    attempts: Arc<AtomicU32>,
    mut outbound_rx: mpsc::Receiver<SignalingMessage>,
    mut shutdown_rx: mpsc::Receiver<()>,
    initial: WsStream,
) {
    // Hooks run on this dedicated task, in frame order, so a slow hook
    // never blocks the socket loop.
    let (dispatch_tx, mut dispatch_rx) = mpsc::channel::<SignalingMessage>(256);
    let dispatch_handlers = handlers.clone();
    let dispatcher = tokio::spawn(async move {
        while let Some(message) = dispatch_rx.recv().await {
            dispatch_handlers.dispatch(&message);
        }
    });

    let mut stream = Some(initial);
    loop {
        let Some(ws) = stream.take() else { break };

        *status.write().await = ConnectionStatus::Connected;
        attempts.store(0, Ordering::SeqCst);
        info!("Signaling connection established");
        handlers.fire_connected();

        let reason = run_connection(
            ws,
            &mut outbound_rx,
            &mut shutdown_rx,
            &dispatch_tx,
            &handlers,
        )
        .await;

        *status.write().await = ConnectionStatus::Disconnected;
        handlers.fire_disconnected();

        if reason == ExitReason::Shutdown || !config.reconnect_enabled {
            break;
        }

        stream = redial(&url, &config, &handlers, &status, &attempts, &mut shutdown_rx).await;
    }

    *status.write().await = ConnectionStatus::Disconnected;
    drop(dispatch_tx);
    let _ = dispatcher.await;
}

/// Pump frames until the connection ends.
async fn run_connection(
    ws: WsStream,
    outbound_rx: &mut mpsc::Receiver<SignalingMessage>,
    shutdown_rx: &mut mpsc::Receiver<()>,
    dispatch_tx: &mpsc::Sender<SignalingMessage>,
    handlers: &Arc<Handlers>,
) -> ExitReason {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match SignalingMessage::decode(text.as_str()) {
                            Ok(message) => {
                                if dispatch_tx.send(message).await.is_err() {
                                    return ExitReason::Shutdown;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Dropping malformed frame from server");
                                handlers.fire_error(&ClientError::Codec(e));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if write.send(Message::Pong(data)).await.is_err() {
                            return ExitReason::Transport;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Server closed the connection");
                        return ExitReason::Transport;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        handlers.fire_error(&ClientError::Transport(e.to_string()));
                        return ExitReason::Transport;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return ExitReason::Transport;
                    }
                    _ => {}
                }
            }

            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    // Client handle dropped.
                    let _ = write.send(Message::Close(None)).await;
                    return ExitReason::Shutdown;
                };
                match message.encode() {
                    Ok(json) => {
                        if write.send(Message::Text(json.into())).await.is_err() {
                            return ExitReason::Transport;
                        }
                    }
                    Err(e) => handlers.fire_error(&ClientError::Codec(e)),
                }
            }

            _ = shutdown_rx.recv() => {
                let _ = write.send(Message::Close(None)).await;
                return ExitReason::Shutdown;
            }
        }
    }
}

/// Sleep-and-dial until a connection sticks, the attempt budget runs
/// out, or shutdown is requested.
async fn redial(
    url: &str,
    config: &ClientConfig,
    handlers: &Arc<Handlers>,
    status: &Arc<RwLock<ConnectionStatus>>,
    attempts: &Arc<AtomicU32>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Option<WsStream> {
    loop {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > config.max_reconnect_attempts {
            warn!(attempts = attempt - 1, "Reconnect attempts exhausted");
            handlers.fire_error(&ClientError::ReconnectExhausted(config.max_reconnect_attempts));
            return None;
        }

        *status.write().await = ConnectionStatus::Reconnecting { attempt };
        info!(attempt, interval = ?config.reconnect_interval, "Reconnecting");

        tokio::select! {
            () = tokio::time::sleep(config.reconnect_interval) => {}
            _ = shutdown_rx.recv() => {
                debug!("Shutdown during reconnect backoff");
                return None;
            }
        }

        match connect_ws(url, config.auth_token.as_deref(), config.handshake_timeout).await {
            Ok(stream) => return Some(stream),
            Err(e) => {
                warn!(attempt, error = %e, "Reconnect attempt failed");
                handlers.fire_error(&e);
            }
        }
    }
}
