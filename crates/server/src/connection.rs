//! The WebSocket accept loop and per-connection read/write tasks.
//!
//! Each accepted socket gets one reader (this function) and one spawned writer task,
//! talking over a bounded channel so a slow socket write never blocks decoding the next
//! inbound frame. A watchdog closes connections that go quiet past the heartbeat or idle
//! deadlines; disconnect cleanup (unsubscribe, drop from the connection table) runs from
//! a single exit point so it's safe to reach from any of the loop's several exit paths.

use crate::config::ServerConfig;
use crate::connections::ConnectionTable;
use crate::rate_limit::RateLimiter;
use crate::router::{self, ServerState};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_core::SessionId;
use tether_wire::ServerMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Accept connections on `listener` until `shutdown` fires, spawning one task per socket.
/// Doesn't return once `shutdown` fires until every connection it spawned has finished —
/// cancelling `shutdown` is what unblocks each of them, so this is how a caller awaiting
/// this function knows every session actually drained rather than was abandoned.
pub async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    config: Arc<ServerConfig>,
    rate_limiter: Arc<RateLimiter>,
    shutdown: CancellationToken,
) {
    let mut connections = tokio::task::JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        if !rate_limiter.check(peer_addr.ip()) {
                            warn!(%peer_addr, "rejecting connection, rate limit exceeded");
                            continue;
                        }
                        let state = state.clone();
                        let config = config.clone();
                        let conn_shutdown = shutdown.child_token();
                        connections.spawn(async move {
                            handle_connection(stream, peer_addr, state, config, conn_shutdown).await;
                        });
                    }
                    Err(e) => error!(error = %e, "accept error"),
                }
            }
            _ = shutdown.cancelled() => {
                info!("accept loop shutting down, waiting for connections to drain");
                break;
            }
        }
    }
    while connections.join_next().await.is_some() {}
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let ws_config = WebSocketConfig {
        max_message_size: Some(config.max_message_size),
        max_frame_size: Some(config.max_message_size),
        ..Default::default()
    };

    let allowed_origins = config.allowed_origins.clone();
    let origin_check = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if allowed_origins.is_empty() {
            return Ok(response);
        }
        let origin = req.headers().get("origin").and_then(|v| v.to_str().ok());
        match origin {
            Some(origin) if allowed_origins.iter().any(|a| a == origin) => Ok(response),
            _ => {
                let mut rejected = ErrorResponse::new(Some("origin not allowed".to_string()));
                *rejected.status_mut() = StatusCode::FORBIDDEN;
                Err(rejected)
            }
        }
    };

    let initial_deadline = config.ping_interval + config.pong_timeout;
    let handshake = tokio::time::timeout(
        initial_deadline,
        tokio_tungstenite::accept_hdr_async_with_config(stream, origin_check, Some(ws_config)),
    )
    .await;

    let ws_stream = match handshake {
        Ok(Ok(ws_stream)) => ws_stream,
        Ok(Err(e)) => {
            warn!(%peer_addr, error = %e, "websocket handshake failed");
            return;
        }
        Err(_) => {
            warn!(%peer_addr, "websocket handshake timed out");
            return;
        }
    };

    let session_id = SessionId::new();
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let handle = match state.connections.register(session_id.clone(), peer_addr.ip(), outbound_tx) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(%peer_addr, error = %e, "rejecting connection");
            return;
        }
    };

    let span = tracing::info_span!("connection", %session_id, %peer_addr);
    async move {
        info!("connection accepted");
        let (write, read) = ws_stream.split();

        let last_heartbeat = Arc::new(Mutex::new(Instant::now()));
        let last_message = Arc::new(Mutex::new(Instant::now()));

        let writer_handle = tokio::spawn(writer_loop(
            write,
            outbound_rx,
            handle.cancel.clone(),
            config.ping_interval,
        ));

        let watchdog_cancel = handle.cancel.clone();
        let watchdog_handle = tokio::spawn(watchdog(
            last_heartbeat.clone(),
            last_message.clone(),
            config.ping_interval + config.pong_timeout,
            config.idle_timeout,
            watchdog_cancel,
        ));

        let mut dispatches = tokio::task::JoinSet::new();
        reader_loop(
            read,
            &state,
            &session_id,
            &handle.cancel,
            &last_heartbeat,
            &last_message,
            &shutdown,
            &mut dispatches,
        )
        .await;

        // Let any dispatch already under way (an execute in progress, say) finish before
        // tearing the connection down, rather than dropping it mid-flight.
        while dispatches.join_next().await.is_some() {}

        handle.cancel.cancel();
        let _ = writer_handle.await;
        let _ = watchdog_handle.await;

        // Idempotent cleanup: both calls are no-ops if this session was never fully
        // registered anywhere else, and this is the only call site.
        state.broadcaster.forget_session(&session_id);
        state.connections.remove(&session_id);
        info!("connection closed");
    }
    .instrument(span)
    .await
}

#[allow(clippy::too_many_arguments)]
async fn reader_loop(
    mut read: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<TcpStream>,
    >,
    state: &Arc<ServerState>,
    session_id: &SessionId,
    cancel: &CancellationToken,
    last_heartbeat: &Arc<Mutex<Instant>>,
    last_message: &Arc<Mutex<Instant>>,
    shutdown: &CancellationToken,
    dispatches: &mut tokio::task::JoinSet<()>,
) {
    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        *last_heartbeat.lock() = Instant::now();
                        *last_message.lock() = Instant::now();
                        match tether_wire::decode(text.as_bytes()) {
                            Ok(message) => {
                                dispatches.spawn(router::dispatch(state.clone(), session_id.clone(), message));
                            }
                            Err(e) => {
                                debug!(error = %e, "rejecting malformed frame");
                                if let Some(handle) = state.connections.get(session_id) {
                                    let _ = handle.sender.try_send(ServerMessage::error(
                                        None,
                                        e.code(),
                                        e.to_string(),
                                    ));
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                        *last_heartbeat.lock() = Instant::now();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "client closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary frames carry no meaning in this protocol; ignore.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                    None => {
                        debug!("stream ended");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => break,
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn writer_loop(
    mut write: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<TcpStream>,
        Message,
    >,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
    cancel: CancellationToken,
    ping_interval: Duration,
) {
    let mut ticker = tokio::time::interval(ping_interval);
    loop {
        tokio::select! {
            message = outbound_rx.recv() => {
                match message {
                    Some(message) => {
                        if write.send(Message::Text(message.to_text().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Closes the connection if neither a heartbeat frame (ping/pong/text) nor a complete
/// client message has been seen inside the respective deadline.
async fn watchdog(
    last_heartbeat: Arc<Mutex<Instant>>,
    last_message: Arc<Mutex<Instant>>,
    heartbeat_deadline: Duration,
    idle_deadline: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let heartbeat_stale = now.duration_since(*last_heartbeat.lock()) > heartbeat_deadline;
                let idle_stale = now.duration_since(*last_message.lock()) > idle_deadline;
                if heartbeat_stale || idle_stale {
                    cancel.cancel();
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
