//! WebSocket Handler
//!
//! One task pair per connection: a writer draining the gateway queue into
//! the socket, and a reader feeding text frames to the relay.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::HeartbeatConfig;
use crate::metrics::RelayMetrics;
use crate::relay::CommandRelay;

/// Drive a relay connection until the client leaves, goes silent, or the
/// server shuts down.
pub async fn handle_relay_ws(
    socket: WebSocket,
    relay: Arc<CommandRelay>,
    metrics: Arc<RelayMetrics>,
    heartbeat: HeartbeatConfig,
    shutdown: CancellationToken,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %connection_id, "New relay WebSocket connection");

    let mut rx = relay.connect(&connection_id).await;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task to send messages to WebSocket
    let mut ping = heartbeat.interval.map(ping_interval);
    let conn_send = connection_id.clone();
    let sender_task = async move {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            error!(conn_id = %conn_send, "Failed to serialize {}: {}", event.name(), e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = tick(&mut ping) => {
                    if ws_sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_sender.close().await;
    };

    // Task to handle incoming messages
    let relay_input = relay.clone();
    let conn_input = connection_id.clone();
    let input_task = async move {
        loop {
            let next = match heartbeat.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, ws_receiver.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(conn_id = %conn_input, "No traffic for {:?}, closing connection", timeout);
                        metrics.heartbeat_timeout();
                        break;
                    }
                },
                None => ws_receiver.next().await,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    relay_input.handle_text(&conn_input, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(conn_id = %conn_input, "Ignoring binary frame");
                    metrics.message_malformed();
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(conn_id = %conn_input, "Client closed connection");
                    break;
                }
                // Ping/Pong only refresh the silence timer.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %conn_input, "WebSocket error: {}", e);
                    break;
                }
                None => break,
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %connection_id, "Sender task ended"),
        _ = input_task => debug!(conn_id = %connection_id, "Input task ended"),
        _ = shutdown.cancelled() => debug!(conn_id = %connection_id, "Server shutting down"),
    }

    relay.disconnect(&connection_id).await;
    info!(conn_id = %connection_id, "Relay WebSocket connection closed");
}

fn ping_interval(period: Duration) -> Interval {
    tokio::time::interval_at(Instant::now() + period, period)
}

async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
