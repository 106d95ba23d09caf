use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use atlas_types::events::{GatewayCommand, GatewayEvent};
use atlas_types::models::ArtifactId;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type Subscriptions = Arc<RwLock<HashSet<ArtifactId>>>;

/// GET /api/gateway
pub async fn upgrade(State(dispatcher): State<Dispatcher>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, dispatcher))
}

/// Serve one gateway socket until either side goes away.
///
/// Reads are public, so there is no identify handshake: a socket starts with
/// only global (artifact) events and opts into message threads with
/// `Subscribe`.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();
    // Subscribe before Ready so nothing published after it is missed.
    let mut broadcast_rx = dispatcher.subscribe();

    let ready = GatewayEvent::Ready {
        heartbeat_secs: HEARTBEAT_INTERVAL.as_secs(),
    };
    match serde_json::to_string(&ready) {
        Ok(text) => {
            if sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        Err(e) => {
            warn!("Failed to encode Ready event: {}", e);
            return;
        }
    }

    let open = dispatcher.connection_opened();
    info!("Gateway connection {} opened ({} open)", conn_id, open);

    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            // Client re-fetches over REST; nothing to replay here.
                            warn!("Gateway connection {} lagged by {} events", conn_id, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    let deliver = send_subscriptions
                        .read()
                        .map(|subs| should_deliver(&event, &subs))
                        .unwrap_or(false);
                    if !deliver {
                        continue;
                    }

                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => {
                        debug!("Gateway connection {} command: {:?}", conn_id, cmd);
                        if let Ok(mut subs) = recv_subscriptions.write() {
                            apply_command(&mut subs, cmd);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Gateway connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let open = dispatcher.connection_closed();
    info!("Gateway connection {} closed ({} open)", conn_id, open);
}

/// Thread-scoped events go only to subscribers of that thread; the rest are
/// global.
pub fn should_deliver(event: &GatewayEvent, subscriptions: &HashSet<ArtifactId>) -> bool {
    match event.thread_id() {
        Some(artifact_id) => subscriptions.contains(&artifact_id),
        None => true,
    }
}

pub fn apply_command(subscriptions: &mut HashSet<ArtifactId>, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Subscribe { artifact_ids } => subscriptions.extend(artifact_ids),
        GatewayCommand::Unsubscribe { artifact_ids } => {
            for id in artifact_ids {
                subscriptions.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_types::models::MessageView;

    fn message_event(artifact_id: ArtifactId) -> GatewayEvent {
        GatewayEvent::MessageCreate {
            message: MessageView {
                id: 1,
                artifact_id,
                user_id: 1,
                username: "alice".into(),
                content: "hi".into(),
                created_at: chrono::Utc::now(),
            },
        }
    }

    #[test]
    fn message_events_need_a_subscription() {
        let mut subs = HashSet::new();
        assert!(!should_deliver(&message_event(5), &subs));

        apply_command(&mut subs, GatewayCommand::Subscribe { artifact_ids: vec![5, 6] });
        assert!(should_deliver(&message_event(5), &subs));
        assert!(!should_deliver(&message_event(7), &subs));

        apply_command(&mut subs, GatewayCommand::Unsubscribe { artifact_ids: vec![5] });
        assert!(!should_deliver(&message_event(5), &subs));
        assert!(should_deliver(&message_event(6), &subs));
    }

    #[test]
    fn artifact_events_are_global() {
        let subs = HashSet::new();
        assert!(should_deliver(&GatewayEvent::ArtifactDelete { id: 9 }, &subs));
    }
}
