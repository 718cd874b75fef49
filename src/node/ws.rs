//! WebSocket event stream.
//!
//! Pushes node events to every connected client and answers a small set of
//! typed queries. New clients get a welcome frame with current DAG state
//! and a replay of recent messages. A client that cannot keep up with the
//! broadcast channel is dropped at send time.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::node::{DevNode, NodeError};
use crate::types::event::NodeEvent;

/// Retained outbound messages, replayable to new clients.
const HISTORY_CAPACITY: usize = 100;

/// How many retained messages a new client receives.
const HISTORY_REPLAY: usize = 20;

#[derive(Clone)]
struct WsState {
    node: Arc<DevNode>,
    history: Arc<Mutex<VecDeque<Value>>>,
}

/// Bind and spawn the WebSocket server.
pub(crate) async fn start_ws_server(
    node: Arc<DevNode>,
    addr: SocketAddr,
) -> Result<JoinHandle<()>, NodeError> {
    let history = Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)));
    let state = WsState {
        node: Arc::clone(&node),
        history: Arc::clone(&history),
    };

    // One recorder keeps the replay buffer current regardless of clients.
    let mut recorder_rx = node.subscribe();
    let recorder_node = Arc::clone(&node);
    let recorder_history = history;
    tokio::spawn(async move {
        loop {
            match recorder_rx.recv().await {
                Ok(event) => {
                    for frame in event_frames(&recorder_node, &event) {
                        push_history(&recorder_history, frame);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event recorder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let app = Router::new().route("/ws", get(ws_upgrade)).with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| NodeError::Bind { addr, source })?;
    info!("WebSocket server listening on {}", listener.local_addr().unwrap_or(addr));

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("WebSocket server error: {e}");
        }
    }))
}

async fn ws_upgrade(State(state): State<WsState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| client_session(state, socket))
}

async fn client_session(state: WsState, mut socket: WebSocket) {
    let mut events = state.node.subscribe();

    // Welcome frame with a snapshot of the DAG.
    let welcome = {
        let dag = state.node.dag().read();
        frame(
            "welcome",
            json!({
                "message": "connected to braidnode",
                "dagStats": dag.get_stats(),
                "tips": dag.get_tips(),
            }),
        )
    };
    if send_json(&mut socket, &welcome).await.is_err() {
        return;
    }

    // Replay of recent traffic.
    let recent: Vec<Value> = {
        let history = state.history.lock();
        history
            .iter()
            .rev()
            .take(HISTORY_REPLAY)
            .rev()
            .cloned()
            .collect()
    };
    let history_frame = frame("history", json!({ "messages": recent }));
    if send_json(&mut socket, &history_frame).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    for out in event_frames(&state.node, &event) {
                        if send_json(&mut socket, &out).await.is_err() {
                            debug!("client disconnected at send");
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Too slow to keep ordering guarantees; drop the client.
                    warn!(skipped, "dropping lagged WebSocket client");
                    return;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(response) = handle_client_message(&state, &text).await {
                        if send_json(&mut socket, &response).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {} // binary/ping/pong frames: nothing to do
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {e}");
                    return;
                }
            },
        }
    }
}

/// Answer a typed client command. Unknown types are logged and ignored.
async fn handle_client_message(state: &WsState, text: &str) -> Option<Value> {
    let message: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            warn!("ignoring malformed WebSocket message");
            return None;
        }
    };

    match message.get("type").and_then(Value::as_str) {
        Some("ping") => Some(frame("pong", json!({}))),
        Some("getStats") => {
            let dag = state.node.dag().read();
            Some(frame("stats", serde_json::to_value(dag.get_stats()).ok()?))
        }
        Some("getTips") => {
            let dag = state.node.dag().read();
            Some(frame("tips", json!({ "tips": dag.get_tips() })))
        }
        Some("getBlock") => {
            let hash = message
                .get("hash")
                .and_then(Value::as_str)
                .and_then(|s| crate::types::Hash::from_hex(s).ok());
            let block = hash.and_then(|h| state.node.dag().read().get_block(&h).cloned());
            Some(frame(
                "block",
                json!({ "block": block.map(|b| serde_json::to_value(b).unwrap_or(Value::Null)) }),
            ))
        }
        Some("getAllBlocks") => {
            let dag = state.node.dag().read();
            let blocks: Vec<Value> = dag
                .get_all_blocks()
                .iter()
                .filter_map(|b| serde_json::to_value(b).ok())
                .collect();
            Some(frame("allBlocks", json!({ "blocks": blocks })))
        }
        Some("mineBlocks") => {
            let count = message
                .get("count")
                .and_then(Value::as_u64)
                .unwrap_or(1)
                .min(100) as usize;
            let mined = state.node.mine_blocks(count).await;
            Some(frame("mineBlocksResult", json!({ "blocks": mined })))
        }
        Some(other) => {
            warn!(kind = other, "ignoring unknown WebSocket message type");
            None
        }
        None => {
            warn!("ignoring WebSocket message without type");
            None
        }
    }
}

/// Outbound frames for one node event. Block commits also refresh the
/// derived tip and stats views.
fn event_frames(node: &DevNode, event: &NodeEvent) -> Vec<Value> {
    let mut frames = Vec::with_capacity(3);
    let data = match event {
        NodeEvent::BlockMined(block) => {
            serde_json::to_value(block).map(|b| json!({ "block": b })).unwrap_or(Value::Null)
        }
        NodeEvent::TransactionAdded(tx) => {
            serde_json::to_value(tx).map(|t| json!({ "transaction": t })).unwrap_or(Value::Null)
        }
        _ => json!({}),
    };
    frames.push(frame(event.kind(), data));

    if matches!(event, NodeEvent::BlockMined(_)) {
        let dag = node.dag().read();
        frames.push(frame("tipsChanged", json!({ "tips": dag.get_tips() })));
        frames.push(frame(
            "dagStatsUpdated",
            serde_json::to_value(dag.get_stats()).unwrap_or(Value::Null),
        ));
    }
    frames
}

fn frame(kind: &str, data: Value) -> Value {
    json!({
        "type": kind,
        "data": data,
        "timestamp": now_millis(),
    })
}

fn push_history(history: &Mutex<VecDeque<Value>>, message: Value) {
    let mut history = history.lock();
    if history.len() >= HISTORY_CAPACITY {
        history.pop_front();
    }
    history.push_back(message);
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string())).await
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
