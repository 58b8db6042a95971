//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{ActorId, ClientLink, SessionInput};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Longest display name accepted from the query string
const MAX_NAME_LEN: usize = 24;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Display name shown to other players
    #[serde(default)]
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let actor_id = Uuid::new_v4();
    let name = display_name(query.name.as_deref(), actor_id);
    info!(actor_id = %actor_id, name = %name, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, actor_id, name, state))
}

fn display_name(requested: Option<&str>, actor_id: ActorId) -> String {
    let trimmed: String = requested
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    if trimmed.is_empty() {
        format!("Player_{}", &actor_id.simple().to_string()[..8])
    } else {
        trimmed
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, actor_id: ActorId, name: String, state: AppState) {
    info!(actor_id = %actor_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (link, reliable_rx, unreliable_rx) = ClientLink::new();

    let join = SessionInput::Join { actor_id, name, link };
    if state.session.input_tx.send(join).await.is_err() {
        error!(actor_id = %actor_id, "Session is not running");
        return;
    }

    run_connection(actor_id, ws_sink, ws_stream, state.session.input_tx.clone(), reliable_rx, unreliable_rx).await;

    info!(actor_id = %actor_id, "WebSocket connection closed");
}

/// Run the WebSocket connection with read/write split
async fn run_connection(
    actor_id: ActorId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    input_tx: mpsc::Sender<SessionInput>,
    mut reliable_rx: mpsc::UnboundedReceiver<ServerMsg>,
    mut unreliable_rx: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Spawn writer task: session queues -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                msg = reliable_rx.recv() => msg,
                Some(msg) = unreliable_rx.recv() => Some(msg),
            };
            let Some(msg) = msg else {
                debug!(actor_id = %actor_id, "Session dropped the connection");
                break;
            };
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(actor_id = %actor_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> session loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(actor_id = %actor_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if input_tx.send(SessionInput::Request { actor_id, msg }).await.is_err() {
                            debug!(actor_id = %actor_id, "Input channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(actor_id = %actor_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(actor_id = %actor_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(actor_id = %actor_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(actor_id = %actor_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to session loop
    let _ = input_tx.send(SessionInput::Leave { actor_id }).await;

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
