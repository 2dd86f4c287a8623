//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{Participant, SessionRegistry};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Per-connection outbound queue depth (a few seconds of snapshots)
pub const OUTBOUND_QUEUE: usize = 256;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let participant_id = Uuid::new_v4();
    info!(participant = %participant_id, "New WebSocket connection");

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let participant = Participant::new(participant_id, outbound_tx);

    let (ws_sink, ws_stream) = socket.split();
    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    run_session(&state.registry, participant, ws_sink, ws_stream, outbound_rx, rate_limiter)
        .await;

    // Disconnect is always a leave
    state.registry.leave(participant_id);

    info!(participant = %participant_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    registry: &SessionRegistry,
    participant: Participant,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
    rate_limiter: ConnectionRateLimiter,
) {
    let participant_id = participant.id;

    // Spawn writer task: session messages -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(participant = %participant_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> registry
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(participant = %participant_id, "Rate limited inbound message");
                    continue;
                }
                handle_text(registry, &participant, &text);
            }
            Ok(Message::Binary(_)) => {
                debug!(participant = %participant_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(participant = %participant_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(participant = %participant_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Parse one text frame and act on it. Malformed frames are dropped
/// without a reply.
pub fn handle_text(registry: &SessionRegistry, participant: &Participant, text: &str) {
    match serde_json::from_str::<ClientMsg>(text) {
        Ok(msg) => dispatch(registry, participant, msg),
        Err(e) => {
            debug!(participant = %participant.id, error = %e, "Dropping malformed message");
        }
    }
}

/// Route a parsed client message to the registry
pub fn dispatch(registry: &SessionRegistry, participant: &Participant, msg: ClientMsg) {
    match msg {
        ClientMsg::CreateRoom => {
            if let Err(e) = registry.create_room(participant.clone()) {
                reject(participant, e);
            }
        }
        ClientMsg::JoinRoom { code } => {
            if let Err(e) = registry.join(&code, participant.clone()) {
                reject(participant, e);
            }
        }
        ClientMsg::Input { frame, input } => {
            registry.submit_input(participant.id, frame, input);
        }
    }
}

fn reject(participant: &Participant, error: impl std::fmt::Display) {
    debug!(participant = %participant.id, error = %error, "Request rejected");
    participant.send(ServerMsg::Error {
        message: error.to_string(),
    });
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
