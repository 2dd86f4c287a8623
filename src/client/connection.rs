//! Client-side connection to the duel server
//!
//! `NetClient` speaks the JSON wire protocol but owns no socket. Raw text
//! frames move through a pair of channels; whatever socket implementation
//! the host uses pumps the [`ClientTransport`] end. Incoming traffic is
//! surfaced as [`NetEvent`]s from [`NetClient::poll_event`].

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::input::InputFrame;
use crate::game::registry::normalize_code;
use crate::ws::protocol::{ClientMsg, GameState, ServerMsg};

/// Frames buffered in each direction before sends start failing
pub const CLIENT_QUEUE: usize = 256;

/// Something the server told us
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    RoomCreated { code: String, player_index: usize },
    RoomJoined { code: String, player_index: usize },
    MatchStarted,
    State(GameState),
    OpponentDisconnected,
    Error(String),
}

/// Reasons an outbound message was not queued
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Match has not started")]
    MatchNotStarted,

    #[error("Outbound queue full")]
    QueueFull,

    #[error("Connection closed")]
    Closed,

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Socket-facing end of a [`NetClient`]
#[derive(Debug)]
pub struct ClientTransport {
    /// Text frames to write to the socket
    pub outgoing: mpsc::Receiver<String>,
    /// Text frames read from the socket
    pub incoming: mpsc::Sender<String>,
}

/// Protocol state of one client connection
#[derive(Debug)]
pub struct NetClient {
    outgoing: mpsc::Sender<String>,
    incoming: mpsc::Receiver<String>,
    room_code: Option<String>,
    player_index: Option<usize>,
    match_started: bool,
}

impl NetClient {
    pub fn new() -> (Self, ClientTransport) {
        let (out_tx, out_rx) = mpsc::channel(CLIENT_QUEUE);
        let (in_tx, in_rx) = mpsc::channel(CLIENT_QUEUE);

        let client = Self {
            outgoing: out_tx,
            incoming: in_rx,
            room_code: None,
            player_index: None,
            match_started: false,
        };
        let transport = ClientTransport {
            outgoing: out_rx,
            incoming: in_tx,
        };
        (client, transport)
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn player_index(&self) -> Option<usize> {
        self.player_index
    }

    pub fn is_match_started(&self) -> bool {
        self.match_started
    }

    pub fn create_room(&self) -> Result<(), ClientError> {
        self.send(&ClientMsg::CreateRoom)
    }

    /// Join by code; typed codes are normalised to upper case
    pub fn join_room(&self, code: &str) -> Result<(), ClientError> {
        self.send(&ClientMsg::JoinRoom {
            code: normalize_code(code),
        })
    }

    /// Send one frame of input. Refused until the match has started.
    pub fn send_input(&self, frame: u64, input: InputFrame) -> Result<(), ClientError> {
        if !self.match_started {
            return Err(ClientError::MatchNotStarted);
        }
        self.send(&ClientMsg::Input { frame, input })
    }

    fn send(&self, msg: &ClientMsg) -> Result<(), ClientError> {
        let json = serde_json::to_string(msg)?;
        self.outgoing.try_send(json).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::Closed,
        })
    }

    /// Next event from the server, if one is waiting. Never blocks.
    /// Frames that fail to parse are skipped.
    pub fn poll_event(&mut self) -> Option<NetEvent> {
        loop {
            let text = self.incoming.try_recv().ok()?;
            match serde_json::from_str::<ServerMsg>(&text) {
                Ok(msg) => return Some(self.absorb(msg)),
                Err(e) => debug!(error = %e, "Dropping malformed server message"),
            }
        }
    }

    /// Update connection state from a server message
    fn absorb(&mut self, msg: ServerMsg) -> NetEvent {
        match msg {
            ServerMsg::RoomCreated { code, player_index } => {
                info!(code = %code, player_index, "Room created");
                self.room_code = Some(code.clone());
                self.player_index = Some(player_index);
                NetEvent::RoomCreated { code, player_index }
            }
            ServerMsg::RoomJoined { code, player_index } => {
                info!(code = %code, player_index, "Joined room");
                self.room_code = Some(code.clone());
                self.player_index = Some(player_index);
                NetEvent::RoomJoined { code, player_index }
            }
            ServerMsg::MatchStart => {
                info!("Match started");
                self.match_started = true;
                NetEvent::MatchStarted
            }
            ServerMsg::GameState { state } => NetEvent::State(state),
            ServerMsg::OpponentDisconnected => {
                info!("Opponent disconnected");
                self.match_started = false;
                NetEvent::OpponentDisconnected
            }
            ServerMsg::Error { message } => {
                warn!(message = %message, "Server error");
                NetEvent::Error(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn push(transport: &ClientTransport, value: Value) {
        transport.incoming.try_send(value.to_string()).unwrap();
    }

    fn sent(transport: &mut ClientTransport) -> Value {
        serde_json::from_str(&transport.outgoing.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn join_uppercases_code() {
        let (client, mut transport) = NetClient::new();
        client.join_room(" ab1c").unwrap();
        assert_eq!(sent(&mut transport), json!({"type": "join_room", "code": "AB1C"}));

        client.create_room().unwrap();
        assert_eq!(sent(&mut transport), json!({"type": "create_room"}));
    }

    #[test]
    fn input_waits_for_match_start() {
        let (mut client, mut transport) = NetClient::new();
        assert!(matches!(
            client.send_input(0, InputFrame::default()),
            Err(ClientError::MatchNotStarted)
        ));
        assert!(transport.outgoing.try_recv().is_err());

        push(&transport, json!({"type": "room_joined", "code": "WXYZ", "playerIndex": 1}));
        push(&transport, json!({"type": "match_start"}));
        assert_eq!(
            client.poll_event(),
            Some(NetEvent::RoomJoined {
                code: "WXYZ".into(),
                player_index: 1
            })
        );
        assert_eq!(client.poll_event(), Some(NetEvent::MatchStarted));
        assert_eq!(client.room_code(), Some("WXYZ"));
        assert_eq!(client.player_index(), Some(1));

        let input = InputFrame {
            dash: true,
            ..Default::default()
        };
        client.send_input(12, input).unwrap();
        let msg = sent(&mut transport);
        assert_eq!(msg["type"], "input");
        assert_eq!(msg["frame"], 12);
        assert_eq!(msg["input"]["dash"], true);
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let (mut client, transport) = NetClient::new();
        transport.incoming.try_send("{oops".into()).unwrap();
        push(&transport, json!({"type": "warp"}));
        push(&transport, json!({"type": "error", "message": "Room not found"}));

        assert_eq!(
            client.poll_event(),
            Some(NetEvent::Error("Room not found".into()))
        );
        assert_eq!(client.poll_event(), None);
    }

    #[test]
    fn opponent_leaving_stops_input() {
        let (mut client, transport) = NetClient::new();
        push(&transport, json!({"type": "match_start"}));
        push(&transport, json!({"type": "opponent_disconnected"}));
        client.poll_event();
        assert!(client.is_match_started());
        assert_eq!(client.poll_event(), Some(NetEvent::OpponentDisconnected));
        assert!(!client.is_match_started());
    }

    #[test]
    fn closed_transport_reports_closed() {
        let (client, transport) = NetClient::new();
        drop(transport);
        assert!(matches!(client.create_room(), Err(ClientError::Closed)));
    }
}
