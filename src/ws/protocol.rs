//! WebSocket protocol message definitions
//! These are the wire types for client-server communication, one JSON object
//! per message, tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::game::fighter::{AttackKind, AttackPhase, FighterState, Stance};
use crate::game::input::InputFrame;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Open a new room and take slot 0
    CreateRoom,

    /// Join an existing room by its code
    JoinRoom { code: String },

    /// Input for one simulation frame
    Input {
        /// Frame this input belongs to
        frame: u64,
        input: InputFrame,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Room created, the creator is player 0
    RoomCreated {
        code: String,
        #[serde(rename = "playerIndex")]
        player_index: usize,
    },

    /// Joined an existing room
    RoomJoined {
        code: String,
        #[serde(rename = "playerIndex")]
        player_index: usize,
    },

    /// Both seats taken, inputs for frame 0 may start flowing
    MatchStart,

    /// Authoritative state after one frame
    GameState { state: GameState },

    /// The other participant left; the session will not tick again
    OpponentDisconnected,

    /// Request rejected
    Error { message: String },
}

/// Snapshot of a whole session after one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub frame: u64,
    /// Indexed by player slot
    pub players: [FighterSnapshot; 2],
}

/// Read-only projection of a fighter; the only contract renderers may rely on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FighterSnapshot {
    pub x: f32,
    /// +1 facing right, -1 facing left
    pub facing: i8,
    pub state: FighterState,
    pub stance: Stance,
    pub health: f32,
    pub stamina: f32,
    /// In-flight attack, `null` when none
    pub attack: Option<AttackSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackSnapshot {
    #[serde(rename = "type")]
    pub kind: AttackKind,
    pub stance: Stance,
    pub phase: AttackPhase,
    pub has_hit: bool,
}
