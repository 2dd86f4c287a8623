//! Snapshot building for network transmission

use crate::ws::protocol::{AttackSnapshot, FighterSnapshot, GameState, ServerMsg};

use super::fighter::{AttackDescriptor, Fighter};

impl From<&AttackDescriptor> for AttackSnapshot {
    fn from(attack: &AttackDescriptor) -> Self {
        Self {
            kind: attack.kind,
            stance: attack.stance,
            phase: attack.phase,
            has_hit: attack.has_hit(),
        }
    }
}

impl From<&Fighter> for FighterSnapshot {
    fn from(fighter: &Fighter) -> Self {
        Self {
            x: fighter.x,
            facing: fighter.facing,
            state: fighter.state,
            stance: fighter.stance,
            health: fighter.health,
            stamina: fighter.stamina,
            attack: fighter.current_attack.as_ref().map(AttackSnapshot::from),
        }
    }
}

impl Fighter {
    pub fn snapshot(&self) -> FighterSnapshot {
        FighterSnapshot::from(self)
    }
}

/// Builds per-frame state broadcasts
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn build(frame: u64, fighters: [&Fighter; 2]) -> GameState {
        GameState {
            frame,
            players: [fighters[0].snapshot(), fighters[1].snapshot()],
        }
    }

    /// Wrap a state in its wire message
    pub fn message(state: GameState) -> ServerMsg {
        ServerMsg::GameState { state }
    }
}
