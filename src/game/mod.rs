//! Game simulation modules

pub mod combat;
pub mod fighter;
pub mod input;
pub mod physics;
pub mod registry;
pub mod session;
pub mod snapshot;

pub use combat::{HitOutcome, HitResolver};
pub use fighter::{AttackKind, AttackPhase, Fighter, FighterState, Stance};
pub use input::InputFrame;
pub use registry::{JoinError, SessionRegistry};
pub use session::{InputDisposition, MatchSession, Participant, ParticipantId};
