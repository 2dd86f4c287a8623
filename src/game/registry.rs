//! Session registry - room codes, membership and the shared tick loop

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::{tick_delta, tick_duration};
use crate::ws::protocol::ServerMsg;

use super::input::InputFrame;
use super::session::{InputDisposition, MatchSession, Participant, ParticipantId};

/// Room code length
pub const ROOM_CODE_LEN: usize = 4;
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Reasons a create or join request is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Room not found")]
    NotFound,

    #[error("Room is full")]
    Full,

    #[error("Already in a room")]
    AlreadyInSession,
}

/// Short human-typeable room codes
#[derive(Debug)]
pub struct RoomCodeGenerator {
    rng: ChaCha8Rng,
}

impl RoomCodeGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { rng }
    }

    pub fn generate(&mut self) -> String {
        (0..ROOM_CODE_LEN)
            .map(|_| {
                let idx = self.rng.gen_range(0..ROOM_CODE_ALPHABET.len());
                ROOM_CODE_ALPHABET[idx] as char
            })
            .collect()
    }
}

/// Normalise user-typed codes
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub type SessionHandle = Arc<Mutex<MatchSession>>;

/// Owns every live session. Each session has its own lock, so rooms never
/// contend with each other; only membership changes touch the maps.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    /// participant -> room code
    participants: DashMap<ParticipantId, String>,
    codes: Mutex<RoomCodeGenerator>,
}

impl SessionRegistry {
    pub fn new(code_seed: Option<u64>) -> Self {
        Self {
            sessions: DashMap::new(),
            participants: DashMap::new(),
            codes: Mutex::new(RoomCodeGenerator::new(code_seed)),
        }
    }

    pub fn get(&self, code: &str) -> Option<SessionHandle> {
        self.sessions.get(code).map(|s| s.value().clone())
    }

    /// Room the participant currently sits in
    pub fn room_of(&self, id: ParticipantId) -> Option<String> {
        self.participants.get(&id).map(|c| c.value().clone())
    }

    /// Register an empty session under a fresh unique code
    pub fn create_session(&self) -> String {
        loop {
            let code = self.codes.lock().generate();
            if let Entry::Vacant(slot) = self.sessions.entry(code.clone()) {
                slot.insert(Arc::new(Mutex::new(MatchSession::new(code.clone()))));
                info!(code = %code, "Session created");
                return code;
            }
        }
    }

    /// Create a room and seat the creator in slot 0
    pub fn create_room(&self, participant: Participant) -> Result<(String, usize), JoinError> {
        self.release_finished(participant.id)?;

        let code = self.create_session();
        match self.seat(&code, participant, true) {
            Ok(index) => Ok((code, index)),
            Err(e) => {
                self.sessions.remove(&code);
                Err(e)
            }
        }
    }

    /// Join an existing room. The joiner hears `room_joined` before the
    /// `match_start` that follows once both seats are taken.
    pub fn join(&self, code: &str, participant: Participant) -> Result<usize, JoinError> {
        let code = normalize_code(code);
        self.release_finished(participant.id)?;
        self.seat(&code, participant, false)
    }

    fn seat(&self, code: &str, participant: Participant, creator: bool) -> Result<usize, JoinError> {
        let session = self.get(code).ok_or(JoinError::NotFound)?;
        self.seat_in(code, &session, participant, creator)
    }

    /// Seat through an already resolved handle. Refused with `NotFound` if
    /// a concurrent `leave` closed the session after the lookup.
    fn seat_in(
        &self,
        code: &str,
        session: &SessionHandle,
        participant: Participant,
        creator: bool,
    ) -> Result<usize, JoinError> {
        let code = code.to_string();
        let mut session = session.lock();

        let id = participant.id;
        let index = session.add_participant(participant)?;
        self.participants.insert(id, code.clone());

        let ack = if creator {
            ServerMsg::RoomCreated {
                code: code.clone(),
                player_index: index,
            }
        } else {
            ServerMsg::RoomJoined {
                code: code.clone(),
                player_index: index,
            }
        };
        session.send_to(index, ack);
        info!(code = %code, participant = %id, slot = index, "Participant joined");

        session.start();
        Ok(index)
    }

    /// A participant still seated in a running room cannot take another
    /// seat; one left behind in a terminated room is released first.
    fn release_finished(&self, id: ParticipantId) -> Result<(), JoinError> {
        let Some(code) = self.room_of(id) else {
            return Ok(());
        };
        let finished = self
            .get(&code)
            .map_or(true, |session| session.lock().is_terminated());
        if !finished {
            return Err(JoinError::AlreadyInSession);
        }
        self.leave(id);
        Ok(())
    }

    /// Remove a participant from its room. Empty rooms are destroyed; a
    /// room with someone left behind is terminated and that member told.
    pub fn leave(&self, id: ParticipantId) {
        let Some((_, code)) = self.participants.remove(&id) else {
            return;
        };
        let Some(session) = self.get(&code) else {
            return;
        };

        let empty = {
            let mut session = session.lock();
            session.remove_participant(id);
            session.is_empty()
        };
        info!(code = %code, participant = %id, "Participant left");

        if empty {
            let removed = self
                .sessions
                .remove_if(&code, |_, s| s.lock().close_if_empty())
                .is_some();
            if removed {
                info!(code = %code, "Session destroyed");
            }
        }
    }

    /// Route one participant's input to its session
    pub fn submit_input(
        &self,
        id: ParticipantId,
        frame: u64,
        input: InputFrame,
    ) -> InputDisposition {
        let Some(session) = self.room_of(id).and_then(|code| self.get(&code)) else {
            return InputDisposition::UnknownParticipant;
        };
        let disposition = session.lock().submit_input(id, frame, input);
        if disposition != InputDisposition::Accepted {
            debug!(participant = %id, frame, ?disposition, "Input not buffered");
        }
        disposition
    }

    /// Advance every session by as many ready frames as allowed.
    /// Returns the total number of frames simulated.
    pub fn tick_all(&self, dt: f32, max_catchup: u32) -> u32 {
        let handles: Vec<SessionHandle> =
            self.sessions.iter().map(|s| s.value().clone()).collect();

        handles
            .iter()
            .map(|session| session.lock().tick_ready(dt, max_catchup))
            .sum()
    }

    /// Fixed-rate authoritative loop over all sessions
    pub async fn run(self: Arc<Self>, tick_rate: u32, max_catchup: u32) {
        info!(tick_rate, max_catchup, "Tick loop started");

        let dt = tick_delta();
        let mut ticker = interval(tick_duration(tick_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick_all(dt, max_catchup);
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_participants(&self) -> usize {
        self.participants.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn participant() -> (Participant, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(512);
        (Participant::new(Uuid::new_v4(), tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn codes_are_four_uppercase_alphanumerics() {
        let mut generator = RoomCodeGenerator::new(Some(7));
        for _ in 0..200 {
            let code = generator.generate();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn seeded_codes_are_reproducible() {
        let mut a = RoomCodeGenerator::new(Some(42));
        let mut b = RoomCodeGenerator::new(Some(42));
        assert_eq!(a.generate(), b.generate());
    }

    #[test]
    fn live_codes_are_unique() {
        let registry = SessionRegistry::new(Some(1));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            assert!(seen.insert(registry.create_session()));
        }
        assert_eq!(registry.active_sessions(), 500);
    }

    #[test]
    fn create_then_join_starts_match() {
        let registry = SessionRegistry::new(Some(3));
        let (host, mut host_rx) = participant();
        let (guest, mut guest_rx) = participant();

        let (code, index) = registry.create_room(host).unwrap();
        assert_eq!(index, 0);
        assert_eq!(
            drain(&mut host_rx),
            vec![ServerMsg::RoomCreated {
                code: code.clone(),
                player_index: 0
            }]
        );

        // Codes are matched case-insensitively
        assert_eq!(registry.join(&code.to_lowercase(), guest).unwrap(), 1);
        assert_eq!(
            drain(&mut guest_rx),
            vec![
                ServerMsg::RoomJoined {
                    code: code.clone(),
                    player_index: 1
                },
                ServerMsg::MatchStart
            ]
        );
        assert_eq!(drain(&mut host_rx), vec![ServerMsg::MatchStart]);
        assert_eq!(registry.total_participants(), 2);
    }

    #[test]
    fn join_errors() {
        let registry = SessionRegistry::new(Some(4));
        let (host, _h) = participant();
        let (guest, _g) = participant();
        let (third, _t) = participant();

        let (p, _rx) = participant();
        assert_eq!(registry.join("ZZZZ", p), Err(JoinError::NotFound));

        let (code, _) = registry.create_room(host).unwrap();
        registry.join(&code, guest.clone()).unwrap();
        assert_eq!(registry.join(&code, third), Err(JoinError::Full));
        assert_eq!(
            registry.create_room(guest),
            Err(JoinError::AlreadyInSession)
        );
    }

    #[test]
    fn leave_notifies_and_destroys_when_empty() {
        let registry = SessionRegistry::new(Some(5));
        let (host, mut host_rx) = participant();
        let (guest, _g) = participant();
        let (host_id, guest_id) = (host.id, guest.id);

        let (code, _) = registry.create_room(host).unwrap();
        registry.join(&code, guest).unwrap();
        drain(&mut host_rx);

        registry.leave(guest_id);
        assert_eq!(drain(&mut host_rx), vec![ServerMsg::OpponentDisconnected]);
        assert_eq!(registry.active_sessions(), 1);
        assert!(registry.get(&code).unwrap().lock().is_terminated());

        // Lingering room rejects new members and ticks
        let (late, _l) = participant();
        assert_eq!(registry.join(&code, late), Err(JoinError::NotFound));
        assert_eq!(registry.tick_all(1.0 / 60.0, 4), 0);

        registry.leave(host_id);
        assert_eq!(registry.active_sessions(), 0);
        assert_eq!(registry.total_participants(), 0);

        // Leaving twice is harmless
        registry.leave(host_id);
    }

    #[test]
    fn stale_handle_cannot_seat_into_destroyed_room() {
        let registry = SessionRegistry::new(Some(9));
        let (host, _h) = participant();
        let (guest, mut guest_rx) = participant();
        let host_id = host.id;
        let guest_id = guest.id;

        let (code, _) = registry.create_room(host).unwrap();
        // The joiner resolved the handle, then the creator left and the room went away
        let handle = registry.get(&code).unwrap();
        registry.leave(host_id);
        assert!(registry.get(&code).is_none());

        assert_eq!(
            registry.seat_in(&code, &handle, guest, false),
            Err(JoinError::NotFound)
        );
        assert!(drain(&mut guest_rx).is_empty());
        assert_eq!(registry.room_of(guest_id), None);
        assert_eq!(registry.total_participants(), 0);
    }

    #[test]
    fn survivor_can_open_a_new_room() {
        let registry = SessionRegistry::new(Some(6));
        let (host, _h) = participant();
        let (guest, _g) = participant();
        let host_again = host.clone();

        let (old_code, _) = registry.create_room(host).unwrap();
        registry.join(&old_code, guest.clone()).unwrap();
        registry.leave(guest.id);

        let (new_code, index) = registry.create_room(host_again).unwrap();
        assert_ne!(new_code, old_code);
        assert_eq!(index, 0);
        assert!(registry.get(&old_code).is_none());
        assert_eq!(registry.active_sessions(), 1);
    }

    #[test]
    fn inputs_drive_ticks() {
        let registry = SessionRegistry::new(Some(8));
        let (host, mut host_rx) = participant();
        let (guest, _g) = participant();
        let (host_id, guest_id) = (host.id, guest.id);
        let (code, _) = registry.create_room(host).unwrap();

        // Input before the match exists is buffered but nothing ticks
        assert_eq!(
            registry.submit_input(host_id, 0, InputFrame::default()),
            InputDisposition::Accepted
        );
        assert_eq!(registry.tick_all(1.0 / 60.0, 4), 0);

        registry.join(&code, guest).unwrap();
        drain(&mut host_rx);

        assert_eq!(
            registry.submit_input(guest_id, 0, InputFrame::default()),
            InputDisposition::Accepted
        );
        assert_eq!(registry.tick_all(1.0 / 60.0, 4), 1);
        let msgs = drain(&mut host_rx);
        assert!(matches!(&msgs[..], [ServerMsg::GameState { state }] if state.frame == 0));

        assert_eq!(
            registry.submit_input(Uuid::new_v4(), 1, InputFrame::default()),
            InputDisposition::UnknownParticipant
        );
    }
}
