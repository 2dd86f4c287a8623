//! Match session state and the authoritative per-frame step

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::{GameState, ServerMsg};

use super::combat::HitResolver;
use super::fighter::Fighter;
use super::input::InputFrame;
use super::physics::{separate_bodies, SPAWN_FACING, SPAWN_X};
use super::registry::JoinError;
use super::snapshot::SnapshotBuilder;

/// Identity of one connected socket
pub type ParticipantId = Uuid;

/// Frames of input history kept behind the current frame
pub const INPUT_HISTORY_FRAMES: u64 = 60;
/// Furthest ahead of the current frame an input may be buffered
pub const MAX_INPUT_LEAD: u64 = 240;

/// A connected participant and its outbound queue
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    outbound: mpsc::Sender<ServerMsg>,
}

impl Participant {
    pub fn new(id: ParticipantId, outbound: mpsc::Sender<ServerMsg>) -> Self {
        Self { id, outbound }
    }

    /// Queue a message without waiting. Returns false if it was dropped.
    pub fn send(&self, msg: ServerMsg) -> bool {
        match self.outbound.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(participant = %self.id, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(participant = %self.id, "Outbound queue closed");
                false
            }
        }
    }
}

/// What happened to a submitted input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    Accepted,
    /// Frame already consumed
    Stale,
    /// Input for this frame was already buffered; first one wins
    Duplicate,
    TooFarAhead,
    UnknownParticipant,
}

#[derive(Debug)]
struct Slot {
    participant: Participant,
    fighter: Fighter,
}

/// One room: two fighter slots, a frame counter and buffered inputs
#[derive(Debug)]
pub struct MatchSession {
    code: String,
    frame: u64,
    slots: [Option<Slot>; 2],
    input_buffer: BTreeMap<u64, HashMap<ParticipantId, InputFrame>>,
    started: bool,
    /// Set once a participant leaves a full session; it never ticks again
    terminated: bool,
}

impl MatchSession {
    pub fn new(code: String) -> Self {
        Self {
            code,
            frame: 0,
            slots: [None, None],
            input_buffer: BTreeMap::new(),
            started: false,
            terminated: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Next frame to be simulated
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn participant_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_full(&self) -> bool {
        self.participant_count() == 2
    }

    pub fn is_empty(&self) -> bool {
        self.participant_count() == 0
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn slot_of(&self, id: ParticipantId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.participant.id == id))
    }

    pub fn fighter(&self, slot: usize) -> Option<&Fighter> {
        self.slots.get(slot)?.as_ref().map(|s| &s.fighter)
    }

    pub fn buffered_frame_range(&self) -> Option<(u64, u64)> {
        let first = *self.input_buffer.keys().next()?;
        let last = *self.input_buffer.keys().next_back()?;
        Some((first, last))
    }

    pub fn has_input(&self, frame: u64, id: ParticipantId) -> bool {
        self.input_buffer
            .get(&frame)
            .is_some_and(|inputs| inputs.contains_key(&id))
    }

    /// Seat a participant in the first free slot and spawn its fighter
    pub fn add_participant(&mut self, participant: Participant) -> Result<usize, JoinError> {
        if self.terminated {
            return Err(JoinError::NotFound);
        }
        if self.slot_of(participant.id).is_some() {
            return Err(JoinError::AlreadyInSession);
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(JoinError::Full)?;

        self.slots[index] = Some(Slot {
            participant,
            fighter: Fighter::new(SPAWN_X[index], SPAWN_FACING[index]),
        });
        Ok(index)
    }

    /// Mark the match as running and tell both sides. No-op unless full.
    pub fn start(&mut self) -> bool {
        if self.started || self.terminated || !self.is_full() {
            return false;
        }
        self.started = true;
        self.broadcast(ServerMsg::MatchStart);
        info!(code = %self.code, "Match started");
        true
    }

    /// Remove a participant and discard its buffered input. If someone is
    /// left behind they are told, and the session stops ticking for good.
    pub fn remove_participant(&mut self, id: ParticipantId) -> Option<usize> {
        let index = self.slot_of(id)?;
        self.slots[index] = None;

        for inputs in self.input_buffer.values_mut() {
            inputs.remove(&id);
        }
        self.input_buffer.retain(|_, inputs| !inputs.is_empty());

        if !self.is_empty() {
            self.terminated = true;
            self.input_buffer.clear();
            self.broadcast(ServerMsg::OpponentDisconnected);
        }

        Some(index)
    }

    /// Close an empty session to further joins. Returns false if anyone is
    /// still seated.
    pub fn close_if_empty(&mut self) -> bool {
        if !self.is_empty() {
            return false;
        }
        self.terminated = true;
        true
    }

    /// Buffer one participant's input for a frame
    pub fn submit_input(
        &mut self,
        id: ParticipantId,
        frame: u64,
        input: InputFrame,
    ) -> InputDisposition {
        if self.slot_of(id).is_none() {
            return InputDisposition::UnknownParticipant;
        }
        if frame < self.frame {
            return InputDisposition::Stale;
        }
        if frame > self.frame + MAX_INPUT_LEAD {
            return InputDisposition::TooFarAhead;
        }

        let inputs = self.input_buffer.entry(frame).or_default();
        if inputs.contains_key(&id) {
            return InputDisposition::Duplicate;
        }
        inputs.insert(id, input);
        InputDisposition::Accepted
    }

    /// Both seats have input for the current frame
    fn current_inputs(&self) -> Option<[InputFrame; 2]> {
        let inputs = self.input_buffer.get(&self.frame)?;
        let mut frames = [InputFrame::default(); 2];
        for (index, slot) in self.slots.iter().enumerate() {
            let slot = slot.as_ref()?;
            frames[index] = *inputs.get(&slot.participant.id)?;
        }
        Some(frames)
    }

    /// Simulate exactly one frame if both inputs are in.
    ///
    /// Returns the broadcast state, or `None` when stalled.
    pub fn tick(&mut self, dt: f32) -> Option<GameState> {
        if !self.started || self.terminated {
            return None;
        }
        let inputs = self.current_inputs()?;

        let [Some(first), Some(second)] = &mut self.slots else {
            return None;
        };
        let (a, b) = (&mut first.fighter, &mut second.fighter);
        let was_down = a.is_dead() || b.is_dead();

        a.face_towards(b.x);
        b.face_towards(a.x);

        let (a_x, b_x) = (a.x, b.x);
        a.update(dt, &inputs[0], b_x);
        b.update(dt, &inputs[1], a_x);

        if !a.is_dead() && !b.is_dead() {
            (a.x, b.x) = separate_bodies(a.x, b.x);
        }

        if HitResolver::is_clash(a, b) {
            HitResolver::apply_clash(a, b);
        } else {
            // Both directions are judged on the same pre-contact state
            let a_on_b = HitResolver::evaluate(a, b);
            let b_on_a = HitResolver::evaluate(b, a);
            if let Some(pending) = a_on_b {
                HitResolver::apply(&pending, a, b);
            }
            if let Some(pending) = b_on_a {
                HitResolver::apply(&pending, b, a);
            }
        }

        let state = SnapshotBuilder::build(self.frame, [&*a, &*b]);
        let knocked_out = !was_down && (a.is_dead() || b.is_dead());

        self.broadcast(SnapshotBuilder::message(state.clone()));

        if knocked_out {
            info!(code = %self.code, frame = self.frame, "Fighter down");
        }

        self.frame += 1;
        self.prune_inputs();
        Some(state)
    }

    /// Drain up to `max_frames` consecutive ready frames
    pub fn tick_ready(&mut self, dt: f32, max_frames: u32) -> u32 {
        let mut advanced = 0;
        while advanced < max_frames.max(1) {
            if self.tick(dt).is_none() {
                break;
            }
            advanced += 1;
        }
        advanced
    }

    fn prune_inputs(&mut self) {
        let cutoff = self.frame.saturating_sub(INPUT_HISTORY_FRAMES);
        self.input_buffer = self.input_buffer.split_off(&cutoff);
    }

    pub fn broadcast(&self, msg: ServerMsg) {
        for slot in self.slots.iter().flatten() {
            slot.participant.send(msg.clone());
        }
    }

    /// Send to one seat only
    pub fn send_to(&self, index: usize, msg: ServerMsg) -> bool {
        match self.slots.get(index).and_then(Option::as_ref) {
            Some(slot) => slot.participant.send(msg),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::fighter::FighterState;

    const DT: f32 = 1.0 / 60.0;

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

    struct Fixture {
        session: MatchSession,
        ids: [ParticipantId; 2],
        rx: [mpsc::Receiver<ServerMsg>; 2],
    }

    fn started() -> Fixture {
        let mut session = MatchSession::new("TEST".into());
        let (p0, rx0) = participant();
        let (p1, rx1) = participant();
        let ids = [p0.id, p1.id];
        assert_eq!(session.add_participant(p0).unwrap(), 0);
        assert_eq!(session.add_participant(p1).unwrap(), 1);
        assert!(session.start());
        let mut rx = [rx0, rx1];
        for r in &mut rx {
            assert_eq!(drain(r), vec![ServerMsg::MatchStart]);
        }
        Fixture { session, ids, rx }
    }

    #[test]
    fn third_participant_is_refused() {
        let mut f = started();
        let (p2, _rx) = participant();
        assert!(matches!(f.session.add_participant(p2), Err(JoinError::Full)));
        let (tx, _rx) = mpsc::channel(1);
        let again = Participant::new(f.ids[0], tx);
        assert!(matches!(
            f.session.add_participant(again),
            Err(JoinError::AlreadyInSession)
        ));
    }

    #[test]
    fn stalls_until_both_inputs_arrive() {
        let mut f = started();
        let idle = InputFrame::default();

        assert_eq!(f.session.submit_input(f.ids[0], 0, idle), InputDisposition::Accepted);
        assert!(f.session.tick(DT).is_none());
        assert_eq!(f.session.frame(), 0);
        assert!(drain(&mut f.rx[0]).is_empty());

        assert_eq!(f.session.submit_input(f.ids[1], 0, idle), InputDisposition::Accepted);
        let state = f.session.tick(DT).expect("both inputs present");
        assert_eq!(state.frame, 0);
        assert_eq!(f.session.frame(), 1);

        for rx in &mut f.rx {
            let msgs = drain(rx);
            assert_eq!(msgs.len(), 1);
            assert!(matches!(&msgs[0], ServerMsg::GameState { state } if state.frame == 0));
        }
    }

    #[test]
    fn does_not_tick_before_start() {
        let mut session = MatchSession::new("WAIT".into());
        let (p0, _rx) = participant();
        let id = p0.id;
        session.add_participant(p0).unwrap();
        assert!(!session.start());
        session.submit_input(id, 0, InputFrame::default());
        assert!(session.tick(DT).is_none());
    }

    #[test]
    fn stale_duplicate_and_far_inputs() {
        let mut f = started();
        let idle = InputFrame::default();
        let right = InputFrame {
            right: true,
            ..Default::default()
        };

        for id in f.ids {
            f.session.submit_input(id, 0, idle);
        }
        f.session.tick(DT).unwrap();

        assert_eq!(f.session.submit_input(f.ids[0], 0, idle), InputDisposition::Stale);
        assert_eq!(f.session.submit_input(f.ids[0], 1, right), InputDisposition::Accepted);
        assert_eq!(f.session.submit_input(f.ids[0], 1, idle), InputDisposition::Duplicate);
        assert_eq!(
            f.session.submit_input(f.ids[0], 1 + MAX_INPUT_LEAD + 1, idle),
            InputDisposition::TooFarAhead
        );
        assert_eq!(
            f.session.submit_input(Uuid::new_v4(), 1, idle),
            InputDisposition::UnknownParticipant
        );

        // First submission wins: the fighter walks right
        let x_before = f.session.fighter(0).unwrap().x;
        f.session.submit_input(f.ids[1], 1, idle);
        f.session.tick(DT).unwrap();
        assert!(f.session.fighter(0).unwrap().x > x_before);
    }

    #[test]
    fn history_is_pruned_behind_current_frame() {
        let mut f = started();
        let idle = InputFrame::default();
        for frame in 0..100 {
            for id in f.ids {
                f.session.submit_input(id, frame, idle);
            }
            f.session.tick(DT).unwrap();
        }
        assert_eq!(f.session.frame(), 100);
        let (oldest, newest) = f.session.buffered_frame_range().unwrap();
        assert_eq!(oldest, 100 - INPUT_HISTORY_FRAMES);
        assert_eq!(newest, 99);
    }

    #[test]
    fn catch_up_is_bounded() {
        let mut f = started();
        let idle = InputFrame::default();
        for frame in 0..10 {
            for id in f.ids {
                f.session.submit_input(id, frame, idle);
            }
        }
        assert_eq!(f.session.tick_ready(DT, 4), 4);
        assert_eq!(f.session.frame(), 4);
        assert_eq!(f.session.tick_ready(DT, 100), 6);
        assert_eq!(f.session.tick_ready(DT, 100), 0);
    }

    #[test]
    fn mirrored_swings_resolve_symmetrically() {
        let mut f = started();
        let idle = InputFrame::default();
        let light = InputFrame {
            light: true,
            ..Default::default()
        };

        // Walk both fighters into range
        let mut frame = 0;
        let walk_in = [
            InputFrame {
                right: true,
                ..Default::default()
            },
            InputFrame {
                left: true,
                ..Default::default()
            },
        ];
        while f.session.fighter(1).unwrap().x - f.session.fighter(0).unwrap().x > 80.0 {
            f.session.submit_input(f.ids[0], frame, walk_in[0]);
            f.session.submit_input(f.ids[1], frame, walk_in[1]);
            f.session.tick(DT).unwrap();
            frame += 1;
        }

        // Swing from both sides on the same frame
        for id in f.ids {
            f.session.submit_input(id, frame, light);
        }
        f.session.tick(DT).unwrap();
        frame += 1;
        for _ in 0..30 {
            for id in f.ids {
                f.session.submit_input(id, frame, idle);
            }
            f.session.tick(DT).unwrap();
            frame += 1;
        }

        let a = f.session.fighter(0).unwrap();
        let b = f.session.fighter(1).unwrap();
        assert_eq!(a.facing, 1);
        assert_eq!(b.facing, -1);
        assert!(b.x - a.x >= crate::game::physics::BODY_WIDTH - 1e-3);
        assert_eq!(a.health, b.health);
    }

    #[test]
    fn disconnect_notifies_and_terminates() {
        let mut f = started();
        let idle = InputFrame::default();
        f.session.submit_input(f.ids[0], 0, idle);
        f.session.submit_input(f.ids[1], 0, idle);

        assert_eq!(f.session.remove_participant(f.ids[1]), Some(1));
        assert!(f.session.is_terminated());
        assert!(!f.session.has_input(0, f.ids[1]));
        assert_eq!(drain(&mut f.rx[0]), vec![ServerMsg::OpponentDisconnected]);

        assert!(f.session.tick(DT).is_none());
        assert_eq!(
            f.session.submit_input(f.ids[1], 0, idle),
            InputDisposition::UnknownParticipant
        );

        let (late, _rx) = participant();
        assert!(matches!(
            f.session.add_participant(late),
            Err(JoinError::NotFound)
        ));

        assert_eq!(f.session.remove_participant(f.ids[0]), Some(0));
        assert!(f.session.is_empty());
    }

    #[test]
    fn lone_creator_leaving_empties_session() {
        let mut session = MatchSession::new("SOLO".into());
        let (p0, _rx) = participant();
        let id = p0.id;
        session.add_participant(p0).unwrap();
        session.remove_participant(id);
        assert!(session.is_empty());
        assert!(!session.is_terminated());
        assert_eq!(session.fighter(0).map(|f| f.state), None::<FighterState>);

        // Once closed, a stale handle can no longer seat anyone
        assert!(session.close_if_empty());
        let (late, _late_rx) = participant();
        assert_eq!(session.add_participant(late), Err(JoinError::NotFound));
    }
}
