//! Client prediction, remote interpolation and reconciliation
//!
//! The local fighter is simulated every fixed sub-step from local input and
//! never waits on the network. The remote fighter is never simulated: its
//! discrete fields are copied from each snapshot and only its position is
//! smoothed toward the latest server value.
//!
//! Snapshots trail the prediction by the round trip, so each one is checked
//! against what was predicted for that same frame. Only the difference is
//! carried onto the live fighter.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::game::fighter::{Fighter, FighterState, MAX_HEALTH, MAX_STAMINA};
use crate::game::input::InputFrame;
use crate::game::physics::{SPAWN_FACING, SPAWN_X};
use crate::util::time::tick_delta;
use crate::ws::protocol::{FighterSnapshot, GameState};

use super::connection::{ClientError, NetClient, NetEvent};
use super::interpolation::{RemoteInterpolator, DEFAULT_SMOOTHING, DEFAULT_SNAP_EPSILON};

/// Predicted frames kept for comparison against late snapshots
pub const PREDICTION_HISTORY: usize = 60;
/// Health and stamina differences below this count as agreement
const RESOURCE_EPSILON: f32 = 1e-3;

/// Tunables for the client sync layer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Predicted vs authoritative distance above which the local fighter snaps
    pub correction_threshold: f32,
    pub smoothing: f32,
    pub snap_epsilon: f32,
    /// Sub-steps allowed per render frame before backlog is dropped
    pub max_substeps: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            correction_threshold: 50.0,
            smoothing: DEFAULT_SMOOTHING,
            snap_epsilon: DEFAULT_SNAP_EPSILON,
            max_substeps: 5,
        }
    }
}

/// Fixed-step accumulator driven by variable render time
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: f32,
    accumulator: f32,
    max_substeps: u32,
}

impl FixedTimestep {
    pub fn new(step: f32, max_substeps: u32) -> Self {
        Self {
            step,
            accumulator: 0.0,
            max_substeps: max_substeps.max(1),
        }
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    /// Add elapsed render time and return how many sub-steps to run.
    /// Backlog beyond the cap is discarded rather than carried forward.
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        self.accumulator += elapsed.max(0.0);

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_substeps {
            self.accumulator -= self.step;
            steps += 1;
        }
        if self.accumulator >= self.step {
            self.accumulator %= self.step;
        }
        steps
    }

    /// Leftover fraction of a step, for render blending
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.step
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// How a snapshot was folded into the local prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Within threshold; predicted position kept
    Kept { error: f32 },
    /// Beyond threshold; snapped to the server position
    Corrected { error: f32 },
}

/// Local fighter fields as predicted at the end of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
struct PredictedFrame {
    frame: u64,
    x: f32,
    health: f32,
    stamina: f32,
    state: FighterState,
}

impl PredictedFrame {
    fn capture(frame: u64, fighter: &Fighter) -> Self {
        Self {
            frame,
            x: fighter.x,
            health: fighter.health,
            stamina: fighter.stamina,
            state: fighter.state,
        }
    }
}

/// Client-side view of one match
#[derive(Debug)]
pub struct NetSync {
    config: SyncConfig,
    local_index: usize,
    frame: u64,
    local: Fighter,
    history: VecDeque<PredictedFrame>,
    remote: FighterSnapshot,
    interpolator: RemoteInterpolator,
    timestep: FixedTimestep,
    last_server_frame: Option<u64>,
    active: bool,
}

impl NetSync {
    /// Start syncing as `local_index` (0 or 1) from spawn positions
    pub fn new(local_index: usize, config: SyncConfig) -> Self {
        let local_index = local_index.min(1);
        let remote_index = 1 - local_index;

        let local = Fighter::new(SPAWN_X[local_index], SPAWN_FACING[local_index]);
        let remote = Fighter::new(SPAWN_X[remote_index], SPAWN_FACING[remote_index]).snapshot();

        let mut interpolator = RemoteInterpolator::new(config.smoothing, config.snap_epsilon);
        interpolator.set_target(remote.x);

        Self {
            timestep: FixedTimestep::new(tick_delta(), config.max_substeps),
            config,
            local_index,
            frame: 0,
            local,
            history: VecDeque::with_capacity(PREDICTION_HISTORY),
            remote,
            interpolator,
            last_server_frame: None,
            active: true,
        }
    }

    /// Next frame number to be predicted and sent
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn local_index(&self) -> usize {
        self.local_index
    }

    pub fn local(&self) -> &Fighter {
        &self.local
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_server_frame(&self) -> Option<u64> {
        self.last_server_frame
    }

    /// Remote fighter as it should be drawn, or `None` once the opponent is gone
    pub fn remote_view(&self) -> Option<FighterSnapshot> {
        let x = self.interpolator.position()?;
        Some(FighterSnapshot {
            x,
            ..self.remote.clone()
        })
    }

    fn remote_x(&self) -> f32 {
        self.interpolator.position().unwrap_or(self.remote.x)
    }

    /// One fixed sub-step: send this frame's input, then predict locally
    pub fn step(&mut self, input: InputFrame, client: &NetClient) {
        if !self.active {
            return;
        }

        match client.send_input(self.frame, input) {
            Ok(()) => {}
            Err(ClientError::MatchNotStarted) => {}
            Err(e) => debug!(frame = self.frame, error = %e, "Input not sent"),
        }

        let opponent_x = self.remote_x();
        self.local.face_towards(opponent_x);
        self.local.update(self.timestep.step(), &input, opponent_x);

        self.history
            .push_back(PredictedFrame::capture(self.frame, &self.local));
        while self.history.len() > PREDICTION_HISTORY {
            self.history.pop_front();
        }
        self.frame += 1;
    }

    /// Fold an authoritative snapshot in. Older or repeated frames and
    /// anything after the match ended are ignored, as is the local side of a
    /// snapshot older than the kept prediction history.
    pub fn apply_snapshot(&mut self, state: &GameState) -> Option<Reconciliation> {
        if !self.active {
            return None;
        }
        if self.last_server_frame.is_some_and(|last| state.frame <= last) {
            return None;
        }
        self.last_server_frame = Some(state.frame);

        // Remote: discrete fields immediately, position as a target
        self.remote = state.players[1 - self.local_index].clone();
        self.interpolator.set_target(self.remote.x);

        while self.history.front().is_some_and(|p| p.frame < state.frame) {
            self.history.pop_front();
        }
        let predicted = if state.frame >= self.frame {
            // Server caught up with or passed the prediction
            PredictedFrame::capture(state.frame, &self.local)
        } else {
            match self.history.front() {
                Some(p) if p.frame == state.frame => *p,
                _ => {
                    debug!(frame = state.frame, "Snapshot older than prediction history");
                    return None;
                }
            }
        };

        let authoritative = &state.players[self.local_index];
        let offset = authoritative.x - predicted.x;
        let error = offset.abs();
        let outcome = if error > self.config.correction_threshold {
            debug!(frame = state.frame, error, "Snapping local fighter to server");
            self.local.x += offset;
            for later in self.history.iter_mut().filter(|p| p.frame > state.frame) {
                later.x += offset;
            }
            Reconciliation::Corrected { error }
        } else {
            Reconciliation::Kept { error }
        };

        self.reconcile_discrete(&predicted, authoritative);
        Some(outcome)
    }

    /// Carry any health, stamina or state disagreement at `predicted.frame`
    /// onto the live fighter and the frames predicted after it
    fn reconcile_discrete(&mut self, predicted: &PredictedFrame, authoritative: &FighterSnapshot) {
        let health_offset = authoritative.health - predicted.health;
        let stamina_offset = authoritative.stamina - predicted.stamina;
        let state_differs = authoritative.state != predicted.state;
        if health_offset.abs() <= RESOURCE_EPSILON
            && stamina_offset.abs() <= RESOURCE_EPSILON
            && !state_differs
        {
            return;
        }

        debug!(
            frame = predicted.frame,
            health_offset,
            stamina_offset,
            predicted = ?predicted.state,
            server = ?authoritative.state,
            "Local prediction diverged"
        );

        let state = if state_differs {
            authoritative.state
        } else {
            self.local.state
        };
        self.local.adopt_discrete(
            self.local.health + health_offset,
            self.local.stamina + stamina_offset,
            state,
        );

        for later in self.history.iter_mut().filter(|p| p.frame > predicted.frame) {
            later.health = (later.health + health_offset).clamp(0.0, MAX_HEALTH);
            later.stamina = (later.stamina + stamina_offset).clamp(0.0, MAX_STAMINA);
            if state_differs {
                later.state = authoritative.state;
            }
        }
    }

    /// React to one network event
    pub fn handle_event(&mut self, event: &NetEvent) -> Option<Reconciliation> {
        match event {
            NetEvent::State(state) => self.apply_snapshot(state),
            NetEvent::OpponentDisconnected => {
                self.stop();
                None
            }
            _ => None,
        }
    }

    /// Stop predicting and sending, and drop the remote fighter from view
    pub fn stop(&mut self) {
        if self.active {
            info!(frame = self.frame, "Sync stopped");
        }
        self.active = false;
        self.history.clear();
        self.interpolator.clear();
        self.timestep.reset();
    }

    /// Advance the remote smoothing by one render frame
    pub fn render_frame(&mut self) -> Option<f32> {
        self.interpolator.step()
    }

    /// One pass of the client loop: drain network events, run the sub-steps
    /// owed for `elapsed` seconds, then advance smoothing. Returns the
    /// number of sub-steps run.
    pub fn frame_update(&mut self, elapsed: f32, input: InputFrame, client: &mut NetClient) -> u32 {
        while let Some(event) = client.poll_event() {
            self.handle_event(&event);
        }

        if !self.active {
            return 0;
        }

        let steps = self.timestep.advance(elapsed);
        for _ in 0..steps {
            self.step(input, client);
        }
        self.render_frame();
        steps
    }
}
