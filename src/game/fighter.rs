//! Fighter state machine - movement, stance, attacks, blocking, resources

use serde::{Deserialize, Serialize};

use super::input::InputFrame;
use super::physics::{self, Rect};

/// Health every fighter starts with
pub const MAX_HEALTH: f32 = 20.0;
/// Stamina ceiling
pub const MAX_STAMINA: f32 = 40.0;
/// Stamina regained per second while alive
pub const STAMINA_REGEN_PER_SEC: f32 = 8.0;
/// Walking speed (units per second)
pub const WALK_SPEED: f32 = 200.0;

pub const FORWARD_DASH_SPEED: f32 = 600.0;
pub const FORWARD_DASH_DURATION: f32 = 0.15;
pub const BACK_DASH_SPEED: f32 = 300.0;
pub const BACK_DASH_DURATION: f32 = 0.25;
pub const DASH_COOLDOWN: f32 = 0.5;
/// Stamina spent to cancel attack recovery into a dash
pub const DASH_CANCEL_COST: f32 = 10.0;

pub const BLOCK_COST: f32 = 5.0;
pub const BLOCK_DURATION: f32 = 0.3;
/// Perfect sub-window, measured from the start of the block
pub const PERFECT_BLOCK_WINDOW: f32 = 0.1;
/// Delay after a block ends before another may start
pub const BLOCK_COOLDOWN: f32 = 0.2;
pub const PERFECT_BLOCK_REFUND: f32 = 5.0;

pub const GUARD_BREAK_STUN: f32 = 0.8;
pub const CHIP_HITSTUN: f32 = 0.05;
pub const CHIP_HITSTOP: f32 = 0.05;
pub const HIT_HITSTOP: f32 = 0.06;
pub const PERFECT_BLOCK_HITSTOP: f32 = 0.08;

pub const CLASH_HITSTOP: f32 = 0.1;
pub const CLASH_STAMINA_PENALTY: f32 = 5.0;
/// Distance each fighter is shoved on a clash
pub const CLASH_PUSH: f32 = 30.0;

/// Knockback velocity lost per second
pub const KNOCKBACK_DECEL: f32 = 1200.0;

/// Hits landed within this window of each other build a combo
pub const COMBO_WINDOW: f32 = 0.6;
pub const COMBO_STEP_BONUS: f32 = 0.1;
pub const COMBO_MAX_BONUS: f32 = 0.5;

/// Fighter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FighterState {
    Idle,
    Dash,
    Attack,
    Block,
    Stunned,
    Hit,
    /// Terminal
    Dead,
}

/// Vertical guard/attack level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Low,
    #[default]
    Mid,
    High,
}

impl Stance {
    /// Up wins over down; neither held means mid
    pub fn from_input(input: &InputFrame) -> Self {
        if input.up {
            Stance::High
        } else if input.down {
            Stance::Low
        } else {
            Stance::Mid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackKind {
    Light,
    Heavy,
}

/// Frame data and payoff for an attack type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackStats {
    pub damage: f32,
    pub stamina_cost: f32,
    pub startup: f32,
    pub active: f32,
    pub recovery: f32,
    /// Time before the next attack may start, counted from attack start
    pub cooldown: f32,
    pub hitstun: f32,
    pub knockback: f32,
    /// Horizontal hitbox length in front of the body
    pub reach: f32,
}

impl AttackKind {
    pub fn stats(self) -> AttackStats {
        match self {
            AttackKind::Light => AttackStats {
                damage: 10.0,
                stamina_cost: 10.0,
                startup: 0.12,
                active: 0.12,
                recovery: 0.1,
                cooldown: 0.35,
                hitstun: 0.15,
                knockback: 200.0,
                reach: 40.0,
            },
            AttackKind::Heavy => AttackStats {
                damage: 20.0,
                stamina_cost: 20.0,
                startup: 0.18,
                active: 0.18,
                recovery: 0.25,
                cooldown: 0.6,
                hitstun: 0.25,
                knockback: 450.0,
                reach: 60.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackPhase {
    Startup,
    Active,
    Recovery,
}

/// The single in-flight attack a fighter may own
#[derive(Debug, Clone, PartialEq)]
pub struct AttackDescriptor {
    pub id: u32,
    pub kind: AttackKind,
    /// Stance locked in when the attack started
    pub stance: Stance,
    pub phase: AttackPhase,
    /// Time left in the current phase
    pub timer: f32,
    has_hit: bool,
}

impl AttackDescriptor {
    fn new(id: u32, kind: AttackKind, stance: Stance) -> Self {
        Self {
            id,
            kind,
            stance,
            phase: AttackPhase::Startup,
            timer: kind.stats().startup,
            has_hit: false,
        }
    }

    pub fn has_hit(&self) -> bool {
        self.has_hit
    }

    /// Latches the hit flag. Returns false if it was already latched or the
    /// hitbox is not live.
    pub fn latch_hit(&mut self) -> bool {
        if self.has_hit || self.phase != AttackPhase::Active {
            return false;
        }
        self.has_hit = true;
        true
    }

    /// Whether this attack can still deal damage this tick
    pub fn is_live(&self) -> bool {
        self.phase == AttackPhase::Active && !self.has_hit
    }

    /// Lights always cancel; heavies only once they connected
    pub fn cancel_eligible(&self) -> bool {
        self.kind == AttackKind::Light || self.has_hit
    }
}

/// Authoritative combat state for one participant
#[derive(Debug, Clone)]
pub struct Fighter {
    pub x: f32,
    /// +1 facing right, -1 facing left
    pub facing: i8,
    pub state: FighterState,
    pub stance: Stance,
    pub health: f32,
    pub stamina: f32,
    pub current_attack: Option<AttackDescriptor>,

    knockback_velocity: f32,
    attack_cooldown: f32,
    hitstun: f32,
    hitstop: f32,
    stun_timer: f32,
    block_timer: f32,
    block_cooldown: f32,
    perfect_block_remaining: f32,
    dash_timer: f32,
    dash_cooldown: f32,
    dash_direction: f32,
    dash_speed: f32,
    combo: u32,
    combo_timer: f32,
    next_attack_id: u32,
}

impl Fighter {
    pub fn new(x: f32, facing: i8) -> Self {
        Self {
            x,
            facing: if facing < 0 { -1 } else { 1 },
            state: FighterState::Idle,
            stance: Stance::Mid,
            health: MAX_HEALTH,
            stamina: MAX_STAMINA,
            current_attack: None,
            knockback_velocity: 0.0,
            attack_cooldown: 0.0,
            hitstun: 0.0,
            hitstop: 0.0,
            stun_timer: 0.0,
            block_timer: 0.0,
            block_cooldown: 0.0,
            perfect_block_remaining: 0.0,
            dash_timer: 0.0,
            dash_cooldown: 0.0,
            dash_direction: 0.0,
            dash_speed: 0.0,
            combo: 0,
            combo_timer: 0.0,
            next_attack_id: 0,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.state == FighterState::Dead
    }

    pub fn facing_sign(&self) -> f32 {
        f32::from(self.facing)
    }

    pub fn hitstun(&self) -> f32 {
        self.hitstun
    }

    pub fn hitstop(&self) -> f32 {
        self.hitstop
    }

    pub fn stun_timer(&self) -> f32 {
        self.stun_timer
    }

    pub fn knockback_velocity(&self) -> f32 {
        self.knockback_velocity
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn perfect_block_open(&self) -> bool {
        self.state == FighterState::Block && self.perfect_block_remaining > 0.0
    }

    /// Hurtbox region at the given height band, if exposed in the current stance
    pub fn hurtbox(&self, region: Stance) -> Option<Rect> {
        if self.is_dead() {
            return None;
        }
        physics::hurtbox(self.x, self.stance, region)
    }

    /// Live attack hitbox; only present during the active phase
    pub fn attack_hitbox(&self) -> Option<Rect> {
        let attack = self.current_attack.as_ref()?;
        if attack.phase != AttackPhase::Active || self.is_dead() {
            return None;
        }
        Some(physics::attack_hitbox(
            self.x,
            self.facing_sign(),
            attack.stance,
            attack.kind.stats().reach,
        ))
    }

    /// Turn toward the opponent unless the current action commits a direction
    pub fn face_towards(&mut self, opponent_x: f32) {
        if matches!(
            self.state,
            FighterState::Dash | FighterState::Attack | FighterState::Dead
        ) {
            return;
        }
        if opponent_x > self.x {
            self.facing = 1;
        } else if opponent_x < self.x {
            self.facing = -1;
        }
    }

    /// Advance one fixed step
    pub fn update(&mut self, dt: f32, input: &InputFrame, opponent_x: f32) {
        if self.is_dead() {
            return;
        }

        // Freeze frame: nothing else moves
        if self.hitstop > 0.0 {
            self.hitstop = (self.hitstop - dt).max(0.0);
            return;
        }

        self.tick_timers(dt);
        self.stance = Stance::from_input(input);
        self.apply_knockback(dt);

        if self.state == FighterState::Stunned {
            if self.stun_timer <= 0.0 {
                self.state = FighterState::Idle;
            }
            self.x = physics::clamp_to_stage(self.x);
            return;
        }

        if self.hitstun > 0.0 {
            self.x = physics::clamp_to_stage(self.x);
            return;
        }

        match self.state {
            FighterState::Idle => {
                self.handle_movement(dt, input);
                if !self.try_dash(input, opponent_x) && !self.try_attack(input) {
                    self.try_block(input);
                }
            }
            FighterState::Dash => {
                self.x += self.dash_direction * self.dash_speed * dt;
                if self.dash_timer <= 0.0 {
                    self.state = FighterState::Idle;
                }
            }
            FighterState::Attack => self.update_attack(dt, input, opponent_x),
            FighterState::Block => {
                if self.block_timer <= 0.0 {
                    self.end_block();
                }
            }
            FighterState::Hit => {
                self.state = FighterState::Idle;
                self.knockback_velocity = 0.0;
            }
            FighterState::Stunned | FighterState::Dead => {}
        }

        self.x = physics::clamp_to_stage(self.x);
    }

    fn tick_timers(&mut self, dt: f32) {
        self.attack_cooldown = (self.attack_cooldown - dt).max(0.0);
        self.hitstun = (self.hitstun - dt).max(0.0);
        self.stun_timer = (self.stun_timer - dt).max(0.0);
        self.block_timer = (self.block_timer - dt).max(0.0);
        self.block_cooldown = (self.block_cooldown - dt).max(0.0);
        self.perfect_block_remaining = (self.perfect_block_remaining - dt).max(0.0);
        self.dash_timer = (self.dash_timer - dt).max(0.0);
        self.dash_cooldown = (self.dash_cooldown - dt).max(0.0);

        self.combo_timer = (self.combo_timer - dt).max(0.0);
        if self.combo_timer <= 0.0 {
            self.combo = 0;
        }

        self.stamina = (self.stamina + STAMINA_REGEN_PER_SEC * dt).min(MAX_STAMINA);
    }

    fn apply_knockback(&mut self, dt: f32) {
        if self.knockback_velocity == 0.0 {
            return;
        }
        self.x += self.knockback_velocity * dt;
        let slowed = self.knockback_velocity.abs() - KNOCKBACK_DECEL * dt;
        self.knockback_velocity = if slowed > 0.0 {
            slowed * self.knockback_velocity.signum()
        } else {
            0.0
        };
    }

    fn handle_movement(&mut self, dt: f32, input: &InputFrame) {
        let axis = input.horizontal();
        if axis != 0.0 {
            self.x += axis * WALK_SPEED * dt;
            self.facing = if axis < 0.0 { -1 } else { 1 };
        }
    }

    // ================= DASH =================

    fn try_dash(&mut self, input: &InputFrame, opponent_x: f32) -> bool {
        if !input.dash || self.dash_cooldown > 0.0 {
            return false;
        }
        self.start_dash(input, opponent_x);
        true
    }

    fn start_dash(&mut self, input: &InputFrame, opponent_x: f32) {
        let toward = if opponent_x > self.x {
            1.0
        } else if opponent_x < self.x {
            -1.0
        } else {
            self.facing_sign()
        };

        // Holding toward the opponent closes distance; anything else escapes
        let (direction, speed, duration) = if input.holds_toward(toward) {
            (toward, FORWARD_DASH_SPEED, FORWARD_DASH_DURATION)
        } else {
            (-toward, BACK_DASH_SPEED, BACK_DASH_DURATION)
        };

        self.state = FighterState::Dash;
        self.dash_direction = direction;
        self.dash_speed = speed;
        self.dash_timer = duration;
        self.dash_cooldown = DASH_COOLDOWN;
    }

    // ================= ATTACK =================

    fn try_attack(&mut self, input: &InputFrame) -> bool {
        if self.attack_cooldown > 0.0 {
            return false;
        }
        if input.light {
            self.begin_attack(AttackKind::Light)
        } else if input.heavy {
            self.begin_attack(AttackKind::Heavy)
        } else {
            false
        }
    }

    fn begin_attack(&mut self, kind: AttackKind) -> bool {
        let stats = kind.stats();
        if self.stamina < stats.stamina_cost {
            return false;
        }

        self.stamina -= stats.stamina_cost;
        self.state = FighterState::Attack;
        self.attack_cooldown = stats.cooldown;
        self.next_attack_id = self.next_attack_id.wrapping_add(1);
        self.current_attack = Some(AttackDescriptor::new(self.next_attack_id, kind, self.stance));
        true
    }

    fn update_attack(&mut self, dt: f32, input: &InputFrame, opponent_x: f32) {
        let Some(attack) = self.current_attack.as_ref() else {
            self.state = FighterState::Idle;
            return;
        };

        let can_cancel = attack.phase == AttackPhase::Recovery
            && attack.cancel_eligible()
            && input.dash
            && self.dash_cooldown <= 0.0
            && self.stamina >= DASH_CANCEL_COST;
        if can_cancel {
            self.stamina -= DASH_CANCEL_COST;
            self.current_attack = None;
            self.start_dash(input, opponent_x);
            return;
        }

        let Some(attack) = self.current_attack.as_mut() else {
            return;
        };
        attack.timer -= dt;
        if attack.timer > 0.0 {
            return;
        }

        let stats = attack.kind.stats();
        match attack.phase {
            AttackPhase::Startup => {
                attack.phase = AttackPhase::Active;
                attack.timer = stats.active;
            }
            AttackPhase::Active => {
                attack.phase = AttackPhase::Recovery;
                attack.timer = stats.recovery;
            }
            AttackPhase::Recovery => {
                self.current_attack = None;
                self.state = FighterState::Idle;
            }
        }
    }

    // ================= BLOCK =================

    fn try_block(&mut self, input: &InputFrame) -> bool {
        if !input.block || self.block_cooldown > 0.0 || self.stamina < BLOCK_COST {
            return false;
        }

        self.stamina -= BLOCK_COST;
        self.state = FighterState::Block;
        self.block_timer = BLOCK_DURATION;
        self.perfect_block_remaining = PERFECT_BLOCK_WINDOW;
        self.block_cooldown = BLOCK_DURATION + BLOCK_COOLDOWN;
        true
    }

    fn end_block(&mut self) {
        self.state = FighterState::Idle;
        self.block_timer = 0.0;
        self.perfect_block_remaining = 0.0;
    }

    // ================= HIT REACTIONS =================

    /// Extend the freeze, never shorten it
    pub(crate) fn apply_hitstop(&mut self, duration: f32) {
        self.hitstop = self.hitstop.max(duration);
    }

    /// Latch the given attack as having connected
    pub(crate) fn latch_attack(&mut self, attack_id: u32) -> bool {
        match self.current_attack.as_mut() {
            Some(attack) if attack.id == attack_id => attack.latch_hit(),
            _ => false,
        }
    }

    /// Count a landed hit and return the damage multiplier for it
    pub(crate) fn register_combo_hit(&mut self) -> f32 {
        self.combo += 1;
        self.combo_timer = COMBO_WINDOW;
        let steps = self.combo.saturating_sub(1) as f32;
        1.0 + (steps * COMBO_STEP_BONUS).min(COMBO_MAX_BONUS)
    }

    pub(crate) fn take_hit(&mut self, damage: f32, hitstun: f32, knockback_velocity: f32) {
        if self.is_dead() {
            return;
        }

        self.health = (self.health - damage).max(0.0);
        if self.health <= 0.0 {
            self.die();
            return;
        }

        self.state = FighterState::Hit;
        self.current_attack = None;
        self.block_timer = 0.0;
        self.perfect_block_remaining = 0.0;
        self.dash_timer = 0.0;
        self.hitstun = hitstun;
        self.knockback_velocity = knockback_velocity;
        self.apply_hitstop(HIT_HITSTOP);
    }

    pub(crate) fn perfect_block(&mut self) {
        self.stamina = (self.stamina + PERFECT_BLOCK_REFUND).min(MAX_STAMINA);
        self.apply_hitstop(PERFECT_BLOCK_HITSTOP);
    }

    pub(crate) fn chip_block(&mut self) {
        self.hitstun = self.hitstun.max(CHIP_HITSTUN);
        self.apply_hitstop(CHIP_HITSTOP);
    }

    pub(crate) fn guard_break(&mut self) {
        self.state = FighterState::Stunned;
        self.stun_timer = GUARD_BREAK_STUN;
        self.block_timer = 0.0;
        self.perfect_block_remaining = 0.0;
        self.hitstun = 0.0;
        self.apply_hitstop(HIT_HITSTOP);
    }

    /// Cancel the in-flight attack after a clash and shove along `push_direction`
    pub(crate) fn clash_recoil(&mut self, push_direction: f32) {
        self.current_attack = None;
        self.state = FighterState::Idle;
        self.x = physics::clamp_to_stage(self.x + push_direction * CLASH_PUSH);
        self.stamina = (self.stamina - CLASH_STAMINA_PENALTY).max(0.0);
        self.apply_hitstop(CLASH_HITSTOP);
    }

    fn die(&mut self) {
        self.state = FighterState::Dead;
        self.health = 0.0;
        self.current_attack = None;
        self.knockback_velocity = 0.0;
        self.hitstun = 0.0;
        self.hitstop = 0.0;
        self.stun_timer = 0.0;
        self.block_timer = 0.0;
        self.perfect_block_remaining = 0.0;
        self.dash_timer = 0.0;
    }

    /// Overwrite the discrete fields with authoritative values, keeping the
    /// predicted position and timers. An `Attack` state is only taken on
    /// together with a predicted attack; a snapshot carries no frame data
    /// to run one from.
    pub fn adopt_discrete(&mut self, health: f32, stamina: f32, state: FighterState) {
        self.health = health.clamp(0.0, MAX_HEALTH);
        self.stamina = stamina.clamp(0.0, MAX_STAMINA);

        if state == FighterState::Dead {
            self.die();
            return;
        }
        if self.state == state {
            return;
        }
        if state == FighterState::Attack {
            if self.current_attack.is_some() {
                self.state = state;
            }
            return;
        }
        self.state = state;
        self.current_attack = None;
    }
}
