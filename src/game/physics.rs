//! Stage geometry - hurtboxes, hitboxes and movement constraints
//!
//! The stage is a single ground plane. `x` runs left to right, `y` is height
//! above the ground. Bodies are split into three stacked height bands, one per
//! [`Stance`], each checked as its own rectangle.

use super::fighter::Stance;

/// Stage width; fighters are kept fully inside it
pub const STAGE_WIDTH: f32 = 800.0;
/// Hurtbox width, centred on the fighter's x
pub const BODY_WIDTH: f32 = 50.0;
/// Height of each of the three hurtbox bands
pub const BAND_HEIGHT: f32 = 50.0;
/// Attack hitbox thickness within its band
pub const HITBOX_HEIGHT: f32 = 20.0;

/// Spawn x per slot
pub const SPAWN_X: [f32; 2] = [100.0, 500.0];
/// Spawn facing per slot
pub const SPAWN_FACING: [i8; 2] = [1, -1];

/// Axis-aligned rectangle (min corner + size)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from two x edges in any order
    pub fn spanning(x_a: f32, x_b: f32, y: f32, height: f32) -> Self {
        Self::new(x_a.min(x_b), y, (x_a - x_b).abs(), height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    /// Strict overlap; touching edges do not count
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.top()
            && other.y < self.top()
    }
}

/// Bottom edge of a height band
fn band_floor(band: Stance) -> f32 {
    match band {
        Stance::Low => 0.0,
        Stance::Mid => BAND_HEIGHT,
        Stance::High => BAND_HEIGHT * 2.0,
    }
}

/// Which height bands a fighter leaves exposed in a given stance.
///
/// Crouching (low) tucks the body under the mid and high lines, a high
/// stance lifts clear of sweeps, mid stands square and exposes everything.
pub fn exposes(stance: Stance, band: Stance) -> bool {
    match stance {
        Stance::Mid => true,
        Stance::Low => band == Stance::Low,
        Stance::High => band != Stance::Low,
    }
}

/// Hurtbox rectangle for one band, or `None` when the stance hides it
pub fn hurtbox(x: f32, stance: Stance, band: Stance) -> Option<Rect> {
    if !exposes(stance, band) {
        return None;
    }
    Some(Rect::new(
        x - BODY_WIDTH / 2.0,
        band_floor(band),
        BODY_WIDTH,
        BAND_HEIGHT,
    ))
}

/// Attack hitbox projecting `reach` in front of the body, centred in its band
pub fn attack_hitbox(x: f32, facing: f32, band: Stance, reach: f32) -> Rect {
    let near = x + facing * (BODY_WIDTH / 2.0);
    let far = near + facing * reach;
    let y = band_floor(band) + (BAND_HEIGHT - HITBOX_HEIGHT) / 2.0;
    Rect::spanning(near, far, y, HITBOX_HEIGHT)
}

/// Keep a body fully on stage
pub fn clamp_to_stage(x: f32) -> f32 {
    x.clamp(BODY_WIDTH / 2.0, STAGE_WIDTH - BODY_WIDTH / 2.0)
}

/// Push two overlapping bodies apart by half the overlap each.
/// Returns the corrected positions.
pub fn separate_bodies(x1: f32, x2: f32) -> (f32, f32) {
    let dx = x2 - x1;
    let dist = dx.abs();

    if dist < 0.001 {
        // Same spot, push apart arbitrarily
        return (
            clamp_to_stage(x1 - BODY_WIDTH / 2.0),
            clamp_to_stage(x2 + BODY_WIDTH / 2.0),
        );
    }

    let overlap = BODY_WIDTH - dist;
    if overlap <= 0.0 {
        return (x1, x2);
    }

    let push = overlap / 2.0 * dx.signum();
    (clamp_to_stage(x1 - push), clamp_to_stage(x2 + push))
}
