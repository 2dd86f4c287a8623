//! Remote fighter smoothing

/// Fraction of the remaining distance covered per render frame
pub const DEFAULT_SMOOTHING: f32 = 0.2;
/// Distance under which the displayed position snaps onto the target
pub const DEFAULT_SNAP_EPSILON: f32 = 0.5;

/// Exponential approach of a displayed x toward the latest server x
#[derive(Debug, Clone)]
pub struct RemoteInterpolator {
    smoothing: f32,
    snap_epsilon: f32,
    displayed: Option<f32>,
    target: Option<f32>,
}

impl RemoteInterpolator {
    pub fn new(smoothing: f32, snap_epsilon: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 1.0),
            snap_epsilon: snap_epsilon.max(0.0),
            displayed: None,
            target: None,
        }
    }

    /// Point smoothing at a new server position. The very first target is
    /// adopted directly so the fighter does not slide in from nowhere.
    pub fn set_target(&mut self, x: f32) {
        self.target = Some(x);
        if self.displayed.is_none() {
            self.displayed = Some(x);
        }
    }

    /// Advance one render frame and return the position to draw
    pub fn step(&mut self) -> Option<f32> {
        let target = self.target?;
        let current = self.displayed.unwrap_or(target);

        let remaining = target - current;
        let next = if remaining.abs() <= self.snap_epsilon {
            target
        } else {
            current + remaining * self.smoothing
        };
        self.displayed = Some(next);
        Some(next)
    }

    pub fn position(&self) -> Option<f32> {
        self.displayed
    }

    pub fn target(&self) -> Option<f32> {
        self.target
    }

    /// Forget both the target and the displayed position
    pub fn clear(&mut self) {
        self.displayed = None;
        self.target = None;
    }
}

impl Default for RemoteInterpolator {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING, DEFAULT_SNAP_EPSILON)
    }
}
