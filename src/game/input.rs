//! Per-frame player intents

use serde::{Deserialize, Serialize};

/// One tick's worth of boolean intents, sampled once per authoritative frame.
///
/// Missing fields deserialize as `false` so older clients that omit a
/// button still produce a valid frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputFrame {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub light: bool,
    pub heavy: bool,
    pub block: bool,
    pub dash: bool,
}

impl InputFrame {
    /// Horizontal axis: -1 for left, 1 for right, 0 when neither or both are held
    pub fn horizontal(&self) -> f32 {
        match (self.left, self.right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }

    /// Whether a direction pointing along `facing` is held
    pub fn holds_toward(&self, facing: f32) -> bool {
        let axis = self.horizontal();
        axis != 0.0 && axis.signum() == facing.signum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposing_directions_cancel() {
        let input = InputFrame {
            left: true,
            right: true,
            ..Default::default()
        };
        assert_eq!(input.horizontal(), 0.0);
        assert!(!input.holds_toward(1.0));
    }

    #[test]
    fn partial_json_fills_missing_buttons() {
        let input: InputFrame = serde_json::from_str(r#"{"right":true,"light":true}"#).unwrap();
        assert!(input.right && input.light);
        assert!(!input.dash && !input.block);
        assert!(input.holds_toward(1.0));
    }
}
