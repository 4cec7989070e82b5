//! UI volume level to native gain.
//!
//! `gain = min + (max - min) * (level / 100) ^ k`. The exponent below one
//! lifts the quiet end of the slider, which is how loudness is perceived.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::output::GainControl;

pub const DEFAULT_EXPONENT: f32 = 0.7;
pub const MAX_LEVEL: u8 = 100;

/// Map a 0-100 level onto `[min, max]`. Levels above 100 clamp.
pub fn gain_for_level(level: u8, min: f32, max: f32, exponent: f32) -> f32 {
    let fraction = level.min(MAX_LEVEL) as f32 / MAX_LEVEL as f32;
    min + (max - min) * fraction.powf(exponent)
}

/// Holds the level and pushes it to whichever gain control is attached.
///
/// Shared by `Arc` so any thread can change the volume. The level is an
/// atomic; the attached control sits behind a lock held only long enough to
/// swap or clone the pointer.
#[derive(Debug)]
pub struct VolumeController {
    level: AtomicU8,
    exponent: f32,
    control: RwLock<Option<Arc<GainControl>>>,
}

impl VolumeController {
    pub fn new(initial_level: u8, exponent: f32) -> Self {
        Self {
            level: AtomicU8::new(initial_level.min(MAX_LEVEL)),
            exponent,
            control: RwLock::new(None),
        }
    }

    pub fn level(&self) -> u8 {
        self.level.load(Ordering::SeqCst)
    }

    /// Store `level` and apply it. Silent when no control is attached.
    pub fn set_level(&self, level: u8) {
        self.level.store(level.min(MAX_LEVEL), Ordering::SeqCst);
        self.apply();
    }

    /// Point at a newly opened line's control and apply the current level.
    pub fn attach(&self, control: Option<Arc<GainControl>>) {
        *self.control.write() = control;
        self.apply();
    }

    pub fn detach(&self) {
        *self.control.write() = None;
    }

    /// Current native value of the attached control.
    pub fn gain(&self) -> Option<f32> {
        self.control.read().as_ref().map(|c| c.value())
    }

    fn apply(&self) {
        let Some(control) = self.control.read().clone() else {
            return;
        };
        let db = gain_for_level(self.level(), control.minimum(), control.maximum(), self.exponent);
        control.set_value(db);
        log::debug!("moodplay: volume {} -> {:.2} dB", self.level(), db);
    }
}

impl Default for VolumeController {
    fn default() -> Self {
        Self::new(80, DEFAULT_EXPONENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MASTER_GAIN_MAX_DB, MASTER_GAIN_MIN_DB};

    #[test]
    fn endpoints_hit_min_and_max() {
        assert_eq!(gain_for_level(0, -80.0, 6.0206, 0.7), -80.0);
        assert!((gain_for_level(100, -80.0, 6.0206, 0.7) - 6.0206).abs() < 1e-4);
        assert_eq!(gain_for_level(250, -80.0, 6.0, 0.7), gain_for_level(100, -80.0, 6.0, 0.7));
    }

    #[test]
    fn curve_is_monotonic() {
        let mut prev = f32::NEG_INFINITY;
        for level in 0..=100u8 {
            let g = gain_for_level(level, MASTER_GAIN_MIN_DB, MASTER_GAIN_MAX_DB, DEFAULT_EXPONENT);
            assert!(g > prev, "level {} gave {} after {}", level, g, prev);
            prev = g;
        }
    }

    #[test]
    fn half_level_sits_above_linear_midpoint() {
        let g = gain_for_level(50, 0.0, 1.0, DEFAULT_EXPONENT);
        assert!((g - 0.5f32.powf(0.7)).abs() < 1e-6);
        assert!(g > 0.5);
    }

    #[test]
    fn controller_applies_on_attach_and_set() {
        let volume = VolumeController::new(100, DEFAULT_EXPONENT);
        let control = Arc::new(GainControl::master());
        volume.attach(Some(Arc::clone(&control)));
        assert!((control.value() - MASTER_GAIN_MAX_DB).abs() < 1e-4);

        volume.set_level(0);
        assert_eq!(control.value(), MASTER_GAIN_MIN_DB);
        assert_eq!(volume.gain(), Some(MASTER_GAIN_MIN_DB));
    }

    #[test]
    fn no_control_is_a_silent_no_op() {
        let volume = VolumeController::default();
        volume.set_level(130);
        assert_eq!(volume.level(), 100);
        assert_eq!(volume.gain(), None);
        volume.attach(None);
        volume.detach();
    }
}
