//! Progress sampling for display.
//!
//! The tracker pulls from any `PositionSource` (the engine implements it) at
//! a fixed cadence and only while playing, so a paused or stopped display
//! holds its last reading.

use std::time::{Duration, Instant};

use crate::models::PlaybackState;

/// Slider resolution of the progress bar.
pub const PROGRESS_SCALE: u16 = 1000;

/// `M:SS`. Zero renders as `0:00`.
pub fn format_time(micros: u64) -> String {
    let secs = micros / 1_000_000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Anything that can report transport state and position.
pub trait PositionSource {
    fn state(&self) -> PlaybackState;
    fn position_micros(&self) -> u64;
    fn total_micros(&self) -> Option<u64>;
}

/// One reading of position and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub position_micros: u64,
    pub total_micros: Option<u64>,
}

impl Progress {
    pub fn elapsed(&self) -> String {
        format_time(self.position_micros)
    }

    pub fn total(&self) -> String {
        format_time(self.total_micros.unwrap_or(0))
    }

    /// Position over length in [0, 1]. None when the length is unknown.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total_micros.filter(|&t| t > 0)?;
        Some((self.position_micros as f64 / total as f64).clamp(0.0, 1.0))
    }

    /// Slider value 0..=1000; 0 when the length is unknown.
    pub fn permille(&self) -> u16 {
        self.fraction()
            .map(|f| (f * PROGRESS_SCALE as f64).round() as u16)
            .unwrap_or(0)
    }
}

/// Rate-limited sampler.
#[derive(Debug)]
pub struct ProgressTracker {
    interval: Duration,
    last_sample: Option<Instant>,
    current: Progress,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sample: None,
            current: Progress::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Refresh from `source` if playing and the interval has passed.
    pub fn sample(&mut self, source: &impl PositionSource) -> Progress {
        let due = self
            .last_sample
            .map_or(true, |at| at.elapsed() >= self.interval);
        if due && source.state() == PlaybackState::Playing {
            self.refresh(source);
        }
        self.current
    }

    /// Read `source` now regardless of state or cadence.
    pub fn refresh(&mut self, source: &impl PositionSource) -> Progress {
        self.current = Progress {
            position_micros: source.position_micros(),
            total_micros: source.total_micros(),
        };
        self.last_sample = Some(Instant::now());
        self.current
    }

    pub fn current(&self) -> Progress {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fake {
        state: PlaybackState,
        position: Cell<u64>,
        reads: Cell<u32>,
    }

    impl Fake {
        fn new(state: PlaybackState, position: u64) -> Self {
            Self {
                state,
                position: Cell::new(position),
                reads: Cell::new(0),
            }
        }
    }

    impl PositionSource for Fake {
        fn state(&self) -> PlaybackState {
            self.state
        }
        fn position_micros(&self) -> u64 {
            self.reads.set(self.reads.get() + 1);
            self.position.get()
        }
        fn total_micros(&self) -> Option<u64> {
            Some(200_000_000)
        }
    }

    #[test]
    fn format_time_renders_minutes_and_seconds() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(999_999), "0:00");
        assert_eq!(format_time(65_000_000), "1:05");
        assert_eq!(format_time(600_000_000), "10:00");
    }

    #[test]
    fn fraction_and_permille() {
        let p = Progress {
            position_micros: 50_000_000,
            total_micros: Some(200_000_000),
        };
        assert_eq!(p.fraction(), Some(0.25));
        assert_eq!(p.permille(), 250);
        assert_eq!(p.elapsed(), "0:50");
        assert_eq!(p.total(), "3:20");

        let unknown = Progress {
            position_micros: 5,
            total_micros: None,
        };
        assert_eq!(unknown.fraction(), None);
        assert_eq!(unknown.permille(), 0);
        assert_eq!(unknown.total(), "0:00");
    }

    #[test]
    fn samples_at_most_once_per_interval() {
        let source = Fake::new(PlaybackState::Playing, 1_000_000);
        let mut tracker = ProgressTracker::new(Duration::from_secs(60));
        assert_eq!(tracker.sample(&source).position_micros, 1_000_000);
        source.position.set(2_000_000);
        assert_eq!(tracker.sample(&source).position_micros, 1_000_000);
        assert_eq!(source.reads.get(), 1);
    }

    #[test]
    fn holds_last_value_when_not_playing() {
        let source = Fake::new(PlaybackState::Paused, 7_000_000);
        let mut tracker = ProgressTracker::new(Duration::from_millis(1));
        assert_eq!(tracker.sample(&source), Progress::default());
        assert_eq!(source.reads.get(), 0);
        assert_eq!(tracker.refresh(&source).position_micros, 7_000_000);
    }
}
