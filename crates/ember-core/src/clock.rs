// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// One tick of the main loop.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    /// Seconds since the clock was created.
    pub elapsed: f32,
    pub frame_index: u64,
}

/// Monotonic clock for the render loop.
///
/// `dt` drives model animation and camera speed and is clamped, so a stall
/// (debugger, minimized window) does not produce a huge step. `elapsed` is
/// never clamped and drives shader time.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame_index: u64,
    dt_max: Duration,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            frame_index: 0,
            dt_max: Duration::from_millis(250),
        }
    }

    /// Drops the time spent suspended so the next tick does not see it.
    pub fn reset_delta(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = clamp_delta(now.saturating_duration_since(self.last), self.dt_max);
        self.last = now;
        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            elapsed: now.saturating_duration_since(self.start).as_secs_f32(),
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

fn clamp_delta(dt: Duration, max: Duration) -> Duration {
    dt.min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_stalls_are_clamped() {
        let max = Duration::from_millis(250);
        assert_eq!(clamp_delta(Duration::from_secs(3), max), max);
        assert_eq!(
            clamp_delta(Duration::from_millis(16), max),
            Duration::from_millis(16)
        );
    }

    #[test]
    fn tick_counts_frames() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick().frame_index, 0);
        assert_eq!(clock.tick().frame_index, 1);
        let t = clock.tick();
        assert!(t.dt >= 0.0 && t.dt <= 0.25);
        assert!(t.elapsed >= 0.0);
    }

    #[test]
    fn elapsed_tracks_wall_clock_across_a_stall() {
        let mut clock = FrameClock::new();
        let Some(earlier) = Instant::now().checked_sub(Duration::from_secs(2)) else {
            return;
        };
        clock.start = earlier;
        clock.last = earlier;
        let t = clock.tick();
        assert!((t.dt - 0.25).abs() < 1e-6);
        assert!(t.elapsed >= 2.0);
    }
}
