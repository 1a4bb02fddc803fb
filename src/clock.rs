//! Time sources.
//!
//! Two clocks feed every invocation: a monotonic wall clock (seconds) that
//! drives Motor integration, and a scene clock (`time`, `frame`) that feeds
//! expression variables. The scene clock can pause or jump; the wall clock
//! never does.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// One reading of both clocks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockReading {
    /// Monotonic seconds since the clock started.
    pub wall_time: f64,
    /// Scene seconds, `scene_frame / fps`.
    pub scene_time: f64,
    pub scene_frame: f64,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> ClockReading;
}

#[derive(Debug, Clone, Copy)]
struct Transport {
    playing: bool,
    /// Scene seconds accumulated before the current play run.
    banked: f64,
    resumed_at: Instant,
}

/// Frame-rate driven scene clock over the system monotonic clock.
///
/// Frames are whole numbers, so `time` advances in `1/fps` steps.
#[derive(Debug)]
pub struct SceneClock {
    origin: Instant,
    fps: f64,
    transport: Mutex<Transport>,
}

impl SceneClock {
    /// Start a playing clock at frame 0.
    pub fn new(fps: f64) -> Self {
        let now = Instant::now();
        Self {
            origin: now,
            fps: if fps > 0.0 { fps } else { 24.0 },
            transport: Mutex::new(Transport {
                playing: true,
                banked: 0.0,
                resumed_at: now,
            }),
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Freeze scene time. The wall clock keeps running.
    pub fn pause(&self) {
        let mut t = self.transport();
        if t.playing {
            t.banked += t.resumed_at.elapsed().as_secs_f64();
            t.playing = false;
        }
    }

    /// Jump to a frame, keeping the play state.
    pub fn seek(&self, frame: f64) {
        let mut t = self.transport();
        t.banked = frame.max(0.0) / self.fps;
        t.resumed_at = Instant::now();
    }

    fn transport(&self) -> std::sync::MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for SceneClock {
    fn now(&self) -> ClockReading {
        let t = *self.transport();
        let scene_seconds = if t.playing {
            t.banked + t.resumed_at.elapsed().as_secs_f64()
        } else {
            t.banked
        };
        let frame = (scene_seconds * self.fps).floor();
        ClockReading {
            wall_time: self.origin.elapsed().as_secs_f64(),
            scene_time: frame / self.fps,
            scene_frame: frame,
        }
    }
}

/// Hand-driven clock for tests and offline evaluation.
#[derive(Debug)]
pub struct ManualClock {
    fps: f64,
    reading: Mutex<ClockReading>,
}

impl ManualClock {
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            reading: Mutex::new(ClockReading::default()),
        }
    }

    /// Advance wall and scene time together by `seconds`.
    pub fn advance(&self, seconds: f64) {
        let mut r = self.reading.lock().unwrap_or_else(PoisonError::into_inner);
        r.wall_time += seconds;
        r.scene_time += seconds;
        r.scene_frame = r.scene_time * self.fps;
    }

    /// Advance only the wall clock, as when the scene is paused.
    pub fn advance_wall(&self, seconds: f64) {
        self.reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .wall_time += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> ClockReading {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
