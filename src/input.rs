//! Input samples and the channel that carries them from device threads.

use std::fmt;
use std::sync::mpsc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Which physical control produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Control {
    /// Continuous controller number.
    Cc(u8),
    /// Note number; note-on reads as 1.0 and note-off as 0.0.
    Note(u8),
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Cc(n) => write!(f, "CC {n}"),
            Control::Note(n) => write!(f, "Note {n}"),
        }
    }
}

/// A control on a specific channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub channel: u8,
    pub control: Control,
}

impl SourceKey {
    pub fn cc(channel: u8, number: u8) -> Self {
        Self {
            channel,
            control: Control::Cc(number),
        }
    }

    pub fn note(channel: u8, number: u8) -> Self {
        Self {
            channel,
            control: Control::Note(number),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ch {})", self.control, self.channel + 1)
    }
}

/// One normalized controller reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSample {
    pub source: SourceKey,
    /// Normalized to `[0.0, 1.0]`.
    pub raw: f64,
    pub timestamp: Instant,
}

impl InputSample {
    /// Build a sample stamped now. `raw` is clamped to `[0.0, 1.0]`.
    pub fn new(source: SourceKey, raw: f64) -> Self {
        Self {
            source,
            raw: if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) },
            timestamp: Instant::now(),
        }
    }
}

/// Sender half. Clone it for each device thread.
pub type InputSender = mpsc::Sender<InputSample>;

/// Receiver half, held by the engine pump.
pub struct InputReceiver {
    rx: mpsc::Receiver<InputSample>,
}

impl InputReceiver {
    /// Drain all pending samples.
    pub fn drain(&self) -> Vec<InputSample> {
        let mut samples = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            samples.push(sample);
        }
        samples
    }

    /// Block until a sample arrives or the timeout elapses.
    ///
    /// Returns `Err(Disconnected)` once every sender is gone.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<InputSample, mpsc::RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Create a new input channel pair.
pub fn input_channel() -> (InputSender, InputReceiver) {
    let (tx, rx) = mpsc::channel();
    (tx, InputReceiver { rx })
}
