//! MIDI device selection.

use serde::{Deserialize, Serialize};

/// Which port to open and which channel to listen on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiConfig {
    /// Preferred MIDI device name (substring match). None = first available.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Only accept messages on this MIDI channel (0-15). None = all channels.
    #[serde(default)]
    pub channel_filter: Option<u8>,
}
