//! MIDI message decoding: raw bytes to normalized input samples.

use crate::input::{InputSample, SourceKey};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

/// Decode a raw MIDI message into an input sample.
///
/// - CC:       `[0xB0 | channel, number, value]` reads as `value / 127`
/// - Note On:  `[0x90 | channel, note, velocity]` reads as 1.0
/// - Note Off: `[0x80 | channel, note, velocity]` reads as 0.0
///
/// Note On with velocity 0 is a Note Off. Everything else, and anything on
/// a channel other than `channel_filter`, is ignored.
pub fn decode(msg: &[u8], channel_filter: Option<u8>) -> Option<InputSample> {
    let (&status_byte, data) = msg.split_first()?;
    let status = status_byte & 0xF0;
    let channel = status_byte & 0x0F;

    if channel_filter.is_some_and(|filter| filter != channel) {
        return None;
    }

    let (source, raw) = match (status, data) {
        (CONTROL_CHANGE, &[number, value, ..]) => {
            (SourceKey::cc(channel, number), f64::from(value & 0x7F) / 127.0)
        }
        (NOTE_ON, &[note, velocity, ..]) if velocity > 0 => (SourceKey::note(channel, note), 1.0),
        (NOTE_ON | NOTE_OFF, &[note, _, ..]) => (SourceKey::note(channel, note), 0.0),
        _ => return None,
    };

    Some(InputSample::new(source, raw))
}
