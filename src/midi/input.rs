//! MIDI input: connects to a port and feeds decoded samples into the input
//! channel.

use std::io;

use midir::{MidiInput as MidirInput, MidiInputConnection};
use tracing::{debug, info};

use super::config::MidiConfig;
use super::message::decode;
use crate::input::InputSender;

/// Active MIDI input connection. Closed on drop.
pub struct MidiInput {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiInput {
    /// Open the port matching `config.device_name`, or the first port.
    pub fn start(config: &MidiConfig, sender: InputSender) -> io::Result<Self> {
        let midi_in =
            MidirInput::new("midibind").map_err(|e| io::Error::other(format!("MIDI init: {e}")))?;

        let ports = midi_in.ports();
        let (port, port_name) = match config.device_name.as_deref() {
            Some(filter) => ports
                .iter()
                .find_map(|p| {
                    let name = midi_in.port_name(p).unwrap_or_default();
                    name.contains(filter).then(|| (p.clone(), name))
                })
                .ok_or_else(|| {
                    io::Error::other(format!("MIDI device matching '{filter}' not found"))
                })?,
            None => {
                let p = ports
                    .first()
                    .cloned()
                    .ok_or_else(|| io::Error::other("no MIDI input ports available"))?;
                let name = midi_in
                    .port_name(&p)
                    .unwrap_or_else(|_| "unknown".to_string());
                (p, name)
            }
        };

        let channel_filter = config.channel_filter;
        let connection = midi_in
            .connect(
                &port,
                "midibind-input",
                move |_timestamp, msg, _| {
                    if let Some(sample) = decode(msg, channel_filter) {
                        if sender.send(sample).is_err() {
                            debug!("input channel closed, dropping MIDI message");
                        }
                    }
                },
                (),
            )
            .map_err(|e| io::Error::other(format!("MIDI connect: {e}")))?;

        info!(port = %port_name, ?channel_filter, "MIDI input connected");
        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// List all available MIDI input device names.
    pub fn list_devices() -> Vec<String> {
        let Ok(midi_in) = MidirInput::new("midibind-list") else {
            return Vec::new();
        };
        midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect()
    }
}
