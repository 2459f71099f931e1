use serde::{Deserialize, Serialize};

const KEY_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// A sounding note: a paired note-on/note-off with its duration in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub channel: u8,
    pub key: u8,
    pub velocity: u8,
    pub duration: u64,
}

impl Note {
    pub fn new(channel: u8, key: u8, velocity: u8, duration: u64) -> Self {
        Self {
            channel,
            key,
            velocity,
            duration,
        }
    }

    /// Pitch class (key modulo 12, C = 0)
    pub fn pitch_class(&self) -> usize {
        (self.key % 12) as usize
    }

    /// Display name with octave, MIDI 60 = C4
    pub fn name(&self) -> String {
        key_name(self.key)
    }
}

/// Name of a MIDI key number with octave (60 = "C4", 0 = "C-1")
pub fn key_name(key: u8) -> String {
    let octave = (key / 12) as i32 - 1;
    format!("{}{}", KEY_NAMES[(key % 12) as usize], octave)
}
