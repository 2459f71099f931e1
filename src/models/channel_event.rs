//! Channel voice messages other than note on/off

use serde::{Deserialize, Serialize};

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_PRESSURE: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

/// A channel voice message kept as raw command and data bytes
///
/// `command` is the status byte with the channel nibble cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel: u8,
    pub command: u8,
    pub data1: u8,
    pub data2: u8,
}

impl ChannelEvent {
    pub fn new(channel: u8, command: u8, data1: u8, data2: u8) -> Self {
        Self {
            channel,
            command: command & 0xF0,
            data1,
            data2,
        }
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::new(channel, PROGRAM_CHANGE, program, 0)
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::new(channel, CONTROL_CHANGE, controller, value)
    }

    pub fn is_program_change(&self) -> bool {
        self.command == PROGRAM_CHANGE
    }

    /// The program number, for program changes only
    pub fn program(&self) -> Option<u8> {
        self.is_program_change().then_some(self.data1)
    }

    /// Status byte as it appears on the wire
    pub fn status(&self) -> u8 {
        self.command | (self.channel & 0x0F)
    }
}
