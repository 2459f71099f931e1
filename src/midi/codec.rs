//! Standard MIDI File boundary
//!
//! Converts between `midly` and a flat, owned representation: one list of
//! `(absolute tick, RawMessage)` pairs per track. Everything above this
//! module works with [`RawMessage`] and never sees `midly` types, so the
//! codec can be swapped without touching the note builder.

use midly::num::{u14, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind};

use crate::error::{Result, StudioError};
use crate::models::channel_event::{
    CHANNEL_PRESSURE, CONTROL_CHANGE, NOTE_OFF, NOTE_ON, PITCH_BEND, POLY_PRESSURE, PROGRAM_CHANGE,
};
use crate::models::meta_event::{
    META_END_OF_TRACK, META_KEY_SIGNATURE, META_LYRIC, META_SEQUENCER_SPECIFIC, META_TEMPO, META_TEXT,
    META_TIME_SIGNATURE, META_TRACK_NAME,
};

/// A message as read from (or written to) a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    /// Channel voice message; `status` includes the channel nibble
    Short { status: u8, data1: u8, data2: u8 },
    Meta { meta_type: u8, data: Vec<u8> },
    /// `status` is 0xF0 for sysex, 0xF7 for escape packets
    Sysex { status: u8, data: Vec<u8> },
}

impl RawMessage {
    pub fn short(status: u8, data1: u8, data2: u8) -> Self {
        RawMessage::Short {
            status,
            data1,
            data2,
        }
    }

    pub fn note_on(channel: u8, key: u8, velocity: u8) -> Self {
        Self::short(NOTE_ON | (channel & 0x0F), key, velocity)
    }

    pub fn note_off(channel: u8, key: u8) -> Self {
        Self::short(NOTE_OFF | (channel & 0x0F), key, 0)
    }

    pub fn meta(meta_type: u8, data: Vec<u8>) -> Self {
        RawMessage::Meta { meta_type, data }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTrack {
    pub events: Vec<(u64, RawMessage)>,
}

impl RawTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tick: u64, message: RawMessage) {
        self.events.push((tick, message));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardMidi {
    /// Ticks per quarter note
    pub resolution: u16,
    pub tracks: Vec<RawTrack>,
}

/// Parse SMF bytes into owned tracks with absolute ticks
pub fn read_standard_midi(bytes: &[u8]) -> Result<StandardMidi> {
    let smf = Smf::parse(bytes).map_err(|e| StudioError::Codec(format!("Failed to parse MIDI: {}", e)))?;

    let resolution = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int(),
        Timing::Timecode(fps, subframe) => {
            return Err(StudioError::UnsupportedTiming(format!(
                "SMPTE timecode {:?}/{} is not supported",
                fps, subframe
            )))
        }
    };
    if resolution == 0 {
        return Err(StudioError::UnsupportedTiming("zero ticks per quarter note".to_string()));
    }

    let mut tracks = Vec::with_capacity(smf.tracks.len());
    for track in &smf.tracks {
        let mut raw = RawTrack::new();
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            raw.push(tick, from_track_event_kind(&event.kind));
        }
        tracks.push(raw);
    }

    log::debug!(
        "Read standard MIDI: {} tracks at {} ticks per quarter",
        tracks.len(),
        resolution
    );
    Ok(StandardMidi { resolution, tracks })
}

/// Write owned tracks (absolute ticks, any order within a track is kept)
/// as SMF bytes. `file_format` 0 is single track, anything else parallel.
pub fn write_standard_midi(midi: &StandardMidi, file_format: u16) -> Result<Vec<u8>> {
    let format = match file_format {
        0 if midi.tracks.len() <= 1 => Format::SingleTrack,
        0 => {
            return Err(StudioError::Codec(format!(
                "format 0 allows one track, got {}",
                midi.tracks.len()
            )))
        }
        _ => Format::Parallel,
    };

    let mut tracks = Vec::with_capacity(midi.tracks.len());
    for raw in &midi.tracks {
        let mut events = Vec::with_capacity(raw.events.len() + 1);
        let mut previous = 0u64;
        let mut ends_track = false;
        for (tick, message) in &raw.events {
            let delta = tick.saturating_sub(previous);
            if delta > 0x0FFF_FFFF {
                return Err(StudioError::Codec(format!("delta time {} does not fit 28 bits", delta)));
            }
            previous = previous.max(*tick);
            let kind = to_track_event_kind(message)?;
            ends_track = matches!(kind, TrackEventKind::Meta(MetaMessage::EndOfTrack));
            events.push(TrackEvent {
                delta: (delta as u32).into(),
                kind,
            });
        }
        if !ends_track {
            events.push(TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
        }
        tracks.push(events);
    }

    let smf = Smf {
        header: Header {
            format,
            timing: Timing::Metrical(midi.resolution.into()),
        },
        tracks,
    };

    let mut out = Vec::new();
    smf.write(&mut out)
        .map_err(|e| StudioError::Codec(format!("Failed to write MIDI: {}", e)))?;
    Ok(out)
}

fn from_track_event_kind(kind: &TrackEventKind) -> RawMessage {
    match kind {
        TrackEventKind::Midi { channel, message } => from_midi_message(channel.as_int(), message),
        TrackEventKind::SysEx(data) => RawMessage::Sysex {
            status: 0xF0,
            data: data.to_vec(),
        },
        TrackEventKind::Escape(data) => RawMessage::Sysex {
            status: 0xF7,
            data: data.to_vec(),
        },
        TrackEventKind::Meta(meta) => {
            let (meta_type, data) = from_meta_message(meta);
            RawMessage::Meta { meta_type, data }
        }
    }
}

fn from_midi_message(channel: u8, message: &MidiMessage) -> RawMessage {
    let (command, data1, data2) = match *message {
        MidiMessage::NoteOff { key, vel } => (NOTE_OFF, key.as_int(), vel.as_int()),
        MidiMessage::NoteOn { key, vel } => (NOTE_ON, key.as_int(), vel.as_int()),
        MidiMessage::Aftertouch { key, vel } => (POLY_PRESSURE, key.as_int(), vel.as_int()),
        MidiMessage::Controller { controller, value } => (CONTROL_CHANGE, controller.as_int(), value.as_int()),
        MidiMessage::ProgramChange { program } => (PROGRAM_CHANGE, program.as_int(), 0),
        MidiMessage::ChannelAftertouch { vel } => (CHANNEL_PRESSURE, vel.as_int(), 0),
        MidiMessage::PitchBend { bend } => {
            let value = bend.0.as_int();
            (PITCH_BEND, (value & 0x7F) as u8, (value >> 7) as u8)
        }
    };
    RawMessage::short(command | (channel & 0x0F), data1, data2)
}

fn text_meta(meta_type: u8, text: &[u8]) -> (u8, Vec<u8>) {
    (meta_type, text.to_vec())
}

fn from_meta_message(meta: &MetaMessage) -> (u8, Vec<u8>) {
    match *meta {
        MetaMessage::TrackNumber(number) => (
            0x00,
            number.map(|n| n.to_be_bytes().to_vec()).unwrap_or_default(),
        ),
        MetaMessage::Text(text) => text_meta(META_TEXT, text),
        MetaMessage::Copyright(text) => text_meta(0x02, text),
        MetaMessage::TrackName(text) => text_meta(META_TRACK_NAME, text),
        MetaMessage::InstrumentName(text) => text_meta(0x04, text),
        MetaMessage::Lyric(text) => text_meta(META_LYRIC, text),
        MetaMessage::Marker(text) => text_meta(0x06, text),
        MetaMessage::CuePoint(text) => text_meta(0x07, text),
        MetaMessage::ProgramName(text) => text_meta(0x08, text),
        MetaMessage::DeviceName(text) => text_meta(0x09, text),
        MetaMessage::MidiChannel(channel) => (0x20, vec![channel.as_int()]),
        MetaMessage::MidiPort(port) => (0x21, vec![port.as_int()]),
        MetaMessage::EndOfTrack => (META_END_OF_TRACK, Vec::new()),
        MetaMessage::Tempo(mpq) => {
            let mpq = mpq.as_int();
            (META_TEMPO, vec![(mpq >> 16) as u8, (mpq >> 8) as u8, mpq as u8])
        }
        MetaMessage::SmpteOffset(time) => {
            let rate = match time.fps() {
                midly::Fps::Fps24 => 0u8,
                midly::Fps::Fps25 => 1,
                midly::Fps::Fps29 => 2,
                midly::Fps::Fps30 => 3,
            };
            (
                0x54,
                vec![
                    (rate << 5) | time.hour(),
                    time.minute(),
                    time.second(),
                    time.frame(),
                    time.subframe(),
                ],
            )
        }
        MetaMessage::TimeSignature(numerator, power, clocks, thirty_seconds) => {
            (META_TIME_SIGNATURE, vec![numerator, power, clocks, thirty_seconds])
        }
        MetaMessage::KeySignature(sharps, minor) => (META_KEY_SIGNATURE, vec![sharps as u8, minor as u8]),
        MetaMessage::SequencerSpecific(data) => (META_SEQUENCER_SPECIFIC, data.to_vec()),
        MetaMessage::Unknown(meta_type, data) => (meta_type, data.to_vec()),
    }
}

fn to_track_event_kind(message: &RawMessage) -> Result<TrackEventKind<'_>> {
    let kind = match message {
        RawMessage::Short {
            status,
            data1,
            data2,
        } => TrackEventKind::Midi {
            channel: u4::from(status & 0x0F),
            message: to_midi_message(*status, *data1, *data2)?,
        },
        RawMessage::Sysex { status: 0xF7, data } => TrackEventKind::Escape(data),
        RawMessage::Sysex { data, .. } => TrackEventKind::SysEx(data),
        RawMessage::Meta { meta_type, data } => TrackEventKind::Meta(to_meta_message(*meta_type, data)),
    };
    Ok(kind)
}

fn to_midi_message(status: u8, data1: u8, data2: u8) -> Result<MidiMessage> {
    let (d1, d2) = (u7::from(data1), u7::from(data2));
    let message = match status & 0xF0 {
        NOTE_OFF => MidiMessage::NoteOff { key: d1, vel: d2 },
        NOTE_ON => MidiMessage::NoteOn { key: d1, vel: d2 },
        POLY_PRESSURE => MidiMessage::Aftertouch { key: d1, vel: d2 },
        CONTROL_CHANGE => MidiMessage::Controller {
            controller: d1,
            value: d2,
        },
        PROGRAM_CHANGE => MidiMessage::ProgramChange { program: d1 },
        CHANNEL_PRESSURE => MidiMessage::ChannelAftertouch { vel: d1 },
        PITCH_BEND => MidiMessage::PitchBend {
            bend: PitchBend(u14::from(((data2 as u16 & 0x7F) << 7) | (data1 as u16 & 0x7F))),
        },
        _ => {
            return Err(StudioError::Codec(format!(
                "status 0x{:02X} is not a channel voice message",
                status
            )))
        }
    };
    Ok(message)
}

fn to_meta_message(meta_type: u8, data: &[u8]) -> MetaMessage<'_> {
    match meta_type {
        META_TEXT => MetaMessage::Text(data),
        META_TRACK_NAME => MetaMessage::TrackName(data),
        META_LYRIC => MetaMessage::Lyric(data),
        META_END_OF_TRACK => MetaMessage::EndOfTrack,
        META_TEMPO if data.len() == 3 => {
            let mpq = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | data[2] as u32;
            MetaMessage::Tempo(mpq.into())
        }
        META_TIME_SIGNATURE if data.len() == 4 => MetaMessage::TimeSignature(data[0], data[1], data[2], data[3]),
        META_KEY_SIGNATURE if data.len() == 2 => MetaMessage::KeySignature(data[0] as i8, data[1] != 0),
        META_SEQUENCER_SPECIFIC => MetaMessage::SequencerSpecific(data),
        _ => MetaMessage::Unknown(meta_type, data),
    }
}
