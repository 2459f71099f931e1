//! The scheduled event ("midel") and its total order
//!
//! Events sort by tick, then by [`SequenceClass`], then by variant-specific
//! fields, and finally by serial number. Notes are the exception: two notes
//! with the same tick, channel, key, velocity and duration are the same note
//! regardless of serial, so adding a duplicate note is a no-op.
//!
//! An event handed to a container is owned by it and only ever lent out as
//! `&Midel`. To edit one, clone it, change the clone and re-add it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::channel_event::ChannelEvent;
use super::meta_event::{MetaEvent, SysexEvent, TimeSignature};
use super::note::Note;

/// Ordering tie-break between event variants at the same tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SequenceClass {
    Sysex,
    Meta,
    Channel,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MidelKind {
    Sysex(SysexEvent),
    Meta(MetaEvent),
    Channel(ChannelEvent),
    Note(Note),
}

impl From<Note> for MidelKind {
    fn from(note: Note) -> Self {
        MidelKind::Note(note)
    }
}

impl From<ChannelEvent> for MidelKind {
    fn from(event: ChannelEvent) -> Self {
        MidelKind::Channel(event)
    }
}

impl From<MetaEvent> for MidelKind {
    fn from(event: MetaEvent) -> Self {
        MidelKind::Meta(event)
    }
}

impl From<SysexEvent> for MidelKind {
    fn from(event: SysexEvent) -> Self {
        MidelKind::Sysex(event)
    }
}

impl MidelKind {
    pub fn sequence_class(&self) -> SequenceClass {
        match self {
            MidelKind::Sysex(_) => SequenceClass::Sysex,
            MidelKind::Meta(_) => SequenceClass::Meta,
            MidelKind::Channel(_) => SequenceClass::Channel,
            MidelKind::Note(_) => SequenceClass::Note,
        }
    }
}

/// Composite key that realises the event order
///
/// Derived `Ord` compares fields top to bottom. Unused fields stay zero for
/// variants that do not tie-break on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub tick: u64,
    pub class: SequenceClass,
    pub channel: i32,
    pub key: u8,
    pub velocity: u8,
    pub duration: u64,
    pub serial: u64,
}

impl SortKey {
    /// Sorts before every event at `tick`
    pub fn floor(tick: u64) -> Self {
        Self {
            tick,
            class: SequenceClass::Sysex,
            channel: i32::MIN,
            key: 0,
            velocity: 0,
            duration: 0,
            serial: 0,
        }
    }

    /// Sorts after every event at `tick`
    pub fn ceiling(tick: u64) -> Self {
        Self {
            tick,
            class: SequenceClass::Note,
            channel: i32::MAX,
            key: u8::MAX,
            velocity: u8::MAX,
            duration: u64::MAX,
            serial: u64::MAX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Midel {
    tick: u64,
    serial: u64,
    kind: MidelKind,
}

impl Midel {
    pub fn new(serial: u64, tick: u64, kind: impl Into<MidelKind>) -> Self {
        Self {
            tick,
            serial,
            kind: kind.into(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn kind(&self) -> &MidelKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut MidelKind {
        &mut self.kind
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = tick;
        self
    }

    pub fn sequence_class(&self) -> SequenceClass {
        self.kind.sequence_class()
    }

    /// Assigned channel; negative for meta groupings that are not voices
    pub fn channel(&self) -> i32 {
        match &self.kind {
            MidelKind::Sysex(e) => e.channel,
            MidelKind::Meta(e) => e.channel,
            MidelKind::Channel(e) => e.channel as i32,
            MidelKind::Note(n) => n.channel as i32,
        }
    }

    /// Reassign the channel. Voice events keep their low nibble only, so
    /// callers range-check first.
    pub fn set_channel(&mut self, channel: i32) {
        match &mut self.kind {
            MidelKind::Sysex(e) => e.channel = channel,
            MidelKind::Meta(e) => e.channel = channel,
            MidelKind::Channel(e) => e.channel = (channel & 0x0F) as u8,
            MidelKind::Note(n) => n.channel = (channel & 0x0F) as u8,
        }
    }

    /// Duration in ticks; zero for everything but notes
    pub fn duration(&self) -> u64 {
        match &self.kind {
            MidelKind::Note(n) => n.duration,
            _ => 0,
        }
    }

    /// Tick at which the event stops sounding
    pub fn end_tick(&self) -> u64 {
        self.tick + self.duration()
    }

    pub fn as_note(&self) -> Option<&Note> {
        match &self.kind {
            MidelKind::Note(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_note_mut(&mut self) -> Option<&mut Note> {
        match &mut self.kind {
            MidelKind::Note(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_channel_event(&self) -> Option<&ChannelEvent> {
        match &self.kind {
            MidelKind::Channel(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_meta(&self) -> Option<&MetaEvent> {
        match &self.kind {
            MidelKind::Meta(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_sysex(&self) -> Option<&SysexEvent> {
        match &self.kind {
            MidelKind::Sysex(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self.kind, MidelKind::Note(_))
    }

    /// Program number, if this is a program change
    pub fn program(&self) -> Option<u8> {
        self.as_channel_event().and_then(|e| e.program())
    }

    pub fn is_program_change(&self) -> bool {
        self.program().is_some()
    }

    pub fn tempo_mpq(&self) -> Option<u32> {
        self.as_meta().and_then(|e| e.tempo_mpq())
    }

    pub fn time_signature(&self) -> Option<TimeSignature> {
        self.as_meta().and_then(|e| e.as_time_signature())
    }

    pub fn sort_key(&self) -> SortKey {
        let mut key = SortKey {
            tick: self.tick,
            class: self.sequence_class(),
            channel: self.channel(),
            key: 0,
            velocity: 0,
            duration: 0,
            serial: self.serial,
        };
        if let MidelKind::Note(n) = &self.kind {
            key.key = n.key;
            key.velocity = n.velocity;
            key.duration = n.duration;
            key.serial = 0;
        }
        key
    }
}

impl PartialEq for Midel {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Midel {}

impl PartialOrd for Midel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Midel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
