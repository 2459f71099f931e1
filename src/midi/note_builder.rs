//! Note reconstruction from raw message streams
//!
//! A [`NoteBuilder`] is fed one track at a time. Ticks are first rescaled from
//! the track's resolution to the container's. Note-on/note-off pairs become
//! [`Note`]s with a duration:
//!
//! - a note-on with velocity 0 is a note-off
//! - a note-on for a key that is already sounding closes the old note first
//! - keys still held when the track ends are closed at the last tick seen
//!
//! Meta and sysex events are held back until the end of the track, because
//! the channel they are filed under is the channel of the track's notes. A
//! track without notes gets a fresh negative channel instead.

use crate::config::StudioConfig;
use crate::error::{Result, StudioError};
use crate::models::channel_event::{NOTE_OFF, NOTE_ON};
use crate::models::meta_event::{META_END_OF_TRACK, META_LYRIC, META_TIME_SIGNATURE};
use crate::models::{ChannelEvent, MetaEvent, Midel, Note, SysexEvent, TimeSignature};

use super::codec::{RawMessage, RawTrack};
use super::Midi;

const KEY_COUNT: usize = 128;

#[derive(Debug, Clone, Copy)]
struct PendingNote {
    channel: u8,
    velocity: u8,
    start: u64,
}

pub struct NoteBuilder<'m> {
    midi: &'m mut Midi,
    signature: String,
    track_resolution: u16,
    pending: [Option<PendingNote>; KEY_COUNT],
    sounding: usize,
    /// Tick at which the last key was released; `None` while keys sound
    silence_since: Option<u64>,
    note_channel: Option<u8>,
    buffered: Vec<Midel>,
    last_tick: u64,
    /// Measure length each track starts from
    initial_ticks_per_measure: u64,
    ticks_per_measure: u64,
    next_meta_channel: i32,
    last_lyric: Option<(u64, u64)>,
    letter_ticks: u64,
    letter_count: u64,
}

impl<'m> NoteBuilder<'m> {
    /// Builder adding into `midi`, which fixes the target resolution
    pub fn new(midi: &'m mut Midi, config: &StudioConfig) -> Self {
        let ticks_per_measure = midi.ticks_per_measure(0);
        let track_resolution = midi.resolution();
        Self {
            midi,
            signature: config.signature.clone(),
            track_resolution,
            pending: [None; KEY_COUNT],
            sounding: 0,
            silence_since: Some(0),
            note_channel: None,
            buffered: Vec::new(),
            last_tick: 0,
            initial_ticks_per_measure: ticks_per_measure,
            ticks_per_measure,
            next_meta_channel: -1,
            last_lyric: None,
            letter_ticks: 0,
            letter_count: 0,
        }
    }

    /// Start a track whose ticks are in `resolution` ticks per quarter
    pub fn begin_track(&mut self, resolution: u16) {
        self.track_resolution = resolution.max(1);
        self.pending = [None; KEY_COUNT];
        self.sounding = 0;
        self.silence_since = Some(0);
        self.note_channel = None;
        self.buffered.clear();
        self.last_tick = 0;
        self.ticks_per_measure = self.initial_ticks_per_measure;
        self.last_lyric = None;
    }

    /// Measure length for tracks that carry no time signature of their own,
    /// typically taken from the conductor track before any track is fed
    pub fn set_time_signature(&mut self, signature: TimeSignature) {
        self.initial_ticks_per_measure = signature.ticks_per_measure(self.midi.resolution()).max(1);
        self.ticks_per_measure = self.initial_ticks_per_measure;
    }

    fn rescale(&self, tick: u64) -> u64 {
        tick * self.midi.resolution() as u64 / self.track_resolution as u64
    }

    /// Feed one message at its raw track tick
    pub fn push(&mut self, message: &RawMessage, raw_tick: u64) -> Result<()> {
        let tick = self.rescale(raw_tick);
        self.last_tick = self.last_tick.max(tick);

        match message {
            RawMessage::Short {
                status,
                data1,
                data2,
            } => self.push_short(*status, *data1, *data2, tick),
            RawMessage::Meta { meta_type, data } => {
                self.push_meta(*meta_type, data, tick);
                Ok(())
            }
            RawMessage::Sysex { status, data } => {
                let event = SysexEvent {
                    channel: 0,
                    status: *status,
                    data: data.clone(),
                };
                self.buffered.push(self.midi.stamp(tick, event));
                Ok(())
            }
        }
    }

    fn push_short(&mut self, status: u8, data1: u8, data2: u8, tick: u64) -> Result<()> {
        if !(0x80..0xF0).contains(&status) {
            return Err(StudioError::UnsupportedMessage {
                tick,
                message: format!("status 0x{:02X} ({:02X} {:02X})", status, data1, data2),
            });
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            NOTE_ON if data2 > 0 => self.note_on(channel, data1 & 0x7F, data2, tick),
            NOTE_ON | NOTE_OFF => self.note_off(data1 & 0x7F, tick),
            command => {
                let event = ChannelEvent::new(channel, command, data1, data2);
                let event = self.midi.stamp(tick, event);
                self.midi.add(event);
            }
        }
        Ok(())
    }

    fn note_on(&mut self, channel: u8, key: u8, velocity: u8, tick: u64) {
        if self.pending[key as usize].is_some() {
            self.note_off(key, tick);
        }

        if self.sounding == 0 {
            if let Some(since) = self.silence_since.take() {
                if tick > since {
                    self.midi.record_rest(channel as i32, tick - since);
                }
            }
        }

        self.note_channel.get_or_insert(channel);
        self.pending[key as usize] = Some(PendingNote {
            channel,
            velocity,
            start: tick,
        });
        self.sounding += 1;
    }

    fn note_off(&mut self, key: u8, tick: u64) {
        let Some(pending) = self.pending[key as usize].take() else {
            log::debug!("Ignoring note-off for silent key {} at tick {}", key, tick);
            return;
        };
        self.sounding -= 1;

        let note = Note::new(pending.channel, key, pending.velocity, tick.saturating_sub(pending.start));
        let event = self.midi.stamp(pending.start, note);
        self.midi.add(event);

        if self.sounding == 0 {
            self.silence_since = Some(tick);
        }
    }

    fn push_meta(&mut self, meta_type: u8, data: &[u8], tick: u64) {
        let event = MetaEvent::new(0, meta_type, data.to_vec());
        match meta_type {
            META_END_OF_TRACK => return,
            META_LYRIC => self.count_letters(data, tick),
            META_TIME_SIGNATURE => {
                if let Some(signature) = event.as_time_signature() {
                    self.ticks_per_measure = signature.ticks_per_measure(self.midi.resolution()).max(1);
                }
            }
            _ => {}
        }

        if let Some(version) = event.signature_version(&self.signature) {
            log::debug!("File written by {} {}", self.signature, version);
            self.midi.set_version(version);
            return;
        }

        self.buffered.push(self.midi.stamp(tick, event));
    }

    /// Gaps between lyric syllables shorter than a measure feed the
    /// ticks-per-letter estimate
    fn count_letters(&mut self, text: &[u8], tick: u64) {
        let letters = String::from_utf8_lossy(text)
            .chars()
            .filter(|c| c.is_alphabetic())
            .count() as u64;

        if let Some((previous_tick, previous_letters)) = self.last_lyric {
            let gap = tick.saturating_sub(previous_tick);
            if gap < self.ticks_per_measure && previous_letters > 0 {
                self.letter_ticks += gap;
                self.letter_count += previous_letters;
            }
        }
        self.last_lyric = Some((tick, letters));
    }

    /// Close held keys and file the buffered meta/sysex events
    pub fn end_track(&mut self) {
        let last_tick = self.last_tick;
        for key in 0..KEY_COUNT {
            if self.pending[key].is_some() {
                log::warn!("Closing stuck key {} at end of track (tick {})", key, last_tick);
                self.note_off(key as u8, last_tick);
            }
        }

        let channel = match self.note_channel {
            Some(channel) => channel as i32,
            None => {
                let channel = self.next_meta_channel;
                self.next_meta_channel -= 1;
                channel
            }
        };

        for mut event in self.buffered.drain(..) {
            event.set_channel(channel);
            self.midi.add(event);
        }
    }

    /// Feed a whole track
    pub fn add_track(&mut self, track: &RawTrack, resolution: u16) -> Result<()> {
        self.begin_track(resolution);
        for (tick, message) in &track.events {
            self.push(message, *tick)?;
        }
        self.end_track();
        Ok(())
    }

    /// Store the lyric timing estimate on the container
    pub fn finish(self) {
        let estimate = (self.letter_count > 0).then(|| self.letter_ticks / self.letter_count);
        self.midi.set_ticks_per_letter(estimate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(resolution: u16, events: &[(u64, RawMessage)]) -> Midi {
        let mut midi = Midi::new();
        let config = StudioConfig::default();
        let mut builder = NoteBuilder::new(&mut midi, &config);
        let track = RawTrack {
            events: events.to_vec(),
        };
        builder.add_track(&track, resolution).unwrap();
        builder.finish();
        midi
    }

    fn notes(midi: &Midi) -> Vec<(u8, u8, u64, u64)> {
        midi.notes()
            .map(|(tick, n)| (n.key, n.velocity, tick, n.duration))
            .collect()
    }

    #[test]
    fn test_retrigger_closes_previous_note() {
        let midi = build(
            480,
            &[
                (0, RawMessage::note_on(0, 60, 80)),
                (100, RawMessage::note_on(0, 60, 90)),
                (150, RawMessage::note_off(0, 60)),
            ],
        );
        assert_eq!(notes(&midi), vec![(60, 80, 0, 100), (60, 90, 100, 50)]);
    }

    #[test]
    fn test_zero_velocity_is_note_off() {
        let midi = build(
            480,
            &[
                (50, RawMessage::note_on(0, 64, 70)),
                (200, RawMessage::note_on(0, 64, 0)),
            ],
        );
        assert_eq!(notes(&midi), vec![(64, 70, 50, 150)]);
    }

    #[test]
    fn test_ticks_are_rescaled() {
        let midi = build(
            96,
            &[
                (96, RawMessage::note_on(2, 60, 100)),
                (144, RawMessage::note_off(2, 60)),
            ],
        );
        assert_eq!(notes(&midi), vec![(60, 100, 480, 240)]);
    }

    #[test]
    fn test_stuck_key_closed_at_last_tick() {
        let midi = build(
            480,
            &[
                (0, RawMessage::note_on(0, 60, 100)),
                (960, RawMessage::meta(META_END_OF_TRACK, vec![])),
            ],
        );
        assert_eq!(notes(&midi), vec![(60, 100, 0, 960)]);
        // End of track is not stored
        assert_eq!(midi.len(), 1);
    }

    #[test]
    fn test_rests_recorded_between_phrases() {
        let midi = build(
            480,
            &[
                (100, RawMessage::note_on(3, 60, 100)),
                (200, RawMessage::note_on(3, 64, 100)),
                (300, RawMessage::note_off(3, 60)),
                (400, RawMessage::note_off(3, 64)),
                (1000, RawMessage::note_on(3, 67, 100)),
                (1100, RawMessage::note_off(3, 67)),
            ],
        );
        let stats = midi.statistics().channel(3).unwrap();
        assert_eq!(stats.rest_count(), 2);
        assert_eq!(stats.rest_duration(), 100 + 600);
        assert_eq!(stats.key_count(), 3);
    }

    #[test]
    fn test_meta_takes_track_note_channel() {
        let midi = build(
            480,
            &[
                (0, RawMessage::meta(0x03, b"Bass".to_vec())),
                (0, RawMessage::short(0xC5, 33, 0)),
                (0, RawMessage::note_on(5, 40, 100)),
                (480, RawMessage::note_off(5, 40)),
            ],
        );
        let name = midi.iter().find(|e| e.as_meta().is_some()).unwrap();
        assert_eq!(name.channel(), 5);
        assert_eq!(midi.program_at(5, 0), Some(33));
    }

    #[test]
    fn test_tracks_without_notes_get_negative_channels() {
        let mut midi = Midi::new();
        let config = StudioConfig::default();
        let mut builder = NoteBuilder::new(&mut midi, &config);
        let tempo = RawTrack {
            events: vec![(0, RawMessage::meta(0x51, vec![0x06, 0x1A, 0x80]))],
        };
        let text = RawTrack {
            events: vec![(0, RawMessage::meta(0x01, b"hello".to_vec()))],
        };
        builder.add_track(&tempo, 480).unwrap();
        builder.add_track(&text, 480).unwrap();
        builder.finish();

        let channels: Vec<i32> = midi.channels().into_iter().collect();
        assert_eq!(channels, vec![-2, -1]);
        assert_eq!(midi.tempo_at(0), 400_000);
        assert_eq!(midi.find_controlling_tempo_change(0).unwrap().channel(), -1);
    }

    #[test]
    fn test_signature_marker_is_consumed() {
        let config = StudioConfig::default();
        let marker = MetaEvent::signature(0, &config.signature, "2.1.0");
        let midi = build(
            480,
            &[(0, RawMessage::meta(marker.meta_type, marker.data.clone()))],
        );
        assert!(midi.is_empty());
        assert_eq!(midi.version(), Some("2.1.0"));
    }

    #[test]
    fn test_lyrics_estimate_ticks_per_letter() {
        let midi = build(
            480,
            &[
                (0, RawMessage::meta(META_LYRIC, b"la".to_vec())),
                (240, RawMessage::meta(META_LYRIC, b"lee".to_vec())),
                (600, RawMessage::meta(META_LYRIC, b"lo".to_vec())),
                // A gap longer than a 4/4 measure is ignored
                (5000, RawMessage::meta(META_LYRIC, b"end".to_vec())),
            ],
        );
        assert_eq!(midi.ticks_per_letter(), Some((240 + 360) / (2 + 3)));
        // Lyrics are kept
        assert_eq!(midi.len(), 4);
    }

    #[test]
    fn test_measure_length_resets_between_tracks() {
        let mut midi = Midi::new();
        let config = StudioConfig::default();
        let mut builder = NoteBuilder::new(&mut midi, &config);
        // 2/4 is 960 ticks per measure
        let two_four = RawTrack {
            events: vec![(0, RawMessage::meta(META_TIME_SIGNATURE, vec![2, 2, 24, 8]))],
        };
        let lyrics = RawTrack {
            events: vec![
                (0, RawMessage::meta(META_LYRIC, b"la".to_vec())),
                (1000, RawMessage::meta(META_LYRIC, b"la".to_vec())),
            ],
        };
        builder.add_track(&two_four, 480).unwrap();
        builder.add_track(&lyrics, 480).unwrap();
        builder.finish();
        // Measured against 4/4 again, so the 1000 tick gap counts
        assert_eq!(midi.ticks_per_letter(), Some(500));
    }

    #[test]
    fn test_set_time_signature_applies_to_every_track() {
        let mut midi = Midi::new();
        let config = StudioConfig::default();
        let mut builder = NoteBuilder::new(&mut midi, &config);
        builder.set_time_signature(TimeSignature::new(2, 4).unwrap());
        let lyrics = RawTrack {
            events: vec![
                (0, RawMessage::meta(META_LYRIC, b"la".to_vec())),
                (1000, RawMessage::meta(META_LYRIC, b"la".to_vec())),
                (1100, RawMessage::meta(META_LYRIC, b"la".to_vec())),
            ],
        };
        builder.add_track(&lyrics, 480).unwrap();
        builder.finish();
        assert_eq!(midi.ticks_per_letter(), Some(50));
    }

    #[test]
    fn test_unknown_status_fails() {
        let mut midi = Midi::new();
        let config = StudioConfig::default();
        let mut builder = NoteBuilder::new(&mut midi, &config);
        builder.begin_track(480);
        let result = builder.push(&RawMessage::short(0xF8, 0, 0), 10);
        assert!(matches!(result, Err(StudioError::UnsupportedMessage { tick: 10, .. })));
    }
}
