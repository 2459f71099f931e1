//! Loading and saving a [`Midi`] as a Standard MIDI File
//!
//! Saving writes one track per distinct channel, lowest channel first, and
//! puts the vendor marker at tick 0 of the first track. Loading feeds tracks
//! to the [`NoteBuilder`] last to first, so a leading track without notes
//! (the usual tempo map) receives the lowest channel and is written back as
//! the first track.

use crate::config::StudioConfig;
use crate::error::Result;
use crate::models::meta_event::META_TIME_SIGNATURE;
use crate::models::{MetaEvent, MidelKind, SerialNumbers, TimeSignature};

use super::codec::{read_standard_midi, write_standard_midi, RawMessage, RawTrack, StandardMidi};
use super::{Midi, NoteBuilder};

impl Midi {
    /// Rebuild a container from parsed tracks, rescaling to
    /// `config.default_resolution`
    pub fn from_standard_midi(smf: &StandardMidi, config: &StudioConfig) -> Result<Midi> {
        let mut midi = Midi::with_serials(SerialNumbers::new(), config.default_resolution);
        let mut builder = NoteBuilder::new(&mut midi, config);
        if let Some(signature) = first_time_signature(smf) {
            builder.set_time_signature(signature);
        }
        for track in smf.tracks.iter().rev() {
            builder.add_track(track, smf.resolution)?;
        }
        builder.finish();

        log::info!(
            "Loaded {} events on {} channels",
            midi.len(),
            midi.channels().len()
        );
        Ok(midi)
    }

    pub fn from_standard_midi_bytes(bytes: &[u8], config: &StudioConfig) -> Result<Midi> {
        let smf = read_standard_midi(bytes)?;
        Self::from_standard_midi(&smf, config)
    }

    /// One track per channel with the vendor marker in the first
    pub fn to_standard_midi(&self, config: &StudioConfig) -> StandardMidi {
        let channels = self.channels();
        let mut tracks = Vec::with_capacity(channels.len().max(1));

        for (index, channel) in channels.iter().enumerate() {
            // (tick, note-off first, message)
            let mut messages: Vec<(u64, u8, RawMessage)> = Vec::new();
            if index == 0 {
                messages.push((0, 1, signature_message(config, *channel)));
            }
            for event in self.events_on_channel(*channel) {
                push_event_messages(&mut messages, event.tick(), event.kind());
            }
            messages.sort_by_key(|(tick, order, _)| (*tick, *order));

            let mut track = RawTrack::new();
            for (tick, _, message) in messages {
                track.push(tick, message);
            }
            tracks.push(track);
        }

        if tracks.is_empty() {
            let mut track = RawTrack::new();
            track.push(0, signature_message(config, 0));
            tracks.push(track);
        }

        StandardMidi {
            resolution: self.resolution,
            tracks,
        }
    }

    pub fn to_standard_midi_bytes(&self, config: &StudioConfig) -> Result<Vec<u8>> {
        let smf = self.to_standard_midi(config);
        let format = if smf.tracks.len() == 1 { 0 } else { 1 };
        write_standard_midi(&smf, format)
    }
}

/// Earliest time signature in any track. Tracks are fed last to first, so
/// the conductor track's signature would otherwise arrive after the lyrics
/// that are timed against it. Later signature changes are not tracked.
fn first_time_signature(smf: &StandardMidi) -> Option<TimeSignature> {
    smf.tracks
        .iter()
        .flat_map(|track| track.events.iter())
        .filter_map(|(tick, message)| match message {
            RawMessage::Meta { meta_type, data } if *meta_type == META_TIME_SIGNATURE => {
                MetaEvent::new(0, *meta_type, data.clone())
                    .as_time_signature()
                    .map(|signature| (*tick, signature))
            }
            _ => None,
        })
        .min_by_key(|(tick, _)| *tick)
        .map(|(_, signature)| signature)
}

fn signature_message(config: &StudioConfig, channel: i32) -> RawMessage {
    let marker = MetaEvent::signature(channel, &config.signature, &config.version);
    RawMessage::meta(marker.meta_type, marker.data)
}

fn push_event_messages(messages: &mut Vec<(u64, u8, RawMessage)>, tick: u64, kind: &MidelKind) {
    match kind {
        MidelKind::Note(note) => {
            messages.push((tick, 1, RawMessage::note_on(note.channel, note.key, note.velocity)));
            // A zero-length note keeps its off after its on
            let order = if note.duration > 0 { 0 } else { 1 };
            messages.push((tick + note.duration, order, RawMessage::note_off(note.channel, note.key)));
        }
        MidelKind::Channel(event) => {
            messages.push((tick, 1, RawMessage::short(event.status(), event.data1, event.data2)));
        }
        MidelKind::Meta(event) => {
            messages.push((tick, 1, RawMessage::meta(event.meta_type, event.data.clone())));
        }
        MidelKind::Sysex(event) => {
            let message = RawMessage::Sysex {
                status: event.status,
                data: event.data.clone(),
            };
            messages.push((tick, 1, message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::meta_event::META_SEQUENCER_SPECIFIC;
    use crate::models::{ChannelEvent, Note};

    #[test]
    fn test_one_track_per_channel_with_marker_first() {
        let mut midi = Midi::new();
        midi.add(midi.stamp(0, MetaEvent::tempo(-1, 400_000)));
        midi.add(midi.stamp(0, Note::new(3, 60, 100, 480)));
        midi.add(midi.stamp(0, Note::new(1, 64, 100, 480)));

        let smf = midi.to_standard_midi(&StudioConfig::default());
        assert_eq!(smf.tracks.len(), 3);
        let (tick, marker) = &smf.tracks[0].events[0];
        assert_eq!(*tick, 0);
        assert!(matches!(marker, RawMessage::Meta { meta_type: META_SEQUENCER_SPECIFIC, .. }));
        assert_eq!(smf.tracks[0].events[1].1, RawMessage::meta(0x51, vec![0x06, 0x1A, 0x80]));
        assert_eq!(smf.tracks[1].events[0].1, RawMessage::note_on(1, 64, 100));
    }

    #[test]
    fn test_note_off_sorts_before_note_on_at_same_tick() {
        let mut midi = Midi::new();
        midi.add(midi.stamp(0, Note::new(0, 60, 100, 480)));
        midi.add(midi.stamp(480, Note::new(0, 60, 90, 480)));
        midi.add(midi.stamp(960, ChannelEvent::control_change(0, 7, 100)));

        let smf = midi.to_standard_midi(&StudioConfig::default());
        let messages: Vec<(u64, RawMessage)> = smf.tracks[0].events[1..].to_vec();
        assert_eq!(
            messages,
            vec![
                (0, RawMessage::note_on(0, 60, 100)),
                (480, RawMessage::note_off(0, 60)),
                (480, RawMessage::note_on(0, 60, 90)),
                (960, RawMessage::note_off(0, 60)),
                (960, RawMessage::short(0xB0, 7, 100)),
            ]
        );
    }

    #[test]
    fn test_zero_length_note_survives_reload() {
        let config = StudioConfig::default();
        let mut midi = Midi::new();
        midi.add(midi.stamp(100, Note::new(0, 60, 100, 0)));
        let bytes = midi.to_standard_midi_bytes(&config).unwrap();
        let loaded = Midi::from_standard_midi_bytes(&bytes, &config).unwrap();
        let notes: Vec<(u64, u64)> = loaded.notes().map(|(t, n)| (t, n.duration)).collect();
        assert_eq!(notes, vec![(100, 0)]);
    }

    #[test]
    fn test_empty_container_writes_marker_only() {
        let config = StudioConfig::default();
        let bytes = Midi::new().to_standard_midi_bytes(&config).unwrap();
        let loaded = Midi::from_standard_midi_bytes(&bytes, &config).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.version(), Some(config.version.as_str()));
    }
}
