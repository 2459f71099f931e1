//! Whole-container edits
//!
//! Each transform clones every event, edits the clones and collects them into
//! a new container that shares the source's serial counter. The source is
//! never touched. Transforms that can push a value out of range return
//! `None` as soon as one event would be invalid, before anything is built.

use std::collections::BTreeMap;

use crate::analysis::{Cluster, CHANNEL_COUNT};
use crate::models::Midel;

use super::Midi;

impl Midi {
    /// Clone and edit every event; `None` if `edit` rejects any of them
    fn rebuild<F>(&self, mut edit: F) -> Option<Midi>
    where
        F: FnMut(&mut Midel) -> bool,
    {
        let mut edited = Vec::with_capacity(self.len());
        for event in self.iter() {
            let mut copy = event.clone();
            if !edit(&mut copy) {
                return None;
            }
            edited.push(copy);
        }
        Some(self.collect_into_derived(edited))
    }

    fn collect_into_derived(&self, events: impl IntoIterator<Item = Midel>) -> Midi {
        let mut midi = self.derived();
        for event in events {
            midi.add(event);
        }
        midi
    }

    /// Move every note by `delta` semitones
    pub fn transpose(&self, delta: i32) -> Option<Midi> {
        let result = self.rebuild(|event| match event.as_note_mut() {
            Some(note) => match (note.key as i32)
                .checked_add(delta)
                .and_then(|key| u8::try_from(key).ok())
                .filter(|key| *key <= 127)
            {
                Some(key) => {
                    note.key = key;
                    true
                }
                None => false,
            },
            None => true,
        });
        if result.is_none() {
            log::debug!("Rejected transpose by {}: a key would leave 0-127", delta);
        }
        result
    }

    pub fn shift_ticks(&self, delta: i64) -> Option<Midi> {
        let result = self.rebuild(|event| match offset(event.tick(), delta) {
            Some(tick) => {
                event.set_tick(tick);
                true
            }
            None => false,
        });
        if result.is_none() {
            log::debug!("Rejected tick shift by {}: an event would start before 0", delta);
        }
        result
    }

    /// Lengthen (or shorten) every note by `delta` ticks
    pub fn change_duration(&self, delta: i64) -> Option<Midi> {
        let result = self.rebuild(|event| match event.as_note_mut() {
            Some(note) => match offset(note.duration, delta) {
                Some(duration) => {
                    note.duration = duration;
                    true
                }
                None => false,
            },
            None => true,
        });
        if result.is_none() {
            log::debug!("Rejected duration change by {}", delta);
        }
        result
    }

    /// Move events on voice channels 0-15 by `delta`. Events on other
    /// channels (meta groupings) are left where they are.
    pub fn change_channel(&self, delta: i32) -> Option<Midi> {
        let voices = 0..CHANNEL_COUNT as i32;
        let result = self.rebuild(|event| {
            let channel = event.channel();
            if !voices.contains(&channel) {
                return true;
            }
            match channel.checked_add(delta).filter(|c| voices.contains(c)) {
                Some(moved) => {
                    event.set_channel(moved);
                    true
                }
                None => false,
            }
        });
        if result.is_none() {
            log::debug!("Rejected channel change by {}", delta);
        }
        result
    }

    /// Mirror each channel in time: an event ending at `end` now starts at
    /// `first + (max - end)`, where `first` and `max` are the channel's first
    /// start and last end tick
    pub fn reverse_time_by_channel(&self) -> Midi {
        let mut windows: BTreeMap<i32, (u64, u64, usize)> = BTreeMap::new();
        for event in self.iter() {
            let window = windows
                .entry(event.channel())
                .or_insert((event.tick(), event.end_tick(), 0));
            window.0 = window.0.min(event.tick());
            window.1 = window.1.max(event.end_tick());
            window.2 += 1;
        }

        let reversed = self.iter().map(|event| {
            let mut copy = event.clone();
            if let Some(&(first, max, count)) = windows.get(&event.channel()) {
                if count > 1 {
                    copy.set_tick(first + (max - event.end_tick()));
                }
            }
            copy
        });
        self.collect_into_derived(reversed)
    }

    /// Per channel, swap note keys from the outside in: the first note gets
    /// the last note's key, the second the second-to-last's, and so on
    pub fn reverse_pitch_by_channel(&self) -> Midi {
        let mut keys: BTreeMap<i32, Vec<u8>> = BTreeMap::new();
        for (_, note) in self.notes() {
            keys.entry(note.channel as i32).or_default().push(note.key);
        }

        let mut taken: BTreeMap<i32, usize> = BTreeMap::new();
        let reversed = self.iter().map(|event| {
            let mut copy = event.clone();
            let channel = copy.channel();
            if let Some(note) = copy.as_note_mut() {
                let index = taken.entry(channel).or_insert(0);
                if let Some(channel_keys) = keys.get(&channel) {
                    note.key = channel_keys[channel_keys.len() - 1 - *index];
                }
                *index += 1;
            }
            copy
        });
        let events: Vec<Midel> = reversed.collect();
        self.collect_into_derived(events)
    }

    /// Keep what sounds between the start of the measure containing `left`
    /// and the end of the measure containing `right`. Notes reaching into
    /// the window from either side are cut to it. The tempo and time
    /// signature in effect at the window start are moved onto it.
    pub fn round_to_measure(&self, left: u64, right: u64) -> Midi {
        let measure = self.ticks_per_measure(left);
        let start = left / measure * measure;
        let end = (right.max(left) / measure + 1) * measure;

        let mut kept: Vec<Midel> = self
            .range(0, end - 1)
            .filter_map(|event| {
                let mut copy = event.clone();
                let tick = copy.tick();
                let begin = tick.max(start);
                if let Some(note) = copy.as_note_mut() {
                    let end_tick = tick + note.duration;
                    if tick < start && end_tick <= start {
                        return None;
                    }
                    note.duration = end_tick.min(end) - begin;
                } else if tick < start {
                    return None;
                }
                copy.set_tick(begin);
                Some(copy)
            })
            .collect();

        let controlling = [
            self.find_controlling_time_signature_change(start),
            self.find_controlling_tempo_change(start),
        ];
        for event in controlling.into_iter().flatten() {
            if event.tick() < start {
                kept.push(event.clone().with_tick(start));
            }
        }
        self.collect_into_derived(kept)
    }

    /// Snap note starts and durations to the buckets of `ticks` and
    /// `durations`, after training both on every note in the container
    pub fn quantize(&self, ticks: &mut Cluster, durations: &mut Cluster) -> Midi {
        for (tick, note) in self.notes() {
            ticks.train(tick as i64);
            durations.train(note.duration as i64);
        }

        let snapped = self
            .iter()
            .map(|event| {
                let mut copy = event.clone();
                if copy.is_note() {
                    let tick = ticks.get(copy.tick() as i64).max(0) as u64;
                    copy.set_tick(tick);
                    if let Some(note) = copy.as_note_mut() {
                        note.duration = durations.get(note.duration as i64).max(0) as u64;
                    }
                }
                copy
            })
            .collect::<Vec<_>>();
        self.collect_into_derived(snapped)
    }
}

/// `value + delta`, or `None` if the result leaves `0..=i64::MAX`
fn offset(value: u64, delta: i64) -> Option<u64> {
    i64::try_from(value)
        .ok()
        .and_then(|v| v.checked_add(delta))
        .and_then(|v| u64::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use crate::analysis::Cluster;
    use crate::models::{ChannelEvent, MetaEvent, Note, TimeSignature};
    use crate::Midi;

    fn notes(midi: &Midi) -> Vec<(u64, u8, u8, u64)> {
        midi.notes()
            .map(|(tick, n)| (tick, n.channel, n.key, n.duration))
            .collect()
    }

    fn sample() -> Midi {
        let mut midi = Midi::new();
        midi.add(midi.stamp(0, Note::new(0, 60, 100, 100)));
        midi.add(midi.stamp(100, Note::new(0, 64, 100, 100)));
        midi.add(midi.stamp(200, Note::new(0, 67, 100, 200)));
        midi.add(midi.stamp(0, MetaEvent::tempo(-1, 500_000)));
        midi
    }

    #[test]
    fn test_transpose() {
        let midi = sample();
        let up = midi.transpose(5).unwrap();
        assert_eq!(
            notes(&up),
            vec![(0, 0, 65, 100), (100, 0, 69, 100), (200, 0, 72, 200)]
        );
        assert_eq!(up.len(), midi.len());
        assert!(up.serials().shares_with(midi.serials()));
    }

    #[test]
    fn test_transpose_rejects_out_of_range() {
        let mut midi = Midi::new();
        midi.add(midi.stamp(0, Note::new(0, 120, 100, 10)));
        assert!(midi.transpose(10).is_none());
        assert!(midi.transpose(-121).is_none());
        assert_eq!(notes(&midi), vec![(0, 0, 120, 10)]);
        assert!(midi.transpose(7).is_some());
    }

    #[test]
    fn test_shift_ticks() {
        let midi = sample();
        assert!(midi.shift_ticks(-1).is_none());
        let later = midi.shift_ticks(50).unwrap();
        assert_eq!(later.first_tick(), Some(50));
        let back = later.shift_ticks(-50).unwrap();
        assert_eq!(notes(&back), notes(&midi));
    }

    #[test]
    fn test_change_duration() {
        let midi = sample();
        assert!(midi.change_duration(-101).is_none());
        let shorter = midi.change_duration(-100).unwrap();
        assert_eq!(
            notes(&shorter),
            vec![(0, 0, 60, 0), (100, 0, 64, 0), (200, 0, 67, 100)]
        );
    }

    #[test]
    fn test_change_channel_skips_meta_groupings() {
        let midi = sample();
        let moved = midi.change_channel(15).unwrap();
        assert!(notes(&moved).iter().all(|n| n.1 == 15));
        assert_eq!(moved.find_controlling_tempo_change(0).unwrap().channel(), -1);
        assert!(midi.change_channel(16).is_none());
        assert!(midi.change_channel(-1).is_none());
    }

    #[test]
    fn test_change_channel_moves_program_changes() {
        let mut midi = Midi::new();
        midi.add(midi.stamp(0, ChannelEvent::program_change(2, 40)));
        let moved = midi.change_channel(1).unwrap();
        assert_eq!(moved.program_at(3, 0), Some(40));
        assert_eq!(moved.program_at(2, 0), None);
    }

    #[test]
    fn test_reverse_time_by_channel() {
        let midi = sample();
        let reversed = midi.reverse_time_by_channel();
        // Window is [0, 400]
        assert_eq!(
            notes(&reversed),
            vec![(0, 0, 67, 200), (200, 0, 64, 100), (300, 0, 60, 100)]
        );
        // A lone event on its channel stays put
        assert_eq!(reversed.find_controlling_tempo_change(0).unwrap().tick(), 0);
    }

    #[test]
    fn test_reverse_pitch_by_channel() {
        let mut midi = sample();
        midi.add(midi.stamp(50, Note::new(1, 40, 100, 10)));
        let reversed = midi.reverse_pitch_by_channel();
        assert_eq!(
            notes(&reversed),
            vec![
                (0, 0, 67, 100),
                (50, 1, 40, 10),
                (100, 0, 64, 100),
                (200, 0, 60, 200)
            ]
        );
    }

    #[test]
    fn test_round_to_measure() {
        let mut midi = Midi::new();
        midi.add(midi.stamp(0, MetaEvent::time_signature(-1, TimeSignature::new(2, 4).unwrap())));
        // 960 ticks per measure
        midi.add(midi.stamp(100, Note::new(0, 60, 100, 100)));
        midi.add(midi.stamp(1000, Note::new(0, 62, 100, 2000)));
        midi.add(midi.stamp(2900, Note::new(0, 64, 100, 10)));

        let window = midi.round_to_measure(1200, 1500);
        assert_eq!(notes(&window), vec![(1000, 0, 62, 920)]);
    }

    #[test]
    fn test_round_to_measure_trims_notes_sounding_into_window() {
        let mut midi = Midi::new();
        midi.add(midi.stamp(0, MetaEvent::time_signature(-1, TimeSignature::new(2, 4).unwrap())));
        midi.add(midi.stamp(0, MetaEvent::tempo(-1, 600_000)));
        midi.add(midi.stamp(500, Note::new(0, 60, 100, 1000)));
        midi.add(midi.stamp(100, Note::new(0, 62, 100, 860)));

        let window = midi.round_to_measure(1200, 1500);
        // The note ending exactly at the window start is gone
        assert_eq!(notes(&window), vec![(960, 0, 60, 540)]);
        assert_eq!(window.ticks_per_measure(960), 960);
        assert_eq!(window.tempo_at(960), 600_000);
        assert_eq!(window.find_controlling_time_signature_change(960).unwrap().tick(), 960);
        assert_eq!(window.first_tick(), Some(960));
    }

    #[test]
    fn test_extreme_deltas_are_rejected() {
        let midi = sample();
        assert!(midi.transpose(i32::MAX).is_none());
        assert!(midi.transpose(i32::MIN).is_none());
        assert!(midi.shift_ticks(i64::MAX).is_none());
        assert!(midi.shift_ticks(i64::MIN).is_none());
        assert!(midi.change_duration(i64::MAX).is_none());
        assert!(midi.change_duration(i64::MIN).is_none());
        assert!(midi.change_channel(i32::MAX).is_none());
        assert!(midi.change_channel(i32::MIN).is_none());
        assert_eq!(notes(&midi), notes(&sample()));
    }

    #[test]
    fn test_quantize_merges_nearby_starts() {
        let mut midi = Midi::new();
        midi.add(midi.stamp(100, Note::new(0, 60, 100, 240)));
        midi.add(midi.stamp(105, Note::new(0, 64, 100, 250)));
        midi.add(midi.stamp(500, Note::new(0, 67, 100, 240)));

        let quantized = midi.quantize(&mut Cluster::new(), &mut Cluster::new());
        assert_eq!(
            notes(&quantized),
            vec![(102, 0, 60, 243), (102, 0, 64, 243), (500, 0, 67, 243)]
        );
    }
}
