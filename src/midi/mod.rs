//! The `Midi` container
//!
//! An ordered set of [`Midel`]s plus the indices the editor and player query
//! on every frame:
//!
//! - program changes ordered by channel, then event order
//! - tempo changes and time signature changes in event order
//! - per-channel [`Statistics`](crate::analysis::Statistics) over notes
//!
//! Every mutation goes through [`Midi::add`] or [`Midi::remove`], which keep
//! the indices and statistics in step with the main set and notify
//! subscribers. Events inside the container are only handed out as
//! `&Midel`; to change one, clone it, edit the clone, remove the original and
//! add the clone.

pub mod codec;
pub mod embed;
pub mod listener;
pub mod note_builder;
pub mod smf;
pub mod transforms;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::analysis::{rank_keys, KeyScore, StatisticsManager};
use crate::config::DEFAULT_RESOLUTION;
use crate::models::{Midel, MidelKind, Note, SerialNumbers, SortKey, TimeSignature, DEFAULT_TEMPO_MPQ};

pub use embed::{encode_blocks, BlockAssembler};
pub use listener::{ListenerId, MidiChange};
pub use note_builder::NoteBuilder;

use listener::Listeners;

pub struct Midi {
    events: BTreeMap<SortKey, Midel>,
    program_changes: BTreeSet<(i32, SortKey)>,
    tempo_changes: BTreeSet<SortKey>,
    time_signature_changes: BTreeSet<SortKey>,
    statistics: StatisticsManager,
    serials: SerialNumbers,
    /// Ticks per quarter note
    resolution: u16,
    ticks_per_letter: Option<u64>,
    version: Option<String>,
    listeners: Listeners,
}

impl Default for Midi {
    fn default() -> Self {
        Self::new()
    }
}

impl Midi {
    pub fn new() -> Self {
        Self::with_serials(SerialNumbers::new(), DEFAULT_RESOLUTION)
    }

    /// Empty container drawing serials from `serials`
    pub fn with_serials(serials: SerialNumbers, resolution: u16) -> Self {
        Self {
            events: BTreeMap::new(),
            program_changes: BTreeSet::new(),
            tempo_changes: BTreeSet::new(),
            time_signature_changes: BTreeSet::new(),
            statistics: StatisticsManager::new(),
            serials,
            resolution,
            ticks_per_letter: None,
            version: None,
            listeners: Listeners::default(),
        }
    }

    /// Empty container sharing this one's serial counter, resolution and
    /// file metadata, with no listeners
    pub fn derived(&self) -> Midi {
        let mut midi = Midi::with_serials(self.serials.clone(), self.resolution);
        midi.ticks_per_letter = self.ticks_per_letter;
        midi.version = self.version.clone();
        midi
    }

    pub fn serials(&self) -> &SerialNumbers {
        &self.serials
    }

    /// New event at `tick` with a serial from this container's counter. The
    /// event is not added.
    pub fn stamp(&self, tick: u64, kind: impl Into<MidelKind>) -> Midel {
        self.serials.stamp(tick, kind)
    }

    pub fn resolution(&self) -> u16 {
        self.resolution
    }

    /// Application version found in the vendor marker of a loaded file
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub(crate) fn set_version(&mut self, version: String) {
        self.version = Some(version);
    }

    /// Average ticks between lyric syllables, estimated while loading
    pub fn ticks_per_letter(&self) -> Option<u64> {
        self.ticks_per_letter
    }

    pub(crate) fn set_ticks_per_letter(&mut self, ticks: Option<u64>) {
        self.ticks_per_letter = ticks;
    }

    /// Insert `event`. Returns false, leaving the container untouched, if an
    /// equal event is already present.
    pub fn add(&mut self, event: Midel) -> bool {
        let key = event.sort_key();
        if self.events.contains_key(&key) {
            return false;
        }

        self.index(&event, key);
        if let Some(note) = event.as_note() {
            if let Some(stats) = self.statistics.channel_mut(event.channel()) {
                stats.add(event.tick(), note);
            }
        }

        let event = self.events.entry(key).or_insert(event);
        self.listeners.notify(&MidiChange::Added(event));
        true
    }

    /// Remove the event equal to `event` and hand it back
    pub fn remove(&mut self, event: &Midel) -> Option<Midel> {
        let key = event.sort_key();
        let removed = self.events.remove(&key)?;
        self.unindex(&removed, key);

        if let Some(note) = removed.as_note() {
            let channel = removed.channel();
            if let Some(stats) = self.statistics.channel_mut(channel) {
                let remaining = self
                    .events
                    .values()
                    .filter(|e| e.channel() == channel)
                    .filter_map(|e| e.as_note().map(|n| (e.tick(), n)));
                stats.remove(removed.tick(), note, remaining);
            }
        }

        self.listeners.notify(&MidiChange::Removed(&removed));
        Some(removed)
    }

    fn index(&mut self, event: &Midel, key: SortKey) {
        if event.is_program_change() {
            self.program_changes.insert((event.channel(), key));
        } else if event.tempo_mpq().is_some() {
            self.tempo_changes.insert(key);
        } else if event.time_signature().is_some() {
            self.time_signature_changes.insert(key);
        }
    }

    fn unindex(&mut self, event: &Midel, key: SortKey) {
        if event.is_program_change() {
            self.program_changes.remove(&(event.channel(), key));
        } else if event.tempo_mpq().is_some() {
            self.tempo_changes.remove(&key);
        } else if event.time_signature().is_some() {
            self.time_signature_changes.remove(&key);
        }
    }

    /// Paste every event of `other`, moving tick `min_tick` to
    /// `current_tick`. Events that would land before tick 0 are skipped.
    /// Each pasted copy is also added to `accumulator` when given. Returns
    /// the number of events added to `self`.
    pub fn add_from(
        &mut self,
        other: &Midi,
        min_tick: u64,
        current_tick: u64,
        mut accumulator: Option<&mut Midi>,
    ) -> usize {
        let mut added = 0;
        for event in other.iter() {
            let tick = event.tick() as i128 - min_tick as i128 + current_tick as i128;
            if tick < 0 {
                log::warn!(
                    "Skipping pasted event at tick {}: would land at {}",
                    event.tick(),
                    tick
                );
                continue;
            }
            let copy = event.clone().with_tick(tick as u64);
            if let Some(acc) = accumulator.as_deref_mut() {
                acc.add(copy.clone());
            }
            if self.add(copy) {
                added += 1;
            }
        }
        added
    }

    /// Register a callback for every subsequent add and remove
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&MidiChange<'_>) + 'static,
    {
        self.listeners.subscribe(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, event: &Midel) -> bool {
        self.events.contains_key(&event.sort_key())
    }

    /// All events in order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Midel> + '_ {
        self.events.values()
    }

    /// Events with `first <= tick <= last`; empty when `first > last`
    pub fn range(&self, first: u64, last: u64) -> impl DoubleEndedIterator<Item = &Midel> + '_ {
        (first <= last)
            .then(|| self.events.range(SortKey::floor(first)..=SortKey::ceiling(last)))
            .into_iter()
            .flatten()
            .map(|(_, event)| event)
    }

    pub fn notes(&self) -> impl Iterator<Item = (u64, &Note)> + '_ {
        self.events
            .values()
            .filter_map(|e| e.as_note().map(|n| (e.tick(), n)))
    }

    pub fn events_on_channel(&self, channel: i32) -> impl Iterator<Item = &Midel> + '_ {
        self.events.values().filter(move |e| e.channel() == channel)
    }

    /// Distinct assigned channels, ascending (negative meta groupings first)
    pub fn channels(&self) -> BTreeSet<i32> {
        self.events.values().map(|e| e.channel()).collect()
    }

    pub fn first_tick(&self) -> Option<u64> {
        self.events.values().next().map(|e| e.tick())
    }

    /// Largest end tick (note starts plus durations)
    pub fn last_tick(&self) -> Option<u64> {
        self.events.values().map(|e| e.end_tick()).max()
    }

    /// Program change in effect on `channel` at `tick`
    pub fn find_controlling_program_change(&self, channel: i32, tick: u64) -> Option<&Midel> {
        let (found_channel, key) = self
            .program_changes
            .range(..=(channel, SortKey::ceiling(tick)))
            .next_back()?;
        if *found_channel != channel {
            return None;
        }
        self.events.get(key)
    }

    pub fn find_controlling_tempo_change(&self, tick: u64) -> Option<&Midel> {
        let key = self.tempo_changes.range(..=SortKey::ceiling(tick)).next_back()?;
        self.events.get(key)
    }

    pub fn find_controlling_time_signature_change(&self, tick: u64) -> Option<&Midel> {
        let key = self
            .time_signature_changes
            .range(..=SortKey::ceiling(tick))
            .next_back()?;
        self.events.get(key)
    }

    /// Microseconds per quarter note in effect at `tick`
    pub fn tempo_at(&self, tick: u64) -> u32 {
        self.find_controlling_tempo_change(tick)
            .and_then(|e| e.tempo_mpq())
            .unwrap_or(DEFAULT_TEMPO_MPQ)
    }

    pub fn time_signature_at(&self, tick: u64) -> TimeSignature {
        self.find_controlling_time_signature_change(tick)
            .and_then(|e| e.time_signature())
            .unwrap_or_default()
    }

    pub fn program_at(&self, channel: i32, tick: u64) -> Option<u8> {
        self.find_controlling_program_change(channel, tick)
            .and_then(|e| e.program())
    }

    pub fn ticks_per_measure(&self, tick: u64) -> u64 {
        self.time_signature_at(tick).ticks_per_measure(self.resolution).max(1)
    }

    /// Note on `key` whose start is closest to `tick`; ties go to the
    /// earlier note
    pub fn nearest_note(&self, tick: u64, key: u8) -> Option<&Midel> {
        let on_key = |e: &&Midel| e.as_note().map_or(false, |n| n.key == key);
        let before = self
            .events
            .range(..SortKey::floor(tick))
            .map(|(_, e)| e)
            .rev()
            .find(on_key);
        let after = self
            .events
            .range(SortKey::floor(tick)..)
            .map(|(_, e)| e)
            .find(on_key);
        match (before, after) {
            (Some(b), Some(a)) => {
                if tick - b.tick() <= a.tick() - tick {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }

    pub fn statistics(&self) -> &StatisticsManager {
        &self.statistics
    }

    pub(crate) fn record_rest(&mut self, channel: i32, duration: u64) {
        if let Some(stats) = self.statistics.channel_mut(channel) {
            stats.add_rest(duration);
        }
    }

    /// All 24 keys scored against the notes in the container, best first
    pub fn key_scores(&self) -> Vec<KeyScore> {
        rank_keys(&self.statistics.pitch_class_histogram())
    }
}

/// Copies events, indices and statistics; listeners stay with the original
impl Clone for Midi {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            program_changes: self.program_changes.clone(),
            tempo_changes: self.tempo_changes.clone(),
            time_signature_changes: self.time_signature_changes.clone(),
            statistics: self.statistics.clone(),
            serials: self.serials.clone(),
            resolution: self.resolution,
            ticks_per_letter: self.ticks_per_letter,
            version: self.version.clone(),
            listeners: Listeners::default(),
        }
    }
}

impl fmt::Debug for Midi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Midi")
            .field("events", &self.events.len())
            .field("program_changes", &self.program_changes.len())
            .field("tempo_changes", &self.tempo_changes.len())
            .field("time_signature_changes", &self.time_signature_changes.len())
            .field("resolution", &self.resolution)
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelEvent, MetaEvent};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn note(midi: &Midi, tick: u64, channel: u8, key: u8) -> Midel {
        midi.stamp(tick, Note::new(channel, key, 100, 120))
    }

    #[test]
    fn test_add_is_idempotent_for_equal_notes() {
        let mut midi = Midi::new();
        assert!(midi.add(note(&midi, 0, 0, 60)));
        assert!(!midi.add(note(&midi, 0, 0, 60)));
        assert_eq!(midi.len(), 1);
        assert_eq!(midi.statistics().channel(0).unwrap().key_count(), 1);
    }

    #[test]
    fn test_events_with_distinct_serials_coexist() {
        let mut midi = Midi::new();
        let a = midi.stamp(0, MetaEvent::lyric(0, "la"));
        let b = midi.stamp(0, MetaEvent::lyric(0, "la"));
        assert!(midi.add(a.clone()));
        assert!(midi.add(b));
        assert!(!midi.add(a));
        assert_eq!(midi.len(), 2);
    }

    #[test]
    fn test_remove_by_value() {
        let mut midi = Midi::new();
        midi.add(note(&midi, 10, 0, 60));
        // A different serial still finds the note
        let removed = midi.remove(&note(&midi, 10, 0, 60));
        assert!(removed.is_some());
        assert!(midi.is_empty());
        assert!(midi.remove(&note(&midi, 10, 0, 60)).is_none());
    }

    #[test]
    fn test_highest_key_after_removing_maximum() {
        let mut midi = Midi::new();
        let high = note(&midi, 0, 3, 90);
        midi.add(high.clone());
        midi.add(note(&midi, 100, 3, 70));
        midi.add(note(&midi, 200, 3, 50));
        assert_eq!(midi.statistics().highest_key(3), Some(90));

        midi.remove(&high);
        assert_eq!(midi.statistics().highest_key(3), Some(70));
        assert_eq!(midi.statistics().channel(3).unwrap().first_tick(), Some(100));
    }

    #[test]
    fn test_range() {
        let mut midi = Midi::new();
        for tick in [0, 100, 200, 300] {
            midi.add(note(&midi, tick, 0, 60));
        }
        let ticks: Vec<u64> = midi.range(100, 200).map(|e| e.tick()).collect();
        assert_eq!(ticks, vec![100, 200]);
        assert_eq!(midi.range(300, 100).count(), 0);
        assert_eq!(midi.range(301, 400).count(), 0);
    }

    #[test]
    fn test_controlling_program_change_is_per_channel() {
        let mut midi = Midi::new();
        midi.add(midi.stamp(0, ChannelEvent::program_change(1, 10)));
        midi.add(midi.stamp(400, ChannelEvent::program_change(2, 20)));
        midi.add(midi.stamp(600, ChannelEvent::program_change(2, 30)));
        midi.add(midi.stamp(100, ChannelEvent::program_change(3, 40)));

        assert_eq!(midi.program_at(2, 500), Some(20));
        assert_eq!(midi.program_at(2, 600), Some(30));
        assert_eq!(midi.program_at(2, 399), None);
        assert_eq!(midi.program_at(1, 10_000), Some(10));
        assert_eq!(midi.program_at(4, 500), None);
        assert_eq!(midi.program_at(-1, 500), None);
    }

    #[test]
    fn test_tempo_and_time_signature_defaults() {
        let mut midi = Midi::new();
        assert_eq!(midi.tempo_at(0), DEFAULT_TEMPO_MPQ);
        assert_eq!(midi.time_signature_at(0), TimeSignature::default());
        assert_eq!(midi.ticks_per_measure(0), 1920);

        midi.add(midi.stamp(960, MetaEvent::tempo(-1, 400_000)));
        let three_four = TimeSignature::new(3, 4).unwrap();
        midi.add(midi.stamp(960, MetaEvent::time_signature(-1, three_four)));
        assert_eq!(midi.tempo_at(959), DEFAULT_TEMPO_MPQ);
        assert_eq!(midi.tempo_at(960), 400_000);
        assert_eq!(midi.time_signature_at(5000), three_four);
        assert_eq!(midi.ticks_per_measure(960), 1440);
    }

    #[test]
    fn test_removing_indexed_events_updates_indices() {
        let mut midi = Midi::new();
        let tempo = midi.stamp(0, MetaEvent::tempo(0, 300_000));
        let program = midi.stamp(0, ChannelEvent::program_change(0, 7));
        midi.add(tempo.clone());
        midi.add(program.clone());
        midi.remove(&tempo);
        midi.remove(&program);
        assert_eq!(midi.tempo_at(10), DEFAULT_TEMPO_MPQ);
        assert_eq!(midi.program_at(0, 10), None);
    }

    #[test]
    fn test_add_from_rebases_ticks() {
        let mut source = Midi::new();
        source.add(note(&source, 1000, 0, 60));
        source.add(note(&source, 1200, 0, 62));
        source.add(note(&source, 100, 0, 64));

        let mut target = source.derived();
        let mut pasted = source.derived();
        let added = target.add_from(&source, 1000, 0, Some(&mut pasted));
        assert_eq!(added, 2);
        let ticks: Vec<u64> = target.iter().map(|e| e.tick()).collect();
        assert_eq!(ticks, vec![0, 200]);
        assert_eq!(pasted.len(), 2);
        // Source is untouched
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_listeners_see_changes_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut midi = Midi::new();
        let sink = Rc::clone(&seen);
        let id = midi.subscribe(move |change| {
            sink.borrow_mut().push((change.is_added(), change.event().tick()));
        });

        let first = note(&midi, 5, 0, 60);
        midi.add(first.clone());
        midi.add(note(&midi, 7, 0, 61));
        midi.add(first.clone());
        midi.remove(&first);
        assert_eq!(*seen.borrow(), vec![(true, 5), (true, 7), (false, 5)]);

        assert!(midi.unsubscribe(id));
        midi.add(first);
        assert_eq!(seen.borrow().len(), 3);
        assert!(!midi.unsubscribe(id));
    }

    #[test]
    fn test_nearest_note() {
        let mut midi = Midi::new();
        midi.add(note(&midi, 100, 0, 60));
        midi.add(note(&midi, 300, 0, 60));
        midi.add(note(&midi, 190, 0, 61));

        assert_eq!(midi.nearest_note(180, 60).map(|e| e.tick()), Some(100));
        assert_eq!(midi.nearest_note(210, 60).map(|e| e.tick()), Some(300));
        assert_eq!(midi.nearest_note(200, 60).map(|e| e.tick()), Some(100));
        assert_eq!(midi.nearest_note(0, 61).map(|e| e.tick()), Some(190));
        assert!(midi.nearest_note(0, 62).is_none());
    }

    #[test]
    fn test_channels_and_extents() {
        let mut midi = Midi::new();
        assert_eq!(midi.first_tick(), None);
        midi.add(midi.stamp(0, MetaEvent::lyric(-2, "x")));
        midi.add(note(&midi, 50, 4, 60));
        midi.add(note(&midi, 10, 1, 60));
        let channels: Vec<i32> = midi.channels().into_iter().collect();
        assert_eq!(channels, vec![-2, 1, 4]);
        assert_eq!(midi.first_tick(), Some(0));
        assert_eq!(midi.last_tick(), Some(170));
        assert_eq!(midi.events_on_channel(4).count(), 1);
    }

    #[test]
    fn test_key_scores_from_container() {
        let mut midi = Midi::new();
        for (i, key) in [60u8, 64, 67, 72].iter().enumerate() {
            midi.add(note(&midi, i as u64 * 100, 0, *key));
        }
        let best = &midi.key_scores()[0];
        assert_eq!(best.rank, 1);
        assert_eq!(best.confidence, 100);
        assert_eq!(best.key_signature.name(), "C major");
    }

    #[test]
    fn test_clone_drops_listeners() {
        let mut midi = Midi::new();
        midi.subscribe(|_| {});
        midi.add(note(&midi, 0, 0, 60));
        let copy = midi.clone();
        assert_eq!(copy.len(), 1);
        assert_eq!(copy.listener_count(), 0);
        assert!(copy.serials().shares_with(midi.serials()));
    }
}
