//! Per-channel running aggregates over notes
//!
//! `add` is O(1). `remove` is O(1) unless the removed note held an extreme
//! value (first/last/max tick, lowest/highest key), in which case those
//! fields are re-derived from the notes still on the channel.

use serde::{Deserialize, Serialize};

use crate::models::Note;

pub const CHANNEL_COUNT: usize = 16;
pub const KEY_COUNT: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    lowest_key: Option<u8>,
    highest_key: Option<u8>,
    first_tick: Option<u64>,
    last_tick: Option<u64>,
    max_tick: Option<u64>,
    key_count: u64,
    key_duration: u64,
    rest_count: u64,
    rest_duration: u64,
    #[serde(with = "histogram_serde")]
    histogram: [u64; KEY_COUNT],
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            lowest_key: None,
            highest_key: None,
            first_tick: None,
            last_tick: None,
            max_tick: None,
            key_count: 0,
            key_duration: 0,
            rest_count: 0,
            rest_duration: 0,
            histogram: [0; KEY_COUNT],
        }
    }
}

impl Statistics {
    pub fn add(&mut self, tick: u64, note: &Note) {
        let end = tick + note.duration;
        self.lowest_key = Some(self.lowest_key.map_or(note.key, |k| k.min(note.key)));
        self.highest_key = Some(self.highest_key.map_or(note.key, |k| k.max(note.key)));
        self.first_tick = Some(self.first_tick.map_or(tick, |t| t.min(tick)));
        self.last_tick = Some(self.last_tick.map_or(tick, |t| t.max(tick)));
        self.max_tick = Some(self.max_tick.map_or(end, |t| t.max(end)));
        self.key_count += 1;
        self.key_duration += note.duration;
        self.histogram[note.key as usize & 0x7F] += 1;
    }

    /// Undo an [`add`](Self::add). `remaining` yields the notes still on this
    /// channel after the removal and is only walked when an extreme moved.
    pub fn remove<'a, I>(&mut self, tick: u64, note: &Note, remaining: I)
    where
        I: IntoIterator<Item = (u64, &'a Note)>,
    {
        let bucket = &mut self.histogram[note.key as usize & 0x7F];
        *bucket = bucket.saturating_sub(1);
        self.key_count = self.key_count.saturating_sub(1);
        self.key_duration = self.key_duration.saturating_sub(note.duration);

        let end = tick + note.duration;
        let was_extreme = self.lowest_key == Some(note.key)
            || self.highest_key == Some(note.key)
            || self.first_tick == Some(tick)
            || self.last_tick == Some(tick)
            || self.max_tick == Some(end);
        if was_extreme {
            self.rescan(remaining);
        }
    }

    fn rescan<'a, I>(&mut self, remaining: I)
    where
        I: IntoIterator<Item = (u64, &'a Note)>,
    {
        self.lowest_key = None;
        self.highest_key = None;
        self.first_tick = None;
        self.last_tick = None;
        self.max_tick = None;
        for (tick, note) in remaining {
            let end = tick + note.duration;
            self.lowest_key = Some(self.lowest_key.map_or(note.key, |k| k.min(note.key)));
            self.highest_key = Some(self.highest_key.map_or(note.key, |k| k.max(note.key)));
            self.first_tick = Some(self.first_tick.map_or(tick, |t| t.min(tick)));
            self.last_tick = Some(self.last_tick.map_or(tick, |t| t.max(tick)));
            self.max_tick = Some(self.max_tick.map_or(end, |t| t.max(end)));
        }
    }

    /// Record a silence between notes
    pub fn add_rest(&mut self, duration: u64) {
        self.rest_count += 1;
        self.rest_duration += duration;
    }

    pub fn lowest_key(&self) -> Option<u8> {
        self.lowest_key
    }

    pub fn highest_key(&self) -> Option<u8> {
        self.highest_key
    }

    pub fn first_tick(&self) -> Option<u64> {
        self.first_tick
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Largest note end tick
    pub fn max_tick(&self) -> Option<u64> {
        self.max_tick
    }

    pub fn key_count(&self) -> u64 {
        self.key_count
    }

    pub fn key_duration(&self) -> u64 {
        self.key_duration
    }

    pub fn rest_count(&self) -> u64 {
        self.rest_count
    }

    pub fn rest_duration(&self) -> u64 {
        self.rest_duration
    }

    pub fn histogram(&self) -> &[u64; KEY_COUNT] {
        &self.histogram
    }

    pub fn average_duration(&self) -> Option<u64> {
        (self.key_count > 0).then(|| self.key_duration / self.key_count)
    }

    pub fn is_empty(&self) -> bool {
        self.key_count == 0
    }
}

/// Sixteen independent channel statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsManager {
    channels: [Statistics; CHANNEL_COUNT],
}

impl StatisticsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` for channels outside 0-15
    pub fn channel(&self, channel: i32) -> Option<&Statistics> {
        usize::try_from(channel).ok().and_then(|c| self.channels.get(c))
    }

    pub fn channel_mut(&mut self, channel: i32) -> Option<&mut Statistics> {
        usize::try_from(channel).ok().and_then(move |c| self.channels.get_mut(c))
    }

    pub fn highest_key(&self, channel: i32) -> Option<u8> {
        self.channel(channel).and_then(|s| s.highest_key())
    }

    pub fn lowest_key(&self, channel: i32) -> Option<u8> {
        self.channel(channel).and_then(|s| s.lowest_key())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Statistics)> {
        self.channels.iter().enumerate()
    }

    /// Key histogram folded to twelve pitch classes across all channels
    pub fn pitch_class_histogram(&self) -> [u64; 12] {
        let mut classes = [0u64; 12];
        for stats in &self.channels {
            for (key, count) in stats.histogram.iter().enumerate() {
                classes[key % 12] += count;
            }
        }
        classes
    }
}

mod histogram_serde {
    use super::KEY_COUNT;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(histogram: &[u64; KEY_COUNT], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(histogram.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u64; KEY_COUNT], D::Error> {
        let values = Vec::<u64>::deserialize(d)?;
        values
            .try_into()
            .map_err(|v: Vec<u64>| D::Error::invalid_length(v.len(), &"128 histogram buckets"))
    }
}
