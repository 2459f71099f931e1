//! Key signature detection from a pitch-class histogram
//!
//! Each of the 24 major/minor keys is scored by how many notes fall inside
//! its scale and how strongly its tonic triad is present. Scores are ranked
//! by fewest out-of-key notes, then strongest triad, then strongest third.

use serde::{Deserialize, Serialize};
use std::fmt;

const MAJOR_SCALE: [usize; 7] = [0, 2, 4, 5, 7, 9, 11];
const MINOR_SCALE: [usize; 7] = [0, 2, 3, 5, 7, 8, 10];

const MAJOR_NAMES: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B"];
const MINOR_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "Bb", "B"];

/// Signed accidentals (sharps > 0, flats < 0) indexed by tonic pitch class
const MAJOR_ACCIDENTALS: [i8; 12] = [0, -5, 2, -3, 4, -1, 6, 1, -4, 3, -2, 5];
const MINOR_ACCIDENTALS: [i8; 12] = [-3, 4, -1, 6, 1, -4, 3, -2, 5, 0, -5, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySignature {
    /// Pitch class of the tonic, C = 0
    pub tonic: u8,
    pub mode: Mode,
    /// Sharps are positive, flats negative
    pub accidentals: i8,
}

impl KeySignature {
    pub fn major(tonic: u8) -> Self {
        let tonic = tonic % 12;
        Self {
            tonic,
            mode: Mode::Major,
            accidentals: MAJOR_ACCIDENTALS[tonic as usize],
        }
    }

    pub fn minor(tonic: u8) -> Self {
        let tonic = tonic % 12;
        Self {
            tonic,
            mode: Mode::Minor,
            accidentals: MINOR_ACCIDENTALS[tonic as usize],
        }
    }

    /// All twelve major keys followed by all twelve minor keys
    pub fn all() -> Vec<KeySignature> {
        (0..12)
            .map(KeySignature::major)
            .chain((0..12).map(KeySignature::minor))
            .collect()
    }

    /// The key sharing this signature in the other mode
    pub fn relative(&self) -> KeySignature {
        match self.mode {
            Mode::Major => KeySignature::minor(self.tonic + 9),
            Mode::Minor => KeySignature::major(self.tonic + 3),
        }
    }

    pub fn scale(&self) -> [usize; 7] {
        let intervals = match self.mode {
            Mode::Major => MAJOR_SCALE,
            Mode::Minor => MINOR_SCALE,
        };
        intervals.map(|i| (i + self.tonic as usize) % 12)
    }

    pub fn contains(&self, pitch_class: usize) -> bool {
        self.scale().contains(&(pitch_class % 12))
    }

    /// Pitch class of the third above the tonic
    pub fn third(&self) -> usize {
        let interval = match self.mode {
            Mode::Major => 4,
            Mode::Minor => 3,
        };
        (self.tonic as usize + interval) % 12
    }

    pub fn fifth(&self) -> usize {
        (self.tonic as usize + 7) % 12
    }

    pub fn name(&self) -> String {
        match self.mode {
            Mode::Major => format!("{} major", MAJOR_NAMES[self.tonic as usize]),
            Mode::Minor => format!("{} minor", MINOR_NAMES[self.tonic as usize]),
        }
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyScore {
    pub key_signature: KeySignature,
    pub in_key_count: u64,
    pub accidental_count: u64,
    pub tonic_third_count: u64,
    pub tonic_triad_count: u64,
    /// Percentage of notes inside the scale, 0-100
    pub confidence: u32,
    /// Dense rank starting at 1; tied scores share a rank
    pub rank: u32,
}

impl KeyScore {
    pub fn new(key_signature: KeySignature, histogram: &[u64; 12]) -> Self {
        let (mut in_key_count, mut accidental_count) = (0, 0);
        for (pitch_class, count) in histogram.iter().enumerate() {
            if key_signature.contains(pitch_class) {
                in_key_count += count;
            } else {
                accidental_count += count;
            }
        }

        let tonic = histogram[key_signature.tonic as usize];
        let third = histogram[key_signature.third()];
        let fifth = histogram[key_signature.fifth()];
        let total = in_key_count + accidental_count;
        let confidence = if total == 0 {
            0
        } else {
            (100 * in_key_count / total) as u32
        };

        Self {
            key_signature,
            in_key_count,
            accidental_count,
            tonic_third_count: tonic.min(third),
            tonic_triad_count: tonic.min(third).min(fifth),
            confidence,
            rank: 0,
        }
    }

    fn ties_with(&self, other: &KeyScore) -> bool {
        self.accidental_count == other.accidental_count
            && self.tonic_triad_count == other.tonic_triad_count
    }
}

/// Score all 24 keys against `histogram` and rank them
pub fn rank_keys(histogram: &[u64; 12]) -> Vec<KeyScore> {
    let mut scores: Vec<KeyScore> = KeySignature::all()
        .into_iter()
        .map(|key| KeyScore::new(key, histogram))
        .collect();

    scores.sort_by(|a, b| {
        a.accidental_count
            .cmp(&b.accidental_count)
            .then(b.tonic_triad_count.cmp(&a.tonic_triad_count))
            .then(b.tonic_third_count.cmp(&a.tonic_third_count))
    });

    let mut rank = 0;
    for i in 0..scores.len() {
        if i == 0 || !scores[i].ties_with(&scores[i - 1]) {
            rank += 1;
        }
        scores[i].rank = rank;
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c_major_triad() -> [u64; 12] {
        let mut histogram = [0u64; 12];
        histogram[0] = 10;
        histogram[4] = 8;
        histogram[7] = 6;
        histogram
    }

    #[test]
    fn test_twenty_four_keys() {
        let keys = KeySignature::all();
        assert_eq!(keys.len(), 24);
        assert_eq!(keys[0].name(), "C major");
        assert_eq!(keys[12 + 9].name(), "A minor");
    }

    #[test]
    fn test_relative_keys_share_accidentals() {
        for key in KeySignature::all() {
            let relative = key.relative();
            assert_eq!(key.accidentals, relative.accidentals, "{}", key);
            assert_eq!(relative.relative(), key);
            let mut scale = key.scale();
            let mut other = relative.scale();
            scale.sort();
            other.sort();
            assert_eq!(scale, other);
        }
    }

    #[test]
    fn test_scale_membership() {
        let g_major = KeySignature::major(7);
        assert!(g_major.contains(6));
        assert!(!g_major.contains(5));
        assert_eq!(g_major.third(), 11);
        assert_eq!(KeySignature::minor(9).third(), 0);
    }

    #[test]
    fn test_c_major_triad_ranks_first() {
        let scores = rank_keys(&c_major_triad());
        let first = &scores[0];
        assert_eq!(first.key_signature, KeySignature::major(0));
        assert_eq!(first.rank, 1);
        assert_eq!(first.confidence, 100);
        assert_eq!(first.tonic_triad_count, 6);
        assert_eq!(first.tonic_third_count, 8);
        assert_eq!(first.key_signature.relative(), KeySignature::minor(9));

        let a_minor = scores
            .iter()
            .find(|s| s.key_signature == KeySignature::minor(9))
            .unwrap();
        assert_eq!(a_minor.confidence, 100);
        assert_eq!(a_minor.accidental_count, 0);
    }

    #[test]
    fn test_ties_share_rank() {
        let scores = rank_keys(&c_major_triad());
        // F major, G major, A minor, D minor and E minor all contain C, E and
        // G without a complete tonic triad.
        let second: Vec<&KeyScore> = scores.iter().filter(|s| s.rank == 2).collect();
        assert_eq!(second.len(), 5);
        assert!(second.iter().all(|s| s.accidental_count == 0 && s.tonic_triad_count == 0));
    }

    #[test]
    fn test_empty_histogram() {
        let scores = rank_keys(&[0; 12]);
        assert!(scores.iter().all(|s| s.confidence == 0 && s.rank == 1));
    }
}
