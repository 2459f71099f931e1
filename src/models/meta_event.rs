//! Meta and system-exclusive events
//!
//! Meta events carry an assigned `channel` that only decides which track they
//! are written to. Tracks without notes get negative channels, so this is an
//! `i32` rather than a voice channel.

use serde::{Deserialize, Serialize};

pub const META_TEXT: u8 = 0x01;
pub const META_TRACK_NAME: u8 = 0x03;
pub const META_LYRIC: u8 = 0x05;
pub const META_END_OF_TRACK: u8 = 0x2F;
pub const META_TEMPO: u8 = 0x51;
pub const META_TIME_SIGNATURE: u8 = 0x58;
pub const META_KEY_SIGNATURE: u8 = 0x59;
pub const META_SEQUENCER_SPECIFIC: u8 = 0x7F;

/// Microseconds per quarter note at 120 BPM
pub const DEFAULT_TEMPO_MPQ: u32 = 500_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaEvent {
    pub channel: i32,
    pub meta_type: u8,
    pub data: Vec<u8>,
}

impl MetaEvent {
    pub fn new(channel: i32, meta_type: u8, data: Vec<u8>) -> Self {
        Self {
            channel,
            meta_type,
            data,
        }
    }

    /// Tempo change in microseconds per quarter note (24-bit)
    pub fn tempo(channel: i32, mpq: u32) -> Self {
        let mpq = mpq.min(0x00FF_FFFF);
        Self::new(
            channel,
            META_TEMPO,
            vec![(mpq >> 16) as u8, (mpq >> 8) as u8, mpq as u8],
        )
    }

    pub fn time_signature(channel: i32, signature: TimeSignature) -> Self {
        Self::new(
            channel,
            META_TIME_SIGNATURE,
            // 24 MIDI clocks per click, 8 32nd notes per quarter
            vec![signature.numerator, signature.denominator_power(), 24, 8],
        )
    }

    pub fn lyric(channel: i32, text: &str) -> Self {
        Self::new(channel, META_LYRIC, text.as_bytes().to_vec())
    }

    /// Vendor marker identifying files written by this application
    pub fn signature(channel: i32, signature: &str, version: &str) -> Self {
        Self::new(
            channel,
            META_SEQUENCER_SPECIFIC,
            format!("{} {}", signature, version).into_bytes(),
        )
    }

    pub fn is_tempo(&self) -> bool {
        self.meta_type == META_TEMPO && self.data.len() >= 3
    }

    pub fn is_time_signature(&self) -> bool {
        self.meta_type == META_TIME_SIGNATURE && self.data.len() >= 2
    }

    pub fn is_lyric(&self) -> bool {
        self.meta_type == META_LYRIC
    }

    /// Decoded tempo, if this is a tempo change
    pub fn tempo_mpq(&self) -> Option<u32> {
        if !self.is_tempo() {
            return None;
        }
        Some(((self.data[0] as u32) << 16) | ((self.data[1] as u32) << 8) | self.data[2] as u32)
    }

    /// Decoded time signature, if this is a time signature change
    pub fn as_time_signature(&self) -> Option<TimeSignature> {
        if !self.is_time_signature() {
            return None;
        }
        TimeSignature::from_power(self.data[0], self.data[1])
    }

    /// Version string following `signature`, if this is our vendor marker
    pub fn signature_version(&self, signature: &str) -> Option<String> {
        if self.meta_type != META_SEQUENCER_SPECIFIC {
            return None;
        }
        let text = std::str::from_utf8(&self.data).ok()?;
        let rest = text.strip_prefix(signature)?;
        Some(rest.trim().to_string())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Beats per measure over a power-of-two beat unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    /// `None` unless the denominator is a power of two
    pub fn new(numerator: u8, denominator: u8) -> Option<Self> {
        if numerator == 0 || !denominator.is_power_of_two() {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    fn from_power(numerator: u8, power: u8) -> Option<Self> {
        if power > 7 {
            return None;
        }
        Self::new(numerator, 1u8 << power)
    }

    pub fn denominator_power(&self) -> u8 {
        self.denominator.trailing_zeros() as u8
    }

    /// Ticks in one measure at the given resolution (ticks per quarter)
    pub fn ticks_per_measure(&self, resolution: u16) -> u64 {
        resolution as u64 * 4 * self.numerator as u64 / self.denominator as u64
    }
}

/// System exclusive payload; `status` is 0xF0, or 0xF7 for escape packets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SysexEvent {
    pub channel: i32,
    pub status: u8,
    pub data: Vec<u8>,
}

impl SysexEvent {
    pub fn new(channel: i32, data: Vec<u8>) -> Self {
        Self {
            channel,
            status: 0xF0,
            data,
        }
    }

    pub fn escape(channel: i32, data: Vec<u8>) -> Self {
        Self {
            channel,
            status: 0xF7,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_encoding() {
        let tempo = MetaEvent::tempo(0, 500_000);
        assert_eq!(tempo.data, vec![0x07, 0xA1, 0x20]);
        assert_eq!(tempo.tempo_mpq(), Some(500_000));
    }

    #[test]
    fn test_tempo_is_clamped_to_24_bits() {
        let tempo = MetaEvent::tempo(0, u32::MAX);
        assert_eq!(tempo.tempo_mpq(), Some(0x00FF_FFFF));
    }

    #[test]
    fn test_time_signature_encoding() {
        let sig = TimeSignature::new(6, 8).unwrap();
        let meta = MetaEvent::time_signature(0, sig);
        assert_eq!(meta.data, vec![6, 3, 24, 8]);
        assert_eq!(meta.as_time_signature(), Some(sig));
    }

    #[test]
    fn test_time_signature_rejects_non_power_of_two() {
        assert!(TimeSignature::new(3, 6).is_none());
        assert!(TimeSignature::new(0, 4).is_none());
    }

    #[test]
    fn test_ticks_per_measure() {
        assert_eq!(TimeSignature::default().ticks_per_measure(480), 1920);
        assert_eq!(TimeSignature::new(3, 4).unwrap().ticks_per_measure(480), 1440);
        assert_eq!(TimeSignature::new(6, 8).unwrap().ticks_per_measure(480), 1440);
    }

    #[test]
    fn test_signature_version() {
        let marker = MetaEvent::signature(0, "MidiStudio", "1.2");
        assert_eq!(marker.signature_version("MidiStudio"), Some("1.2".to_string()));
        assert_eq!(marker.signature_version("Other"), None);
        assert_eq!(MetaEvent::lyric(0, "la").signature_version("MidiStudio"), None);
    }
}
