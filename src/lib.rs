//! MIDI Studio core
//!
//! The ordered MIDI event model used by the piano roll, staff view, player
//! and jam-session sharing. Raw messages from a Standard MIDI File (or a live
//! input device) are reconstructed into [`Note`]s by the
//! [`NoteBuilder`](midi::NoteBuilder) and kept in a [`Midi`] container that
//! maintains per-channel statistics and "controlling event" indices.

pub mod analysis;
pub mod config;
pub mod error;
pub mod midi;
pub mod models;
pub mod protocol;

// Re-export commonly used types
pub use analysis::{Cluster, KeyScore, KeySignature, Statistics, StatisticsManager};
pub use config::StudioConfig;
pub use error::{Result, StudioError};
pub use midi::{Midi, MidiChange, NoteBuilder};
pub use models::*;
