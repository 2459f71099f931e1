//! Event model
//!
//! The four event variants (sysex, meta, channel voice, note), the shared
//! [`Midel`] wrapper that orders them, and the serial number generator.

pub mod channel_event;
pub mod meta_event;
pub mod midel;
pub mod note;
pub mod serial;

// Re-export commonly used types
pub use channel_event::ChannelEvent;
pub use meta_event::{MetaEvent, SysexEvent, TimeSignature, DEFAULT_TEMPO_MPQ};
pub use midel::{Midel, MidelKind, SequenceClass, SortKey};
pub use note::{key_name, Note};
pub use serial::SerialNumbers;
