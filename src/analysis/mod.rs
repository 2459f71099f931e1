//! Derived data over the event model: per-channel statistics, value
//! clustering for quantization and key-signature detection.

pub mod cluster;
pub mod key_score;
pub mod statistics;

pub use cluster::Cluster;
pub use key_score::{rank_keys, KeyScore, KeySignature, Mode};
pub use statistics::{Statistics, StatisticsManager, CHANNEL_COUNT};
