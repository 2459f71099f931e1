//! Embedding a performance in chat messages
//!
//! A container is written as a Standard MIDI File, base64 encoded and split
//! into blocks of `block_size` characters. Each block is sent as
//! `<prefix><number>,<count>=<chunk>` with 1-based block numbers. The
//! receiver collects blocks per transfer and reassembles the text once every
//! block has arrived, in any order.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

use crate::config::StudioConfig;
use crate::error::{Result, StudioError};

use super::Midi;

static BLOCK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+),(\d+)=(.*)$").expect("block header pattern is valid"));

impl Midi {
    pub fn to_base64(&self, config: &StudioConfig) -> Result<String> {
        let bytes = self.to_standard_midi_bytes(config)?;
        Ok(BASE64.encode(bytes))
    }

    pub fn from_base64(text: &str, config: &StudioConfig) -> Result<Midi> {
        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64.decode(cleaned)?;
        Midi::from_standard_midi_bytes(&bytes, config)
    }
}

/// Split `text` into numbered chat blocks
pub fn encode_blocks(config: &StudioConfig, text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<String> = if chars.is_empty() {
        vec![String::new()]
    } else {
        chars
            .chunks(config.block_size.max(1))
            .map(|chunk| chunk.iter().collect())
            .collect()
    };

    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| format!("{}{},{}={}", config.block_prefix, index + 1, count, chunk))
        .collect()
}

#[derive(Debug, Default)]
struct Transfer {
    count: usize,
    blocks: BTreeMap<usize, String>,
}

/// Reassembles block streams, one per transfer id
#[derive(Debug)]
pub struct BlockAssembler {
    prefix: String,
    transfers: HashMap<String, Transfer>,
}

impl BlockAssembler {
    pub fn new(config: &StudioConfig) -> Self {
        Self {
            prefix: config.block_prefix.clone(),
            transfers: HashMap::new(),
        }
    }

    /// True if `message` carries a block rather than ordinary chat text
    pub fn is_block(&self, message: &str) -> bool {
        message.starts_with(&self.prefix)
    }

    /// Take one block. Returns the full text once the last missing block of
    /// `transfer_id` arrives.
    pub fn accept(&mut self, transfer_id: &str, message: &str) -> Result<Option<String>> {
        let body = message
            .strip_prefix(&self.prefix)
            .ok_or_else(|| StudioError::MalformedBlock(format!("missing prefix {:?}", self.prefix)))?;
        let captures = BLOCK_HEADER
            .captures(body)
            .ok_or_else(|| StudioError::MalformedBlock(format!("bad block header in {:?}", truncate(body))))?;

        let number: usize = captures[1]
            .parse()
            .map_err(|e| StudioError::MalformedBlock(format!("block number: {}", e)))?;
        let count: usize = captures[2]
            .parse()
            .map_err(|e| StudioError::MalformedBlock(format!("block count: {}", e)))?;
        if count == 0 || number == 0 || number > count {
            return Err(StudioError::MalformedBlock(format!("block {} of {}", number, count)));
        }

        let transfer = self.transfers.entry(transfer_id.to_string()).or_default();
        if transfer.count == 0 {
            transfer.count = count;
        } else if transfer.count != count {
            return Err(StudioError::MalformedBlock(format!(
                "transfer {} announced {} blocks, now {}",
                transfer_id, transfer.count, count
            )));
        }
        transfer.blocks.insert(number, captures[3].to_string());
        log::debug!(
            "Transfer {}: block {}/{} ({} received)",
            transfer_id,
            number,
            count,
            transfer.blocks.len()
        );

        if transfer.blocks.len() < transfer.count {
            return Ok(None);
        }
        let complete = self.transfers.remove(transfer_id).unwrap_or_default();
        Ok(Some(complete.blocks.into_values().collect()))
    }

    /// Transfers still waiting for blocks
    pub fn pending(&self) -> usize {
        self.transfers.len()
    }

    pub fn discard(&mut self, transfer_id: &str) -> bool {
        self.transfers.remove(transfer_id).is_some()
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(32).collect()
}
