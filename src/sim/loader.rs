//! Program loading.
//!
//! Loads a flat binary of instruction words into the text section and
//! reports the address of the last word, which the drivers use as the
//! bottom of the instruction stack.

use std::fs;
use std::process;

use crate::common::Exception;
use crate::mem::{Memory, MemoryLevel};

/// Reads a flat binary from disk, exiting with a message on failure.
pub fn load_binary(path: &str) -> Vec<u8> {
    match fs::read(path) {
        Ok(data) => data,
        Err(error) => {
            eprintln!("Failed to read {path}: {error}");
            process::exit(1);
        }
    }
}

/// Writes raw bytes into memory starting at `base`. Returns the address
/// of the last full word written.
pub fn write_program(
    memory: &mut MemoryLevel,
    base: u32,
    bytes: &[u8],
) -> Result<u32, Exception> {
    for (offset, byte) in bytes.iter().enumerate() {
        let _ = memory.set_byte(base + offset as u32, *byte)?;
    }
    let words = (bytes.len() as u32) / 4;
    Ok(base + words.saturating_sub(1) * 4)
}

/// Writes already-encoded instruction words into memory starting at
/// `base`. Returns the address of the last word.
pub fn write_words(
    memory: &mut MemoryLevel,
    base: u32,
    words: &[u32],
) -> Result<u32, Exception> {
    for (index, word) in words.iter().enumerate() {
        let _ = memory.set_word(base + (index as u32) * 4, *word as i32)?;
    }
    Ok(base + (words.len() as u32).saturating_sub(1) * 4)
}
