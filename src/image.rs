use std::fs;
use std::path::Path;

use log::{info, warn};
use miette::{Result, WrapErr};

use crate::error;
use crate::state::RunState;

/// Program image: a load origin followed by the words stored from there on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    origin: u16,
    words: Vec<u16>,
}

impl Image {
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Parse big-endian words, the first of which is the origin.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(error::image_misaligned(bytes.len()));
        }
        let mut words = bytes
            .chunks_exact(2)
            .map(|word| u16::from_be_bytes([word[0], word[1]]));
        let Some(origin) = words.next() else {
            return Err(error::image_empty());
        };
        Ok(Self {
            origin,
            words: words.collect(),
        })
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| error::image_unreadable(path, e))?;
        Self::from_bytes(&bytes)
            .wrap_err_with(|| format!("Failed to load image {}", path.display()))
    }

    pub fn origin(&self) -> u16 {
        self.origin
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Copy words into memory starting at the origin, returning how many were stored.
    ///
    /// Words which would lie past the end of memory are dropped.
    pub fn load_into(&self, state: &mut RunState) -> usize {
        let mut count = 0;
        for (addr, word) in (self.origin..=u16::MAX).zip(&self.words) {
            state.write(addr, *word);
            count += 1;
        }
        if count < self.words.len() {
            warn!(
                "image at 0x{:04x} truncated: {} of {} words do not fit in memory",
                self.origin,
                self.words.len() - count,
                self.words.len(),
            );
        }
        info!("loaded {count} words at 0x{:04x}", self.origin);
        count
    }
}
