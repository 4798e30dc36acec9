//! Incremental decoder for the sensor's serial object stream.
//!
//! Wire format, all values little-endian u16:
//! - each object block is `SYNC checksum sig x y width height`
//! - a frame boundary is an extra `SYNC` directly before the first block of
//!   the new frame, so two sync words arrive back to back
//! - `checksum` is the low 16 bits of `sig + x + y + width + height`
//!
//! The decoder never fails. Garbage bytes are skipped until the next sync
//! word, and blocks with bad checksums or unknown signatures are dropped
//! and counted. The sensor emits nothing for frames with no visible
//! objects, so only non-empty frames exist on the wire; a completed frame
//! becomes available when the boundary of the following frame arrives.

use std::collections::VecDeque;

use racer_traits::{Detection, Feature};

pub const SYNC_WORD: u16 = 0xaa55;

/// Bytes per block after the leading sync: checksum plus five payload words.
const BLOCK_BYTES: usize = 12;

/// Completed frames kept when the consumer lags; older frames are stale
/// for steering and get dropped first.
const MAX_QUEUED_FRAMES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Scanning byte-by-byte for a sync word.
    Hunting,
    /// Sync consumed; the next word is either another sync (frame
    /// boundary) or a block checksum.
    AfterSync,
    /// Block consumed; the next word must be the next block's sync.
    ExpectSync,
}

#[derive(Debug)]
pub struct BlockDecoder {
    buf: Vec<u8>,
    state: State,
    current: Vec<Detection>,
    frames: VecDeque<Vec<Detection>>,
    dropped_blocks: u64,
}

impl Default for BlockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            state: State::Hunting,
            current: Vec::new(),
            frames: VecDeque::new(),
            dropped_blocks: 0,
        }
    }

    /// Feed raw bytes; completed frames become available via `next_frame`.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.process();
    }

    /// True when at least one completed frame is queued.
    pub fn has_frame(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Oldest completed frame, if any.
    pub fn next_frame(&mut self) -> Option<Vec<Detection>> {
        self.frames.pop_front()
    }

    /// Newest completed frame, discarding anything older.
    pub fn latest_frame(&mut self) -> Option<Vec<Detection>> {
        let last = self.frames.pop_back();
        self.frames.clear();
        last
    }

    /// Blocks dropped so far for bad checksums or unknown signatures.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }

    fn process(&mut self) {
        let mut i = 0;
        loop {
            match self.state {
                State::Hunting => match find_sync(&self.buf[i..]) {
                    Some(off) => {
                        i += off + 2;
                        self.state = State::AfterSync;
                    }
                    None => {
                        // Keep a trailing low sync byte; its partner may be
                        // in the next read.
                        let n = self.buf.len();
                        i = if n > i && self.buf[n - 1] == 0x55 {
                            n - 1
                        } else {
                            n
                        };
                        break;
                    }
                },
                State::AfterSync => {
                    let Some(word) = word_at(&self.buf, i) else {
                        break;
                    };
                    if word == SYNC_WORD {
                        i += 2;
                        self.finish_frame();
                        continue;
                    }
                    if self.buf.len() < i + BLOCK_BYTES {
                        break;
                    }
                    let block = &self.buf[i..i + BLOCK_BYTES];
                    let checksum = word;
                    let sig = u16::from_le_bytes([block[2], block[3]]);
                    let x = u16::from_le_bytes([block[4], block[5]]);
                    let y = u16::from_le_bytes([block[6], block[7]]);
                    let width = u16::from_le_bytes([block[8], block[9]]);
                    let height = u16::from_le_bytes([block[10], block[11]]);
                    i += BLOCK_BYTES;

                    let sum = sig
                        .wrapping_add(x)
                        .wrapping_add(y)
                        .wrapping_add(width)
                        .wrapping_add(height);
                    if sum != checksum {
                        self.dropped_blocks += 1;
                        tracing::warn!(checksum, sum, "block checksum mismatch, resyncing");
                        self.state = State::Hunting;
                        continue;
                    }
                    match Feature::from_signature(sig) {
                        Some(feature) => {
                            self.current.push(Detection {
                                feature,
                                x,
                                y,
                                width,
                                height,
                            });
                            self.state = State::ExpectSync;
                        }
                        None => {
                            // Aligned stream, unknown object class
                            self.dropped_blocks += 1;
                            tracing::debug!(sig, "unknown signature dropped");
                            self.state = State::ExpectSync;
                        }
                    }
                }
                State::ExpectSync => {
                    let Some(word) = word_at(&self.buf, i) else {
                        break;
                    };
                    i += 2;
                    if word == SYNC_WORD {
                        self.state = State::AfterSync;
                    } else {
                        tracing::warn!(word, "stream desynced, hunting");
                        self.state = State::Hunting;
                    }
                }
            }
        }
        self.buf.drain(..i);
    }

    fn finish_frame(&mut self) {
        if self.current.is_empty() {
            return;
        }
        if self.frames.len() == MAX_QUEUED_FRAMES {
            self.frames.pop_front();
            tracing::trace!("stale frame dropped, consumer lagging");
        }
        self.frames.push_back(std::mem::take(&mut self.current));
    }
}

fn find_sync(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == [0x55, 0xaa])
}

fn word_at(buf: &[u8], i: usize) -> Option<u16> {
    let b = buf.get(i..i + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

#[cfg(test)]
mod tests {
    use super::{find_sync, word_at};

    #[test]
    fn sync_found_at_any_byte_offset() {
        assert_eq!(find_sync(&[0x55, 0xaa]), Some(0));
        assert_eq!(find_sync(&[0x00, 0x55, 0xaa]), Some(1));
        assert_eq!(find_sync(&[0xaa, 0x55, 0x00]), None);
        assert_eq!(find_sync(&[0x55]), None);
    }

    #[test]
    fn words_decode_little_endian() {
        assert_eq!(word_at(&[0x55, 0xaa], 0), Some(0xaa55));
        assert_eq!(word_at(&[0x00, 0x34, 0x12], 1), Some(0x1234));
        assert_eq!(word_at(&[0x55], 0), None);
    }
}
