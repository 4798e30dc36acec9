//! Bounded memory of recent side-feature counts.
//!
//! Feeds the blind-turn vote when the guide line disappears: whichever side
//! produced more features lately is probably where the track bent.

use std::collections::VecDeque;

/// Which way the recent scenery leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lean {
    Left,
    Right,
}

#[derive(Debug)]
pub struct RecentHistory {
    buf: VecDeque<(u32, u32)>,
    cap: usize,
}

impl RecentHistory {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Record one frame's (left, right) feature counts, evicting the oldest
    /// entry once the bound is reached.
    pub fn push(&mut self, left: u32, right: u32) {
        self.buf.push_back((left, right));
        while self.buf.len() > self.cap {
            self.buf.pop_front();
        }
    }

    /// Majority vote over the window. `None` on a tie or empty history.
    pub fn lean(&self) -> Option<Lean> {
        let (mut left, mut right) = (0u64, 0u64);
        for &(l, r) in &self.buf {
            left += u64::from(l);
            right += u64::from(r);
        }
        match left.cmp(&right) {
            std::cmp::Ordering::Greater => Some(Lean::Left),
            std::cmp::Ordering::Less => Some(Lean::Right),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
