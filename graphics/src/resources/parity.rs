//! A small stateful object reachable through the handle table.
//!
//! It remembers the last number it was asked about and a bounded history of
//! answers, which makes it a cheap check of handle lifecycle across workers.

use std::collections::VecDeque;

/// Answers kept by [`ParityTracker::history`].
pub const HISTORY_LIMIT: usize = 4096;

#[derive(Debug, Default)]
pub struct ParityTracker {
    last_number: Option<u32>,
    queries: u64,
    history: VecDeque<u8>,
}

impl ParityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `number` and report whether it is even.
    pub fn is_even(&mut self, number: u32) -> bool {
        let even = number % 2 == 0;
        self.last_number = Some(number);
        self.queries += 1;
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(u8::from(even));
        even
    }

    pub fn last_number(&self) -> Option<u32> {
        self.last_number
    }

    pub fn queries(&self) -> u64 {
        self.queries
    }

    /// One byte per recent answer, oldest first: 1 for even, 0 for odd.
    pub fn history(&self) -> Vec<u8> {
        self.history.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_last_number() {
        let mut tracker = ParityTracker::new();
        assert_eq!(tracker.last_number(), None);
        assert!(tracker.is_even(4));
        assert!(!tracker.is_even(7));
        assert_eq!(tracker.last_number(), Some(7));
        assert_eq!(tracker.queries(), 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = ParityTracker::new();
        for n in 0..HISTORY_LIMIT as u32 + 3 {
            tracker.is_even(n);
        }
        let history = tracker.history();
        assert_eq!(history.len(), HISTORY_LIMIT);
        // 0, 1 and 2 were dropped; the oldest kept answer is for 3.
        assert_eq!(&history[..2], &[0, 1]);
    }
}
