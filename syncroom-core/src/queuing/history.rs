use std::collections::VecDeque;

use crate::Track;

/// The tracks a room played most recently, newest first
#[derive(Debug, Clone)]
pub struct History {
    capacity: usize,
    items: VecDeque<Track>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Records a track as the most recently played, dropping the oldest when full.
    pub fn push(&mut self, track: Track) {
        self.items.push_front(track);
        self.items.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }
}
