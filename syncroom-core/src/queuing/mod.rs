mod history;
mod queue;
mod track;

pub use history::*;
pub use queue::*;
pub use track::*;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("There is no queue entry at position {index} (queue has {len})")]
    OutOfRange { index: i64, len: usize },
    #[error("Voting is disabled in this room")]
    VotingDisabled,
}

/// The parts of a room's settings that decide how the queue is consumed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPolicy {
    /// Keep playing the current track instead of advancing
    pub repeat: bool,
    /// Pick the next track at random instead of from the front
    pub shuffle: bool,
    /// Whether members may vote on queued tracks
    pub voting: bool,
}
