use rand::Rng;

use crate::{PlaybackPolicy, QueueError, SessionId, Track, Vote};

/// An ordered queue of tracks waiting to be played.
///
/// The queue is plain data. Whoever owns it is responsible for making sure
/// it is only mutated by one caller at a time.
#[derive(Debug, Default, Clone)]
pub struct PlaybackQueue {
    items: Vec<Track>,
}

/// The outcome of asking a queue for the track to play next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Repeat is enabled, so the current track plays again
    Repeat(Track),
    /// A track was taken out of the queue
    Next(Track),
    /// There is nothing left to play
    Exhausted,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a track to the end of the queue, without any votes.
    pub fn append(&mut self, mut track: Track) {
        track.votes = 0;
        track.voters.clear();

        self.items.push(track);
    }

    /// Removes the track at the given position.
    pub fn remove_at(&mut self, index: i64) -> Result<Track, QueueError> {
        let index = self.checked_index(index)?;
        Ok(self.items.remove(index))
    }

    /// Moves a track to a new position, keeping the order of everything else.
    pub fn reorder(&mut self, from: i64, to: i64) -> Result<(), QueueError> {
        let from = self.checked_index(from)?;
        let to = self.checked_index(to)?;

        let track = self.items.remove(from);
        self.items.insert(to, track);

        Ok(())
    }

    /// Votes on a track, then sorts the queue so the most voted tracks come first.
    ///
    /// The sort is stable, so tracks with equal votes keep their relative order.
    pub fn vote(
        &mut self,
        index: i64,
        vote: Vote,
        voter: SessionId,
        policy: PlaybackPolicy,
    ) -> Result<(), QueueError> {
        let index = self.checked_index(index)?;

        if !policy.voting {
            return Err(QueueError::VotingDisabled);
        }

        self.items[index].apply_vote(vote, voter);
        self.items.sort_by(|a, b| b.votes.cmp(&a.votes));

        Ok(())
    }

    /// Removes every track from the queue.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Selects the next track to play according to the policy, using the thread rng for shuffling.
    pub fn select_next(&mut self, policy: PlaybackPolicy, current: Option<&Track>) -> Selection {
        self.select_next_with(policy, current, &mut rand::thread_rng())
    }

    /// Same as [PlaybackQueue::select_next], with a custom source of randomness.
    pub fn select_next_with<R>(
        &mut self,
        policy: PlaybackPolicy,
        current: Option<&Track>,
        rng: &mut R,
    ) -> Selection
    where
        R: Rng + ?Sized,
    {
        if policy.repeat {
            if let Some(current) = current {
                return Selection::Repeat(current.clone());
            }
        }

        if self.items.is_empty() {
            return Selection::Exhausted;
        }

        let index = if policy.shuffle {
            rng.gen_range(0..self.items.len())
        } else {
            0
        };

        Selection::Next(self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.items.get(index)
    }

    /// Returns a copy of the queued tracks, in order
    pub fn tracks(&self) -> Vec<Track> {
        self.items.clone()
    }

    fn checked_index(&self, index: i64) -> Result<usize, QueueError> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.items.len())
            .ok_or(QueueError::OutOfRange {
                index,
                len: self.items.len(),
            })
    }
}
