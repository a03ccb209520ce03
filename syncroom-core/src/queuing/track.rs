use serde::{Deserialize, Serialize};

use crate::SessionId;

/// Metadata of an external video, as returned by a resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// The id of the video on the external platform
    pub id: String,
    pub title: String,
    pub channel: String,
    pub thumbnail: String,
}

/// A single track in a queue, or one that was played
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(flatten)]
    pub metadata: TrackMetadata,
    /// Display name of the member who queued the track
    pub added_by: String,
    pub added_by_id: SessionId,
    pub votes: u32,
    pub voters: Vec<SessionId>,
}

/// The direction of a vote on a queued track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

impl Track {
    pub fn new(metadata: TrackMetadata, added_by_id: SessionId, added_by: String) -> Self {
        Self {
            metadata,
            added_by,
            added_by_id,
            votes: 0,
            voters: vec![],
        }
    }

    /// Applies a vote, returning true if the track's votes changed.
    ///
    /// A voter can only ever contribute a single upvote, and can only take back a vote they cast.
    pub(crate) fn apply_vote(&mut self, vote: Vote, voter: SessionId) -> bool {
        let position = self.voters.iter().position(|v| *v == voter);

        match (vote, position) {
            (Vote::Up, None) => {
                self.votes += 1;
                self.voters.push(voter);
                true
            }
            (Vote::Down, Some(index)) => {
                self.votes -= 1;
                self.voters.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Creates a track for tests
    #[cfg(test)]
    pub fn mock(title: &str) -> Self {
        Self::new(
            TrackMetadata {
                id: format!("{:0>11}", title),
                title: title.to_string(),
                channel: "mock".to_string(),
                thumbnail: String::new(),
            },
            SessionId::new(),
            "mock".to_string(),
        )
    }
}
