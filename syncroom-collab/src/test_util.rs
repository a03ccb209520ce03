use std::sync::Arc;

use async_trait::async_trait;
use syncroom_core::TrackMetadata;

use crate::{EventReceiver, ResolveError, ServerEvent, VideoResolver};

/// Resolves every video instantly, titled after its id
pub struct StubResolver;

#[async_trait]
impl VideoResolver for StubResolver {
    async fn resolve(&self, video_id: &str) -> Result<TrackMetadata, ResolveError> {
        Ok(TrackMetadata {
            id: video_id.to_string(),
            title: format!("Video {}", video_id),
            channel: "Stub".to_string(),
            thumbnail: String::new(),
        })
    }
}

/// Takes every event currently waiting in the receiver
pub fn drain(receiver: &mut EventReceiver) -> Vec<Arc<ServerEvent>> {
    let mut events = vec![];

    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }

    events
}
