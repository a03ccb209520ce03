use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde::Deserialize;
use syncroom_core::TrackMetadata;
use thiserror::Error;

lazy_static! {
    /// Matches the 11 character video id in the common YouTube url shapes
    static ref VIDEO_ID_REGEX: Regex = Regex::new(
        r#"(?:youtube\.com/(?:[^/]+/.+/|(?:v|e(?:mbed)?)/|.*[?&]v=)|youtu\.be/)([^"&?/\s]{11})"#
    )
    .expect("video id regex is valid");
}

const NOEMBED_URL: &str = "https://noembed.com/embed";
const FALLBACK_TITLE: &str = "YouTube video";
const FALLBACK_CHANNEL: &str = "YouTube channel";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to fetch metadata: {0}")]
    FetchError(String),

    #[error("Failed to parse metadata: {0}")]
    ParseError(String),

    #[error("Video is unavailable: {0}")]
    Unavailable(String),
}

/// Looks up the metadata of an external video.
#[async_trait]
pub trait VideoResolver
where
    Self: Send + Sync,
{
    /// Resolves the metadata for the given video id.
    async fn resolve(&self, video_id: &str) -> Result<TrackMetadata, ResolveError>;
}

/// Resolves metadata through the public noembed oEmbed proxy.
#[derive(Debug, Clone, Default)]
pub struct NoembedResolver {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct NoembedResponse {
    title: Option<String>,
    author_name: Option<String>,
    error: Option<String>,
}

impl NoembedResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoResolver for NoembedResolver {
    async fn resolve(&self, video_id: &str) -> Result<TrackMetadata, ResolveError> {
        let watch_url = format!("https://www.youtube.com/watch?v={}", video_id);

        let response: NoembedResponse = self
            .client
            .get(NOEMBED_URL)
            .query(&[("url", watch_url.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ResolveError::FetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| ResolveError::ParseError(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(ResolveError::Unavailable(error));
        }

        let fallback = fallback_metadata(video_id);

        Ok(TrackMetadata {
            title: response.title.unwrap_or(fallback.title),
            channel: response.author_name.unwrap_or(fallback.channel),
            ..fallback
        })
    }
}

/// Extracts the video id from a user supplied reference, if it contains one.
pub fn extract_video_id(reference: &str) -> Option<String> {
    VIDEO_ID_REGEX
        .captures(reference)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The record used when metadata could not be looked up
pub fn fallback_metadata(video_id: &str) -> TrackMetadata {
    TrackMetadata {
        id: video_id.to_string(),
        title: FALLBACK_TITLE.to_string(),
        channel: FALLBACK_CHANNEL.to_string(),
        thumbnail: format!("https://img.youtube.com/vi/{}/mqdefault.jpg", video_id),
    }
}

/// Resolves metadata, recovering from failures and timeouts with [fallback_metadata].
pub async fn resolve_or_fallback(
    resolver: &dyn VideoResolver,
    video_id: &str,
    timeout: Duration,
) -> TrackMetadata {
    match tokio::time::timeout(timeout, resolver.resolve(video_id)).await {
        Ok(Ok(metadata)) => metadata,
        Ok(Err(error)) => {
            warn!("Using placeholder metadata for {}: {}", video_id, error);
            fallback_metadata(video_id)
        }
        Err(_) => {
            warn!(
                "Using placeholder metadata for {}: lookup took longer than {:?}",
                video_id, timeout
            );
            fallback_metadata(video_id)
        }
    }
}
