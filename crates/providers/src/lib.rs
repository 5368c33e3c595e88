//! Provider abstractions for the video platform: authorization and uploads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub mod oauth;
pub mod youtube;

pub use oauth::Token;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("api returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn request_failed(e: reqwest::Error) -> ProviderError {
    ProviderError::RequestFailed(e.to_string())
}

pub(crate) async fn api_error(resp: reqwest::Response) -> ProviderError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ProviderError::Api { status, body }
}

/// Platform-assigned id of a created video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Unlisted,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    pub description: String,
    pub category_id: String,
}

/// Status part of a create-video request.
///
/// Only [`VideoStatus::unlisted`] builds one: every upload is unlisted and
/// declared as not made for kids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    privacy_status: PrivacyStatus,
    self_declared_made_for_kids: bool,
}

impl VideoStatus {
    pub fn unlisted() -> Self {
        Self {
            privacy_status: PrivacyStatus::Unlisted,
            self_declared_made_for_kids: false,
        }
    }

    pub fn privacy_status(&self) -> PrivacyStatus {
        self.privacy_status
    }

    pub fn made_for_kids(&self) -> bool {
        self.self_declared_made_for_kids
    }
}

/// Body of the create-video request (`part=snippet,status`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub snippet: VideoSnippet,
    pub status: VideoStatus,
}

/// Local file handed to the platform.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    InProgress { uploaded: u64, total: u64 },
    Complete(VideoId),
}

impl ChunkOutcome {
    /// Whole-number progress, when it can be computed.
    pub fn percent(&self) -> Option<u8> {
        match self {
            &ChunkOutcome::InProgress { uploaded, total } if total > 0 => {
                Some((uploaded.min(total) * 100 / total) as u8)
            }
            _ => None,
        }
    }
}

/// One in-flight resumable upload.
#[async_trait::async_trait]
pub trait UploadSession: Send {
    /// Sends the next chunk. Returns `Complete` once the platform answers
    /// with the created resource.
    async fn next_chunk(&mut self) -> Result<ChunkOutcome, ProviderError>;
}

#[async_trait::async_trait]
pub trait VideoHost: Send + Sync {
    async fn start_upload(
        &self,
        metadata: &VideoMetadata,
        media: &MediaFile,
    ) -> Result<Box<dyn UploadSession>, ProviderError>;

    async fn add_to_playlist(
        &self,
        playlist_id: &str,
        video_id: &VideoId,
    ) -> Result<(), ProviderError>;
}

/// Produces and renews OAuth2 credentials.
#[async_trait::async_trait]
pub trait Authorizer: Send + Sync {
    /// Interactive consent flow.
    async fn login(&self) -> Result<Token, ProviderError>;
    async fn refresh(&self, token: &Token) -> Result<Token, ProviderError>;
}
