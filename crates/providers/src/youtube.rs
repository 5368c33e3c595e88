//! YouTube Data API v3: resumable `videos.insert` and `playlistItems.insert`.

use crate::{
    api_error, request_failed, Authorizer, ChunkOutcome, MediaFile, ProviderError, Token,
    UploadSession, VideoHost, VideoId, VideoMetadata,
};
use bytes::Bytes;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Resumable chunks must be multiples of this size (except the last one).
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Chunks in a row that may come back without the committed offset moving.
const MAX_STALLED_CHUNKS: u32 = 3;

#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub api_base: String,
    pub upload_base: String,
    pub chunk_size: u64,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/youtube/v3".to_string(),
            chunk_size: 32 * CHUNK_GRANULARITY,
        }
    }
}

/// Authorized client for one run.
pub struct YouTubeClient {
    client: Client,
    cfg: Arc<YouTubeConfig>,
    token: Mutex<Token>,
    refresher: Option<Arc<dyn Authorizer>>,
}

impl YouTubeClient {
    pub fn new(cfg: YouTubeConfig, token: Token) -> Result<Self, ProviderError> {
        // A 308 from the upload endpoint is "resume incomplete", not a redirect.
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(request_failed)?;
        Ok(Self {
            client,
            cfg: Arc::new(cfg),
            token: Mutex::new(token),
            refresher: None,
        })
    }

    /// Lets the client renew its access token in memory when it runs out
    /// in the middle of a long run.
    pub fn with_refresher(mut self, refresher: Arc<dyn Authorizer>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut token = self.token.lock().await;
        if token.is_expired() && token.can_refresh() {
            if let Some(refresher) = &self.refresher {
                debug!("access token expired, refreshing");
                *token = refresher.refresh(&token).await?;
            }
        }
        Ok(token.access_token.clone())
    }
}

#[derive(Deserialize)]
struct VideoResource {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId<'a> {
    kind: &'static str,
    video_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet<'a> {
    playlist_id: &'a str,
    resource_id: ResourceId<'a>,
}

#[derive(Serialize)]
struct PlaylistItem<'a> {
    snippet: PlaylistItemSnippet<'a>,
}

#[async_trait::async_trait]
impl VideoHost for YouTubeClient {
    async fn start_upload(
        &self,
        metadata: &VideoMetadata,
        media: &MediaFile,
    ) -> Result<Box<dyn UploadSession>, ProviderError> {
        let access = self.access_token().await?;
        let resp = self
            .client
            .post(format!("{}/videos", self.cfg.upload_base))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&access)
            .header("X-Upload-Content-Length", media.size.to_string())
            .header("X-Upload-Content-Type", media.mime.as_str())
            .json(metadata)
            .send()
            .await
            .map_err(request_failed)?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let session_url = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no upload session URL in response".into())
            })?
            .to_string();
        debug!(%session_url, "resumable session started");

        let file = tokio::fs::File::open(&media.path).await?;
        Ok(Box::new(ResumableUpload {
            client: self.client.clone(),
            session_url,
            file,
            mime: media.mime.clone(),
            total: media.size,
            offset: 0,
            chunk_size: self.cfg.chunk_size.max(CHUNK_GRANULARITY),
            stalled: 0,
        }))
    }

    async fn add_to_playlist(
        &self,
        playlist_id: &str,
        video_id: &VideoId,
    ) -> Result<(), ProviderError> {
        let access = self.access_token().await?;
        let body = PlaylistItem {
            snippet: PlaylistItemSnippet {
                playlist_id,
                resource_id: ResourceId {
                    kind: "youtube#video",
                    video_id: video_id.as_str(),
                },
            },
        };
        let resp = self
            .client
            .post(format!("{}/playlistItems", self.cfg.api_base))
            .query(&[("part", "snippet")])
            .bearer_auth(&access)
            .json(&body)
            .send()
            .await
            .map_err(request_failed)?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }
}

struct ResumableUpload {
    client: Client,
    session_url: String,
    file: tokio::fs::File,
    mime: String,
    total: u64,
    offset: u64,
    chunk_size: u64,
    stalled: u32,
}

#[async_trait::async_trait]
impl UploadSession for ResumableUpload {
    async fn next_chunk(&mut self) -> Result<ChunkOutcome, ProviderError> {
        let len = (self.total - self.offset.min(self.total)).min(self.chunk_size);
        let mut buf = vec![0u8; len as usize];
        if len > 0 {
            self.file.seek(SeekFrom::Start(self.offset)).await?;
            self.file.read_exact(&mut buf).await?;
        }

        let resp = self
            .client
            .put(&self.session_url)
            .header(CONTENT_RANGE, content_range(self.offset, len, self.total))
            .header(CONTENT_TYPE, self.mime.as_str())
            .body(Bytes::from(buf))
            .send()
            .await
            .map_err(request_failed)?;

        let status = resp.status();
        if status == StatusCode::PERMANENT_REDIRECT {
            let committed = resp
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(committed_offset)
                .unwrap_or(0);
            if committed <= self.offset {
                self.stalled += 1;
                warn!(
                    offset = self.offset,
                    committed, "upload chunk was not committed"
                );
                if self.stalled >= MAX_STALLED_CHUNKS {
                    return Err(ProviderError::InvalidResponse(format!(
                        "upload stalled at byte {} of {}",
                        self.offset, self.total
                    )));
                }
            } else {
                self.stalled = 0;
            }
            self.offset = committed;
            return Ok(ChunkOutcome::InProgress {
                uploaded: committed,
                total: self.total,
            });
        }
        if status.is_success() {
            let video: VideoResource = resp.json().await.map_err(request_failed)?;
            return Ok(ChunkOutcome::Complete(VideoId(video.id)));
        }
        Err(api_error(resp).await)
    }
}

/// `Content-Range` value for a chunk of `len` bytes at `offset`.
fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

/// Next byte to send, from a `Range: bytes=0-N` header.
fn committed_offset(range: &str) -> Option<u64> {
    let last = range.trim().strip_prefix("bytes=")?.split('-').nth(1)?;
    last.trim().parse::<u64>().ok().map(|n| n + 1)
}
