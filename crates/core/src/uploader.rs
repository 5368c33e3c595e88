//! Uploads one file: metadata, resumable transfer, playlist attachment.

use crate::config::UploadConfig;
use providers::{
    ChunkOutcome, MediaFile, ProviderError, VideoHost, VideoId, VideoMetadata, VideoSnippet,
    VideoStatus,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const MAX_TITLE_CHARS: usize = 100;
pub const FALLBACK_MIME: &str = "video/*";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("create-video request failed: {0}")]
    Create(#[source] ProviderError),
    #[error("upload transfer failed: {0}")]
    Transfer(#[source] ProviderError),
    #[error("video {video_id} was created but not added to its playlist: {source}")]
    Playlist {
        video_id: VideoId,
        #[source]
        source: ProviderError,
    },
}

impl UploadError {
    /// Id of a video that exists on the platform despite the error.
    pub fn created_video(&self) -> Option<&VideoId> {
        match self {
            UploadError::Playlist { video_id, .. } => Some(video_id),
            _ => None,
        }
    }
}

/// Title from the file name: extension dropped, `<`/`>` removed, at most 100 chars.
pub fn title_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let title: String = stem
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .take(MAX_TITLE_CHARS)
        .collect();
    let title = title.trim().to_string();
    if title.is_empty() {
        "untitled".to_string()
    } else {
        title
    }
}

pub fn description_for(category: &str, cfg: &UploadConfig) -> String {
    cfg.description.replace("{category}", category)
}

pub fn build_metadata(path: &Path, category: &str, cfg: &UploadConfig) -> VideoMetadata {
    VideoMetadata {
        snippet: VideoSnippet {
            title: title_for(path),
            description: description_for(category, cfg),
            category_id: cfg.category_id.clone(),
        },
        status: VideoStatus::unlisted(),
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "m4v" => "video/x-m4v",
        _ => return None,
    };
    Some(mime)
}

/// MIME type from the extension, then from the file content, then `video/*`.
/// Scanned files always hit the extension table; sniffing covers paths
/// handed to [`upload`] directly. Blocking.
pub fn mime_for(path: &Path) -> String {
    if let Some(mime) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
    {
        return mime.to_string();
    }
    infer::get_from_path(path)
        .ok()
        .flatten()
        .map(|kind| kind.mime_type())
        .filter(|m| m.starts_with("video/"))
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}

async fn media_file(path: &Path) -> Result<MediaFile, UploadError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    // Content sniffing reads the file header, so keep it off the runtime.
    let owned = path.to_path_buf();
    let mime = tokio::task::spawn_blocking(move || mime_for(&owned))
        .await
        .map_err(|e| UploadError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
    Ok(MediaFile {
        path: path.to_path_buf(),
        mime,
        size: meta.len(),
    })
}

/// Drives a resumable upload to completion and returns the new video's id.
pub async fn create_video(
    host: &dyn VideoHost,
    metadata: &VideoMetadata,
    media: &MediaFile,
) -> Result<VideoId, UploadError> {
    let mut session = host
        .start_upload(metadata, media)
        .await
        .map_err(UploadError::Create)?;
    loop {
        let outcome = session.next_chunk().await.map_err(UploadError::Transfer)?;
        if let Some(pct) = outcome.percent() {
            info!("Uploading {}: {}%", media.path.display(), pct);
        }
        if let ChunkOutcome::Complete(video_id) = outcome {
            return Ok(video_id);
        }
    }
}

/// Uploads `path` and adds the result to `playlist_id`.
pub async fn upload(
    host: &dyn VideoHost,
    path: &Path,
    playlist_id: &str,
    category: &str,
    cfg: &UploadConfig,
) -> Result<VideoId, UploadError> {
    info!("Uploading: {} to playlist ({}) ...", path.display(), category);
    let metadata = build_metadata(path, category, cfg);
    let media = media_file(path).await?;
    let video_id = create_video(host, &metadata, &media).await?;

    host.add_to_playlist(playlist_id, &video_id)
        .await
        .map_err(|source| UploadError::Playlist {
            video_id: video_id.clone(),
            source,
        })?;

    info!(
        "Uploaded {} (Video ID: {}) -> Playlist: {}",
        path.display(),
        video_id,
        category
    );
    Ok(video_id)
}
