use providers::VideoId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A content category: where its files come from and which playlist they go to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub folder: PathBuf,
    pub playlist_id: String,
}

/// A file found by the scanner, waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub path: PathBuf,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedVideo {
    pub source: PathBuf,
    pub archived: PathBuf,
    pub video_id: VideoId,
}

/// Video created but not attached to its playlist; the file stays in place.
#[derive(Debug, Clone, Serialize)]
pub struct PartialUpload {
    pub path: PathBuf,
    pub video_id: VideoId,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub uploaded: Vec<UploadedVideo>,
    pub partial: Vec<PartialUpload>,
    pub failed: Vec<PathBuf>,
}
