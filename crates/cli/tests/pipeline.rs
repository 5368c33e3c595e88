use async_trait::async_trait;
use cli::prompt::ConsolePrompt;
use providers::{
    ChunkOutcome, MediaFile, PrivacyStatus, ProviderError, UploadSession, VideoHost, VideoId,
    VideoMetadata,
};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use uploader_core::auth::{AuthError, Connector};
use uploader_core::config::{AppConfig, ArchiveConfig, CategoryConfig, UploadConfig};
use uploader_core::pipeline::{self, Confirm, RunOutcome};

#[derive(Default)]
struct HostState {
    uploads: Vec<(VideoMetadata, String)>,
    playlist_adds: Vec<(String, VideoId)>,
    fail_uploads_of: Vec<String>,
    fail_playlist: bool,
    started_at: Vec<tokio::time::Instant>,
}

#[derive(Clone, Default)]
struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

struct OneShot {
    id: Option<VideoId>,
}

#[async_trait]
impl UploadSession for OneShot {
    async fn next_chunk(&mut self) -> Result<ChunkOutcome, ProviderError> {
        match self.id.take() {
            Some(id) => Ok(ChunkOutcome::Complete(id)),
            None => Err(ProviderError::InvalidResponse("session already finished".into())),
        }
    }
}

#[async_trait]
impl VideoHost for FakeHost {
    async fn start_upload(
        &self,
        metadata: &VideoMetadata,
        media: &MediaFile,
    ) -> Result<Box<dyn UploadSession>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let name = media
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        state.uploads.push((metadata.clone(), name.clone()));
        state.started_at.push(tokio::time::Instant::now());
        if state.fail_uploads_of.contains(&name) {
            return Err(ProviderError::Api {
                status: 500,
                body: "backendError".into(),
            });
        }
        let id = VideoId(format!("vid-{}", state.uploads.len()));
        Ok(Box::new(OneShot { id: Some(id) }))
    }

    async fn add_to_playlist(
        &self,
        playlist_id: &str,
        video_id: &VideoId,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state
            .playlist_adds
            .push((playlist_id.to_string(), video_id.clone()));
        if state.fail_playlist {
            return Err(ProviderError::Api {
                status: 404,
                body: "playlistNotFound".into(),
            });
        }
        Ok(())
    }
}

struct FakeConnector {
    host: FakeHost,
    connects: Mutex<usize>,
}

impl FakeConnector {
    fn new(host: FakeHost) -> Self {
        Self {
            host,
            connects: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn VideoHost>, AuthError> {
        *self.connects.lock().unwrap() += 1;
        Ok(Box::new(self.host.clone()))
    }
}

struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self) -> Result<Box<dyn VideoHost>, AuthError> {
        Err(AuthError::Login(ProviderError::Authorization(
            "consent was not granted: access_denied".into(),
        )))
    }
}

/// Answers with a fixed reply and remembers every summary it was shown.
struct Scripted {
    answer: bool,
    shown: Vec<String>,
}

impl Scripted {
    fn answering(answer: bool) -> Self {
        Self {
            answer,
            shown: Vec::new(),
        }
    }
}

impl Confirm for Scripted {
    fn confirm(&mut self, summary: &str) -> std::io::Result<bool> {
        self.shown.push(summary.to_string());
        Ok(self.answer)
    }
}

fn config(root: &Path) -> AppConfig {
    let category = |name: &str, playlist: &str| CategoryConfig {
        name: name.to_string(),
        folder: root.join("videos").join(name).to_string_lossy().into_owned(),
        playlist: playlist.to_string(),
    };
    AppConfig {
        categories: vec![category("shorts", "PLshorts"), category("landscape", "PLland")],
        auth: Default::default(),
        upload: UploadConfig {
            delay_secs: 0,
            ..UploadConfig::default()
        },
        archive: ArchiveConfig {
            dir: root.join("uploaded").to_string_lossy().into_owned(),
            ..ArchiveConfig::default()
        },
        scan: Default::default(),
    }
}

fn add_video(root: &Path, category: &str, name: &str) {
    let dir = root.join("videos").join(category);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), b"not really a video").unwrap();
}

#[tokio::test]
async fn empty_folders_stop_before_prompt() {
    let temp = tempdir().unwrap();
    let cfg = config(temp.path());
    let host = FakeHost::default();
    let connector = FakeConnector::new(host.clone());
    let mut prompt = Scripted::answering(true);

    let outcome = pipeline::run(&cfg, &connector, &mut prompt).await.unwrap();

    assert!(matches!(outcome, RunOutcome::NothingToUpload));
    assert!(prompt.shown.is_empty());
    assert!(host.state.lock().unwrap().uploads.is_empty());
    // Missing category folders are created by the scan.
    assert!(temp.path().join("videos").join("shorts").is_dir());
    assert!(temp.path().join("videos").join("landscape").is_dir());
}

#[tokio::test]
async fn credentials_obtained_before_scan() {
    let temp = tempdir().unwrap();
    let cfg = config(temp.path());
    let connector = FakeConnector::new(FakeHost::default());
    let mut prompt = Scripted::answering(true);

    pipeline::run(&cfg, &connector, &mut prompt).await.unwrap();
    assert_eq!(*connector.connects.lock().unwrap(), 1);
}

#[tokio::test]
async fn rejected_confirmation_leaves_everything_in_place() {
    let temp = tempdir().unwrap();
    add_video(temp.path(), "shorts", "clip1.mp4");
    let cfg = config(temp.path());
    let host = FakeHost::default();
    let connector = FakeConnector::new(host.clone());
    let input: &[u8] = b"n\n";
    let mut prompt = ConsolePrompt::new(input, Vec::new());

    let outcome = pipeline::run(&cfg, &connector, &mut prompt).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert!(host.state.lock().unwrap().uploads.is_empty());
    assert!(temp.path().join("videos/shorts/clip1.mp4").exists());
    assert!(!temp.path().join("uploaded").exists());

    let shown = String::from_utf8(prompt.into_output()).unwrap();
    assert!(shown.contains("Shorts: 1"));
    assert!(shown.contains("   - clip1.mp4"));
    assert!(shown.contains("Landscape: 0"));
    assert!(shown.contains("TOTAL: 1 videos"));
}

#[tokio::test]
async fn successful_upload_is_archived_under_category() {
    let temp = tempdir().unwrap();
    add_video(temp.path(), "shorts", "clip1.mp4");
    add_video(temp.path(), "landscape", "view.mov");
    let cfg = config(temp.path());
    let host = FakeHost::default();
    let connector = FakeConnector::new(host.clone());
    let mut prompt = Scripted::answering(true);

    let RunOutcome::Finished(report) = pipeline::run(&cfg, &connector, &mut prompt).await.unwrap()
    else {
        panic!("expected a finished run");
    };

    assert_eq!(report.uploaded.len(), 2);
    assert!(report.failed.is_empty());
    assert!(!temp.path().join("videos/shorts/clip1.mp4").exists());
    assert!(temp.path().join("uploaded/shorts/clip1.mp4").exists());
    assert!(temp.path().join("uploaded/landscape/view.mov").exists());

    let state = host.state.lock().unwrap();
    // Categories are processed in configured order.
    assert_eq!(state.uploads[0].1, "clip1.mp4");
    assert_eq!(state.uploads[1].1, "view.mov");
    assert_eq!(
        state.playlist_adds,
        vec![
            ("PLshorts".to_string(), VideoId("vid-1".into())),
            ("PLland".to_string(), VideoId("vid-2".into())),
        ]
    );
}

#[tokio::test]
async fn failed_upload_stays_and_next_file_proceeds() {
    let temp = tempdir().unwrap();
    add_video(temp.path(), "shorts", "a.mp4");
    add_video(temp.path(), "shorts", "b.mp4");
    let cfg = config(temp.path());
    let host = FakeHost::default();
    host.state.lock().unwrap().fail_uploads_of = vec!["a.mp4".to_string()];
    let connector = FakeConnector::new(host.clone());
    let mut prompt = Scripted::answering(true);

    let RunOutcome::Finished(report) = pipeline::run(&cfg, &connector, &mut prompt).await.unwrap()
    else {
        panic!("expected a finished run");
    };

    assert_eq!(report.failed, vec![temp.path().join("videos/shorts/a.mp4")]);
    assert_eq!(report.uploaded.len(), 1);
    assert!(temp.path().join("videos/shorts/a.mp4").exists());
    assert!(temp.path().join("uploaded/shorts/b.mp4").exists());
    assert_eq!(host.state.lock().unwrap().playlist_adds.len(), 1);
}

#[tokio::test]
async fn playlist_failure_is_partial_and_file_not_archived() {
    let temp = tempdir().unwrap();
    add_video(temp.path(), "shorts", "clip1.mp4");
    let cfg = config(temp.path());
    let host = FakeHost::default();
    host.state.lock().unwrap().fail_playlist = true;
    let connector = FakeConnector::new(host.clone());
    let mut prompt = Scripted::answering(true);

    let RunOutcome::Finished(report) = pipeline::run(&cfg, &connector, &mut prompt).await.unwrap()
    else {
        panic!("expected a finished run");
    };

    assert!(report.uploaded.is_empty());
    assert_eq!(report.partial.len(), 1);
    assert_eq!(report.partial[0].video_id, VideoId("vid-1".into()));
    assert!(temp.path().join("videos/shorts/clip1.mp4").exists());
    assert!(!temp.path().join("uploaded/shorts/clip1.mp4").exists());
}

#[tokio::test]
async fn every_video_is_unlisted_and_not_for_kids() {
    let temp = tempdir().unwrap();
    add_video(temp.path(), "shorts", "one.mp4");
    add_video(temp.path(), "landscape", "two.mkv");
    let cfg = config(temp.path());
    let host = FakeHost::default();
    let connector = FakeConnector::new(host.clone());
    let mut prompt = Scripted::answering(true);

    pipeline::run(&cfg, &connector, &mut prompt).await.unwrap();

    let state = host.state.lock().unwrap();
    assert_eq!(state.uploads.len(), 2);
    for (metadata, _) in &state.uploads {
        assert_eq!(metadata.status.privacy_status(), PrivacyStatus::Unlisted);
        assert!(!metadata.status.made_for_kids());
    }
    assert_eq!(state.uploads[0].0.snippet.title, "one");
    assert_eq!(
        state.uploads[1].0.snippet.description,
        "Uploaded via API to landscape playlist"
    );
}

#[test]
fn plan_lists_pending_without_connecting() {
    let temp = tempdir().unwrap();
    add_video(temp.path(), "shorts", "clip1.mp4");
    add_video(temp.path(), "shorts", "notes.txt");
    let cfg = config(temp.path());

    let pending = pipeline::plan(&cfg).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].category, "shorts");
}

#[tokio::test]
async fn auth_failure_aborts_before_scan_and_prompt() {
    let temp = tempdir().unwrap();
    let cfg = config(temp.path());
    let mut prompt = Scripted::answering(true);

    let err = pipeline::run(&cfg, &RefusingConnector, &mut prompt)
        .await
        .unwrap_err();

    assert!(err.downcast_ref::<AuthError>().is_some());
    assert!(prompt.shown.is_empty());
    // The scan would have created the category folders.
    assert!(!temp.path().join("videos").exists());
}

#[tokio::test(start_paused = true)]
async fn delay_follows_every_attempt_including_failures() {
    let temp = tempdir().unwrap();
    add_video(temp.path(), "shorts", "a.mp4");
    add_video(temp.path(), "landscape", "b.mp4");
    let mut cfg = config(temp.path());
    cfg.upload.delay_secs = 5;
    let host = FakeHost::default();
    host.state.lock().unwrap().fail_uploads_of = vec!["a.mp4".to_string()];
    let connector = FakeConnector::new(host.clone());
    let mut prompt = Scripted::answering(true);

    let started = tokio::time::Instant::now();
    let RunOutcome::Finished(report) = pipeline::run(&cfg, &connector, &mut prompt).await.unwrap()
    else {
        panic!("expected a finished run");
    };
    let elapsed = started.elapsed();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.uploaded.len(), 1);
    let state = host.state.lock().unwrap();
    assert_eq!(state.started_at.len(), 2);
    assert!(state.started_at[1] - state.started_at[0] >= Duration::from_secs(5));
    assert!(elapsed >= Duration::from_secs(10));
}

#[tokio::test]
async fn archive_failure_leaves_file_and_counts_as_failed() {
    let temp = tempdir().unwrap();
    add_video(temp.path(), "shorts", "clip1.mp4");
    let blocker = temp.path().join("not-a-dir");
    fs::write(&blocker, b"file in the way").unwrap();
    let mut cfg = config(temp.path());
    cfg.archive.dir = blocker.to_string_lossy().into_owned();
    let host = FakeHost::default();
    let connector = FakeConnector::new(host.clone());
    let mut prompt = Scripted::answering(true);

    let RunOutcome::Finished(report) = pipeline::run(&cfg, &connector, &mut prompt).await.unwrap()
    else {
        panic!("expected a finished run");
    };

    assert!(report.uploaded.is_empty());
    assert_eq!(report.failed, vec![temp.path().join("videos/shorts/clip1.mp4")]);
    assert!(temp.path().join("videos/shorts/clip1.mp4").exists());
    // The video itself did reach the platform.
    assert_eq!(host.state.lock().unwrap().playlist_adds.len(), 1);
}
