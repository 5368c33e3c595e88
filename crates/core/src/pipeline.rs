use crate::archive;
use crate::auth::Connector;
use crate::config::AppConfig;
use crate::models::{Category, PartialUpload, PendingUpload, RunReport, UploadedVideo};
use crate::scanner;
use crate::uploader;
use anyhow::Context;
use providers::VideoHost;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::{error, info, warn};

/// Asks the operator whether to start uploading.
pub trait Confirm {
    /// `summary` is the rendered upload summary; `Ok(false)` cancels.
    fn confirm(&mut self, summary: &str) -> std::io::Result<bool>;
}

#[derive(Debug)]
pub enum RunOutcome {
    NothingToUpload,
    Cancelled,
    Finished(RunReport),
}

/// Only `y`/`yes` (any case, surrounding whitespace ignored) proceed.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Per-category counts and file names, then the grand total.
pub fn render_summary(categories: &[Category], pending: &[PendingUpload]) -> String {
    let mut out = String::from("Upload Summary:\n");
    for category in categories {
        let files: Vec<&PendingUpload> = pending
            .iter()
            .filter(|p| p.category == category.name)
            .collect();
        let _ = writeln!(out, "{}: {}", capitalize(&category.name), files.len());
        for file in files {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.path.display().to_string());
            let _ = writeln!(out, "   - {}", name);
        }
    }
    let _ = writeln!(out, "TOTAL: {} videos", pending.len());
    out
}

/// Scan only, no credentials or network.
pub fn plan(cfg: &AppConfig) -> anyhow::Result<Vec<PendingUpload>> {
    scanner::scan(&cfg.categories(), &cfg.scan.exclude)
}

/// One full run: authenticate, scan, confirm, upload and archive.
pub async fn run(
    cfg: &AppConfig,
    connector: &dyn Connector,
    prompt: &mut dyn Confirm,
) -> anyhow::Result<RunOutcome> {
    let categories = cfg.categories();

    let host = connector.connect().await.context("authentication failed")?;
    let pending = scanner::scan(&categories, &cfg.scan.exclude)?;
    if pending.is_empty() {
        info!("No videos found for upload.");
        return Ok(RunOutcome::NothingToUpload);
    }

    let summary = render_summary(&categories, &pending);
    if !prompt.confirm(&summary).context("failed to read confirmation")? {
        return Ok(RunOutcome::Cancelled);
    }

    let report = upload_all(cfg, &categories, host.as_ref(), &pending).await;
    Ok(RunOutcome::Finished(report))
}

/// Uploads each pending file in order. Failures are logged and never stop
/// the loop; the configured delay follows every attempt.
pub async fn upload_all(
    cfg: &AppConfig,
    categories: &[Category],
    host: &dyn VideoHost,
    pending: &[PendingUpload],
) -> RunReport {
    let mut report = RunReport::default();
    let delay = cfg.upload.delay();
    let by_name: HashMap<&str, &Category> =
        categories.iter().map(|c| (c.name.as_str(), c)).collect();

    for item in pending {
        match by_name.get(item.category.as_str()) {
            Some(category) => upload_one(cfg, category, host, item, &mut report).await,
            None => {
                error!(
                    "Failed to upload {}: unknown category {}",
                    item.path.display(),
                    item.category
                );
                report.failed.push(item.path.clone());
            }
        }
        tokio::time::sleep(delay).await;
    }

    info!(
        "Upload run finished: {} uploaded, {} partial, {} failed",
        report.uploaded.len(),
        report.partial.len(),
        report.failed.len()
    );
    report
}

async fn upload_one(
    cfg: &AppConfig,
    category: &Category,
    host: &dyn VideoHost,
    item: &PendingUpload,
    report: &mut RunReport,
) {
    let uploaded = uploader::upload(
        host,
        &item.path,
        &category.playlist_id,
        &category.name,
        &cfg.upload,
    )
    .await;

    match uploaded {
        Ok(video_id) => match archive::move_to_archive(&item.path, &category.name, &cfg.archive) {
            Ok(archived) => report.uploaded.push(UploadedVideo {
                source: item.path.clone(),
                archived,
                video_id,
            }),
            Err(e) => {
                error!(
                    "Uploaded {} as {} but could not archive it: {:#}",
                    item.path.display(),
                    video_id,
                    e
                );
                report.failed.push(item.path.clone());
            }
        },
        Err(e) => {
            if let Some(video_id) = e.created_video() {
                warn!(
                    "Video {} exists but is not in playlist {}; {} stays in place",
                    video_id,
                    category.playlist_id,
                    item.path.display()
                );
                report.partial.push(PartialUpload {
                    path: item.path.clone(),
                    video_id: video_id.clone(),
                });
            } else {
                report.failed.push(item.path.clone());
            }
            error!("Failed to upload {}: {}", item.path.display(), e);
        }
    }
}
