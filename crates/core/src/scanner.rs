//! Finds uploadable videos in each category's source folder.

use crate::models::{Category, PendingUpload};
use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v"];

/// Scans every category in order and concatenates the results.
///
/// Missing source folders are created. Order within a folder is whatever
/// the directory listing returns.
pub fn scan(categories: &[Category], excludes: &[String]) -> anyhow::Result<Vec<PendingUpload>> {
    let exclude_set = build_globset(excludes)?;
    let mut pending = Vec::new();
    for category in categories {
        let found = scan_category(category, &exclude_set)?;
        debug!(category = %category.name, count = found.len(), "scanned folder");
        pending.extend(found);
    }
    Ok(pending)
}

pub fn scan_category(
    category: &Category,
    excludes: &GlobSet,
) -> anyhow::Result<Vec<PendingUpload>> {
    fs::create_dir_all(&category.folder).with_context(|| {
        format!(
            "failed to create source folder {}",
            category.folder.display()
        )
    })?;

    let mut found = Vec::new();
    for entry in WalkDir::new(&category.folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !entry.file_type().is_file() || is_hidden(path) || is_excluded(path, excludes) {
            continue;
        }
        if is_video(path) {
            found.push(PendingUpload {
                path: path.to_path_buf(),
                category: category.name.clone(),
            });
        }
    }
    Ok(found)
}

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|allowed| e.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("bad exclude pattern {:?}", pat))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Exclude globs match the file name, not the full path.
fn is_excluded(path: &Path, excludes: &GlobSet) -> bool {
    path.file_name()
        .map(|n| excludes.is_match(n))
        .unwrap_or(false)
}
