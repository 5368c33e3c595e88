//! Moves uploaded files into `<archive>/<category>/`.

use crate::config::ArchiveConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What to do when the archive already holds a file with the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Overwrite,
    Rename,
}

pub fn archive_path(root: &Path, category: &str, src: &Path) -> PathBuf {
    let file_name = src
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "video".into());
    root.join(category).join(file_name)
}

/// Moves `src` into the archive and returns where it ended up.
pub fn move_to_archive(src: &Path, category: &str, cfg: &ArchiveConfig) -> Result<PathBuf> {
    let root = Path::new(&cfg.dir);
    let dest = archive_path(root, category, src);
    let target = if dest.exists() {
        match cfg.conflict {
            ConflictPolicy::Overwrite => dest,
            ConflictPolicy::Rename => resolve_conflict(&dest),
        }
    } else {
        dest
    };
    apply_move(src, &target, cfg.copy_then_delete)
        .with_context(|| format!("failed to archive {} to {}", src.display(), target.display()))?;
    Ok(target)
}

fn resolve_conflict(dest: &Path) -> PathBuf {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video")
        .to_string();
    let ext = dest
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{}_{}", stem, counter)
        } else {
            format!("{}_{}.{}", stem, counter, ext)
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn apply_move(from: &Path, to: &Path, copy_then_delete: bool) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if copy_then_delete {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    } else {
        fs::rename(from, to)?;
    }
    Ok(())
}
