use crate::archive::ConflictPolicy;
use crate::models::Category;
use anyhow::{bail, Context};
use providers::youtube::{YouTubeConfig, CHUNK_GRANULARITY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub categories: Vec<CategoryConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub folder: String,
    pub playlist: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub client_secrets: String,
    pub token_file: String,
    pub scopes: Vec<String>,
    pub login_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_secrets: "client_secrets.json".to_string(),
            token_file: "token.json".to_string(),
            // playlistItems.insert is not covered by youtube.upload alone.
            scopes: vec![
                "https://www.googleapis.com/auth/youtube.upload".to_string(),
                "https://www.googleapis.com/auth/youtube".to_string(),
            ],
            login_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub delay_secs: u64,
    pub chunk_size: u64,
    pub category_id: String,
    /// `{category}` is replaced with the category name.
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_base: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            delay_secs: 2,
            chunk_size: 32 * CHUNK_GRANULARITY,
            category_id: "22".to_string(),
            description: "Uploaded via API to {category} playlist".to_string(),
            api_base: None,
            upload_base: None,
        }
    }
}

impl UploadConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn youtube(&self) -> YouTubeConfig {
        let mut yt = YouTubeConfig {
            chunk_size: self.chunk_size,
            ..YouTubeConfig::default()
        };
        if let Some(base) = &self.api_base {
            yt.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(base) = &self.upload_base {
            yt.upload_base = base.trim_end_matches('/').to_string();
        }
        yt
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: String,
    pub conflict: ConflictPolicy,
    pub copy_then_delete: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: "uploaded".to_string(),
            conflict: ConflictPolicy::Overwrite,
            copy_then_delete: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl AppConfig {
    /// Categories in configured order.
    pub fn categories(&self) -> Vec<Category> {
        self.categories
            .iter()
            .map(|c| Category {
                name: c.name.clone(),
                folder: PathBuf::from(&c.folder),
                playlist_id: c.playlist.clone(),
            })
            .collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.categories.is_empty() {
            bail!("no categories configured");
        }
        let mut seen = HashSet::new();
        for c in &self.categories {
            if c.name.trim().is_empty() {
                bail!("category with empty name");
            }
            if !seen.insert(c.name.as_str()) {
                bail!("duplicate category: {}", c.name);
            }
            if c.playlist.trim().is_empty() {
                bail!("category {} has no playlist id", c.name);
            }
            if c.folder.trim().is_empty() {
                bail!("category {} has no folder", c.name);
            }
        }
        if self.upload.chunk_size == 0 || self.upload.chunk_size % CHUNK_GRANULARITY != 0 {
            bail!(
                "upload.chunk_size must be a positive multiple of {} bytes, got {}",
                CHUNK_GRANULARITY,
                self.upload.chunk_size
            );
        }
        Ok(())
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(config::Environment::with_prefix("UPLOADER").separator("__"));
    let cfg = settings.build().context("failed to read configuration")?;
    let cfg: AppConfig = cfg
        .try_deserialize()
        .context("invalid configuration")?;
    cfg.validate()?;
    Ok(cfg)
}
