//! Credential store: load, refresh or re-acquire the OAuth token, then hand
//! out an authorized client.

use crate::config::AppConfig;
use providers::oauth::InstalledFlow;
use providers::youtube::{YouTubeClient, YouTubeConfig};
use providers::{Authorizer, ProviderError, Token, VideoHost};
use std::sync::Arc;
use std::time::Duration;
use storage::{StorageError, TokenFile, TokenStore};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("interactive login failed: {0}")]
    Login(#[source] ProviderError),
    #[error("token storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("cannot build api client: {0}")]
    Client(#[source] ProviderError),
}

pub struct CredentialStore {
    authorizer: Arc<dyn Authorizer>,
    store: Arc<dyn TokenStore<Token>>,
}

impl CredentialStore {
    pub fn new(authorizer: Arc<dyn Authorizer>, store: Arc<dyn TokenStore<Token>>) -> Self {
        Self { authorizer, store }
    }

    pub fn authorizer(&self) -> Arc<dyn Authorizer> {
        self.authorizer.clone()
    }

    /// Returns a usable token, refreshing or logging in as needed.
    pub async fn obtain_token(&self) -> Result<Token, AuthError> {
        let stored = match self.store.load_token().await {
            Ok(token) => token,
            Err(StorageError::Malformed { path, source }) => {
                warn!(
                    "Ignoring unreadable token file {}: {}",
                    path.display(),
                    source
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        match stored {
            Some(token) if !token.is_expired() => {
                debug!("using stored token");
                Ok(token)
            }
            Some(token) if token.can_refresh() => {
                match self.authorizer.refresh(&token).await {
                    Ok(fresh) => {
                        self.store.save_token(&fresh).await?;
                        info!("Refreshed access token");
                        Ok(fresh)
                    }
                    Err(e) => {
                        warn!("Token refresh failed, starting a new login: {}", e);
                        self.store.clear().await?;
                        self.login().await
                    }
                }
            }
            _ => self.login().await,
        }
    }

    /// Runs the interactive login and persists the result.
    pub async fn login(&self) -> Result<Token, AuthError> {
        let token = self.authorizer.login().await.map_err(AuthError::Login)?;
        self.store.save_token(&token).await?;
        Ok(token)
    }
}

/// Source of an authorized platform client.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn VideoHost>, AuthError>;
}

pub struct YouTubeConnector {
    credentials: CredentialStore,
    youtube: YouTubeConfig,
}

impl YouTubeConnector {
    pub fn new(credentials: CredentialStore, youtube: YouTubeConfig) -> Self {
        Self {
            credentials,
            youtube,
        }
    }

    /// Installed-app flow plus JSON token file, as configured.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let flow = InstalledFlow::new(&cfg.auth.client_secrets, cfg.auth.scopes.clone())
            .with_timeout(Duration::from_secs(cfg.auth.login_timeout_secs));
        let credentials = CredentialStore::new(
            Arc::new(flow),
            Arc::new(TokenFile::new(&cfg.auth.token_file)),
        );
        Self::new(credentials, cfg.upload.youtube())
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }
}

#[async_trait::async_trait]
impl Connector for YouTubeConnector {
    async fn connect(&self) -> Result<Box<dyn VideoHost>, AuthError> {
        let token = self.credentials.obtain_token().await?;
        let client = YouTubeClient::new(self.youtube.clone(), token)
            .map_err(AuthError::Client)?
            .with_refresher(self.credentials.authorizer());
        Ok(Box::new(client))
    }
}
