//! Google OAuth2 installed-app flow: loopback consent, code exchange, refresh.

use crate::{Authorizer, ProviderError};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::url::Url;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens closer than this to their expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// How long the callback server may take to finish its last reply.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

const GRANTED_PAGE: &str = "Authorization complete. You can close this window.";
const DENIED_PAGE: &str = "Authorization failed.";

type TokenRequestError =
    RequestTokenError<oauth2::reqwest::Error<reqwest::Error>, BasicErrorResponse>;

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Persisted OAuth2 credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - ChronoDuration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    fn from_response(resp: &BasicTokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: resp.access_token().secret().clone(),
            refresh_token: resp.refresh_token().map(|t| t.secret().clone()),
            expires_at: resp
                .expires_in()
                .and_then(|d| ChronoDuration::from_std(d).ok())
                .map(|d| now + d),
            token_type: default_token_type(),
            scopes: resp
                .scopes()
                .map(|s| s.iter().map(|scope| scope.as_str().to_string()).collect())
                .unwrap_or_default(),
        }
    }
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Application credentials as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(raw: &str) -> Result<Self, ProviderError> {
        let file: SecretsFile = serde_json::from_str(raw)
            .map_err(|e| ProviderError::InvalidResponse(format!("client secrets: {}", e)))?;
        file.installed.or(file.web).ok_or_else(|| {
            ProviderError::InvalidResponse(
                "client secrets: expected an \"installed\" or \"web\" section".into(),
            )
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Authorization(format!(
                "cannot read client secrets {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    /// OAuth2 client for these credentials. Google wants the client secret
    /// in the request body rather than a basic-auth header.
    pub fn client(&self, redirect_uri: Option<&str>) -> Result<BasicClient, ProviderError> {
        let invalid = |what: &str, e: oauth2::url::ParseError| {
            ProviderError::InvalidResponse(format!("client secrets: bad {}: {}", what, e))
        };
        let mut client = BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.clone())),
            AuthUrl::new(self.auth_uri.clone()).map_err(|e| invalid("auth_uri", e))?,
            Some(TokenUrl::new(self.token_uri.clone()).map_err(|e| invalid("token_uri", e))?),
        )
        .set_auth_type(AuthType::RequestBody);
        if let Some(uri) = redirect_uri {
            client = client.set_redirect_uri(
                RedirectUrl::new(uri.to_string()).map_err(|e| invalid("redirect uri", e))?,
            );
        }
        Ok(client)
    }
}

/// Consent URL asking for offline access, so the grant carries a refresh token.
pub fn authorization_url(
    client: &BasicClient,
    scopes: &[String],
    challenge: PkceCodeChallenge,
) -> (Url, CsrfToken) {
    client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(scopes.iter().cloned().map(Scope::new))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(challenge)
        .url()
}

fn token_error(e: TokenRequestError) -> ProviderError {
    match e {
        RequestTokenError::ServerResponse(resp) => {
            ProviderError::Authorization(format!("token endpoint refused the grant: {}", resp))
        }
        other => ProviderError::RequestFailed(other.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Callback {
    Code(String),
    Denied(String),
    /// Not a consent redirect (favicon requests, reloads without a code).
    Ignored,
}

fn check_callback(params: &CallbackParams, expected_state: &str) -> Callback {
    if let Some(err) = &params.error {
        return Callback::Denied(err.clone());
    }
    match &params.code {
        Some(_) if params.state.as_deref() != Some(expected_state) => {
            Callback::Denied("state mismatch".to_string())
        }
        Some(code) => Callback::Code(code.clone()),
        None => Callback::Ignored,
    }
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    outcome: mpsc::Sender<Result<String, String>>,
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    match check_callback(&params, &state.expected_state) {
        Callback::Code(code) => {
            let _ = state.outcome.try_send(Ok(code));
            (StatusCode::OK, Html(GRANTED_PAGE))
        }
        Callback::Denied(reason) => {
            let _ = state.outcome.try_send(Err(reason));
            (StatusCode::BAD_REQUEST, Html(DENIED_PAGE))
        }
        Callback::Ignored => (StatusCode::NOT_FOUND, Html("Not found.")),
    }
}

/// Serves the redirect target on `listener` until the consent redirect
/// arrives or `timeout` runs out.
async fn wait_for_code(
    listener: TcpListener,
    expected_state: &str,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let (outcome_tx, mut outcome_rx) = mpsc::channel(1);
    let app = Router::new()
        .route("/", get(handle_callback))
        .with_state(CallbackState {
            expected_state: Arc::from(expected_state),
            outcome: outcome_tx,
        });

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let received = tokio::time::timeout(timeout, outcome_rx.recv()).await;

    let _ = stop_tx.send(());
    let abort = server.abort_handle();
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Err(e))) => warn!("oauth callback server failed: {}", e),
        Ok(_) => {}
        Err(_) => abort.abort(),
    }

    match received {
        Err(_) => Err(ProviderError::Authorization(format!(
            "no authorization callback within {}s",
            timeout.as_secs()
        ))),
        Ok(None) => Err(ProviderError::Authorization(
            "callback server stopped before consent".into(),
        )),
        Ok(Some(Ok(code))) => Ok(code),
        Ok(Some(Err(reason))) => Err(ProviderError::Authorization(format!(
            "consent was not granted: {}",
            reason
        ))),
    }
}

/// Installed-app authorizer. Client secrets are read from disk on each
/// login or refresh, so a run with a still-valid token never touches them.
#[derive(Debug, Clone)]
pub struct InstalledFlow {
    secrets_path: PathBuf,
    scopes: Vec<String>,
    timeout: Duration,
}

impl InstalledFlow {
    pub fn new(secrets_path: impl Into<PathBuf>, scopes: Vec<String>) -> Self {
        Self {
            secrets_path: secrets_path.into(),
            scopes,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn secrets(&self) -> Result<ClientSecrets, ProviderError> {
        ClientSecrets::from_file(&self.secrets_path)
    }
}

#[async_trait::async_trait]
impl Authorizer for InstalledFlow {
    async fn login(&self) -> Result<Token, ProviderError> {
        let secrets = self.secrets()?;
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());
        let client = secrets.client(Some(&redirect_uri))?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf) = authorization_url(&client, &self.scopes, challenge);

        println!("Open this URL in your browser to authorize access:\n\n  {}\n", url);
        info!("Waiting for authorization callback on {}", redirect_uri);

        let code = wait_for_code(listener, csrf.secret(), self.timeout).await?;
        let resp = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(async_http_client)
            .await
            .map_err(token_error)?;
        info!("Authorization granted");
        Ok(Token::from_response(&resp, Utc::now()))
    }

    async fn refresh(&self, token: &Token) -> Result<Token, ProviderError> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| ProviderError::Authorization("no refresh token".into()))?;
        let client = self.secrets()?.client(None)?;
        let resp = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(async_http_client)
            .await
            .map_err(token_error)?;
        let mut fresh = Token::from_response(&resp, Utc::now());
        // Google omits the refresh token on refresh; keep the one we had.
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = token.refresh_token.clone();
        }
        if fresh.scopes.is_empty() {
            fresh.scopes = token.scopes.clone();
        }
        debug!("refreshed access token");
        Ok(fresh)
    }
}
