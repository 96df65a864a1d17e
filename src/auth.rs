//! Authentication for Google APIs.
//!
//! Three credential sources are supported:
//! - a cached user token (`token.json`) refreshed with its refresh token,
//! - a service account key, exchanged through a signed JWT,
//! - a static access token, mainly for scripting and tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::models::{
    AuthorizedUserToken, ClientSecrets, ClientSecretsFile, ServiceAccountCredentials,
    TokenResponse,
};

/// Google OAuth2 token endpoint.
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google Drive API scope.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Scopes that allow creating and updating files.
const WRITE_SCOPES: [&str; 2] = [DRIVE_SCOPE, "https://www.googleapis.com/auth/drive.file"];

/// Tokens expiring within this window are refreshed early.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

enum CredentialSource {
    ServiceAccount(ServiceAccountCredentials),
    AuthorizedUser {
        token: AuthorizedUserToken,
        secrets: Option<ClientSecrets>,
        token_path: Option<PathBuf>,
    },
    Static(String),
}

/// Authenticator handing out bearer tokens for the Drive API.
#[derive(Clone)]
pub struct Authenticator {
    source: Arc<CredentialSource>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    /// Build an authenticator from the OAuth client file and the token cache.
    ///
    /// A token cache takes precedence. Without one, the credentials file must
    /// be a service account key.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(credentials: P, token: Q) -> Result<Self> {
        let credentials = credentials.as_ref();
        let token = token.as_ref();

        if token.exists() {
            let secrets = if credentials.exists() {
                let content = fs::read_to_string(credentials)?;
                serde_json::from_str::<ClientSecretsFile>(&content)
                    .ok()
                    .and_then(ClientSecretsFile::into_secrets)
            } else {
                None
            };
            return Self::from_token_file(token, secrets);
        }

        if !credentials.exists() {
            return Err(SyncError::AuthenticationError(format!(
                "neither {} nor {} found",
                token.display(),
                credentials.display()
            )));
        }

        let content = fs::read_to_string(credentials)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        if value.get("type").and_then(|t| t.as_str()) == Some("service_account") {
            let creds: ServiceAccountCredentials = serde_json::from_value(value)?;
            return Ok(Self::service_account(creds));
        }

        Err(SyncError::AuthenticationError(format!(
            "{} is an OAuth client file but no token cache exists at {}; \
             authorize once and place the token file there",
            credentials.display(),
            token.display()
        )))
    }

    /// Create an authenticator from a cached user token file.
    ///
    /// Refreshed tokens are written back to the same file.
    pub fn from_token_file<P: AsRef<Path>>(path: P, secrets: Option<ClientSecrets>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let token: AuthorizedUserToken = serde_json::from_str(&content)?;
        Ok(Self::with_source(CredentialSource::AuthorizedUser {
            token,
            secrets,
            token_path: Some(path.to_path_buf()),
        }))
    }

    pub fn service_account(credentials: ServiceAccountCredentials) -> Self {
        Self::with_source(CredentialSource::ServiceAccount(credentials))
    }

    pub fn authorized_user(token: AuthorizedUserToken, secrets: Option<ClientSecrets>) -> Self {
        Self::with_source(CredentialSource::AuthorizedUser {
            token,
            secrets,
            token_path: None,
        })
    }

    /// Use a fixed access token. It is never refreshed.
    pub fn static_token(access_token: impl Into<String>) -> Self {
        Self::with_source(CredentialSource::Static(access_token.into()))
    }

    fn with_source(source: CredentialSource) -> Self {
        let cached = match &source {
            CredentialSource::AuthorizedUser { token, .. } => {
                if lacks_write_scope(&token.scopes) {
                    warn!(
                        scopes = ?token.scopes,
                        "token cannot write to Drive; uploads will fail and exports \
                         will be written locally. Re-authorize with the {} scope",
                        DRIVE_SCOPE
                    );
                }
                cached_user_token(token)
            }
            _ => None,
        };

        Self {
            source: Arc::new(source),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(cached)),
        }
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + EXPIRY_BUFFER {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = match self.source.as_ref() {
            CredentialSource::ServiceAccount(creds) => self.refresh_service_account(creds).await?,
            CredentialSource::AuthorizedUser {
                token,
                secrets,
                token_path,
            } => {
                self.refresh_user_token(token, secrets.as_ref(), token_path.as_deref())
                    .await?
            }
            CredentialSource::Static(token) => return Ok(token.clone()),
        };

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Refresh the access token using JWT assertion.
    async fn refresh_service_account(
        &self,
        credentials: &ServiceAccountCredentials,
    ) -> Result<CachedToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SyncError::AuthenticationError(e.to_string()))?
            .as_secs();
        let token_uri = credentials.token_uri.as_deref().unwrap_or(TOKEN_URI);

        let claims = Claims {
            iss: credentials.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: token_uri.to_string(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ];

        debug!(email = %credentials.client_email, "requesting service account token");
        self.exchange(token_uri, &params).await
    }

    /// Refresh a cached user token with its refresh token.
    async fn refresh_user_token(
        &self,
        token: &AuthorizedUserToken,
        secrets: Option<&ClientSecrets>,
        token_path: Option<&Path>,
    ) -> Result<CachedToken> {
        let client_id = token
            .client_id
            .as_deref()
            .or(secrets.map(|s| s.client_id.as_str()))
            .ok_or_else(|| SyncError::AuthenticationError("token file has no client_id".into()))?;
        let client_secret = token
            .client_secret
            .as_deref()
            .or(secrets.map(|s| s.client_secret.as_str()))
            .ok_or_else(|| {
                SyncError::AuthenticationError("token file has no client_secret".into())
            })?;
        let token_uri = token
            .token_uri
            .as_deref()
            .or(secrets.and_then(|s| s.token_uri.as_deref()))
            .unwrap_or(TOKEN_URI);

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", token.refresh_token.as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        debug!("refreshing cached user token");
        let refreshed = self.exchange(token_uri, &params).await?;

        if let Some(path) = token_path {
            let mut updated = token.clone();
            updated.token = Some(refreshed.access_token.clone());
            updated.expiry = Some(refreshed.expires_at.into());
            fs::write(path, serde_json::to_string_pretty(&updated)?)?;
            info!(path = %path.display(), "saved refreshed token");
        }

        Ok(refreshed)
    }

    async fn exchange(&self, token_uri: &str, params: &[(&str, &str)]) -> Result<CachedToken> {
        let response = self.client.post(token_uri).form(params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        let expires_at = SystemTime::now() + Duration::from_secs(token_response.expires_in);

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at,
        })
    }
}

/// A token listing its scopes, none of which grants write access.
///
/// Refreshing keeps the originally granted scopes, so this cannot be fixed
/// without authorizing again. An empty list means the scopes are unknown.
fn lacks_write_scope(scopes: &[String]) -> bool {
    !scopes.is_empty() && !scopes.iter().any(|s| WRITE_SCOPES.contains(&s.as_str()))
}

/// Reuse the access token stored in the cache file while it is still valid.
fn cached_user_token(token: &AuthorizedUserToken) -> Option<CachedToken> {
    let access_token = token.token.clone()?;
    let expires_at: SystemTime = token.expiry?.into();
    Some(CachedToken {
        access_token,
        expires_at,
    })
}
