//! Credential lifecycle: load, refresh, acquire, persist.

use crate::consent::CredentialAcquirer;
use crate::error::{Error, Result};
use crate::session::{Session, DEFAULT_API_BASE_URL};
use crate::store::CredentialStore;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::http_client;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Access credential persisted to `token.json`.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credential {
    /// A non-expiring credential for an already provisioned access token.
    pub fn bearer(access_token: &str) -> Self {
        Credential {
            access_token: access_token.to_string(),
            refresh_token: None,
            expiry: None,
            scopes: vec![CALENDAR_SCOPE.to_string()],
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_MARGIN_SECS) >= expiry,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn covers(&self, scopes: &[String]) -> bool {
        scopes.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Usable for API calls: not expired and granted every required scope.
    pub fn is_valid(&self, scopes: &[String]) -> bool {
        !self.access_token.is_empty() && !self.is_expired() && self.covers(scopes)
    }

    /// Builds a credential from a token endpoint response. Fields the
    /// response omits (refresh token, scopes) are carried over from
    /// `previous`, or fall back to the `requested` scopes.
    pub(crate) fn from_token_response(
        response: &BasicTokenResponse,
        previous: Option<&Credential>,
        requested: &[String],
    ) -> Self {
        let refresh_token = response
            .refresh_token()
            .map(|token| token.secret().clone())
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));

        let scopes = match response.scopes() {
            Some(scopes) => scopes.iter().map(|scope| (**scope).clone()).collect(),
            None => previous
                .map(|p| p.scopes.clone())
                .unwrap_or_else(|| requested.to_vec()),
        };

        let expiry = response
            .expires_in()
            .and_then(|expires_in| Duration::from_std(expires_in).ok())
            .map(|expires_in| Utc::now() + expires_in);

        Credential {
            access_token: response.access_token().secret().clone(),
            refresh_token,
            expiry,
            scopes,
        }
    }
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// OAuth client configuration from `credentials.json`.
#[derive(Deserialize, Debug, Clone)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Client secrets not found at {}. Download an OAuth desktop client \
                 configuration from https://console.cloud.google.com/apis/credentials",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
            .map_err(|e| Error::Config(format!("Invalid client secrets in {}: {e}", path.display())))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(contents)?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or_else(|| Error::Config("expected an \"installed\" or \"web\" client".to_string()))?;

        if secrets.client_id.is_empty() || secrets.client_secret.is_empty() {
            return Err(Error::Config("client_id and client_secret must be set".to_string()));
        }
        Ok(secrets)
    }

    pub(crate) fn oauth_client(&self) -> Result<BasicClient> {
        let auth_url = AuthUrl::new(self.auth_uri.clone())
            .map_err(|e| Error::Config(format!("Invalid auth_uri: {e}")))?;
        let token_url = TokenUrl::new(self.token_uri.clone())
            .map_err(|e| Error::Config(format!("Invalid token_uri: {e}")))?;

        Ok(BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody))
    }
}

/// Exchanges the credential's refresh token for a new access token.
pub fn refresh_credential(secrets: &ClientSecrets, credential: &Credential) -> Result<Credential> {
    let refresh_token = credential
        .refresh_token
        .as_ref()
        .ok_or_else(|| Error::Auth("no refresh token available".to_string()))?;

    let response = secrets
        .oauth_client()?
        .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
        .request(http_client)
        .map_err(|e| Error::Auth(format!("Token refresh failed: {e}")))?;

    Ok(Credential::from_token_response(
        &response,
        Some(credential),
        &credential.scopes,
    ))
}

/// Produces a [`Session`] from persisted state, refreshing or re-acquiring
/// the credential when needed.
pub struct Authenticator {
    store: Box<dyn CredentialStore>,
    acquirer: Box<dyn CredentialAcquirer>,
    secrets_path: PathBuf,
    api_base_url: String,
    scopes: Vec<String>,
}

impl Authenticator {
    pub fn new(
        store: Box<dyn CredentialStore>,
        acquirer: Box<dyn CredentialAcquirer>,
        secrets_path: impl Into<PathBuf>,
    ) -> Self {
        Authenticator {
            store,
            acquirer,
            secrets_path: secrets_path.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scopes: vec![CALENDAR_SCOPE.to_string()],
        }
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    pub fn obtain_session(&self, verbose: bool) -> Result<Session> {
        let credential = self.obtain_credential()?;
        let session = Session::new(credential, &self.api_base_url)?;

        if verbose {
            println!("Authenticated Google Calendar API service.");
        }

        Ok(session)
    }

    /// Returns a valid credential, touching the network or the acquisition
    /// strategy only when the stored one cannot be used as is.
    pub fn obtain_credential(&self) -> Result<Credential> {
        let stored = self.store.load()?;

        if let Some(credential) = &stored {
            if credential.is_valid(&self.scopes) {
                debug!("Using stored credential");
                return Ok(credential.clone());
            }

            if credential.refresh_token.is_some() && credential.covers(&self.scopes) {
                match self.refresh(credential) {
                    Ok(refreshed) => {
                        self.store.save(&refreshed)?;
                        info!("Refreshed access token");
                        return Ok(refreshed);
                    }
                    Err(e @ Error::Config(_)) => return Err(e),
                    Err(e) => warn!("{e}; falling back to credential acquisition"),
                }
            }
        }

        let acquired = self.acquirer.acquire(&self.scopes)?;
        self.store.save(&acquired)?;
        info!("Stored newly acquired credential");

        Ok(acquired)
    }

    fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let secrets = ClientSecrets::load(&self.secrets_path)?;
        refresh_credential(&secrets, credential)
    }
}
