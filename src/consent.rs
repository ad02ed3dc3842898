//! Strategies for obtaining a brand new credential.
//!
//! [`InteractiveConsent`] runs the installed-app OAuth flow: it listens on an
//! ephemeral loopback port, sends the user to the consent page and waits for
//! the redirect. [`ProvidedCredential`] wraps a token provisioned elsewhere,
//! for environments where nobody can click through a browser.

use crate::auth::{ClientSecrets, Credential};
use crate::error::{auth_error, Error, Result};
use oauth2::reqwest::http_client;
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope};
use std::path::PathBuf;
use tiny_http::{Response, Server};
use tracing::{debug, warn};
use url::Url;

pub trait CredentialAcquirer {
    fn acquire(&self, scopes: &[String]) -> Result<Credential>;
}

impl<F> CredentialAcquirer for F
where
    F: Fn(&[String]) -> Result<Credential>,
{
    fn acquire(&self, scopes: &[String]) -> Result<Credential> {
        self(scopes)
    }
}

/// Browser-based consent with a loopback redirect.
pub struct InteractiveConsent {
    secrets_path: PathBuf,
    open_browser: bool,
    on_url: Box<dyn Fn(&str)>,
}

impl InteractiveConsent {
    pub fn new(secrets_path: impl Into<PathBuf>) -> Self {
        InteractiveConsent {
            secrets_path: secrets_path.into(),
            open_browser: true,
            on_url: Box::new(|url: &str| {
                println!("Please visit this URL to authorize this application: {url}");
            }),
        }
    }

    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Replaces the default "please visit" prompt.
    pub fn on_authorization_url(mut self, on_url: impl Fn(&str) + 'static) -> Self {
        self.on_url = Box::new(on_url);
        self
    }
}

impl CredentialAcquirer for InteractiveConsent {
    fn acquire(&self, scopes: &[String]) -> Result<Credential> {
        let secrets = ClientSecrets::load(&self.secrets_path)?;

        // Dropped on every return path below, which closes the port.
        let server = Server::http("127.0.0.1:0")
            .map_err(|e| Error::Auth(format!("Failed to start local callback listener: {e}")))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| auth_error("Callback listener has no TCP address"))?;

        let redirect_url = RedirectUrl::new(format!("http://127.0.0.1:{port}/"))
            .map_err(|e| Error::Auth(format!("Invalid redirect URL: {e}")))?;
        let client = secrets.oauth_client()?.set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (authorize_url, csrf_state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        (self.on_url)(authorize_url.as_str());
        if self.open_browser {
            if let Err(e) = webbrowser::open(authorize_url.as_str()) {
                warn!("Could not open a browser: {e}");
            }
        }

        debug!(port, "Waiting for OAuth callback");
        let code = wait_for_code(&server, csrf_state.secret())?;

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request(http_client)
            .map_err(|e| Error::Auth(format!("Failed to exchange authorization code: {e}")))?;

        Ok(Credential::from_token_response(&response, None, scopes))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
    StateMismatch,
    Unrelated,
}

fn parse_callback(path: &str, expected_state: &str) -> Callback {
    let Ok(url) = Url::parse("http://127.0.0.1/").and_then(|base| base.join(path)) else {
        return Callback::Unrelated;
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Callback::Denied(error);
    }
    match code {
        None => Callback::Unrelated,
        Some(_) if state.as_deref() != Some(expected_state) => Callback::StateMismatch,
        Some(code) => Callback::Code(code),
    }
}

/// Blocks until the browser is redirected back with a code or an error.
fn wait_for_code(server: &Server, expected_state: &str) -> Result<String> {
    loop {
        let request = server.recv()?;
        let callback = parse_callback(request.url(), expected_state);

        let (status, body): (u16, &str) = match &callback {
            Callback::Code(_) => (200, "Authorization complete. You may close this window."),
            Callback::Denied(_) => (200, "Authorization was declined. You may close this window."),
            Callback::StateMismatch => (400, "Authorization failed: state mismatch."),
            Callback::Unrelated => (404, "Not found"),
        };
        if let Err(e) = request.respond(Response::from_string(body).with_status_code(status)) {
            warn!("Failed to answer OAuth callback: {e}");
        }

        match callback {
            Callback::Code(code) => return Ok(code),
            Callback::Denied(reason) => {
                return Err(Error::Auth(format!("Consent was declined: {reason}")))
            }
            Callback::StateMismatch => {
                return Err(auth_error("OAuth state mismatch in callback"))
            }
            Callback::Unrelated => continue,
        }
    }
}

/// Pre-provisioned access token; never touches the network.
pub struct ProvidedCredential {
    credential: Credential,
}

impl ProvidedCredential {
    pub fn new(access_token: &str) -> Self {
        ProvidedCredential {
            credential: Credential::bearer(access_token),
        }
    }
}

impl CredentialAcquirer for ProvidedCredential {
    fn acquire(&self, scopes: &[String]) -> Result<Credential> {
        if self.credential.access_token.is_empty() {
            return Err(auth_error("provided access token is empty"));
        }
        Ok(Credential {
            scopes: scopes.to_vec(),
            ..self.credential.clone()
        })
    }
}
