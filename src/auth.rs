use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// Scope required to create videos on the user's channel.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

// A token this close to expiry is treated as expired so an upload never
// starts with a credential about to lapse mid-transfer.
const EXPIRY_SLACK_SECS: u64 = 60;

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// OAuth client identity, read from the standard client secrets JSON the
/// API console hands out.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets, AuthError> {
    if !path.is_file() {
        return Err(AuthError::MissingClientSecrets(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path)?;
    let parsed: ClientSecretsFile = serde_json::from_str(&raw)?;
    parsed.installed.or(parsed.web).ok_or_else(|| {
        AuthError::InvalidClientSecrets(
            "expected an \"installed\" (or \"web\") application entry".to_string(),
        )
    })
}

/// Credential persisted between runs so consent is a one-time affair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds after which `access_token` is no longer usable.
    pub expires_at: u64,
}

impl StoredToken {
    pub fn is_expired(&self, now_unix: u64) -> bool {
        now_unix + EXPIRY_SLACK_SECS >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

/// Obtains access credentials for the upload API.
///
/// Order of preference: a persisted unexpired token, a silent refresh when
/// a refresh token exists, and only then interactive browser consent over
/// a loopback redirect.
pub struct Authenticator {
    secrets: ClientSecrets,
    token_path: PathBuf,
    client: reqwest::blocking::Client,
}

impl Authenticator {
    pub fn new(secrets: ClientSecrets, token_path: PathBuf) -> Self {
        Self {
            secrets,
            token_path,
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn access_token(&self) -> Result<String, AuthError> {
        let now = unix_now();

        if let Some(stored) = self.load_stored()? {
            if !stored.is_expired(now) {
                return Ok(stored.access_token);
            }
            if let Some(refresh_token) = stored.refresh_token.clone() {
                match self.refresh(&refresh_token) {
                    Ok(mut renewed) => {
                        // The refresh grant usually omits the refresh token;
                        // keep the one we already have.
                        if renewed.refresh_token.is_none() {
                            renewed.refresh_token = Some(refresh_token);
                        }
                        self.persist(&renewed)?;
                        return Ok(renewed.access_token);
                    }
                    Err(err) => {
                        log::warn!("token refresh failed, falling back to consent: {err}");
                    }
                }
            }
        }

        let fresh = self.interactive_consent()?;
        self.persist(&fresh)?;
        Ok(fresh.access_token)
    }

    fn load_stored(&self) -> Result<Option<StoredToken>, AuthError> {
        if !self.token_path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.token_path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn persist(&self, token: &StoredToken) -> Result<(), AuthError> {
        if let Some(parent) = self.token_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.token_path, format!("{payload}\n"))?;
        Ok(())
    }

    fn refresh(&self, refresh_token: &str) -> Result<StoredToken, AuthError> {
        log::info!("refreshing upload access token");
        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()?;
        Self::token_from_response(response)
    }

    fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<StoredToken, AuthError> {
        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()?;
        Self::token_from_response(response)
    }

    fn token_from_response(response: reqwest::blocking::Response) -> Result<StoredToken, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: TokenResponse = response.json()?;
        Ok(StoredToken {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_at: unix_now() + parsed.expires_in,
        })
    }

    /// One-shot consent flow: opens the provider's consent page in the
    /// default browser and waits on a loopback listener for the redirect
    /// carrying the authorization code.
    fn interactive_consent(&self) -> Result<StoredToken, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}");

        let consent_url = Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", UPLOAD_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|err| AuthError::Consent(format!("invalid auth uri: {err}")))?;

        log::info!("opening browser for upload consent");
        open_in_browser(consent_url.as_str());

        let (mut stream, _) = listener.accept()?;
        let mut buf = [0_u8; 4096];
        let read = stream.read(&mut buf)?;
        let request = String::from_utf8_lossy(&buf[..read]);
        let request_line = request.lines().next().unwrap_or_default();
        let code = extract_auth_code(request_line)?;

        let _ = stream.write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
              <html><body>Authorization received. You can close this window.</body></html>",
        );

        self.exchange_code(&code, &redirect_uri)
    }
}

/// Pulls the `code` parameter out of the redirect's request line
/// (`GET /?code=... HTTP/1.1`).
fn extract_auth_code(request_line: &str) -> Result<String, AuthError> {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AuthError::Consent("malformed redirect request".to_string()))?;
    let full = Url::parse(&format!("http://127.0.0.1{path}"))
        .map_err(|_| AuthError::Consent("malformed redirect request".to_string()))?;

    let mut code = None;
    for (key, value) in full.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => {
                return Err(AuthError::Consent(format!(
                    "provider reported: {value}"
                )));
            }
            _ => {}
        }
    }
    code.ok_or_else(|| AuthError::Consent("redirect carried no authorization code".to_string()))
}

fn open_in_browser(url: &str) {
    #[cfg(target_os = "windows")]
    let result = Command::new("cmd").args(["/C", "start", "", url]).spawn();

    #[cfg(target_os = "macos")]
    let result = Command::new("open").arg(url).spawn();

    #[cfg(all(unix, not(target_os = "macos")))]
    let result = Command::new("xdg-open").arg(url).spawn();

    if let Err(err) = result {
        log::warn!("could not open browser, visit manually: {url} ({err})");
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
