//! Easee cloud authentication
//!
//! Keeps the access/refresh token pair, persists it to the credentials file
//! and refreshes it from a background thread before it expires.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::EaseeConfig;
use crate::errors::ChargerError;

pub const EASEE_API_URL: &str = "https://api.easee.com/api";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Refresh this long before the token expires
const REFRESH_MARGIN: Duration = Duration::from_secs(10);

/// Token pair as persisted in the credentials file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// JSON file holding the last issued tokens
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored tokens. A missing or unreadable file yields empty
    /// credentials so that a fresh login is performed.
    pub fn load(&self) -> StoredCredentials {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return StoredCredentials::default(),
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(
                "Ignoring unreadable credentials file {}: {}",
                self.path.display(),
                e
            );
            StoredCredentials::default()
        })
    }

    /// Write tokens, readable by the owner only.
    pub fn save(&self, credentials: &StoredCredentials) -> Result<(), ChargerError> {
        let fail = |reason: String| ChargerError::Credentials {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(credentials).map_err(|e| fail(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| fail(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|e| fail(e.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_name: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    access_token: &'a str,
    refresh_token: &'a str,
}

#[derive(Debug, Clone, Default)]
struct Tokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
    lifetime: Option<Duration>,
}

/// Exponential backoff for authentication retries
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Delay before the next attempt; doubles on every call up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Token holder shared by the charger client and the refresh task
pub struct Authenticator {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    auth_interval: Option<Duration>,
    store: CredentialStore,
    tokens: RwLock<Tokens>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("store", &self.store)
            .finish()
    }
}

impl Authenticator {
    pub fn new(config: &EaseeConfig, store: CredentialStore) -> Result<Self, ChargerError> {
        Self::with_base_url(config, store, EASEE_API_URL)
    }

    pub fn with_base_url(
        config: &EaseeConfig,
        store: CredentialStore,
        base_url: impl Into<String>,
    ) -> Result<Self, ChargerError> {
        let base_url = base_url.into();
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| ChargerError::Http {
                url: base_url.clone(),
                source,
            })?;

        let stored = store.load();
        let tokens = Tokens {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            lifetime: stored.expires_in.map(Duration::from_secs),
        };

        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            auth_interval: config.auth_interval,
            store,
            tokens: RwLock::new(tokens),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens.read().ok()?.access_token.clone()
    }

    /// Log in with the configured account.
    pub fn login(&self) -> Result<(), ChargerError> {
        let url = format!("{}/accounts/login", self.base_url);
        debug!("Logging in to {}", url);
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&LoginRequest {
                user_name: &self.username,
                password: &self.password,
            })
            .send()
            .map_err(|source| ChargerError::Http {
                url: url.clone(),
                source,
            })?;
        self.accept_tokens(&url, response)
    }

    /// Exchange the refresh token for a new token pair.
    pub fn refresh(&self) -> Result<(), ChargerError> {
        let (access_token, refresh_token) = {
            let tokens = self
                .tokens
                .read()
                .map_err(|_| ChargerError::Authentication("token lock poisoned".to_string()))?;
            match (&tokens.access_token, &tokens.refresh_token) {
                (Some(a), Some(r)) => (a.clone(), r.clone()),
                _ => {
                    return Err(ChargerError::Authentication(
                        "no refresh token available".to_string(),
                    ))
                }
            }
        };

        let url = format!("{}/accounts/refresh_token", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .bearer_auth(&access_token)
            .json(&RefreshRequest {
                access_token: &access_token,
                refresh_token: &refresh_token,
            })
            .send()
            .map_err(|source| ChargerError::Http {
                url: url.clone(),
                source,
            })?;
        self.accept_tokens(&url, response)
    }

    fn accept_tokens(
        &self,
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<(), ChargerError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ChargerError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body: TokenResponse = response
            .json()
            .map_err(|e| ChargerError::Decode(e.to_string()))?;
        let access_token = body.access_token.ok_or_else(|| {
            ChargerError::Authentication("no access token received".to_string())
        })?;

        let stored = StoredCredentials {
            access_token: Some(access_token),
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
        };
        self.store.save(&stored)?;
        self.set_tokens(stored);
        Ok(())
    }

    fn set_tokens(&self, stored: StoredCredentials) {
        if let Ok(mut tokens) = self.tokens.write() {
            *tokens = Tokens {
                access_token: stored.access_token,
                refresh_token: stored.refresh_token,
                lifetime: stored.expires_in.map(Duration::from_secs),
            };
        }
    }

    /// Time until the next scheduled refresh.
    pub fn refresh_delay(&self) -> Duration {
        let lifetime = self
            .auth_interval
            .or_else(|| self.tokens.read().ok().and_then(|t| t.lifetime))
            .unwrap_or(Duration::from_secs(3600));
        lifetime.saturating_sub(REFRESH_MARGIN)
    }

    /// Obtain a valid token pair, preferring a refresh of stored tokens over
    /// a new login. Retries with exponential backoff until it succeeds or
    /// `running` is cleared.
    pub fn authenticate_with_retry(&self, running: &AtomicBool) -> Result<(), ChargerError> {
        let mut backoff = Backoff::default();
        loop {
            let result = self.refresh().or_else(|e| {
                debug!("Token refresh not possible ({}), logging in", e);
                self.login()
            });
            match result {
                Ok(()) => {
                    info!("Authentication succeeded");
                    return Ok(());
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(
                        "Authentication failed: {}. Retrying in {:?}...",
                        e, delay
                    );
                    if !sleep_while_running(delay, running) {
                        return Err(e);
                    }
                }
            }
        }
    }
}

fn sleep_while_running(delay: Duration, running: &AtomicBool) -> bool {
    let step = Duration::from_millis(250);
    let mut slept = Duration::ZERO;
    while slept < delay {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        thread::sleep(step);
        slept += step;
    }
    running.load(Ordering::SeqCst)
}

/// Background token refresh, re-armed after every attempt.
///
/// Dropping the handle (or calling [`RefreshTask::stop`]) cancels the task.
pub struct RefreshTask {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    pub fn spawn(auth: Arc<Authenticator>) -> Self {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let mut backoff = Backoff::default();
            let mut delay = auth.refresh_delay();
            loop {
                debug!("Next token refresh in {:?}", delay);
                match stop_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                let result = auth.refresh().or_else(|e| {
                    warn!("Token refresh failed ({}), logging in again", e);
                    auth.login()
                });
                match result {
                    Ok(()) => {
                        info!("Access token refreshed");
                        backoff.reset();
                        delay = auth.refresh_delay();
                    }
                    Err(e) => {
                        delay = backoff.next_delay();
                        error!("Token refresh failed: {}. Retrying in {:?}", e, delay);
                    }
                }
            }
            debug!("Token refresh task stopped");
        });

        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
