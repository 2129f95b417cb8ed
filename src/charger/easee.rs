//! Easee cloud client
//!
//! Blocking HTTP client for the charger state and command endpoints.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};

use super::types::{ChargerCommand, ChargerState, EaseeState};
use super::Charger;
use crate::auth::Authenticator;
use crate::errors::ChargerError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct EaseeCharger {
    id: String,
    http: Client,
    auth: Arc<Authenticator>,
}

/// Decode a state response taken at `timestamp`.
pub fn parse_state(
    raw: serde_json::Value,
    timestamp: DateTime<Utc>,
) -> Result<ChargerState, ChargerError> {
    let state: EaseeState =
        serde_json::from_value(raw.clone()).map_err(|e| ChargerError::Decode(e.to_string()))?;
    Ok(ChargerState {
        snapshot: state.to_snapshot(timestamp),
        raw,
    })
}

impl EaseeCharger {
    pub fn new(id: impl Into<String>, auth: Arc<Authenticator>) -> Result<Self, ChargerError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| ChargerError::Http {
                url: auth.base_url().to_string(),
                source,
            })?;
        Ok(Self {
            id: id.into(),
            http,
            auth,
        })
    }

    fn send_once(&self, method: &Method, url: &str) -> Result<Response, ChargerError> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");
        if let Some(token) = self.auth.access_token() {
            request = request.bearer_auth(token);
        }
        request.send().map_err(|source| ChargerError::Http {
            url: url.to_string(),
            source,
        })
    }

    /// Send a request, logging in again and retrying once on 401.
    fn request(&self, method: Method, path: &str) -> Result<Response, ChargerError> {
        let url = format!("{}{}", self.auth.base_url(), path);
        let mut response = self.send_once(&method, &url)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Unauthorized response from {}, logging in again", url);
            self.auth.login()?;
            response = self.send_once(&method, &url)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ChargerError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Charger for EaseeCharger {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch_state(&self) -> Result<ChargerState, ChargerError> {
        let response = self.request(Method::GET, &format!("/chargers/{}/state", self.id))?;
        let raw: serde_json::Value = response
            .json()
            .map_err(|e| ChargerError::Decode(e.to_string()))?;
        let state = parse_state(raw, Utc::now())?;
        debug!(
            "Charger {} opMode={} L1={} L2={} L3={}",
            self.id,
            state.snapshot.op_mode,
            state.snapshot.l1,
            state.snapshot.l2,
            state.snapshot.l3
        );
        Ok(state)
    }

    fn send_command(&self, command: ChargerCommand) -> Result<(), ChargerError> {
        let path = format!("/chargers/{}/commands/{}", self.id, command.endpoint());
        self.request(Method::POST, &path)?;
        info!("Sent {} to charger {}", command, self.id);
        Ok(())
    }
}
