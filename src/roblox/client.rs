//! Thin HTTP wrapper for the Roblox web APIs

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::RobloxSettings;

/// Why a single lookup against Roblox failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("responded with status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Base URLs for the Roblox hosts we talk to
#[derive(Debug, Clone)]
pub struct RobloxEndpoints {
    pub api: String,
    pub users: String,
    pub avatar: String,
    pub friends: String,
    pub www: String,
}

impl Default for RobloxEndpoints {
    fn default() -> Self {
        Self {
            api: "https://api.roblox.com".to_string(),
            users: "https://users.roblox.com".to_string(),
            avatar: "https://avatar.roblox.com".to_string(),
            friends: "https://friends.roblox.com".to_string(),
            www: "https://www.roblox.com".to_string(),
        }
    }
}

/// An HTTP response whose body has been read
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn non-2xx responses into errors
    pub fn ensure_success(self) -> Result<Self, LookupError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(LookupError::Status(self.status))
        }
    }

    pub fn json(&self) -> Result<Value, LookupError> {
        serde_json::from_str(&self.body).map_err(|e| LookupError::Malformed(e.to_string()))
    }
}

/// Roblox HTTP client carrying the auth cookie and user agent
#[derive(Clone)]
pub struct RobloxClient {
    http: reqwest::Client,
    cookie: Option<String>,
    user_agent: String,
    pub endpoints: RobloxEndpoints,
}

impl RobloxClient {
    pub fn new(settings: &RobloxSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            cookie: settings.cookie.clone(),
            user_agent: settings.user_agent.clone(),
            endpoints: RobloxEndpoints::default(),
        }
    }

    fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(reqwest::header::USER_AGENT, &self.user_agent);
        match &self.cookie {
            Some(cookie) => request.header(reqwest::header::COOKIE, format!(".ROBLOSECURITY={}", cookie)),
            None => request,
        }
    }

    /// GET a URL; only transport failures are errors
    pub async fn get(&self, url: &str) -> Result<RawResponse, LookupError> {
        debug!("GET {}", url);
        let response = self
            .decorate(self.http.get(url))
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        read_response(response).await
    }

    /// POST a JSON body; only transport failures are errors
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<RawResponse, LookupError> {
        debug!("POST {}", url);
        let response = self
            .decorate(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        read_response(response).await
    }

    /// GET a URL and parse a successful response as JSON
    pub async fn get_json(&self, url: &str) -> Result<Value, LookupError> {
        self.get(url).await?.ensure_success()?.json()
    }

    /// POST a JSON body and parse a successful response as JSON
    pub async fn post_for_json(&self, url: &str, body: &Value) -> Result<Value, LookupError> {
        self.post_json(url, body).await?.ensure_success()?.json()
    }

    /// GET a URL and return the body of a successful response
    pub async fn get_text(&self, url: &str) -> Result<String, LookupError> {
        Ok(self.get(url).await?.ensure_success()?.body)
    }
}

async fn read_response(response: reqwest::Response) -> Result<RawResponse, LookupError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| LookupError::Transport(e.to_string()))?;
    Ok(RawResponse { status, body })
}

/// Read a Roblox user ID that may be encoded as a number or a string
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n.to_string()),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            Some(s.clone())
        }
        _ => None,
    }
}
