//! Google Identity Provider
//!
//! Exchanges the OAuth access token obtained by the extension (via
//! `chrome.identity`) for the account profile.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use premium_core::{CoreError, Identity, IdentityProvider, Result};

const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Google OAuth userinfo provider
pub struct GoogleIdentityProvider {
    http: reqwest::Client,
    userinfo_url: String,
}

impl GoogleIdentityProvider {
    pub fn new(userinfo_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(Self {
            http,
            userinfo_url: userinfo_url.into(),
        })
    }

    /// Provider against Google's production userinfo endpoint
    pub fn google() -> Result<Self> {
        Self::new(USERINFO_URL)
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn identify(&self, credential: &str) -> Result<Identity> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(credential)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST) {
            return Err(CoreError::InvalidCredential(format!("google returned {status}")));
        }
        if !status.is_success() {
            return Err(CoreError::Unavailable(format!("google returned {status}")));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| CoreError::Unavailable(e.to_string()))?;

        let email = info
            .email
            .ok_or_else(|| CoreError::InvalidCredential("token lacks the email scope".into()))?;
        if info.email_verified == Some(false) {
            return Err(CoreError::InvalidCredential(format!("{email} is not verified")));
        }

        Ok(Identity {
            subject_id: info.sub,
            email,
            name: info.name,
            picture: info.picture,
        })
    }

    fn name(&self) -> &str {
        "google"
    }
}
