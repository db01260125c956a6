use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};

use super::drive::check_status;
use super::SyncError;

/// Bearer credential shared between the authorizer and the drive client.
pub type SharedToken = Arc<RwLock<Option<String>>>;

const ABOUT_URL: &str = "https://www.googleapis.com/drive/v3/about";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Delegated authorization. The flow that produces the credential lives
/// outside the crate; implementations only validate, hold and revoke it.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self) -> Result<(), SyncError>;
    async fn revoke(&self) -> Result<(), SyncError>;
}

/// Uses an access token obtained elsewhere (config or `STRATA_SYNC_TOKEN`).
pub struct BearerAuthorizer {
    http: Client,
    api_key: String,
    token: Option<String>,
    slot: SharedToken,
}

impl BearerAuthorizer {
    pub fn new(http: Client, api_key: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            token: token.filter(|token| !token.trim().is_empty()),
            slot: SharedToken::default(),
        }
    }

    /// Handle the drive client reads the active credential from.
    pub fn token_handle(&self) -> SharedToken {
        Arc::clone(&self.slot)
    }
}

#[async_trait]
impl Authorizer for BearerAuthorizer {
    async fn authorize(&self) -> Result<(), SyncError> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| SyncError::Unauthorized("no access token available".into()))?;

        let response = self
            .http
            .get(ABOUT_URL)
            .query(&[("fields", "user"), ("key", self.api_key.as_str())])
            .bearer_auth(&token)
            .send()
            .await?;
        check_status(response).await?;

        *self.slot.write() = Some(token);
        tracing::info!("remote storage authorized");
        Ok(())
    }

    /// Falls back to the configured token when this session never authorized.
    async fn revoke(&self) -> Result<(), SyncError> {
        let active = self.slot.write().take();
        let Some(token) = active.or_else(|| self.token.clone()) else {
            return Ok(());
        };
        let response = self
            .http
            .post(REVOKE_URL)
            .form(&[("token", token.as_str())])
            .send()
            .await?;
        // Already-expired tokens come back as 400; the session is gone either way.
        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(());
        }
        check_status(response).await.map(|_| ())
    }
}
