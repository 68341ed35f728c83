//! Directory port over the Auth0 Management API.
//!
//! Billing attributes live in the user's `app_metadata`. Auth0 merges a PATCHed
//! `app_metadata` object into the stored one at the top level and removes keys
//! set to `null`, which is exactly the merge contract the port promises.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::directory::DirectoryPort,
    domain::entities::{
        billing_metadata::{Metadata, MetadataFragment},
        directory_user::DirectoryUser,
    },
    infra::http_client::build_client,
};

/// Refresh the management token this long before Auth0 says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: SecretString,
    expires_at: Instant,
}

pub struct Auth0Directory {
    client: Client,
    base_url: Url,
    client_id: String,
    client_secret: SecretString,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Auth0User {
    user_id: String,
    email: Option<String>,
    #[serde(default)]
    app_metadata: Metadata,
}

impl From<Auth0User> for DirectoryUser {
    fn from(user: Auth0User) -> Self {
        DirectoryUser {
            id: user.user_id,
            email: user.email,
            metadata: user.app_metadata,
        }
    }
}

#[derive(Serialize)]
struct MetadataPatch<'a> {
    app_metadata: &'a Metadata,
}

impl Auth0Directory {
    pub fn new(domain: &str, client_id: String, client_secret: SecretString) -> AppResult<Self> {
        let base_url = Url::parse(&format!("https://{}/", domain.trim_end_matches('/')))
            .map_err(|e| AppError::Config(format!("Invalid AUTH0_DOMAIN: {}", e)))?;

        Ok(Self {
            client: build_client()?,
            base_url,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    fn audience(&self) -> String {
        format!("{}api/v2/", self.base_url)
    }

    fn user_url(&self, user_id: &str) -> String {
        // Auth0 ids contain `|`, which must be percent-encoded in the path.
        let encoded: String = url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect();
        format!("{}api/v2/users/{}", self.base_url, encoded)
    }

    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.access_token.expose_secret().to_string());
        }

        let response = self
            .client
            .post(format!("{}oauth/token", self.base_url))
            .json(&TokenRequest {
                grant_type: "client_credentials",
                client_id: &self.client_id,
                client_secret: self.client_secret.expose_secret(),
                audience: self.audience(),
            })
            .send()
            .await
            .map_err(|e| AppError::Directory(format!("Auth0 token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Auth0 token request rejected");
            return Err(AppError::Directory(format!(
                "Auth0 token request rejected: {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Directory(format!("Invalid Auth0 token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: SecretString::from(token.access_token.clone()),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!(expires_in = token.expires_in, "Fetched Auth0 management token");

        Ok(token.access_token)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            // Token was revoked or rotated early; the next call fetches a new one.
            self.forget_token().await;
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, action, "Auth0 Management API error");
        Err(AppError::Directory(format!(
            "Auth0 {} failed: {} - {}",
            action, status, body
        )))
    }
}

#[async_trait]
impl DirectoryPort for Auth0Directory {
    async fn get_user(&self, user_id: &str) -> AppResult<Option<DirectoryUser>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.user_url(user_id))
            .bearer_auth(token)
            .query(&[("fields", "user_id,email,app_metadata"), ("include_fields", "true")])
            .send()
            .await
            .map_err(|e| AppError::Directory(format!("Auth0 request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = self.check_status(response, "get user").await?;
        let user: Auth0User = response
            .json()
            .await
            .map_err(|e| AppError::Directory(format!("Invalid Auth0 user response: {}", e)))?;
        Ok(Some(user.into()))
    }

    async fn merge_metadata(&self, user_id: &str, fragment: &MetadataFragment) -> AppResult<()> {
        if fragment.is_empty() {
            return Ok(());
        }

        let token = self.access_token().await?;
        let response = self
            .client
            .patch(self.user_url(user_id))
            .bearer_auth(token)
            .json(&MetadataPatch {
                app_metadata: fragment.fields(),
            })
            .send()
            .await
            .map_err(|e| AppError::Directory(format!("Auth0 request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound);
        }

        self.check_status(response, "update app_metadata").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directory() -> Auth0Directory {
        Auth0Directory::new(
            "tenant.eu.auth0.com",
            "client".into(),
            SecretString::from("secret".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn user_ids_are_percent_encoded() {
        assert_eq!(
            directory().user_url("auth0|65f0c1"),
            "https://tenant.eu.auth0.com/api/v2/users/auth0%7C65f0c1"
        );
    }

    #[test]
    fn audience_is_management_api() {
        assert_eq!(directory().audience(), "https://tenant.eu.auth0.com/api/v2/");
    }

    #[test]
    fn rejects_unparseable_domain() {
        assert!(matches!(
            Auth0Directory::new("bad domain", "client".into(), SecretString::from("secret".to_string())),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn patch_body_carries_nulls() {
        let fragment = MetadataFragment::clear("cus_1", "canceled");
        let body = serde_json::to_value(MetadataPatch {
            app_metadata: fragment.fields(),
        })
        .unwrap();

        assert_eq!(body["app_metadata"]["billingCustomerId"], json!("cus_1"));
        assert_eq!(body["app_metadata"]["planName"], json!(null));
    }

    #[test]
    fn user_without_app_metadata_parses() {
        let user: Auth0User =
            serde_json::from_value(json!({ "user_id": "auth0|1", "email": "a@example.com" }))
                .unwrap();
        let user: DirectoryUser = user.into();
        assert!(user.metadata.is_empty());
        assert_eq!(user.id, "auth0|1");
    }
}
