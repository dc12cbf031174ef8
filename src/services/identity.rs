use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::services::auth::external_user_id;
use crate::services::http_retry::send_with_backoff;

/// Supplies calendar-scoped OAuth access tokens for an authenticated subject.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, subject: &str) -> AppResult<String>;
}

/// Token broker backed by the identity provider's backend API:
/// `GET {api_url}/users/{user_id}/oauth_access_tokens/{provider}`.
pub struct HttpTokenBroker {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
    provider: String,
}

impl HttpTokenBroker {
    pub fn new(client: reqwest::Client, api_url: String, secret_key: String, provider: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key,
            provider,
        }
    }
}

/// The broker has answered with each of these shapes over time:
/// `{"data":[{"token":..}]}`, `[{"token":..}]` and `{"token":..}`.
pub fn extract_token(body: &Value) -> Option<String> {
    let candidate = body
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|t| t.get("token"))
        .or_else(|| body.get(0).and_then(|t| t.get("token")))
        .or_else(|| body.get("token"));

    candidate
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl TokenProvider for HttpTokenBroker {
    async fn access_token(&self, subject: &str) -> AppResult<String> {
        let user_id = external_user_id(subject);
        let url = format!(
            "{}/users/{}/oauth_access_tokens/{}",
            self.api_url,
            urlencoding::encode(user_id),
            urlencoding::encode(&self.provider)
        );

        let response = send_with_backoff("identity provider", || {
            self.client.get(&url).bearer_auth(&self.secret_key)
        })
        .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Identity(format!(
                "Failed to get calendar access token ({}): {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AppError::Identity(format!("Failed to parse access token response: {}", e))
        })?;

        extract_token(&body).ok_or_else(|| {
            tracing::warn!("No {} token found for user {}", self.provider, user_id);
            AppError::Identity(
                "No calendar access token available; reconnect the calendar account".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_token_from_every_known_shape() {
        assert_eq!(
            extract_token(&json!({"data": [{"token": "a"}]})).as_deref(),
            Some("a")
        );
        assert_eq!(extract_token(&json!([{"token": "b"}])).as_deref(), Some("b"));
        assert_eq!(extract_token(&json!({"token": "c"})).as_deref(), Some("c"));
    }

    #[test]
    fn missing_or_empty_token_is_none() {
        assert_eq!(extract_token(&json!({"data": []})), None);
        assert_eq!(extract_token(&json!([])), None);
        assert_eq!(extract_token(&json!({"token": ""})), None);
    }
}
