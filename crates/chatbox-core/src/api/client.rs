//! Authenticated HTTP client for the chat backend.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

use super::schema::{
    self, ChatReply, ChatRequest, HistoryRecord, LoginRequest, RefreshRequest, RegisterRequest,
    SessionRecord, TokenResponse,
};
use crate::auth::{AuthContext, Credentials};
use crate::error::{ApiError, Result};
use crate::state::Session;

/// Which pass of a request this is. Only a first pass may trigger a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

/// HTTP client that attaches the stored bearer token and recovers from an
/// expired access token by refreshing it once per call.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    auth: AuthContext,
    /// Serializes refreshes so concurrent 401s spend the refresh token once
    refresh_lock: Arc<Mutex<()>>,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: AuthContext) -> Result<Self> {
        Self::with_client(base_url, auth, Client::new())
    }

    pub fn with_timeout(base_url: &str, auth: AuthContext, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, auth, http)
    }

    pub fn with_client(base_url: &str, auth: AuthContext, http: Client) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        Ok(Self {
            http,
            base_url,
            auth,
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Sets or clears the bearer token used by all subsequent calls.
    pub fn set_credential(&self, token: Option<String>) {
        self.auth.set_access_token(token);
    }

    /// Issues an authenticated call and decodes the response body into `T`.
    ///
    /// A 401 on the first pass refreshes the access token and retries once.
    /// A 401 on the retry is returned as [`ApiError::Unauthorized`]; a failed
    /// refresh clears the stored credentials and returns
    /// [`ApiError::SessionExpired`]. Every other failure propagates unchanged.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let value = self.execute(method, &segments, body).await?;
        schema::decode(value, path)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Account endpoints (no bearer, no refresh)
    // ─────────────────────────────────────────────────────────────────────

    /// Logs in and stores the issued credential pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credentials> {
        let body = to_body(&LoginRequest {
            user_email: email,
            user_password: password,
        })?;
        let value = self.post_public(&["user", "login"], &body).await?;
        let tokens: TokenResponse = schema::decode(value, "login response")?;

        let access_token = tokens
            .access_token()
            .ok_or_else(|| ApiError::Schema("login response without access_token".to_string()))?
            .to_string();
        let credentials = Credentials {
            access_token,
            refresh_token: tokens.refresh_token().map(str::to_string),
        };

        self.auth.set_credentials(credentials.clone());
        tracing::info!(
            has_refresh_token = credentials.refresh_token.is_some(),
            "Logged in"
        );
        Ok(credentials)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<()> {
        let body = to_body(&RegisterRequest {
            user_email: email,
            user_password: password,
        })?;
        self.post_public(&["user", "register"], &body).await?;
        tracing::info!("Registered new account");
        Ok(())
    }

    /// Forgets the credential pair and the active session.
    pub fn logout(&self) {
        self.auth.clear();
        self.auth.set_active_session_id(None);
        tracing::info!("Logged out");
    }

    /// Exchanges the stored refresh token for a new access token.
    ///
    /// Any failure, including a response without a token, discards the
    /// stored credentials and yields [`ApiError::SessionExpired`].
    pub async fn refresh(&self) -> Result<String> {
        self.refresh_after(None).await
    }

    async fn refresh_after(&self, rejected: Option<&str>) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        // Another call already replaced the rejected token
        if let Some(current) = self.auth.access_token() {
            if rejected.is_some_and(|r| r != current) {
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.auth.refresh_token() else {
            tracing::warn!("No refresh token stored, re-authentication required");
            self.auth.clear();
            return Err(ApiError::SessionExpired);
        };

        let body = to_body(&RefreshRequest {
            refresh_token: &refresh_token,
        })?;
        let tokens = match self.post_public(&["user", "refresh"], &body).await {
            Ok(value) => schema::decode::<TokenResponse>(value, "refresh response"),
            Err(e) => Err(e),
        };

        match tokens {
            Ok(tokens) => match tokens.access_token() {
                Some(access) => {
                    let access = access.to_string();
                    self.auth.set_access_token(Some(access.clone()));
                    if let Some(rotated) = tokens.refresh_token() {
                        self.auth.set_refresh_token(rotated.to_string());
                    }
                    tracing::debug!("Access token refreshed");
                    Ok(access)
                }
                None => {
                    tracing::warn!("Refresh response carried no access token");
                    self.auth.clear();
                    Err(ApiError::SessionExpired)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                self.auth.clear();
                Err(ApiError::SessionExpired)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chat endpoints
    // ─────────────────────────────────────────────────────────────────────

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let value = self.execute(Method::GET, &["chat", "history"], None).await?;
        let records: Vec<SessionRecord> = schema::decode_list(value, "sessions");
        Ok(records.into_iter().map(Session::from).collect())
    }

    pub async fn fetch_history(&self, session_id: &str) -> Result<Vec<HistoryRecord>> {
        let value = self
            .execute(Method::GET, &["chat", "history", session_id], None)
            .await?;
        Ok(schema::decode_list(value, "history"))
    }

    pub async fn create_session(&self) -> Result<Session> {
        let value = self
            .execute(Method::POST, &["chat", "createSession"], None)
            .await?;
        let record: SessionRecord = schema::decode(value, "created session")?;
        tracing::info!(session_id = %record.id, "Created session");
        Ok(record.into())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.execute(Method::DELETE, &["chat", "history", session_id], None)
            .await?;
        tracing::info!(session_id, "Deleted session");
        Ok(())
    }

    /// Sends a chat message and returns the bot's reply text.
    pub async fn send_message(&self, session_id: &str, message: &str) -> Result<String> {
        let body = to_body(&ChatRequest {
            message,
            id: session_id,
        })?;
        let value = self.execute(Method::POST, &["chat"], Some(&body)).await?;
        let reply: ChatReply = schema::decode(value, "chat reply")?;
        Ok(reply.reply)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute(&self, method: Method, segments: &[&str], body: Option<&Value>) -> Result<Value> {
        let mut attempt = Attempt::First;
        loop {
            let token = self.auth.access_token();
            let mut request = self.http.request(method.clone(), self.url(segments));
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!(%method, path = %segments.join("/"), ?attempt, "Sending request");
            let response = request.send().await?;

            if response.status() == StatusCode::UNAUTHORIZED {
                match attempt {
                    Attempt::First => {
                        tracing::debug!(path = %segments.join("/"), "Access token rejected, refreshing");
                        self.refresh_after(token.as_deref()).await?;
                        attempt = Attempt::Retry;
                        continue;
                    }
                    Attempt::Retry => return Err(ApiError::Unauthorized),
                }
            }

            return read_body(response).await;
        }
    }

    async fn post_public(&self, segments: &[&str], body: &Value) -> Result<Value> {
        tracing::debug!(path = %segments.join("/"), "Sending unauthenticated request");
        let response = self
            .http
            .post(self.url(segments))
            .json(body)
            .send()
            .await?;
        read_body(response).await
    }
}

fn to_body<T: Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| ApiError::Schema(format!("request body: {e}")))
}

async fn read_body(response: Response) -> Result<Value> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Http {
            status: status.as_u16(),
            message,
        });
    }

    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Schema(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, AuthContext::in_memory()).unwrap()
    }

    #[test]
    fn test_url_joins_segments() {
        let api = client("http://localhost:8000");
        assert_eq!(
            api.url(&["chat", "history", "42"]).as_str(),
            "http://localhost:8000/chat/history/42"
        );
    }

    #[test]
    fn test_url_keeps_base_path_and_escapes_ids() {
        let api = client("http://localhost:8000/api/");
        assert_eq!(
            api.url(&["chat", "history", "a b/c"]).as_str(),
            "http://localhost:8000/api/chat/history/a%20b%2Fc"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", AuthContext::in_memory()),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            ApiClient::new("mailto:someone@example.com", AuthContext::in_memory()),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_set_credential_updates_context() {
        let api = client("http://localhost:8000");
        api.set_credential(Some("token".to_string()));
        assert_eq!(api.auth().access_token().as_deref(), Some("token"));
        api.set_credential(None);
        assert!(api.auth().access_token().is_none());
    }
}
