//! Token grant and authenticated calls.

use crate::transport::{ApiRequest, ApiResponse, Body, Method, Transport};
use da_core::{Credentials, Error, Session};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Issues calls under one immutable session. There is no refresh: a
/// token that expires mid-run surfaces as a transport error, and
/// renewing means calling `authenticate` again for a new client.
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    session: Session,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Exchanges client credentials for a bearer token bound to `scopes`.
    pub async fn authenticate(
        transport: Arc<dyn Transport>,
        auth_url: &str,
        credentials: &Credentials,
        scopes: &[String],
    ) -> Result<Self, Error> {
        let form = vec![
            ("client_id".to_string(), credentials.client_id.clone()),
            ("client_secret".to_string(), credentials.client_secret.clone()),
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("scope".to_string(), scopes.join(" ")),
        ];
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        let request = ApiRequest::post(auth_url, Body::Form(form)).with_headers(headers);
        let response = transport.execute(request).await?;
        if !response.is_success() {
            return Err(Error::Authentication(format!(
                "status {}: {}",
                response.status,
                response.text()
            )));
        }
        let token: TokenResponse = response.json()?;
        info!(scope = %scopes.join(" "), "authenticated");
        Ok(Self {
            transport,
            session: Session {
                access_token: token.access_token,
                scopes: scopes.to_vec(),
                issued_at: SystemTime::now(),
            },
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn bearer_token(&self) -> &str {
        &self.session.access_token
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Default headers for JSON API calls under this session.
    pub fn default_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.session.access_token),
        );
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers
    }

    /// Headers for an authorized upload with an explicit content type.
    pub fn headers_with_content_type(&self, content_type: &str) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.session.access_token),
        );
        headers.insert("content-type".to_string(), content_type.to_string());
        headers
    }

    /// Sends `request`, injecting the bearer/json defaults when it
    /// carries no explicit headers. Any non-2xx becomes
    /// `Error::Transport`; callers interpret status codes themselves.
    /// No retry.
    pub async fn call(&self, mut request: ApiRequest) -> Result<ApiResponse, Error> {
        if request.headers.is_none() {
            request.headers = Some(self.default_headers());
        }
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(Error::transport(Some(response.status), response.text()));
        }
        Ok(response)
    }
}

/// GET `/forgeapps/me`: the caller's resolved account identifier used to
/// compose fully qualified package/activity names. Falls back to the app
/// id remotely when no nickname was ever set.
pub async fn fetch_nickname(client: &SessionClient, base_url: &str) -> Result<String, Error> {
    let response = client
        .call(ApiRequest::get(format!("{base_url}/forgeapps/me")))
        .await?;
    let text = response.text();
    Ok(text.trim().trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use da_core::Credentials;

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials {
            client_id: "app-id".to_string(),
            client_secret: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("app-id"));
        assert!(!rendered.contains("hunter2"));
    }
}
