//! HTTP client for the workspace API

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cs_core::config::{ApiConfig, RetryPolicy};
use cs_core::{ApiError, User, Workspace};

use crate::pagination::next_page_url;

/// Largest page the server honours
pub const MAX_PAGE_SIZE: usize = 100;

/// Response bodies longer than this are cut in error messages
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    codespaces: Vec<Workspace>,
    #[serde(default)]
    total_count: usize,
}

/// Client for the workspace REST API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    web_url: String,
    token: Option<String>,
    retry: RetryPolicy,
    page_size: usize,
}

impl ApiClient {
    /// Create a client. `token` is sent as a bearer credential when present.
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cs/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            token,
            retry: config.retry,
            page_size: config.page_size.clamp(1, MAX_PAGE_SIZE),
        })
    }

    pub fn web_url(&self) -> &str {
        &self.web_url
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request, mapping non-success statuses to `ApiError`
    async fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let resp = self
            .apply_auth(req)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > ERROR_BODY_LIMIT {
            let mut cut = ERROR_BODY_LIMIT;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(ApiError::from_status(status.as_u16(), body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        req: RequestBuilder,
    ) -> Result<T, ApiError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ApiError::Canceled),
            result = async {
                let resp = self.send(req).await?;
                resp.json::<T>()
                    .await
                    .map_err(|e| ApiError::Decode(e.to_string()))
            } => result,
        }
    }

    /// Get the authenticated user
    pub async fn get_user(&self, cancel: &CancellationToken) -> Result<User, ApiError> {
        let req = self.http.get(format!("{}/user", self.api_url));
        self.send_json(cancel, req).await
    }

    /// Fetch one workspace by name.
    ///
    /// Server-side failures are retried up to the retry policy's bound with
    /// its delay in between; the last error is returned once the bound is
    /// exhausted. Anything else fails on the first attempt.
    pub async fn get_workspace(
        &self,
        cancel: &CancellationToken,
        name: &str,
        include_connection: bool,
    ) -> Result<Workspace, ApiError> {
        let url = format!("{}/user/codespaces/{}", self.api_url, name);
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 1;

        loop {
            let mut req = self.http.get(&url);
            if include_connection {
                req = req.query(&[("internal", "true"), ("refresh", "true")]);
            }

            match self.send_json::<Workspace>(cancel, req).await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        codespace = %name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Transient API failure, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ApiError::Canceled),
                        _ = tokio::time::sleep(self.retry.delay) => {}
                    }
                    attempt += 1;
                }
                Err(ApiError::NotFound(_)) => return Err(ApiError::NotFound(name.to_string())),
                result => return result,
            }
        }
    }

    /// List the user's workspaces in server order.
    ///
    /// `None` walks every page exactly once. `Some(limit)` stops as soon as
    /// `limit` workspaces are collected and truncates to exactly that many.
    pub async fn list_workspaces(
        &self,
        cancel: &CancellationToken,
        limit: Option<usize>,
    ) -> Result<Vec<Workspace>, ApiError> {
        let per_page = match limit {
            Some(0) => return Ok(Vec::new()),
            Some(limit) => limit.min(MAX_PAGE_SIZE),
            None => self.page_size,
        };

        let mut workspaces = Vec::new();
        let mut req = self
            .http
            .get(format!("{}/user/codespaces", self.api_url))
            .query(&[("per_page", per_page)]);
        let mut page = 1;

        loop {
            let (resp, next) = tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::Canceled),
                result = async {
                    let resp = self.send(req).await?;
                    let next = next_page_url(resp.headers());
                    let body = resp
                        .json::<ListResponse>()
                        .await
                        .map_err(|e| ApiError::Decode(e.to_string()))?;
                    Ok::<_, ApiError>((body, next))
                } => result?,
            };

            debug!(
                page,
                count = resp.codespaces.len(),
                total = resp.total_count,
                "Fetched workspace page"
            );
            workspaces.extend(resp.codespaces);

            if let Some(limit) = limit {
                if workspaces.len() >= limit {
                    workspaces.truncate(limit);
                    break;
                }
            }

            match next {
                Some(url) => req = self.http.get(url),
                None => break,
            }
            page += 1;
        }

        Ok(workspaces)
    }

    /// Ask the server to start a stopped workspace
    pub async fn start_workspace(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<(), ApiError> {
        let req = self
            .http
            .post(format!("{}/user/codespaces/{}/start", self.api_url, name));

        tokio::select! {
            _ = cancel.cancelled() => Err(ApiError::Canceled),
            result = self.send(req) => result.map(|_| ()),
        }
    }

    /// Public SSH keys registered for `login`, one per line
    pub async fn authorized_keys(
        &self,
        cancel: &CancellationToken,
        login: &str,
    ) -> Result<Vec<String>, ApiError> {
        let req = self.http.get(format!("{}/{}.keys", self.web_url, login));

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Canceled),
            result = async {
                let resp = self.send(req).await?;
                Ok::<_, ApiError>(resp.text().await?)
            } => result?,
        };

        Ok(body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.api_url)
            .field("web_url", &self.web_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_clamped() {
        let config = ApiConfig {
            page_size: 1000,
            ..ApiConfig::default()
        };
        let client = ApiClient::new(&config, None).unwrap();
        assert_eq!(client.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_debug_hides_token() {
        let client = ApiClient::new(&ApiConfig::default(), Some("ghp_secret".into())).unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("authenticated: true"));
    }

    #[tokio::test]
    async fn test_zero_limit_makes_no_request() {
        let config = ApiConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            ..ApiConfig::default()
        };
        let client = ApiClient::new(&config, None).unwrap();
        let cancel = CancellationToken::new();
        let list = client.list_workspaces(&cancel, Some(0)).await.unwrap();
        assert!(list.is_empty());
    }
}
