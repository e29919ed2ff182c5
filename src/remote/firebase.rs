use super::push_id::PushKeyGenerator;
use super::RealtimeTransport;
use crate::config::Config;
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

/// Realtime Database REST client: every path maps to `{base}/{path}.json`.
pub struct FirebaseClient {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
    keys: PushKeyGenerator,
}

impl fmt::Debug for FirebaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

impl FirebaseClient {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, TransportError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| TransportError::InvalidUrl(format!("{base}: {e}")))?;
        let http = Client::builder()
            .user_agent("workplace-sync/0.1")
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base_url,
            auth_token,
            keys: PushKeyGenerator::new(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, TransportError> {
        Self::new(&cfg.remote.base_url, cfg.remote.auth_token().map(str::to_string))
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let relative = format!("{}.json", path.trim_matches('/'));
        let mut url = self
            .base_url
            .join(&relative)
            .map_err(|e| TransportError::InvalidUrl(format!("{relative}: {e}")))?;
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, TransportError> {
        let mut builder = self
            .http
            .request(method, self.endpoint(path)?)
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        // The query string carries the auth token; only the path is logged.
        debug!(method = %request.method(), path = %request.url().path(), "remote request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            info!(%status, "remote request failed");
            return Err(TransportError::from_status(status, &body));
        }
        Ok(res)
    }
}

#[async_trait]
impl RealtimeTransport for FirebaseClient {
    async fn read(&self, path: &str) -> Result<Value, TransportError> {
        let request = self.build_request(Method::GET, path, None)?;
        let res = self.execute(request).await?;
        let text = res.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| TransportError::InvalidResponse(format!("{path}: {e}")))
    }

    async fn write(&self, path: &str, value: &Value) -> Result<(), TransportError> {
        let request = self.build_request(Method::PUT, path, Some(value))?;
        self.execute(request).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        let request = self.build_request(Method::DELETE, path, None)?;
        self.execute(request).await?;
        Ok(())
    }

    fn push_key(&self) -> String {
        self.keys.next_key()
    }
}
