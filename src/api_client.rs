//! Records API client used to persist imported apprehensions.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::apprehension::{ApiEnvelope, ApprehensionInput, BulkImportSummary, LoginData};
use crate::config::AppConfig;

/// Destination for validated import rows.
#[async_trait::async_trait]
pub trait ApprehensionSink: Send + Sync {
    async fn bulk_import(&self, records: &[ApprehensionInput]) -> Result<BulkImportSummary>;
}

/// HTTP client for the records backend (`{data, pagination?}` envelopes).
///
/// A 401 on a non-auth path triggers one token refresh (or a fresh login
/// when credentials are configured) and a single replay of the request.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: Arc<RwLock<Option<String>>>,
    credentials: Option<(String, String)>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // The refresh endpoint authenticates with the cookie set at login
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: Arc::new(RwLock::new(None)),
            credentials: None,
        })
    }

    /// Keep credentials for logging in again after the token expires.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Create a client from config; logs in when credentials are configured.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let mut client = Self::new(&config.api_base_url)?;

        if let Some(token) = &config.api_token {
            client.set_token(token.clone());
        }

        if let Some((username, password)) = &config.api_credentials {
            client = client.with_credentials(username, password);
            client
                .login(username, password)
                .await
                .context("Failed to log in to records API")?;
        }

        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn set_token(&self, token: String) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = Some(token);
        }
    }

    fn token(&self) -> Option<String> {
        self.access_token.read().ok().and_then(|t| t.clone())
    }

    /// `POST /auth/login`; keeps the returned access token for later calls.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let envelope: ApiEnvelope<LoginData> = self
            .post_once("/auth/login", &json!({ "username": username, "password": password }))
            .await?;
        self.set_token(envelope.data.access_token);
        info!("Logged in to records API as {}", username);
        Ok(())
    }

    /// `POST /auth/refresh`, falling back to a fresh login.
    async fn reauthenticate(&self) -> Result<()> {
        let refreshed = self
            .post_once::<_, ApiEnvelope<LoginData>>("/auth/refresh", &json!({}))
            .await;

        match (refreshed, &self.credentials) {
            (Ok(envelope), _) => {
                self.set_token(envelope.data.access_token);
                info!("Refreshed records API access token");
                Ok(())
            }
            (Err(e), Some((username, password))) => {
                warn!("Token refresh failed, logging in again: {:#}", e);
                self.login(username, password).await
            }
            (Err(e), None) => Err(e.context("Access token expired and could not be refreshed")),
        }
    }

    /// `POST /apprehensions/bulk` with every normalized record.
    pub async fn bulk_import_apprehensions(
        &self,
        records: &[ApprehensionInput],
    ) -> Result<BulkImportSummary> {
        info!("Submitting {} apprehension(s) for bulk import", records.len());

        let envelope: ApiEnvelope<BulkImportSummary> = self
            .post_json("/apprehensions/bulk", &json!({ "apprehensions": records }))
            .await?;

        let summary = envelope.data;
        info!(
            "Bulk import finished: {} imported, {} failed",
            summary.imported, summary.failed
        );
        Ok(summary)
    }

    /// POST with one reauthentication and replay on 401.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut resp = self.send_post(path, body).await?;

        if resp.status() == StatusCode::UNAUTHORIZED && !path.starts_with("/auth/") {
            info!("Records API rejected the access token on {}, reauthenticating", path);
            self.reauthenticate().await?;
            resp = self.send_post(path, body).await?;
        }

        Self::read_json(path, resp).await
    }

    async fn post_once<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.send_post(path, body).await?;
        Self::read_json(path, resp).await
    }

    async fn send_post<B>(&self, path: &str, body: &B) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = self.token() {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))
    }

    async fn read_json<T: DeserializeOwned>(path: &str, resp: Response) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Records API error on {} ({}): {}", path, status, text));
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }
}

#[async_trait::async_trait]
impl ApprehensionSink for ApiClient {
    async fn bulk_import(&self, records: &[ApprehensionInput]) -> Result<BulkImportSummary> {
        self.bulk_import_apprehensions(records).await
    }
}
