//! HTTP implementation of the stage API

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::command::{Command, Method};
use super::error::{error_message, ApiError};
use super::StageApi;
use crate::config::Config;
use crate::data::{
    CompoData, CompoResults, ConfigId, ControlId, ControlState, EditionId, EditionInfo,
    HasCompoId, PresentationSummary, Sponsor, StageConfig,
};

/// Configuration lookup response; only the identifier is needed
#[derive(Debug, Deserialize)]
struct ConfigRef {
    id: ConfigId,
}

/// List endpoints may or may not be paginated
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Page { results: Vec<T> },
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Page { results } => results,
            Self::Plain(items) => items,
        }
    }
}

/// Stage API client over HTTP
#[derive(Clone)]
pub struct HttpStageApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpStageApi {
    /// Create a new client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.api.request_timeout_ms))
            .user_agent(concat!("stagerunner/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            auth_token: config.api.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await.map_err(ApiError::Network)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        response.json().await.map_err(ApiError::Decode)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("GET {}", path);
        self.execute(self.request(reqwest::Method::GET, path)).await
    }
}

/// Map a 404 on a configuration lookup to `NotConfigured`
fn not_configured(err: ApiError, what: String) -> ApiError {
    match err {
        ApiError::Status { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
            ApiError::NotConfigured(what)
        }
        other => other,
    }
}

impl StageApi for HttpStageApi {
    async fn fetch_control(&self, config_id: ConfigId) -> Result<ControlState, ApiError> {
        self.get(&format!("/api/stage-control/by-config/?config={}", config_id))
            .await
            .map_err(|e| not_configured(e, format!("config {}", config_id)))
    }

    async fn send_command(
        &self,
        control_id: ControlId,
        command: &Command,
    ) -> Result<ControlState, ApiError> {
        let request = command.request();
        let path = request.path(control_id);
        let method = match request.method {
            Method::Post { .. } => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
        };

        debug!("{} {} ({})", method, path, command.name());
        self.execute(self.request(method, &path).json(&request.body))
            .await
    }

    async fn fetch_stage(&self, config_id: ConfigId) -> Result<StageConfig, ApiError> {
        self.get(&format!("/api/stagerunner-config/{}/full-state/", config_id))
            .await
            .map_err(|e| not_configured(e, format!("config {}", config_id)))
    }

    async fn find_config(&self, edition_id: EditionId) -> Result<ConfigId, ApiError> {
        let config: ConfigRef = self
            .get(&format!("/api/stagerunner-config/by-edition/?edition={}", edition_id))
            .await
            .map_err(|e| not_configured(e, format!("edition {}", edition_id)))?;
        Ok(config.id)
    }

    async fn fetch_presentations(
        &self,
        config_id: ConfigId,
    ) -> Result<Vec<PresentationSummary>, ApiError> {
        let listing: Listing<PresentationSummary> = self
            .get(&format!("/api/stage-presentations/?config={}", config_id))
            .await?;
        Ok(listing.into_vec())
    }

    async fn fetch_compo(&self, has_compo_id: HasCompoId) -> Result<CompoData, ApiError> {
        self.get(&format!("/api/stagerunner-data/compo/{}/", has_compo_id))
            .await
    }

    async fn fetch_results(&self, has_compo_id: HasCompoId) -> Result<CompoResults, ApiError> {
        self.get(&format!("/api/stagerunner-data/results/{}/", has_compo_id))
            .await
    }

    async fn fetch_sponsors(&self, edition_id: EditionId) -> Result<Vec<Sponsor>, ApiError> {
        let listing: Listing<Sponsor> = self
            .get(&format!("/api/stagerunner-data/sponsors/{}/", edition_id))
            .await?;
        Ok(listing.into_vec())
    }

    async fn fetch_edition(&self, edition_id: EditionId) -> Result<EditionInfo, ApiError> {
        self.get(&format!("/api/stagerunner-data/edition/{}/", edition_id))
            .await
    }
}
