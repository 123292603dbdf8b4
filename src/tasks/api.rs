//! HTTP client for the translation connector REST API

use super::{TaskApi, TaskPage};
use crate::config::TaskApiConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

/// Header carrying the API key on every request
pub const API_KEY_HEADER: &str = "api-key";

/// Wrapper the connector puts around every JSON response
#[derive(Deserialize)]
struct Envelope<T> {
    response_data: T,
}

/// [`TaskApi`] over HTTP
///
/// Every call is scoped to the configured connector key. Non-success responses
/// become [`Error::Api`] carrying the status and, when present, the JSON body.
#[derive(Clone, Debug)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: Url,
    connector_key: String,
    page_size: u32,
}

impl HttpTaskApi {
    /// Build a client from configuration
    pub fn new(config: &TaskApiConfig) -> Result<Self> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", config.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;

        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&config.api_key).map_err(|_| Error::Config {
            message: "API key contains characters not allowed in a header".to_string(),
            key: Some("api.api_key".to_string()),
        })?;
        headers.insert(API_KEY_HEADER, api_key);

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url,
            connector_key: config.connector_key.clone(),
            page_size: config.page_size,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Other(format!("failed to build URL for '{path}': {e}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<Value> = serde_json::from_str(&text).ok();
        let message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    text
                }
            });

        tracing::debug!(status = status.as_u16(), %message, "Task API request failed");
        Err(Error::Api {
            status: status.as_u16(),
            message,
            body,
        })
    }

    async fn response_data<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let text = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        Ok(envelope.response_data)
    }

    async fn post_task(&self, path: &str, task_id: i64) -> Result<()> {
        let request = self.client.post(self.url(path)?).json(&json!({
            "task_id": task_id,
            "connector_key": self.connector_key,
        }));
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn download_task(&self, task_id: i64) -> Result<String> {
        tracing::debug!(task_id, "Downloading task payload");
        let request = self.client.get(self.url("task/download")?).query(&[
            ("task_id", task_id.to_string()),
            ("connector_key", self.connector_key.clone()),
        ]);
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }

    async fn update_task_metadata(&self, task_id: i64, metadata: Value) -> Result<()> {
        let request = self.client.put(self.url("task/metadata")?).json(&json!({
            "task_ids": [task_id],
            "task_metadata": metadata,
            "connector_key": self.connector_key,
        }));
        self.send(request).await?;
        Ok(())
    }

    async fn confirm_download(&self, task_id: i64) -> Result<()> {
        self.post_task("task/download/confirm", task_id).await
    }

    async fn error_task(&self, task_id: i64, message: &str) -> Result<()> {
        let request = self.client.post(self.url("task/error")?).json(&json!({
            "task_id": task_id,
            "error_message": message,
            "error_stacktrace": "",
            "connector_key": self.connector_key,
        }));
        self.send(request).await?;
        Ok(())
    }

    async fn cancel_task(&self, task_id: i64) -> Result<()> {
        self.post_task("task/cancel", task_id).await
    }

    async fn get_tasks(&self, submission_id: i64, page: u32) -> Result<TaskPage> {
        let request = self.client.get(self.url("submission/tasks")?).query(&[
            ("submission_id", submission_id.to_string()),
            ("connector_key", self.connector_key.clone()),
            ("page_number", page.to_string()),
            ("page_size", self.page_size.to_string()),
        ]);
        let response = self.send(request).await?;
        self.response_data(response).await
    }
}
