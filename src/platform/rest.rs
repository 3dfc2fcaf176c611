use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{ApplicationDescription, PlatformClient, RestError, ServiceDescription};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body the management API sends along with failed requests.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    verbose: Option<String>,
}

pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: &str) -> Result<Self, RestError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, subject: &str) -> Result<T, RestError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RestError::NotFound(subject.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let message = body.error.unwrap_or_else(|| {
                if text.is_empty() {
                    format!("Request to {url} failed with status {status}")
                } else {
                    text
                }
            });
            return Err(RestError::Status {
                status: status.as_u16(),
                message,
                verbose: body.verbose,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PlatformClient for RestClient {
    async fn application_description(
        &self,
        application: &str,
    ) -> Result<ApplicationDescription, RestError> {
        let path = format!("/applications/{}", urlencoding::encode(application));
        self.get_json(&path, application).await
    }

    async fn service_description(
        &self,
        application: &str,
        service: &str,
    ) -> Result<ServiceDescription, RestError> {
        let path = format!(
            "/applications/{}/services/{}",
            urlencoding::encode(application),
            urlencoding::encode(service)
        );
        self.get_json(&path, service).await
    }
}
