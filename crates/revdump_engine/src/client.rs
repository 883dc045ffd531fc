use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use revdump_core::{HttpMethod, Params};
use serde_json::Value;
use url::{form_urlencoded, Url};

use crate::{ApiError, FailureKind};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: format!("revdump/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One query against a MediaWiki `api.php` endpoint.
#[async_trait::async_trait]
pub trait ApiClient: Send + Sync {
    async fn call(&self, method: HttpMethod, params: &Params) -> Result<Value, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestApiClient {
    endpoint: Url,
    client: reqwest::Client,
    settings: ClientSettings,
}

impl ReqwestApiClient {
    pub fn new(endpoint: &str, settings: ClientSettings) -> Result<Self, ApiError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| ApiError::new(FailureKind::InvalidEndpoint, err.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(FailureKind::Client, err.to_string()))?;
        Ok(Self {
            endpoint,
            client,
            settings,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn encoded_pairs(params: &Params) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = params
            .iter()
            .filter(|(key, _)| key.as_str() != "format")
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        pairs.push(("format", "json"));
        pairs
    }

    fn build_request(&self, method: HttpMethod, params: &Params) -> reqwest::RequestBuilder {
        let pairs = Self::encoded_pairs(params);
        let builder = match method {
            HttpMethod::Get => {
                let mut url = self.endpoint.clone();
                url.query_pairs_mut().extend_pairs(pairs);
                self.client.get(url)
            }
            HttpMethod::Post => {
                let body = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                self.client
                    .post(self.endpoint.clone())
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body)
            }
        };
        builder.header(USER_AGENT, self.settings.user_agent.as_str())
    }
}

#[async_trait::async_trait]
impl ApiClient for ReqwestApiClient {
    async fn call(&self, method: HttpMethod, params: &Params) -> Result<Value, ApiError> {
        let response = self
            .build_request(method, params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        parse_api_body(&bytes)
    }
}

/// Decodes an API response body, surfacing the API's own `error` object.
pub fn parse_api_body(bytes: &[u8]) -> Result<Value, ApiError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| ApiError::new(FailureKind::Malformed, err.to_string()))?;
    if !value.is_object() {
        return Err(ApiError::new(
            FailureKind::Malformed,
            "response is not a JSON object",
        ));
    }
    if let Some(error) = value.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        return Err(ApiError::new(
            FailureKind::Api {
                code: code.to_string(),
            },
            info,
        ));
    }
    Ok(value)
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_builder() {
        return ApiError::new(FailureKind::InvalidEndpoint, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
