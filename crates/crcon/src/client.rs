use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use crate::connection::ServerConnectionDetails;
use crate::models::{
    ApiResult, Layer, MessagePlayerBody, ServerStatus, VoteMapUserConfig, VoteMapWhitelistBody,
};
use crate::retry::JitterRetry;
use crate::{Error, Result};

/// Session-wide bound on a single request attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// The CRCON API operations the service depends on.
///
/// `ApiClient` is the live implementation; tests substitute scripted doubles.
#[async_trait]
pub trait CrconApi: Send + Sync {
    async fn get_status(&self) -> Result<ServerStatus>;
    async fn get_maps(&self) -> Result<Vec<Layer>>;
    async fn get_votemap_config(&self) -> Result<VoteMapUserConfig>;
    async fn get_votemap_whitelist(&self) -> Result<Vec<String>>;
    async fn set_votemap_whitelist(&self, map_names: &[String]) -> Result<()>;
    async fn reset_votemap_state(&self) -> Result<()>;
    async fn get_playerids(&self) -> Result<Vec<(String, String)>>;
    async fn message_player(&self, player_id: &str, message: &str) -> Result<()>;
    async fn download_vips(&self) -> Result<String>;
}

/// A client for the CRCON REST API.
///
/// Holds one long-lived hyper client; auth headers are applied to every
/// request. All operations decode the standard `ApiResult` envelope and
/// surface `failed=true` as [`Error::Api`].
pub struct ApiClient {
    details: ServerConnectionDetails,
    client: HttpsClient,
    retry: JitterRetry,
}

impl ApiClient {
    pub fn new(details: ServerConnectionDetails) -> Self {
        Self::with_retry(details, JitterRetry::default())
    }

    pub fn with_retry(details: ServerConnectionDetails, retry: JitterRetry) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);
        Self {
            details,
            client,
            retry,
        }
    }

    pub fn details(&self) -> &ServerConnectionDetails {
        &self.details
    }

    async fn call_api<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
        retry: &JitterRetry,
    ) -> Result<ApiResult<T>> {
        let url = self.details.endpoint(endpoint);
        let bytes = self.request_with_retry(method, &url, body, retry).await?;
        let api_result: ApiResult<T> = serde_json::from_slice(&bytes)?;
        if api_result.failed {
            return Err(Error::api(
                api_result.command,
                api_result.error.unwrap_or_default(),
                api_result.version.unwrap_or_default(),
            ));
        }
        Ok(api_result)
    }

    async fn request_with_retry(
        &self,
        method: Method,
        url: &Url,
        body: Option<serde_json::Value>,
        retry: &JitterRetry,
    ) -> Result<Bytes> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(%url, attempt, total = retry.attempts, "api request");

            let request = self.build_request(&method, url, body.as_ref())?;
            let response = match timeout(REQUEST_TIMEOUT, self.client.request(request)).await {
                Err(_) => {
                    if retry.should_retry_transport(attempt) {
                        self.wait_before_retry(retry, attempt, "request timed out").await;
                        continue;
                    }
                    return Err(Error::Timeout(REQUEST_TIMEOUT));
                }
                Ok(Err(e)) => {
                    if retry.should_retry_transport(attempt) {
                        self.wait_before_retry(retry, attempt, &e.to_string()).await;
                        continue;
                    }
                    return Err(Error::Http(e.to_string()));
                }
                Ok(Ok(response)) => response,
            };

            let status = response.status();
            if !status.is_success() {
                if retry.should_retry_status(attempt, status.as_u16()) {
                    self.wait_before_retry(retry, attempt, &format!("status {status}")).await;
                    continue;
                }
                return Err(Error::Status(status.as_u16()));
            }

            let collected = response
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            return Ok(collected.to_bytes());
        }
    }

    async fn wait_before_retry(&self, retry: &JitterRetry, attempt: u32, reason: &str) {
        let delay = retry.timeout(attempt);
        warn!(attempt, reason, "retrying api request in {:.2}s", delay.as_secs_f64());
        sleep(delay).await;
    }

    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .header(
                AUTHORIZATION,
                format!("BEARER {}", self.details.api_key()),
            );
        if let Some(headers) = self.details.rcon_headers() {
            for (name, value) in headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        let bytes = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Bytes::from(serde_json::to_vec(value)?)
            }
            None => Bytes::new(),
        };
        builder
            .body(Full::new(bytes))
            .map_err(|e| Error::Http(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let api_result = self
            .call_api::<T>(Method::GET, endpoint, None, &self.retry)
            .await?;
        api_result.result.ok_or(Error::MissingResult {
            command: api_result.command,
        })
    }

    async fn post_unit(
        &self,
        endpoint: &str,
        body: serde_json::Value,
        retry: &JitterRetry,
    ) -> Result<()> {
        self.call_api::<serde_json::Value>(Method::POST, endpoint, Some(body), retry)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CrconApi for ApiClient {
    /// Get the status of the server.
    async fn get_status(&self) -> Result<ServerStatus> {
        self.get("api/get_status").await
    }

    /// Get the layer catalog the server is configured with.
    async fn get_maps(&self) -> Result<Vec<Layer>> {
        self.get("api/get_maps").await
    }

    /// Get the server's vote-map configuration.
    async fn get_votemap_config(&self) -> Result<VoteMapUserConfig> {
        self.get("api/get_votemap_config").await
    }

    /// Get the list of layer ids in the vote-map whitelist.
    async fn get_votemap_whitelist(&self) -> Result<Vec<String>> {
        self.get("api/get_votemap_whitelist").await
    }

    /// Replace the vote-map whitelist.
    async fn set_votemap_whitelist(&self, map_names: &[String]) -> Result<()> {
        let body = VoteMapWhitelistBody {
            map_names: map_names.to_vec(),
        };
        self.post_unit(
            "api/set_votemap_whitelist",
            serde_json::to_value(body)?,
            &self.retry,
        )
        .await
    }

    /// Tell the server to rebuild its in-game vote ballot from the current whitelist.
    async fn reset_votemap_state(&self) -> Result<()> {
        self.post_unit(
            "api/reset_votemap_state",
            serde_json::Value::Object(serde_json::Map::new()),
            &self.retry,
        )
        .await
    }

    async fn get_playerids(&self) -> Result<Vec<(String, String)>> {
        self.get("api/get_playerids").await
    }

    /// Not retried: a duplicate delivery would message the player twice.
    async fn message_player(&self, player_id: &str, message: &str) -> Result<()> {
        let body = MessagePlayerBody {
            player_id: player_id.to_string(),
            message: message.to_string(),
        };
        self.post_unit(
            "api/message_player",
            serde_json::to_value(body)?,
            &JitterRetry::none(),
        )
        .await
    }

    /// The VIP list is a plain-text document, not an `ApiResult` envelope.
    async fn download_vips(&self) -> Result<String> {
        let url = self.details.endpoint("api/download_vips");
        let bytes = self
            .request_with_retry(Method::GET, &url, None, &self.retry)
            .await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Http(format!("vip list not utf-8: {e}")))
    }
}
