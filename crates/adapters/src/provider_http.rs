//! REST adapter for the remote index provider.
//!
//! Wire contract (JSON, camelCase):
//! - `GET  {base}/stores?name=..`            -> `{ "stores": [{ "id", "name" }] }`
//! - `POST {base}/stores`                    -> `{ "id", "name" }`
//! - `POST {base}/stores/{id}/documents`     -> `{ "operation": "<handle>" }`
//! - `GET  {base}/operations/{handle}`       -> `{ "done", "resourceId"?, "error"? }`
//! - `DELETE {base}/stores/{id}`
//!
//! There is no per-document delete endpoint.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;
use vault_sync_config::ProviderConfig;
use vault_sync_domain::{OperationHandle, RemoteResourceId, StoreId, StoreName};
use vault_sync_ports::{
    BoxFuture, DocumentContent, IndexProviderPort, OperationStatus, UploadRequest, provider_error,
};
use vault_sync_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString,
};

/// REST provider adapter configuration.
#[derive(Debug, Clone)]
pub struct HttpIndexProviderConfig {
    /// Base URL, e.g. `https://index.example.com/v1`.
    pub base_url: Box<str>,
    /// Optional bearer token.
    pub api_key: Option<SecretString>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl HttpIndexProviderConfig {
    /// Build from the validated `provider` section plus the env-only API key.
    #[must_use]
    pub fn from_provider_config(config: &ProviderConfig, api_key: Option<SecretString>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key,
            timeout_ms: config.timeout_ms,
        }
    }
}

/// `IndexProviderPort` over HTTP/JSON.
pub struct HttpIndexProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpIndexProvider {
    /// Build the adapter; fails on an unusable base URL or API key.
    pub fn new(config: &HttpIndexProviderConfig) -> Result<Self> {
        let raw = config.base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(&format!("{raw}/")).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!("provider base url is invalid: {error}"),
            )
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "provider base url cannot carry paths",
            ));
        }
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "provider timeout must be greater than zero",
            ));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key.expose()))
                .map_err(|_| {
                    ErrorEnvelope::expected(
                        ErrorCode::invalid_input(),
                        "api key contains invalid header characters",
                    )
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("provider", "client_init_failed"),
                    format!("failed to build provider client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                ErrorEnvelope::invariant(ErrorCode::internal(), "provider base url lost its path")
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T> {
        let payload = self.send(ctx, request, operation).await?;
        serde_json::from_slice(&payload).map_err(|error| {
            provider_error::invalid_response(format!("failed to decode provider response: {error}"))
                .with_metadata("operation", operation)
        })
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Vec<u8>> {
        ctx.ensure_not_cancelled(operation)?;
        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error(operation)),
            result = request.send() => result.map_err(|error| map_reqwest_error(&error, operation))?,
        };

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let payload = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error(operation)),
            result = response.bytes() => result.map_err(|error| map_reqwest_error(&error, operation))?,
        };

        if status.is_success() {
            return Ok(payload.to_vec());
        }
        Err(map_http_error(status, &payload, retry_after).with_metadata("operation", operation))
    }

    async fn find_store(&self, ctx: &RequestContext, name: &StoreName) -> Result<Option<StoreId>> {
        let mut url = self.endpoint(&["stores"])?;
        url.query_pairs_mut().append_pair("name", name.as_str());
        let listing: StoreListResponse = self
            .send_json(ctx, self.client.get(url), "provider.list_stores")
            .await?;
        listing
            .stores
            .into_iter()
            .find(|store| store.name == name.as_str())
            .map(|store| parse_id(StoreId::parse(&store.id)))
            .transpose()
    }

    async fn create_store(&self, ctx: &RequestContext, name: &StoreName) -> Result<StoreId> {
        let url = self.endpoint(&["stores"])?;
        let body = CreateStoreRequest {
            name: name.as_str(),
        };
        let created: StoreDto = self
            .send_json(
                ctx,
                self.client.post(url).json(&body),
                "provider.create_store",
            )
            .await?;
        parse_id(StoreId::parse(&created.id))
    }
}

impl IndexProviderPort for HttpIndexProvider {
    fn ensure_store(&self, ctx: &RequestContext, name: StoreName) -> BoxFuture<'_, Result<StoreId>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Some(existing) = self.find_store(&ctx, &name).await? {
                return Ok(existing);
            }
            self.create_store(&ctx, &name).await
        })
    }

    fn upload(
        &self,
        ctx: &RequestContext,
        request: UploadRequest,
    ) -> BoxFuture<'_, Result<OperationHandle>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = self.endpoint(&["stores", request.store_id.as_str(), "documents"])?;
            let (encoding, content) = match &request.content {
                DocumentContent::Text(text) => (ContentEncoding::Utf8, text.to_string()),
                DocumentContent::Binary(bytes) => (ContentEncoding::Base64, BASE64.encode(bytes)),
            };
            let body = UploadDocumentRequest {
                display_name: request.path.as_str(),
                encoding,
                content,
                metadata: &request.metadata,
            };
            let accepted: UploadAcceptedResponse = self
                .send_json(&ctx, self.client.post(url).json(&body), "provider.upload")
                .await?;
            parse_id(OperationHandle::parse(&accepted.operation))
        })
    }

    fn poll_operation(
        &self,
        ctx: &RequestContext,
        handle: OperationHandle,
    ) -> BoxFuture<'_, Result<OperationStatus>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = self.endpoint(&["operations", handle.as_str()])?;
            let response: OperationResponse = self
                .send_json(&ctx, self.client.get(url), "provider.poll_operation")
                .await?;
            operation_status(response)
        })
    }

    fn delete_store(&self, ctx: &RequestContext, store_id: StoreId) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let url = self.endpoint(&["stores", store_id.as_str()])?;
            let request = self.client.request(Method::DELETE, url);
            match self.send(&ctx, request, "provider.delete_store").await {
                Ok(_) => Ok(()),
                Err(error) if error.metadata_value("status") == Some("404") => Ok(()),
                Err(error) => Err(error),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct StoreListResponse {
    #[serde(default)]
    stores: Vec<StoreDto>,
}

#[derive(Debug, Deserialize)]
struct StoreDto {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateStoreRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum ContentEncoding {
    Utf8,
    Base64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadDocumentRequest<'a> {
    display_name: &'a str,
    encoding: ContentEncoding,
    content: String,
    metadata: &'a BTreeMap<Box<str>, Box<str>>,
}

#[derive(Debug, Deserialize)]
struct UploadAcceptedResponse {
    operation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    done: bool,
    resource_id: Option<String>,
    error: Option<OperationErrorDto>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorDto {
    message: String,
    #[serde(default)]
    retryable: bool,
}

fn operation_status(response: OperationResponse) -> Result<OperationStatus> {
    if !response.done {
        return Ok(OperationStatus::pending());
    }
    if let Some(error) = response.error {
        let class = if error.retryable {
            ErrorClass::Retriable
        } else {
            ErrorClass::NonRetriable
        };
        return Ok(OperationStatus::failed(provider_error::operation_failed(
            error.message,
            class,
        )));
    }
    match response.resource_id {
        Some(id) => Ok(OperationStatus::succeeded(parse_id(RemoteResourceId::parse(id))?)),
        None => Err(provider_error::invalid_response(
            "operation finished without a resource id or error",
        )),
    }
}

fn parse_id<T>(parsed: std::result::Result<T, vault_sync_domain::PrimitiveError>) -> Result<T> {
    parsed.map_err(|error| {
        provider_error::invalid_response(format!("provider returned an unusable id: {error}"))
    })
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn map_http_error(status: StatusCode, payload: &[u8], retry_after: Option<Duration>) -> ErrorEnvelope {
    let detail = serde_json::from_slice::<ErrorBody>(payload)
        .ok()
        .and_then(|body| body.error.map(|error| error.message).or(body.message))
        .unwrap_or_else(|| format!("provider responded with HTTP {}", status.as_u16()));

    let error = match status.as_u16() {
        429 => provider_error::rate_limited(detail, retry_after),
        401 | 403 => provider_error::auth(detail),
        400 | 404 | 409 | 413 | 422 => provider_error::invalid_request(detail),
        408 | 504 => provider_error::timeout(detail),
        _ if status.is_server_error() => provider_error::unavailable(detail),
        _ => ErrorEnvelope::unexpected(
            ErrorCode::new("provider", "http_error"),
            detail,
            ErrorClass::NonRetriable,
        ),
    };
    error.with_metadata("status", status.as_u16().to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn map_reqwest_error(error: &reqwest::Error, operation: &'static str) -> ErrorEnvelope {
    let envelope = if error.is_timeout() {
        provider_error::timeout("provider request timed out")
    } else if error.is_connect() || error.is_request() || error.is_body() {
        provider_error::connection(format!("provider connection failed: {error}"))
    } else if error.is_decode() {
        provider_error::invalid_response(format!("provider response unreadable: {error}"))
    } else {
        ErrorEnvelope::unexpected(
            ErrorCode::new("provider", "request_failed"),
            format!("provider request failed: {error}"),
            ErrorClass::NonRetriable,
        )
    };
    envelope.with_metadata("operation", operation)
}

fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}
