//! HTTP client for the upstream chat endpoint.

use crate::checksum::ChecksumGenerator;
use crate::codec::encode_request;
use crate::error::{CursorError, CursorResult};
use crate::translator::{translate, translate_with, AggregatedResponse, TranslatorEvent};
use curio_protocol::{normalize_credential, ChatRequest};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_CURSOR_URL: &str = "https://api2.cursor.sh/aiserver.v1.AiService/StreamChat";
pub const DEFAULT_CLIENT_VERSION: &str = "0.42.3";
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

const CONNECT_PROTO: &str = "application/connect+proto";
const USER_AGENT: &str = "connect-es/1.4.0";

#[derive(Debug, Clone)]
pub struct CursorClientConfig {
    pub url: String,
    pub checksum_override: Option<String>,
    pub client_version: String,
    pub timezone: String,
    pub connect_timeout_secs: u64,
}

impl Default for CursorClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CURSOR_URL.to_string(),
            checksum_override: None,
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// Client for the upstream chat service. Cheap to clone.
///
/// No retries and no read timeout: a streamed reply may legitimately take
/// minutes, so callers bound latency themselves.
#[derive(Debug, Clone)]
pub struct CursorClient {
    http: reqwest::Client,
    url: String,
    client_version: String,
    timezone: String,
    checksum: ChecksumGenerator,
}

impl CursorClient {
    pub fn new(config: CursorClientConfig) -> CursorResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| CursorError::Configuration(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            url: config.url,
            client_version: config.client_version,
            timezone: config.timezone,
            checksum: ChecksumGenerator::new(config.checksum_override),
        })
    }

    /// Headers for one upstream call.
    pub fn headers(&self, token: &str, checksum: &str) -> CursorResult<HeaderMap> {
        let invalid = |name: &str| {
            CursorError::MalformedCredential(format!("{} is not a valid header value", name))
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| invalid("token"))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static(CONNECT_PROTO),
        );
        headers.insert(
            HeaderName::from_static("connect-protocol-version"),
            HeaderValue::from_static("1"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            HeaderName::from_static("x-cursor-checksum"),
            HeaderValue::from_str(checksum).map_err(|_| invalid("checksum"))?,
        );
        headers.insert(
            HeaderName::from_static("x-cursor-client-version"),
            HeaderValue::from_str(&self.client_version).map_err(|_| {
                CursorError::Configuration("client version is not a valid header value".into())
            })?,
        );
        headers.insert(
            HeaderName::from_static("x-cursor-timezone"),
            HeaderValue::from_str(&self.timezone).map_err(|_| {
                CursorError::Configuration("timezone is not a valid header value".into())
            })?,
        );
        Ok(headers)
    }

    /// Issue the upstream call and return the response with its body unread.
    pub async fn send(
        &self,
        credential: &str,
        request: &ChatRequest,
    ) -> CursorResult<reqwest::Response> {
        let token = normalize_credential(credential);
        let checksum = self.checksum.compute(token)?;
        let body = encode_request(request)?;
        let headers = self.headers(token, &checksum)?;

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            bytes = body.len(),
            checksum_override = self.checksum.has_override(),
            "forwarding chat request upstream"
        );

        let response = self
            .http
            .post(&self.url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, url = %self.url, "upstream request failed");
                CursorError::TransportUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "upstream error");
            return Err(CursorError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Send and drain the reply into an [`AggregatedResponse`].
    pub async fn complete(
        &self,
        credential: &str,
        request: &ChatRequest,
    ) -> CursorResult<AggregatedResponse> {
        let response = self.send(credential, request).await?;
        translate(response.bytes_stream(), &request.model).await
    }

    /// Send and drain, delivering incremental events along the way.
    pub async fn complete_with<F>(
        &self,
        credential: &str,
        request: &ChatRequest,
        on_event: F,
    ) -> CursorResult<AggregatedResponse>
    where
        F: FnMut(TranslatorEvent),
    {
        let response = self.send(credential, request).await?;
        translate_with(response.bytes_stream(), &request.model, on_event).await
    }
}
