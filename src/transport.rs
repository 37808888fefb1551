use std::{
    fmt,
    time::{Duration, SystemTime},
};

use reqwest::{header, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::sleep;

use crate::{
    credentials::CredentialsSource,
    signing::{sign, SigningRequest},
    wire::ErrorDocument,
    ClientOptions, Result, WarehouseError,
};

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Formats the public regional endpoint of an AWS JSON service.
///
/// Example: `("redshift-data", "eu-west-2")` →
/// `"https://redshift-data.eu-west-2.amazonaws.com/"`
pub fn service_endpoint(service: &str, region: &str) -> String {
    format!("https://{service}.{}.amazonaws.com/", region.trim())
}

/// Signed AWS JSON 1.1 client for one service.
#[derive(Clone)]
pub(crate) struct AwsJsonClient {
    http: reqwest::Client,
    endpoint: String,
    service: &'static str,
    target_prefix: &'static str,
    region: String,
    credentials: CredentialsSource,
    options: ClientOptions,
}

impl fmt::Debug for AwsJsonClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsJsonClient")
            .field("endpoint", &self.endpoint)
            .field("service", &self.service)
            .field("region", &self.region)
            .field("credentials", &self.credentials)
            .field("options", &self.options)
            .finish()
    }
}

impl AwsJsonClient {
    pub fn new(
        service: &'static str,
        target_prefix: &'static str,
        region: &str,
        credentials: CredentialsSource,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: service_endpoint(service, region),
            service,
            target_prefix,
            region: region.to_owned(),
            credentials,
            options: ClientOptions::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invokes `<TargetPrefix>.<operation>` and decodes the JSON response.
    pub async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let target = format!("{}.{operation}", self.target_prefix);
        let text = self.send_with_retry(&target, body).await?;

        serde_json::from_str::<Resp>(&text).map_err(|err| {
            WarehouseError::Decode(format!(
                "invalid {operation} response JSON: {err}; body: {text}"
            ))
        })
    }

    async fn send_with_retry(&self, target: &str, body: Vec<u8>) -> Result<String> {
        let url = Url::parse(&self.endpoint).map_err(|err| {
            WarehouseError::Config(format!("invalid endpoint '{}': {err}", self.endpoint))
        })?;

        let mut attempt = 0usize;
        loop {
            // Signed per attempt: the signature embeds the request time.
            let credentials = self.credentials.resolve().await?;
            let signed = sign(
                &SigningRequest {
                    url: url.as_str(),
                    region: &self.region,
                    service: self.service,
                    headers: &[("content-type", CONTENT_TYPE), ("x-amz-target", target)],
                    body: &body,
                },
                credentials,
                SystemTime::now(),
            )?;

            let mut request = self
                .http
                .post(url.clone())
                .header(header::CONTENT_TYPE, CONTENT_TYPE)
                .header("x-amz-target", target)
                .timeout(Duration::from_millis(self.options.timeout_ms))
                .body(body.clone());
            for (name, value) in &signed {
                request = request.header(name.as_str(), value.as_str());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.map_err(WarehouseError::Transport)?;

                    if !status.is_success() {
                        if should_retry_status(status) && attempt < self.options.max_retries {
                            self.wait_before_retry(attempt).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(error_from_response(status, text));
                    }

                    return Ok(text);
                }
                Err(err) => {
                    if should_retry_transport(&err) && attempt < self.options.max_retries {
                        self.wait_before_retry(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(WarehouseError::Transport(err));
                }
            }
        }
    }

    async fn wait_before_retry(&self, attempt: usize) {
        let exp = attempt.min(16) as u32;
        let multiplier = 1u64 << exp;
        let delay_ms = self.options.retry_backoff_ms.saturating_mul(multiplier);

        #[cfg(feature = "tracing")]
        tracing::debug!(service = self.service, "retrying request after {} ms", delay_ms);

        sleep(Duration::from_millis(delay_ms)).await;
    }
}

fn error_from_response(status: StatusCode, body: String) -> WarehouseError {
    if let Ok(doc) = serde_json::from_str::<ErrorDocument>(&body) {
        if let Some(code) = doc.code() {
            return WarehouseError::Service {
                status: status.as_u16(),
                code: code.to_owned(),
                message: doc.message.clone().unwrap_or_default(),
            };
        }
    }
    WarehouseError::Http {
        status: status.as_u16(),
        body,
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn should_retry_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}
