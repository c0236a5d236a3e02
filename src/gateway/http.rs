//! reqwest-backed transport for the TV's HTTPS API.
//!
//! Philips TVs serve JointSpace on port 1926 with a self-signed certificate
//! and, once paired, HTTP digest authentication.

use super::{DeviceRequest, Method, Transport};
use crate::config::TvConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url, header};
use std::fmt;
use std::time::Duration;

/// Digest credentials obtained when pairing with the TV.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP transport with certificate validation disabled and optional digest auth.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration, credentials: Option<Credentials>) -> Result<Self> {
        let mut url = Url::parse(base_url)
            .map_err(|e| BridgeError::Config(format!("invalid TV base URL {base_url}: {e}")))?;
        // Url::join drops the last segment unless the path ends in a slash.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| BridgeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: url,
            credentials,
        })
    }

    pub fn from_config(config: &TvConfig) -> Result<Self> {
        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        Self::new(
            &config.base_url,
            Duration::from_millis(config.timeout_ms),
            credentials,
        )
    }

    fn url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| BridgeError::Config(format!("invalid endpoint {endpoint}: {e}")))
    }

    fn build(
        &self,
        request: &DeviceRequest,
        url: &Url,
        authorization: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
        };
        if let Some(body) = &request.body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        if let Some(authorization) = authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        builder
    }

    fn answer_challenge(
        credentials: &Credentials,
        request: &DeviceRequest,
        url: &Url,
        challenge: &str,
    ) -> Result<String> {
        let mut prompt = digest_auth::parse(challenge)
            .map_err(|e| BridgeError::Transport(format!("unusable digest challenge: {e}")))?;

        let uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let method: &str = request.method.as_ref();
        let context = digest_auth::AuthContext::new_with_method(
            credentials.username.as_str(),
            credentials.password.as_str(),
            uri.as_str(),
            request.body.as_deref().map(str::as_bytes),
            digest_auth::HttpMethod::from(method),
        );

        let answer = prompt
            .respond(&context)
            .map_err(|e| BridgeError::Transport(format!("digest authentication failed: {e}")))?;
        Ok(answer.to_header_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: DeviceRequest) -> Result<String> {
        let url = self.url(&request.endpoint)?;
        let mut response = self.build(&request, &url, None).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED
            && let Some(credentials) = &self.credentials
        {
            let challenge = response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
                .ok_or_else(|| {
                    BridgeError::Transport(format!(
                        "{} answered 401 without a digest challenge",
                        request.endpoint
                    ))
                })?;
            let authorization = Self::answer_challenge(credentials, &request, &url, &challenge)?;
            log::trace!("[Gateway] answering digest challenge for {}", request.endpoint);
            response = self
                .build(&request, &url, Some(&authorization))
                .send()
                .await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::HttpStatus {
                endpoint: request.endpoint,
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}
