//! reqwest-based IRCC transport.
//!
//! One POST per attempt; the retry loop lives in
//! [`CommandSender`](crate::application::outbound::CommandSender).  The
//! client is built once with the per-request timeout and reused so
//! connections to the TV are kept alive between presses.

use std::time::Duration;

use async_trait::async_trait;
use keybridge_core::ircc::{CONTENT_TYPE, IRCC_PATH, SOAP_ACTION};
use keybridge_core::OutboundCommand;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE as CONTENT_TYPE_HEADER};
use reqwest::Client;
use thiserror::Error;

use crate::application::outbound::{CommandTransport, TransportError};

const USER_AGENT: &str = concat!("keybridge/", env!("CARGO_PKG_VERSION"));

// Header names must be lowercase for `from_static`; HTTP treats them
// case-insensitively.
const SOAPACTION_HEADER: &str = "soapaction";
const PSK_HEADER: &str = "x-auth-psk";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for building the client.
#[derive(Debug, Error)]
pub enum IrccClientError {
    #[error("pre-shared key contains characters not allowed in an HTTP header")]
    InvalidPsk,

    #[error("failed to create HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Connection settings for one TV.
#[derive(Debug, Clone)]
pub struct IrccClientConfig {
    /// Host or `host:port` of the TV.
    pub host: String,
    pub psk: String,
    pub request_timeout: Duration,
}

/// [`CommandTransport`] that talks to a Sony Bravia over HTTP.
#[derive(Debug, Clone)]
pub struct IrccClient {
    client: Client,
    url: String,
    host: String,
}

impl IrccClient {
    /// # Errors
    ///
    /// Returns [`IrccClientError`] if the PSK is not a valid header value or
    /// the HTTP client cannot be created.
    pub fn new(config: IrccClientConfig) -> Result<Self, IrccClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE_HEADER, HeaderValue::from_static(CONTENT_TYPE));
        headers.insert(
            HeaderName::from_static(SOAPACTION_HEADER),
            HeaderValue::from_static(SOAP_ACTION),
        );
        let mut psk = HeaderValue::from_str(&config.psk).map_err(|_| IrccClientError::InvalidPsk)?;
        psk.set_sensitive(true);
        headers.insert(HeaderName::from_static(PSK_HEADER), psk);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: format!("http://{}{}", config.host, IRCC_PATH),
            host: config.host,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CommandTransport for IrccClient {
    async fn post(&self, command: &OutboundCommand) -> Result<u16, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .body(command.envelope())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }

    fn target(&self) -> String {
        self.host.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
