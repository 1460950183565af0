//! Outbound delivery client for final results.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::payload::DeliveryKey;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a delivery attempt that reached the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The receiver acknowledged the payload.
    Accepted,
    /// The receiver refused the payload with the given HTTP status.
    Rejected(u16),
}

/// Hands a finished candidate's results to the downstream consumer.
///
/// Implementations must be safe to call again with the same key: the
/// pipeline redelivers after crashes and the key is what receivers
/// dedupe on.
#[async_trait]
pub trait ResultsDelivery: Send + Sync {
    /// Delivers one payload. Returns `Ok` when the receiver answered,
    /// `Err` for transport failures (timeout, connection refused).
    async fn deliver(&self, key: &DeliveryKey, payload: &Value) -> Result<DeliveryStatus>;
}

/// HTTP implementation posting JSON to a single ingest endpoint.
pub struct HttpDelivery {
    client: reqwest::Client,
    uri: String,
}

impl HttpDelivery {
    /// Creates a client posting to `uri`, authenticating every request
    /// with `api_key` in the `api_key_header` header.
    pub fn new(uri: impl Into<String>, api_key_header: &str, api_key: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(api_key_header.as_bytes())
            .map_err(|e| Error::delivery(format!("invalid api key header name: {e}")))?;
        let mut value = HeaderValue::from_str(api_key)
            .map_err(|e| Error::delivery(format!("invalid api key value: {e}")))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(name, value);

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::delivery_with_source("building http client", e))?;

        Ok(Self {
            client,
            uri: uri.into(),
        })
    }
}

#[async_trait]
impl ResultsDelivery for HttpDelivery {
    async fn deliver(&self, key: &DeliveryKey, payload: &Value) -> Result<DeliveryStatus> {
        let response = self
            .client
            .post(&self.uri)
            .query(&[("id", key.as_str())])
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::delivery_with_source(format!("posting {key}"), e))?;

        let status = response.status();
        if status.is_success() {
            Ok(DeliveryStatus::Accepted)
        } else {
            Ok(DeliveryStatus::Rejected(status.as_u16()))
        }
    }
}
