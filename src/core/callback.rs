// src/core/callback.rs

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

use crate::core::error::CallbackError;
use crate::core::models::{AggregateResult, FailureNotice};

/// Delivers scan results to the caller's callback endpoint.
///
/// Delivery is best effort: a single `POST`, bounded by a timeout, never
/// retried. Failures are logged and swallowed so they cannot change the
/// outcome of the scan itself.
#[derive(Debug, Clone)]
pub struct CallbackDispatcher {
    client: reqwest::Client,
}

impl CallbackDispatcher {
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("VanguardScanRunner/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Sends the aggregate result. Never fails outward.
    pub async fn deliver(&self, callback_url: &str, result: &AggregateResult) {
        match self.send(callback_url, result).await {
            Ok(()) => info!(scan_id = result.scan_id(), status = %result.status(), "Callback delivered."),
            Err(e) => error!(scan_id = result.scan_id(), callback_url, error = %e, "Callback delivery failed."),
        }
    }

    /// Sends the minimal failure notice for faults detected before dispatch.
    pub async fn deliver_failure(&self, scan_id: &str, callback_url: &str, message: &str) {
        let notice = FailureNotice::new(scan_id, message);
        match self.send(callback_url, &notice).await {
            Ok(()) => info!(scan_id, "Failure callback delivered."),
            Err(e) => error!(scan_id, callback_url, error = %e, "Failure callback delivery failed."),
        }
    }

    /// POSTs `payload` as JSON. Any non-2xx response is an error.
    pub(crate) async fn send<T: Serialize>(&self, callback_url: &str, payload: &T) -> Result<(), CallbackError> {
        let url = Url::parse(callback_url)
            .map_err(|source| CallbackError::InvalidUrl { url: callback_url.to_string(), source })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CallbackError::UnsupportedScheme(url.scheme().to_string()));
        }

        debug!(%url, "Posting callback.");
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::Status(status));
        }
        Ok(())
    }
}
