//! Capability probe: does the server advertise byte ranges, and how big
//! is the resource?

use reqwest::Client;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH};
use tracing::debug;

use crate::error::{Result, TransferError};
use crate::retry::{RetryPolicy, run_with_retry};
use crate::transfer::Credentials;

/// What the HEAD probe learned about the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeCapability {
    /// Resource size from Content-Length, when the server reports one.
    pub total_size: Option<u64>,
    /// Whether `Accept-Ranges: bytes` was advertised.
    pub supports_ranges: bool,
}

pub(crate) async fn probe(
    client: &Client,
    url: &str,
    credentials: Option<&Credentials>,
    policy: &RetryPolicy,
) -> Result<RangeCapability> {
    run_with_retry(policy, url, || async {
        let mut request = client.head(url);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request.send().await.map_err(|e| TransferError::Network {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransferError::Authentication {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(TransferError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let supports_ranges = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("bytes"));

        let total_size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let capability = RangeCapability {
            total_size,
            supports_ranges,
        };
        debug!(url, ?capability, "probed remote resource");
        Ok(capability)
    })
    .await
    .map(|outcome| outcome.value)
}
