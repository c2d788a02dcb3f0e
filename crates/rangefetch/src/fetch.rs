//! Streaming fetch of one chunk (or the whole body) into a part file
//!
//! Every attempt starts the chunk over from its beginning: the part file is
//! truncated, the checksum state is reset, and the full range is requested
//! again. Partial bytes from a stalled attempt are never reused.

use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_RANGE, RANGE};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::checksum::StreamChecksum;
use crate::error::{FileOperation, Result, TransferError};
use crate::plan::ChunkPlan;
use crate::progress::ProgressAggregator;
use crate::retry::{RetryPolicy, run_with_retry};
use crate::transfer::Credentials;
use std::sync::Arc;

/// What one chunk fetch produced.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOutcome {
    pub index: u32,
    pub bytes_written: u64,
    /// CRC-32 of this chunk's bytes in stream order. Diagnostic only; the
    /// verified checksum comes from a pass over the merged file.
    pub checksum: u32,
}

pub(crate) struct ChunkFetcher {
    pub client: Client,
    pub url: String,
    pub part_path: PathBuf,
    /// `None` requests the whole body with no Range header.
    pub plan: Option<ChunkPlan>,
    pub credentials: Option<Credentials>,
    pub read_timeout: Duration,
    pub policy: RetryPolicy,
    pub progress: Arc<ProgressAggregator>,
}

impl ChunkFetcher {
    fn index(&self) -> u32 {
        self.plan.map_or(0, |p| p.index)
    }

    pub async fn fetch(self) -> Result<ChunkOutcome> {
        let index = self.index();
        let label = format!("chunk {index} of {}", self.url);

        let outcome = run_with_retry(&self.policy, &label, || self.attempt())
            .await
            .map_err(|e| match e {
                TransferError::RetriesExhausted {
                    max_attempts,
                    last_error,
                    ..
                } => TransferError::ChunkFetch {
                    index,
                    attempts: max_attempts,
                    last_error,
                },
                other => other,
            })?;

        let (bytes_written, checksum) = outcome.value;
        debug!(index, bytes_written, retries = outcome.retries, "chunk complete");
        Ok(ChunkOutcome {
            index,
            bytes_written,
            checksum,
        })
    }

    async fn attempt(&self) -> Result<(u64, u32)> {
        let mut request = self.client.get(&self.url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        if let Some(plan) = &self.plan {
            request = request.header(RANGE, plan.range_header());
        }

        // A server that stops talking before sending headers should hit the
        // same stall deadline as one that stops mid-body.
        let response = tokio::time::timeout(self.read_timeout, request.send())
            .await
            .map_err(|_| TransferError::Timeout {
                url: self.url.clone(),
                limit: self.read_timeout,
            })?
            .map_err(|e| TransferError::Network {
                url: self.url.clone(),
                source: e,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransferError::Authentication {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(TransferError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        if let Some(plan) = &self.plan {
            let served_range = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if !content_range_matches(served_range, plan) {
                return Err(TransferError::RangeIgnored {
                    url: self.url.clone(),
                    index: plan.index,
                });
            }
        }

        // Truncating here is what makes a retry a clean restart.
        let mut file = tokio::fs::File::create(&self.part_path)
            .await
            .map_err(|e| TransferError::fs(&self.part_path, FileOperation::Create, e))?;

        let mut stream = response.bytes_stream();
        let mut checksum = StreamChecksum::new();
        let mut written: u64 = 0;

        loop {
            let next = tokio::time::timeout(self.read_timeout, stream.next())
                .await
                .map_err(|_| TransferError::Timeout {
                    url: self.url.clone(),
                    limit: self.read_timeout,
                })?;

            let Some(item) = next else { break };
            let bytes = item.map_err(|e| TransferError::Network {
                url: self.url.clone(),
                source: e,
            })?;

            checksum.update(&bytes);
            file.write_all(&bytes)
                .await
                .map_err(|e| TransferError::fs(&self.part_path, FileOperation::Write, e))?;
            written += bytes.len() as u64;
            self.progress.record(self.index(), written);
        }

        file.flush()
            .await
            .map_err(|e| TransferError::fs(&self.part_path, FileOperation::Write, e))?;

        if let Some(plan) = &self.plan
            && written != plan.len()
        {
            return Err(TransferError::ShortBody {
                index: plan.index,
                expected: plan.len(),
                actual: written,
            });
        }

        Ok((written, checksum.finalize()))
    }
}

/// True when a Content-Range header confirms exactly the requested span.
/// The bounds are compared numerically so a longer served range cannot
/// slip through on a shared string prefix.
fn content_range_matches(header: &str, plan: &ChunkPlan) -> bool {
    let Some(rest) = header.strip_prefix("bytes ") else {
        return false;
    };
    let span = rest.split('/').next().unwrap_or("");
    let mut bounds = span.splitn(2, '-');
    let start = bounds.next().and_then(|s| s.trim().parse::<u64>().ok());
    let end = bounds.next().and_then(|s| s.trim().parse::<u64>().ok());
    start == Some(plan.start) && end == Some(plan.end)
}
