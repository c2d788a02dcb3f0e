//! Transfer orchestration: probe, plan, fetch in parallel, merge, verify

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::task::JoinSet;
use tracing::{Instrument, info, info_span, warn};

use crate::checksum::{crc32_of_file, format_crc32, matches_expected};
use crate::config::TransferConfig;
use crate::error::{FileOperation, Result, TransferError};
use crate::fetch::ChunkFetcher;
use crate::merge::{merge_parts, part_path};
use crate::plan::plan_chunks;
use crate::probe::probe;
use crate::progress::{ProgressAggregator, ProgressObserver};

/// Username and password sent as HTTP Basic auth with every request.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One resource to fetch and where to put it.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
    pub credentials: Option<Credentials>,
    /// CRC-32 as 8 hex digits. When set, the merged file is verified
    /// against it, and a matching file already on disk skips the transfer.
    pub expected_checksum: Option<String>,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            credentials: None,
            expected_checksum: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_expected_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }
}

/// What a completed transfer looked like.
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// CRC-32 of the destination file, formatted as 8 hex digits.
    pub checksum: String,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

/// Transfer engine. Cheap to clone per job is not needed; one instance
/// serves any number of sequential [`run`](Transfer::run) calls.
pub struct Transfer {
    config: TransferConfig,
    client: Client,
}

impl Transfer {
    pub fn new(config: TransferConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.read_timeout)
            .build()
            .map_err(|e| TransferError::ClientBuild { source: e })?;
        Ok(Self { config, client })
    }

    /// Fetch `job.url` into `job.destination`, reporting progress to
    /// `observer` roughly every [`TransferConfig::progress_interval`].
    pub async fn run(
        &self,
        job: &DownloadJob,
        observer: Option<ProgressObserver>,
    ) -> Result<TransferResult> {
        let span = info_span!("transfer", url = %job.url);
        self.run_inner(job, observer).instrument(span).await
    }

    async fn run_inner(
        &self,
        job: &DownloadJob,
        observer: Option<ProgressObserver>,
    ) -> Result<TransferResult> {
        let started = Instant::now();

        url::Url::parse(&job.url).map_err(|e| TransferError::InvalidUrl {
            url: job.url.clone(),
            source: e,
        })?;

        if let Some(result) = self.check_existing(job, started).await? {
            return Ok(result);
        }

        if let Some(parent) = job.destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::fs(parent, FileOperation::CreateDir, e))?;
        }

        let capability = probe(
            &self.client,
            &job.url,
            job.credentials.as_ref(),
            &self.config.probe_policy(),
        )
        .await?;
        info!(?capability, "starting transfer");

        let plans = match capability.total_size {
            Some(total) if capability.supports_ranges => {
                plan_chunks(total, self.config.max_chunks, self.config.min_chunk_size)
            }
            _ => Vec::new(),
        };

        let aggregator = Arc::new(ProgressAggregator::new(
            self.config.progress_interval,
            self.config.window_samples(),
            observer,
        ));
        aggregator.set_total(capability.total_size);
        ProgressAggregator::start(&aggregator);

        let fetched = if plans.len() < 2 {
            self.fetch_single(job, &aggregator).await
        } else {
            self.fetch_chunks(job, &plans, &aggregator).await
        };
        aggregator.stop();
        let (part_count, bytes_written) = fetched?;

        merge_parts(&job.destination, part_count).await?;

        let checksum = crc32_of_file(&job.destination).await?;
        if let Some(expected) = &job.expected_checksum
            && !matches_expected(checksum, expected)
        {
            return Err(TransferError::ChecksumMismatch {
                path: job.destination.clone(),
                expected: expected.trim().to_uppercase(),
                actual: format_crc32(checksum),
            });
        }

        let result = TransferResult {
            checksum: format_crc32(checksum),
            bytes_written,
            elapsed: started.elapsed(),
        };
        info!(
            checksum = %result.checksum,
            bytes = result.bytes_written,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "transfer complete"
        );
        Ok(result)
    }

    /// When an expected checksum is known and the destination already
    /// matches it, skip the network entirely.
    async fn check_existing(
        &self,
        job: &DownloadJob,
        started: Instant,
    ) -> Result<Option<TransferResult>> {
        let Some(expected) = &job.expected_checksum else {
            return Ok(None);
        };
        if !tokio::fs::try_exists(&job.destination).await.unwrap_or(false) {
            return Ok(None);
        }

        let checksum = crc32_of_file(&job.destination).await?;
        if matches_expected(checksum, expected) {
            let size = tokio::fs::metadata(&job.destination)
                .await
                .map_err(|e| {
                    TransferError::fs(&job.destination, FileOperation::Metadata, e)
                })?
                .len();
            info!(
                path = %job.destination.display(),
                checksum = %format_crc32(checksum),
                "existing file verified, skipping transfer"
            );
            return Ok(Some(TransferResult {
                checksum: format_crc32(checksum),
                bytes_written: size,
                elapsed: started.elapsed(),
            }));
        }

        warn!(
            path = %job.destination.display(),
            expected = %expected,
            actual = %format_crc32(checksum),
            "existing file fails verification, downloading again"
        );
        Ok(None)
    }

    async fn fetch_single(
        &self,
        job: &DownloadJob,
        aggregator: &Arc<ProgressAggregator>,
    ) -> Result<(u32, u64)> {
        let fetcher = ChunkFetcher {
            client: self.client.clone(),
            url: job.url.clone(),
            part_path: part_path(&job.destination, 0),
            plan: None,
            credentials: job.credentials.clone(),
            read_timeout: self.config.read_timeout,
            policy: self.config.retry_policy(),
            progress: aggregator.clone(),
        };
        let outcome = fetcher.fetch().await?;
        Ok((1, outcome.bytes_written))
    }

    async fn fetch_chunks(
        &self,
        job: &DownloadJob,
        plans: &[crate::plan::ChunkPlan],
        aggregator: &Arc<ProgressAggregator>,
    ) -> Result<(u32, u64)> {
        let mut set = JoinSet::new();
        for plan in plans {
            let fetcher = ChunkFetcher {
                client: self.client.clone(),
                url: job.url.clone(),
                part_path: part_path(&job.destination, plan.index),
                plan: Some(*plan),
                credentials: job.credentials.clone(),
                read_timeout: self.config.read_timeout,
                policy: self.config.retry_policy(),
                progress: aggregator.clone(),
            };
            set.spawn(fetcher.fetch());
        }

        let mut bytes_written = 0u64;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => bytes_written += outcome.bytes_written,
                Ok(Err(e)) => {
                    // One dead chunk fails the transfer; stop the rest now.
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    return Err(e);
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        continue;
                    }
                    std::panic::resume_unwind(join_err.into_panic());
                }
            }
        }

        Ok((plans.len() as u32, bytes_written))
    }
}
