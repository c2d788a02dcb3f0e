//! Chunked, resumable-by-retry HTTP transfers with integrity verification.
//!
//! A transfer probes the server for byte-range support, splits the resource
//! into parallel chunks when it can, streams each chunk to its own part
//! file, merges the parts, and verifies the result with a full-file CRC-32
//! pass. Stalled or failed chunks restart from their beginning under a
//! fixed-delay retry budget.
//!
//! ```no_run
//! use rangefetch::{DownloadJob, Transfer, TransferConfig};
//!
//! # async fn demo() -> rangefetch::Result<()> {
//! let transfer = Transfer::new(TransferConfig::default())?;
//! let job = DownloadJob::new("https://example.com/big.iso", "big.iso")
//!     .with_expected_checksum("CBF43926");
//! let result = transfer.run(&job, None).await?;
//! println!("crc32 {}", result.checksum);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod fetch;
mod merge;
pub mod plan;
pub mod probe;
pub mod progress;
pub mod retry;
pub mod transfer;


pub use checksum::{crc32_of_file, format_crc32, matches_expected};
pub use config::TransferConfig;
pub use error::{FileOperation, Result, TransferError};
pub use fetch::ChunkOutcome;
pub use plan::{ChunkPlan, plan_chunks};
pub use probe::RangeCapability;
pub use progress::{ProgressObserver, ProgressUpdate};
pub use retry::{RetryOutcome, RetryPolicy, run_with_retry};
pub use transfer::{Credentials, DownloadJob, Transfer, TransferResult};
