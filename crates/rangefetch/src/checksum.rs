//! Streaming CRC-32 computation and the whole-file verification pass
//!
//! Each chunk folds its own bytes as they arrive, but the checksum that is
//! reported and compared against an expected value always comes from one
//! sequential pass over the merged file. Combining per-chunk CRCs through
//! zero-padding arithmetic is deliberately not implemented.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::{FileOperation, Result, TransferError};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Incremental, order-sensitive CRC-32 accumulator.
#[derive(Debug, Default)]
pub struct StreamChecksum {
    hasher: crc32fast::Hasher,
}

impl StreamChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the next bytes of the stream into the running state.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// Render a checksum as an 8-character uppercase hex string.
pub fn format_crc32(checksum: u32) -> String {
    format!("{checksum:08X}")
}

/// Compare a computed checksum against an externally supplied hex string.
///
/// Expected-checksum tables in the wild mix upper- and lowercase, so the
/// comparison is case-insensitive.
pub fn matches_expected(checksum: u32, expected: &str) -> bool {
    format_crc32(checksum).eq_ignore_ascii_case(expected.trim())
}

/// Compute the CRC-32 of a file in one sequential pass.
pub async fn crc32_of_file(path: &Path) -> Result<u32> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| TransferError::fs(path, FileOperation::Read, e))?;

    let mut checksum = StreamChecksum::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| TransferError::fs(path, FileOperation::Read, e))?;
        if read == 0 {
            break;
        }
        checksum.update(&buffer[..read]);
    }

    Ok(checksum.finalize())
}
