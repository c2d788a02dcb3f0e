//! Part-file naming and merge into the final destination
//!
//! Parts 1..n are appended onto part 0 in order, each deleted as soon as it
//! has been consumed, and part 0 is renamed into place last. The
//! destination path never holds a partial file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{FileOperation, Result, TransferError};

/// Path of the part file for chunk `index`, alongside the destination.
pub(crate) fn part_path(destination: &Path, index: u32) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(format!(".part{index}"));
    PathBuf::from(name)
}

pub(crate) async fn merge_parts(destination: &Path, part_count: u32) -> Result<()> {
    let base = part_path(destination, 0);

    if part_count > 1 {
        let mut output = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&base)
            .await
            .map_err(|e| merge_error(&base, e))?;

        for index in 1..part_count {
            let part = part_path(destination, index);
            let mut input = tokio::fs::File::open(&part)
                .await
                .map_err(|e| merge_error(&part, e))?;
            tokio::io::copy(&mut input, &mut output)
                .await
                .map_err(|e| merge_error(&part, e))?;
            drop(input);
            tokio::fs::remove_file(&part)
                .await
                .map_err(|e| merge_error(&part, e))?;
            debug!(part = %part.display(), "merged and removed part");
        }

        output.flush().await.map_err(|e| merge_error(&base, e))?;
    }

    // On Windows, rename does not replace an existing file.
    match tokio::fs::remove_file(destination).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(TransferError::fs(destination, FileOperation::Remove, e)),
    }

    tokio::fs::rename(&base, destination)
        .await
        .map_err(|e| TransferError::fs(destination, FileOperation::Rename, e))?;

    Ok(())
}

fn merge_error(path: &Path, source: std::io::Error) -> TransferError {
    TransferError::Merge {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_names_keep_the_full_filename() {
        let path = part_path(Path::new("/tmp/archive.tar.gz"), 2);
        assert_eq!(path, Path::new("/tmp/archive.tar.gz.part2"));
    }

    #[tokio::test]
    async fn parts_merge_in_order_and_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        for (i, content) in [b"aaa".as_slice(), b"bb", b"cccc"].iter().enumerate() {
            tokio::fs::write(part_path(&dest, i as u32), content)
                .await
                .unwrap();
        }

        merge_parts(&dest, 3).await.unwrap();

        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"aaabbcccc");
        for i in 0..3 {
            assert!(!part_path(&dest, i).exists());
        }
    }

    #[tokio::test]
    async fn single_part_is_renamed_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        tokio::fs::write(part_path(&dest, 0), b"payload").await.unwrap();

        merge_parts(&dest, 1).await.unwrap();

        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"payload");
        assert!(!part_path(&dest, 0).exists());
    }

    #[tokio::test]
    async fn existing_destination_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        tokio::fs::write(&dest, b"stale").await.unwrap();
        tokio::fs::write(part_path(&dest, 0), b"fresh").await.unwrap();

        merge_parts(&dest, 1).await.unwrap();

        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn missing_part_is_a_merge_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        tokio::fs::write(part_path(&dest, 0), b"aaa").await.unwrap();

        let result = merge_parts(&dest, 2).await;
        assert!(matches!(result, Err(TransferError::Merge { .. })));
    }
}
