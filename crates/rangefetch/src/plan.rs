//! Chunk planning for parallel range fetches

/// One contiguous byte range of the remote resource. `end` is inclusive,
/// matching HTTP Range header semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub index: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkPlan {
    /// Number of bytes this chunk covers. Never zero, since `end` is inclusive.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub(crate) fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Split `total_size` bytes into at most `max_chunks` contiguous ranges.
///
/// The chunk count is driven by `min_chunk_size`: a resource smaller than
/// two minimum-sized chunks is fetched as a single range. Division rounding
/// leaves a remainder on the last chunk, which absorbs it.
pub fn plan_chunks(total_size: u64, max_chunks: u32, min_chunk_size: u64) -> Vec<ChunkPlan> {
    if total_size == 0 {
        return Vec::new();
    }

    let count = (total_size / min_chunk_size.max(1)).min(u64::from(max_chunks.max(1)));
    if count < 2 {
        return vec![ChunkPlan {
            index: 0,
            start: 0,
            end: total_size - 1,
        }];
    }

    let chunk_size = total_size / count;
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = if i == count - 1 {
                total_size - 1
            } else {
                start + chunk_size - 1
            };
            ChunkPlan {
                index: i as u32,
                start,
                end,
            }
        })
        .collect()
}
