use crate::config::{Config, DEFAULT_MAX_PART_COUNT, DEFAULT_MIN_PART_SIZE};
use crate::models::{CompletedPart, UploadedPart};
use std::collections::HashMap;
use std::ops::Range;

/// Provider limits that shape a chunk plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub min_part_size: u64,
    pub max_part_count: u32,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            min_part_size: DEFAULT_MIN_PART_SIZE,
            max_part_count: DEFAULT_MAX_PART_COUNT,
        }
    }
}

impl From<&Config> for ChunkPolicy {
    fn from(config: &Config) -> Self {
        Self {
            min_part_size: config.min_part_size,
            max_part_count: config.max_part_count,
        }
    }
}

impl ChunkPolicy {
    /// Size of every chunk but the last: `max(min_part_size, ceil(size / max_part_count))`.
    pub fn chunk_size(&self, file_size: u64) -> u64 {
        let spread = file_size.div_ceil(u64::from(self.max_part_count.max(1)));
        self.min_part_size.max(spread).max(1)
    }
}

/// One byte range of a file, uploaded as one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based part number.
    pub number: u32,
    pub range: Range<u64>,
    pub complete: bool,
    /// Empty until `complete`.
    pub etag: String,
}

impl Chunk {
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }
}

/// Splits `file_size` bytes into chunks, marking those found in `existing` as done.
///
/// A zero-byte file still gets one (empty) chunk: multipart uploads need at
/// least one part to complete.
pub fn plan(file_size: u64, existing: &[UploadedPart], policy: ChunkPolicy) -> Vec<Chunk> {
    let existing: HashMap<u32, &UploadedPart> =
        existing.iter().map(|p| (p.part_number, p)).collect();

    let chunk_size = policy.chunk_size(file_size);
    let mut chunks = Vec::new();
    let mut offset = 0u64;

    loop {
        let number = chunks.len() as u32 + 1;
        let end = (offset + chunk_size).min(file_size);
        let done = existing.get(&number);

        chunks.push(Chunk {
            number,
            range: offset..end,
            complete: done.is_some(),
            etag: done.map(|p| p.etag.clone()).unwrap_or_default(),
        });

        offset = end;
        if offset >= file_size {
            break;
        }
    }

    chunks
}

/// The chunk plan of one upload, plus the sliding-window bookkeeping.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    chunks: Vec<Chunk>,
    total_size: u64,
}

impl ChunkPlan {
    pub fn new(total_size: u64, existing: &[UploadedPart], policy: ChunkPolicy) -> Self {
        Self {
            chunks: plan(total_size, existing, policy),
            total_size,
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.complete).count()
    }

    pub fn completed_bytes(&self) -> u64 {
        self.chunks.iter().filter(|c| c.complete).map(Chunk::size).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.complete)
    }

    /// Up to `width` contiguous incomplete chunks starting at the first incomplete one.
    pub fn next_window(&self, width: usize) -> Vec<Chunk> {
        let Some(first) = self.chunks.iter().position(|c| !c.complete) else {
            return Vec::new();
        };

        self.chunks[first..]
            .iter()
            .take(width.max(1))
            .take_while(|c| !c.complete)
            .cloned()
            .collect()
    }

    /// Records completion tokens. Unknown part numbers are ignored.
    pub fn mark_complete(&mut self, parts: &[CompletedPart]) {
        for part in parts {
            if let Some(chunk) = self.chunks.iter_mut().find(|c| c.number == part.part_number) {
                chunk.etag = part.etag.clone();
                chunk.complete = true;
            }
        }
    }

    /// Ordered part list for the complete-multipart-upload call.
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        self.chunks
            .iter()
            .filter(|c| c.complete)
            .map(|c| CompletedPart {
                part_number: c.number,
                etag: c.etag.clone(),
            })
            .collect()
    }
}
