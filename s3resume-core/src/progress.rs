use crate::chunk::Chunk;
use crate::models::SpeedSnapshot;
use human_bytes::human_bytes;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    loaded: u64,
    size: u64,
}

/// Byte-level progress and throughput of one upload.
///
/// Fed with three kinds of events: batch start, per-chunk progress and batch
/// end. Bytes of a batch only count as uploaded once the whole batch has
/// succeeded; until then they live in the in-flight set.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_size: u64,
    bytes_uploaded: u64,
    in_flight: BTreeMap<u32, InFlight>,
    batch_started: Option<Instant>,
    smoothed_speed: f64,
}

impl ProgressTracker {
    /// `already_uploaded` seeds the counter with the sizes of resumed parts.
    pub fn new(total_size: u64, already_uploaded: u64) -> Self {
        Self {
            total_size,
            bytes_uploaded: already_uploaded.min(total_size),
            in_flight: BTreeMap::new(),
            batch_started: None,
            smoothed_speed: 0.0,
        }
    }

    pub fn start_batch(&mut self, chunks: &[Chunk], now: Instant) {
        self.in_flight = chunks
            .iter()
            .map(|c| {
                (
                    c.number,
                    InFlight {
                        loaded: 0,
                        size: c.size(),
                    },
                )
            })
            .collect();
        self.batch_started = Some(now);
    }

    /// A new attempt of the same batch: sent bytes start over.
    pub fn restart_batch(&mut self, now: Instant) {
        for chunk in self.in_flight.values_mut() {
            chunk.loaded = 0;
        }
        self.batch_started = Some(now);
    }

    /// Records `loaded` bytes sent for chunk `number` in the current batch.
    ///
    /// Returns false and ignores the report when the chunk is not in flight
    /// or the value goes backwards. Values above the chunk size are clamped.
    pub fn chunk_progress(&mut self, number: u32, loaded: u64) -> bool {
        let Some(chunk) = self.in_flight.get_mut(&number) else {
            return false;
        };
        if loaded < chunk.loaded {
            return false;
        }
        chunk.loaded = loaded.min(chunk.size);
        true
    }

    /// Folds the batch into `bytes_uploaded` and updates the smoothed speed.
    ///
    /// Returns the batch's own throughput in bytes per second.
    pub fn end_batch(&mut self, now: Instant) -> f64 {
        let batch_bytes: u64 = self.in_flight.values().map(|c| c.size).sum();
        self.bytes_uploaded = (self.bytes_uploaded + batch_bytes).min(self.total_size);
        self.in_flight.clear();

        let elapsed = self
            .batch_started
            .take()
            .map(|start| now.saturating_duration_since(start).as_secs_f64())
            .unwrap_or_default()
            .max(0.001);
        let speed = batch_bytes as f64 / elapsed;

        self.smoothed_speed = if self.smoothed_speed == 0.0 {
            speed
        } else {
            (self.smoothed_speed + speed) / 2.0
        };
        speed
    }

    /// Drops the in-flight batch without counting any of it.
    pub fn abort_batch(&mut self) {
        self.in_flight.clear();
        self.batch_started = None;
    }

    /// Stops the batch clock but keeps the last reported in-flight bytes visible.
    pub fn freeze(&mut self) {
        self.batch_started = None;
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    pub fn in_flight_bytes(&self) -> u64 {
        self.in_flight.values().map(|c| c.loaded).sum()
    }

    pub fn percentage(&self) -> u8 {
        if self.total_size == 0 {
            return 0;
        }
        let done = (self.bytes_uploaded + self.in_flight_bytes()).min(self.total_size);
        (100.0 * done as f64 / self.total_size as f64).round() as u8
    }

    pub fn smoothed_speed(&self) -> f64 {
        self.smoothed_speed
    }

    /// `active` is whether the owning upload is currently transferring.
    pub fn speed(&self, active: bool) -> SpeedSnapshot {
        SpeedSnapshot {
            calculating: active && self.smoothed_speed == 0.0,
            raw: self.smoothed_speed,
            readable: format!("{}/s", human_bytes(self.smoothed_speed)),
        }
    }
}
