use std::io;

use crate::message::{DeliveryBatch, IngestionPayload, IngestionRecord};

/// Largest number of records the ingestion endpoint accepts in one request.
pub const MAX_BATCH_RECORDS: usize = 500;

/// Default ceiling on the serialized size of the records in one batch.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 4 * 1024 * 1024;

/// Splits a payload's records into ordered delivery batches.
///
/// Batches are cut at `max_records`, and earlier when the serialized records would
/// exceed `max_bytes`. A record that is larger than `max_bytes` on its own still gets a
/// batch of its own, so no batch is ever empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batcher {
    max_records: usize,
    max_bytes: Option<usize>,
}

impl Default for Batcher {
    fn default() -> Self {
        Self {
            max_records: MAX_BATCH_RECORDS,
            max_bytes: Some(DEFAULT_MAX_BATCH_BYTES),
        }
    }
}

impl Batcher {
    /// Count-bounded batcher with no byte ceiling. `max_records` is raised to 1 if 0.
    pub fn new(max_records: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            max_bytes: None,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<usize>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn split<'a>(&self, payload: &'a IngestionPayload) -> Vec<DeliveryBatch<'a>> {
        self.split_records(&payload.dataset, &payload.records)
    }

    pub fn split_records<'a>(
        &self,
        dataset: &'a str,
        records: &'a [IngestionRecord],
    ) -> Vec<DeliveryBatch<'a>> {
        let mut batches = Vec::with_capacity(records.len().div_ceil(self.max_records));
        let mut rest = records;
        while !rest.is_empty() {
            let (head, tail) = rest.split_at(self.next_len(rest));
            batches.push(DeliveryBatch {
                dataset,
                records: head,
            });
            rest = tail;
        }
        batches
    }

    /// How many records from the front of `records` go into the next batch (at least one).
    fn next_len(&self, records: &[IngestionRecord]) -> usize {
        let Some(max_bytes) = self.max_bytes else {
            return records.len().min(self.max_records);
        };

        let mut bytes = 0usize;
        let mut taken = 0usize;
        for record in records.iter().take(self.max_records) {
            // +1 for the separating comma
            let size = serialized_len(record) + 1;
            if taken > 0 && bytes + size > max_bytes {
                break;
            }
            bytes += size;
            taken += 1;
        }
        taken.max(1)
    }
}

fn serialized_len(record: &IngestionRecord) -> usize {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, record) {
        Ok(()) => counter.0,
        Err(_) => 0,
    }
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
