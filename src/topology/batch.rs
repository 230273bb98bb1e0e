// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_size: usize,
    pub timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 8192,
            timeout: Duration::from_millis(200),
        }
    }
}

/// Accumulates payload items until `max_size` is reached or the batch has been
/// waiting longer than the timeout.
pub(crate) struct Batch {
    items: Vec<Bytes>,
    max_size: usize,
    last_flush: Instant,
    batch_timeout: Duration,
}

impl Batch {
    pub(crate) fn new(config: &BatchConfig) -> Self {
        // A zero max size would never flush on size
        let max_size = config.max_size.max(1);
        Self {
            items: Vec::with_capacity(max_size.min(1024)),
            max_size,
            last_flush: Instant::now(),
            batch_timeout: config.timeout,
        }
    }

    pub(crate) fn get_timeout(&self) -> Duration {
        self.batch_timeout
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn take_batch(&mut self) -> Vec<Bytes> {
        self.last_flush = Instant::now();
        std::mem::take(&mut self.items)
    }

    pub(crate) fn should_flush(&self, now: Instant) -> bool {
        !self.items.is_empty() && (self.last_flush + self.batch_timeout) <= now
    }

    /// Adds items to the batch and returns every batch that filled up as a result.
    /// Each returned batch holds exactly `max_size` items; the remainder stays buffered.
    pub(crate) fn offer(&mut self, new_items: Vec<Bytes>) -> Vec<Vec<Bytes>> {
        let mut full = Vec::new();
        for item in new_items {
            self.items.push(item);
            if self.items.len() >= self.max_size {
                full.push(self.take_batch());
            }
        }
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<Bytes> {
        (0..n).map(|i| Bytes::from(format!("item-{}", i))).collect()
    }

    fn config(max_size: usize) -> BatchConfig {
        BatchConfig {
            max_size,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn batch_splitting() {
        let mut batch = Batch::new(&config(10));
        assert!(batch.offer(items(5)).is_empty());

        let full = batch.offer(items(7));
        assert_eq!(1, full.len());
        assert_eq!(10, full[0].len());

        // Grab what's left in the batch
        assert_eq!(2, batch.len());
        assert_eq!(2, batch.take_batch().len());
        assert!(batch.is_empty());
    }

    #[test]
    fn oversized_offer_yields_several_batches() {
        let mut batch = Batch::new(&config(10));
        let full = batch.offer(items(25));
        assert_eq!(2, full.len());
        assert!(full.iter().all(|b| b.len() == 10));
        assert_eq!(5, batch.len());
    }

    #[test]
    fn order_is_preserved() {
        let mut batch = Batch::new(&config(3));
        let full = batch.offer(items(3));
        assert_eq!(items(3), full[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_on_timeout() {
        let mut batch = Batch::new(&config(10));
        assert!(!batch.should_flush(Instant::now()));

        batch.offer(items(1));
        assert!(!batch.should_flush(Instant::now()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(batch.should_flush(Instant::now()));

        batch.take_batch();
        assert!(!batch.should_flush(Instant::now()));
    }
}
