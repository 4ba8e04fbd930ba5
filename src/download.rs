//! Resumable item download. Every flipped flag is persisted before the next
//! item is considered, so a rerun after a crash repeats at most the item that
//! was in flight.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::MirrorError;
use crate::imaging;
use crate::site::SiteClient;
use crate::store::Store;

/// Bounded per-item retry for transient fetch failures, with linear
/// back-off (`base_delay_ms * attempt`). This is the whole budget for an item:
/// [`SiteClient::fetch_bytes`] does not retry underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub installment: String,
    pub item: String,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvanceReport {
    pub title: String,
    pub downloaded: usize,
    pub fetch_failures: Vec<ItemFailure>,
    pub decode_failures: Vec<ItemFailure>,
    pub needs_resync: bool,
    pub complete: bool,
}

pub struct Downloader<'a, C: SiteClient> {
    client: &'a C,
    store: &'a Store,
    policy: RetryPolicy,
}

impl<'a, C: SiteClient> Downloader<'a, C> {
    pub fn new(client: &'a C, store: &'a Store, policy: RetryPolicy) -> Self {
        Self {
            client,
            store,
            policy,
        }
    }

    /// Downloads every incomplete item of `title` in stored order.
    ///
    /// A fetch that still fails after the retry budget marks the work as
    /// needing a hard resync and moves on; an undecodable payload is recorded
    /// separately and leaves the item incomplete.
    pub fn advance(&self, title: &str) -> Result<AdvanceReport, MirrorError> {
        let mut work = self.store.load(title)?;
        let title = work.title().to_string();
        let mut report = AdvanceReport {
            title: title.clone(),
            ..AdvanceReport::default()
        };

        Store::ensure_dir(&self.store.work_dir(&title))?;
        for inst_pos in 0..work.installments().len() {
            let installment = &work.installments()[inst_pos];
            let inst_label = installment.label().to_string();
            let dir = self.store.installment_dir(&title, installment);
            Store::ensure_dir(&dir)?;

            for item_pos in 0..work.installments()[inst_pos].items().len() {
                let item = &work.installments()[inst_pos].items()[item_pos];
                if item.is_complete() {
                    continue;
                }
                let item_label = item.label().to_string();
                let url = item.url().to_string();
                let failure = |err: &MirrorError| ItemFailure {
                    installment: inst_label.clone(),
                    item: item_label.clone(),
                    url: url.clone(),
                    reason: err.to_string(),
                };

                let bytes = match self.fetch_with_retry(&url) {
                    Ok(bytes) => bytes,
                    Err(err) if err.is_fetch() => {
                        warn!(%title, installment = %inst_label, item = %item_label, error = %err, "item fetch failed, work flagged for resync");
                        report.fetch_failures.push(failure(&err));
                        if !work.needs_resync() {
                            work.set_needs_resync(true);
                            self.store.save(&work)?;
                        }
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                match imaging::decode_and_store(&bytes, &url, &dir.join(&item_label)) {
                    Ok(()) => {}
                    Err(err @ MirrorError::Decode { .. }) => {
                        warn!(%title, installment = %inst_label, item = %item_label, error = %err, "item is not a decodable image");
                        report.decode_failures.push(failure(&err));
                        continue;
                    }
                    Err(err) => return Err(err),
                }

                let installment = &mut work.installments_mut()[inst_pos];
                installment.items_mut()[item_pos].set_complete(true);
                installment.refresh();
                self.store.save(&work)?;
                report.downloaded += 1;
                info!(%title, installment = %inst_label, item = %item_label, "downloaded");
            }

            work.installments_mut()[inst_pos].refresh();
        }

        report.complete = work.refresh();
        report.needs_resync = work.needs_resync();
        self.store.save(&work)?;
        Ok(report)
    }

    fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        let mut attempt = 1;
        loop {
            match self.client.fetch_bytes(url) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_fetch() && attempt < self.policy.max_attempts => {
                    thread::sleep(self.policy.delay(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 250,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(250));
        assert_eq!(policy.delay(3), Duration::from_millis(750));
    }
}
