//! Catalog discovery: bootstrapping a work's tree from its remote listing and
//! merging installments that appeared remotely since the last run.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::MirrorOptions;
use crate::catalog::{Installment, Work};
use crate::domain::MatchMode;
use crate::error::MirrorError;
use crate::extract::{Extractor, RemoteInstallment};
use crate::site::SiteClient;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub title: String,
    pub mode: Option<MatchMode>,
    pub bootstrapped: bool,
    pub added: Vec<String>,
    pub relisted: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct Discovery<'a, C: SiteClient> {
    client: &'a C,
    store: &'a Store,
    extractor: &'a Extractor,
    options: &'a MirrorOptions,
}

impl<'a, C: SiteClient> Discovery<'a, C> {
    pub fn new(
        client: &'a C,
        store: &'a Store,
        extractor: &'a Extractor,
        options: &'a MirrorOptions,
    ) -> Self {
        Self {
            client,
            store,
            extractor,
            options,
        }
    }

    /// Builds the tree for the work at `url`, keeping it in numeric order and
    /// persisting after every installment. An existing record for the same title is resumed:
    /// installments already present are left untouched, so an interrupted
    /// bootstrap can simply be run again.
    pub fn discover(&self, url: &str) -> Result<SyncReport, MirrorError> {
        let markup = self.client.fetch_text(url)?;
        let title = self.extractor.title(&markup, url)?;
        let remote = self
            .extractor
            .installments(&markup, url, self.options.oldest_first)?;

        let mut work = match self.store.load(&title) {
            Ok(work) => {
                info!(title = %work.title(), "resuming catalog bootstrap");
                work
            }
            Err(MirrorError::CatalogNotFound(_)) => {
                let work = Work::new(&title, url);
                self.store.save(&work)?;
                work
            }
            Err(err) => return Err(err),
        };

        let mut report = SyncReport {
            title: work.title().to_string(),
            mode: None,
            bootstrapped: true,
            ..SyncReport::default()
        };

        for candidate in &remote {
            if work.contains(&candidate.label) {
                debug!(label = %candidate.label, "installment already recorded");
                continue;
            }
            let installment = self.build_installment(candidate)?;
            let items = installment.items().len();
            work.insert_installment(installment)?;
            work.sort_installments();
            work.refresh();
            self.store.save(&work)?;
            info!(title = %work.title(), label = %candidate.label, items, "installment added");
            report.added.push(candidate.label.clone());
        }

        work.refresh();
        self.store.save(&work)?;
        Ok(report)
    }

    /// Merges installments listed remotely but missing from the stored tree.
    /// Falls back to [`Discovery::discover`] when no record exists yet.
    ///
    /// In [`MatchMode::ByLocation`] an installment whose url is new but whose
    /// label is recorded has moved: the recorded one is replaced in place with
    /// a freshly built one and reported as relisted.
    pub fn sync(&self, title: &str, url: &str, mode: MatchMode) -> Result<SyncReport, MirrorError> {
        let mut work = match self.store.load(title) {
            Ok(work) => work,
            Err(MirrorError::CatalogNotFound(_)) => {
                info!(title, url, "no catalog record, bootstrapping");
                return self.discover(url);
            }
            Err(err) => return Err(err),
        };

        let markup = self.client.fetch_text(url)?;
        let remote = self
            .extractor
            .installments(&markup, url, self.options.oldest_first)?;
        let missing = missing_identities(&work, &remote, mode);

        let mut report = SyncReport {
            title: work.title().to_string(),
            mode: Some(mode),
            ..SyncReport::default()
        };
        if !missing.is_empty() {
            info!(title = %work.title(), count = missing.len(), %mode, "missing installments found");
        }

        for identity in missing {
            let Some(candidate) = remote
                .iter()
                .find(|listed| listed.url == identity || listed.label == identity)
            else {
                continue;
            };
            if work.contains(&candidate.label) {
                if mode == MatchMode::ByLabel {
                    warn!(
                        title = %work.title(),
                        label = %candidate.label,
                        url = %candidate.url,
                        "remote installment collides with a recorded label, skipping"
                    );
                    report.skipped.push(candidate.label.clone());
                    continue;
                }
                // Moved installment: take the new location and item list. Item
                // labels are positional, so reconcile picks up files on disk.
                let installment = self.build_installment(candidate)?;
                if let Err(installment) = work.replace_installment(installment) {
                    work.insert_installment(installment)?;
                }
                work.refresh();
                self.store.save(&work)?;
                info!(title = %work.title(), label = %candidate.label, url = %candidate.url, "installment relisted at its new location");
                report.relisted.push(candidate.label.clone());
                continue;
            }
            let installment = self.build_installment(candidate)?;
            work.insert_installment(installment)?;
            work.sort_installments();
            work.refresh();
            self.store.save(&work)?;
            info!(title = %work.title(), label = %candidate.label, "missing installment merged");
            report.added.push(candidate.label.clone());
        }

        if mode == MatchMode::ByLocation && work.needs_resync() {
            work.set_needs_resync(false);
            work.refresh();
            self.store.save(&work)?;
        }
        Ok(report)
    }

    /// Fetches the installment page and lists its items. An installment only
    /// enters the tree together with its full item list.
    fn build_installment(&self, remote: &RemoteInstallment) -> Result<Installment, MirrorError> {
        let markup = self.client.fetch_text(&remote.url)?;
        let mut sources = self.extractor.items(&markup, &remote.url)?;
        if self.options.probe_items {
            sources.retain(|source| {
                let reachable = self.client.probe(source);
                if !reachable {
                    debug!(%source, "item source unreachable, dropped");
                }
                reachable
            });
        }
        let mut installment = Installment::new(&remote.label, remote.url.clone());
        for source in sources {
            installment.push_item(source);
        }
        installment.refresh();
        Ok(installment)
    }
}

/// Remote identities absent from the stored tree, in remote listing order.
fn missing_identities(work: &Work, remote: &[RemoteInstallment], mode: MatchMode) -> Vec<String> {
    let known = work.identities(mode);
    let mut seen = HashSet::new();
    remote
        .iter()
        .map(|candidate| match mode {
            MatchMode::ByLabel => candidate.label.as_str(),
            MatchMode::ByLocation => candidate.url.as_str(),
        })
        .filter(|identity| !known.contains(identity) && seen.insert(*identity))
        .map(str::to_string)
        .collect()
}
