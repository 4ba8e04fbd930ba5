use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::catalog::Work;
use crate::config::IndexConfig;
use crate::discovery::{Discovery, SyncReport};
use crate::domain::MatchMode;
use crate::download::{AdvanceReport, Downloader, RetryPolicy};
use crate::error::MirrorError;
use crate::extract::{Extractor, SiteLayout};
use crate::reconcile::{ReconcileReport, reconcile};
use crate::site::SiteClient;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    /// Process listings oldest installment first (listing pages are newest
    /// first).
    pub oldest_first: bool,
    /// Drop item sources that do not answer with a success status when the
    /// installment is first listed.
    pub probe_items: bool,
    pub retry: RetryPolicy,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            oldest_first: true,
            probe_items: true,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub title: String,
    pub url: String,
    pub started_at: String,
    pub finished_at: String,
    pub sync: SyncReport,
    pub reconcile: ReconcileReport,
    pub advance: AdvanceReport,
    pub resync: Option<SyncReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkFailure {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PollReport {
    pub discovered: usize,
    pub cycles: Vec<CycleReport>,
    pub failures: Vec<WorkFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallmentSummary {
    pub label: String,
    pub url: String,
    pub items: usize,
    pub complete_items: usize,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkSummary {
    pub title: String,
    pub url: String,
    pub installments: usize,
    pub items: usize,
    pub complete_items: usize,
    pub complete: bool,
    pub needs_resync: bool,
}

impl From<&Work> for WorkSummary {
    fn from(work: &Work) -> Self {
        Self {
            title: work.title().to_string(),
            url: work.url().to_string(),
            installments: work.installments().len(),
            items: work.item_count(),
            complete_items: work.complete_item_count(),
            complete: work.is_complete(),
            needs_resync: work.needs_resync(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub works: Vec<WorkSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub work: WorkSummary,
    pub installments: Vec<InstallmentSummary>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

pub struct App<C: SiteClient> {
    store: Store,
    client: C,
    extractor: Extractor,
    options: MirrorOptions,
    index: IndexConfig,
}

impl<C: SiteClient> App<C> {
    pub fn new(
        store: Store,
        client: C,
        layout: &SiteLayout,
        options: MirrorOptions,
        index: IndexConfig,
    ) -> Result<Self, MirrorError> {
        Ok(Self {
            store,
            client,
            extractor: Extractor::new(layout)?,
            options,
            index,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn discovery(&self) -> Discovery<'_, C> {
        Discovery::new(&self.client, &self.store, &self.extractor, &self.options)
    }

    pub fn bootstrap(&self, url: &str, sink: &dyn ProgressSink) -> Result<SyncReport, MirrorError> {
        emit(sink, format!("phase=Discover; bootstrapping {url}"));
        self.discovery().discover(url)
    }

    pub fn sync(
        &self,
        title: &str,
        url: &str,
        mode: MatchMode,
        sink: &dyn ProgressSink,
    ) -> Result<SyncReport, MirrorError> {
        emit(sink, format!("phase=Sync; {title} ({mode})"));
        self.discovery().sync(title, url, mode)
    }

    /// Sync keyed by the title found on the work's page.
    pub fn sync_url(
        &self,
        url: &str,
        mode: MatchMode,
        sink: &dyn ProgressSink,
    ) -> Result<SyncReport, MirrorError> {
        let title = self.remote_title(url)?;
        self.sync(&title, url, mode, sink)
    }

    pub fn advance(&self, title: &str, sink: &dyn ProgressSink) -> Result<AdvanceReport, MirrorError> {
        emit(sink, format!("phase=Download; {title}"));
        Downloader::new(&self.client, &self.store, self.options.retry).advance(title)
    }

    pub fn reconcile(
        &self,
        title: &str,
        sink: &dyn ProgressSink,
    ) -> Result<ReconcileReport, MirrorError> {
        emit(sink, format!("phase=Verify; checking {title} against disk"));
        reconcile(&self.store, title)
    }

    /// One full pass over a single work: sync (or bootstrap), reconcile,
    /// download, and a location-keyed resync when a download failed.
    pub fn run_cycle(&self, url: &str, sink: &dyn ProgressSink) -> Result<CycleReport, MirrorError> {
        let started_at = Utc::now().to_rfc3339();
        let title = self.remote_title(url)?;

        let mode = match self.store.load(&title) {
            Ok(work) if work.needs_resync() => MatchMode::ByLocation,
            Ok(_) | Err(MirrorError::CatalogNotFound(_)) => MatchMode::ByLabel,
            Err(err) => return Err(err),
        };
        let sync = self.sync(&title, url, mode, sink)?;
        let reconcile = self.reconcile(&title, sink)?;
        let advance = self.advance(&title, sink)?;
        let resync = if advance.needs_resync {
            emit(sink, format!("phase=Sync; hard resync of {title}"));
            Some(self.sync(&title, url, MatchMode::ByLocation, sink)?)
        } else {
            None
        };

        emit(sink, format!("phase=Done; {title}"));
        Ok(CycleReport {
            title,
            url: url.to_string(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            sync,
            reconcile,
            advance,
            resync,
        })
    }

    /// Work urls from every configured index page. A page that cannot be
    /// fetched is skipped for this pass.
    pub fn discover_index(&self, sink: &dyn ProgressSink) -> Result<Vec<String>, MirrorError> {
        let mut urls: Vec<String> = Vec::new();
        for page in self.index.page_urls() {
            emit(sink, format!("phase=Index; {page}"));
            let markup = match self.client.fetch_text(&page) {
                Ok(markup) => markup,
                Err(err) if err.is_fetch() => {
                    warn!(%page, error = %err, "index page unavailable");
                    continue;
                }
                Err(err) => return Err(err),
            };
            for url in self.extractor.index(&markup, &page)? {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        Ok(urls)
    }

    /// Runs a cycle for every work on the index. Failures of one work are
    /// recorded and never stop the pass.
    pub fn poll_once(&self, sink: &dyn ProgressSink) -> Result<PollReport, MirrorError> {
        let urls = self.discover_index(sink)?;
        let mut report = PollReport {
            discovered: urls.len(),
            ..PollReport::default()
        };
        for url in urls {
            match self.run_cycle(&url, sink) {
                Ok(cycle) => report.cycles.push(cycle),
                Err(err) => {
                    warn!(%url, error = %err, "work skipped this cycle");
                    report.failures.push(WorkFailure {
                        url,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, MirrorError> {
        emit(sink, "phase=Resolve; scanning catalog".to_string());
        let mut works = Vec::new();
        for title in self.store.list()? {
            let work = self.store.load(&title)?;
            works.push(WorkSummary::from(&work));
        }
        Ok(ListResult { works })
    }

    pub fn show(&self, title: &str, sink: &dyn ProgressSink) -> Result<ShowResult, MirrorError> {
        emit(sink, format!("phase=Resolve; looking up {title}"));
        let work = self.store.load(title)?;
        let installments = work
            .installments()
            .iter()
            .map(|installment| InstallmentSummary {
                label: installment.label().to_string(),
                url: installment.url().to_string(),
                items: installment.items().len(),
                complete_items: installment
                    .items()
                    .iter()
                    .filter(|item| item.is_complete())
                    .count(),
                complete: installment.is_complete(),
            })
            .collect();
        Ok(ShowResult {
            work: WorkSummary::from(&work),
            installments,
        })
    }

    fn remote_title(&self, url: &str) -> Result<String, MirrorError> {
        let markup = self.client.fetch_text(url)?;
        self.extractor.title(&markup, url)
    }
}
