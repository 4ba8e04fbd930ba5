//! Field extraction from remote listing markup.
//!
//! The CSS selectors come from [`SiteLayout`], so a site with a different
//! theme only needs a different config block.

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::sanitize_label;
use crate::error::MirrorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteLayout {
    pub title: String,
    pub installment_link: String,
    pub installment_label: String,
    pub item_image: String,
    pub item_fallback: String,
    pub index_link: String,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            title: "div.infox .entry-title".to_string(),
            installment_link: ".clstyle a".to_string(),
            installment_label: ".chapternum".to_string(),
            item_image: "img.ts-main-image".to_string(),
            item_fallback: "p img".to_string(),
            index_link: "div.listupd a".to_string(),
        }
    }
}

/// An installment as listed remotely, before it enters the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInstallment {
    pub label: String,
    pub url: String,
}

#[derive(Debug)]
pub struct Extractor {
    title: Selector,
    installment_link: Selector,
    installment_label: Selector,
    item_image: Selector,
    item_fallback: Selector,
    index_link: Selector,
}

impl Extractor {
    pub fn new(layout: &SiteLayout) -> Result<Self, MirrorError> {
        Ok(Self {
            title: parse_selector(&layout.title)?,
            installment_link: parse_selector(&layout.installment_link)?,
            installment_label: parse_selector(&layout.installment_label)?,
            item_image: parse_selector(&layout.item_image)?,
            item_fallback: parse_selector(&layout.item_fallback)?,
            index_link: parse_selector(&layout.index_link)?,
        })
    }

    /// Sanitized work title.
    pub fn title(&self, markup: &str, page_url: &str) -> Result<String, MirrorError> {
        let document = Html::parse_document(markup);
        let title = document
            .select(&self.title)
            .map(|element| sanitize_label(&element_text(element)))
            .find(|title| !title.is_empty())
            .ok_or_else(|| MirrorError::Extract {
                what: "work title",
                url: page_url.to_string(),
            })?;
        Ok(title)
    }

    /// Installments in page order, or reversed when `oldest_first` is set
    /// (listing pages show the newest installment first).
    pub fn installments(
        &self,
        markup: &str,
        page_url: &str,
        oldest_first: bool,
    ) -> Result<Vec<RemoteInstallment>, MirrorError> {
        let document = Html::parse_document(markup);
        let mut found = Vec::new();
        for link in document.select(&self.installment_link) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let label = link
                .select(&self.installment_label)
                .next()
                .map(element_text)
                .unwrap_or_else(|| element_text(link));
            let label = sanitize_label(&label);
            if label.is_empty() {
                debug!(href, "skipping installment link without a label");
                continue;
            }
            found.push(RemoteInstallment {
                label,
                url: resolve(page_url, href)?,
            });
        }
        if oldest_first {
            found.reverse();
        }
        Ok(found)
    }

    /// Image sources of an installment page. The fallback selector is tried
    /// only when the primary one yields nothing.
    pub fn items(&self, markup: &str, page_url: &str) -> Result<Vec<String>, MirrorError> {
        let document = Html::parse_document(markup);
        let primary = image_sources(&document, &self.item_image, page_url)?;
        if !primary.is_empty() {
            return Ok(primary);
        }
        debug!(page_url, "primary item selector empty, using fallback");
        image_sources(&document, &self.item_fallback, page_url)
    }

    /// Work urls linked from an index page, deduplicated in page order.
    pub fn index(&self, markup: &str, page_url: &str) -> Result<Vec<String>, MirrorError> {
        let document = Html::parse_document(markup);
        let mut urls: Vec<String> = Vec::new();
        for link in document.select(&self.index_link) {
            if let Some(href) = link.value().attr("href") {
                let url = resolve(page_url, href)?;
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        Ok(urls)
    }
}

fn image_sources(
    document: &Html,
    selector: &Selector,
    page_url: &str,
) -> Result<Vec<String>, MirrorError> {
    document
        .select(selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(|src| resolve(page_url, src))
        .collect()
}

fn parse_selector(selector: &str) -> Result<Selector, MirrorError> {
    Selector::parse(selector).map_err(|err| MirrorError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{err:?}"),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves `href` against the page it was found on.
pub fn resolve(page_url: &str, href: &str) -> Result<String, MirrorError> {
    let href = href.trim();
    if let Ok(absolute) = Url::parse(href) {
        return Ok(absolute.to_string());
    }
    let base = Url::parse(page_url).map_err(|_| MirrorError::InvalidUrl(page_url.to_string()))?;
    base.join(href)
        .map(|url| url.to_string())
        .map_err(|_| MirrorError::InvalidUrl(href.to_string()))
}
