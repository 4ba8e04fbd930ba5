#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use serial_mirror::app::{App, MirrorOptions, ProgressEvent, ProgressSink};
use serial_mirror::catalog::Work;
use serial_mirror::config::IndexConfig;
use serial_mirror::download::RetryPolicy;
use serial_mirror::error::MirrorError;
use serial_mirror::extract::SiteLayout;
use serial_mirror::site::SiteClient;
use serial_mirror::store::Store;

pub const SITE: &str = "https://site.example";

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct SiteState {
    resources: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    fetches: Vec<String>,
}

/// In-memory site. Clones share state so a test can keep changing the site
/// after handing it to the app.
#[derive(Clone, Default)]
pub struct MockSite {
    state: Arc<Mutex<SiteState>>,
}

impl MockSite {
    pub fn put(&self, url: &str, body: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        state.resources.insert(url.to_string(), body.into());
    }

    pub fn remove(&self, url: &str) {
        self.state.lock().unwrap().resources.remove(url);
    }

    pub fn fail(&self, url: &str) {
        self.state.lock().unwrap().failing.insert(url.to_string());
    }

    pub fn heal(&self, url: &str) {
        self.state.lock().unwrap().failing.remove(url);
    }

    pub fn fetched(&self, url: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.fetches.iter().filter(|fetched| *fetched == url).count()
    }

    pub fn clear_fetches(&self) {
        self.state.lock().unwrap().fetches.clear();
    }

    /// Publishes a series page listing `chapters` newest first, plus every
    /// chapter page and its `pages` images. Returns the series url.
    pub fn publish_work(&self, slug: &str, title: &str, chapters: &[u32], pages: usize) -> String {
        let mut entries = Vec::new();
        for &chapter in chapters {
            self.publish_chapter(slug, chapter, pages);
            entries.push((chapter, chapter_url(slug, chapter)));
        }
        self.publish_listing(slug, title, entries)
    }

    /// Moves `moved` to a new page holding one new image and drops its old
    /// images. `chapters` is the full listing to republish.
    pub fn move_chapter(&self, slug: &str, title: &str, chapters: &[u32], moved: u32) -> String {
        let old_images = format!("https://cdn.example/{slug}/{moved}/");
        self.state
            .lock()
            .unwrap()
            .resources
            .retain(|url, _| !url.starts_with(&old_images));

        let target = moved_chapter_url(slug, moved);
        let src = moved_image_url(slug, moved);
        self.put(&src, png());
        self.put(
            &target,
            format!(r#"<html><body><img class="ts-main-image" src="{src}"></body></html>"#),
        );

        let entries = chapters
            .iter()
            .map(|&chapter| {
                let url = if chapter == moved {
                    target.clone()
                } else {
                    chapter_url(slug, chapter)
                };
                (chapter, url)
            })
            .collect();
        self.publish_listing(slug, title, entries);
        target
    }

    /// Series page listing `entries` newest first. Returns the series url.
    fn publish_listing(&self, slug: &str, title: &str, mut entries: Vec<(u32, String)>) -> String {
        entries.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        let mut listing = String::new();
        for (chapter, href) in &entries {
            listing.push_str(&format!(
                r#"<li><a href="{href}"><span class="chapternum">Chapter {chapter}</span><span class="chapterdate">today</span></a></li>"#
            ));
        }
        let url = series_url(slug);
        self.put(
            &url,
            format!(
                r#"<html><body><div class="infox"><h1 class="entry-title">{title}</h1></div>
                <div class="clstyle"><ul>{listing}</ul></div></body></html>"#
            ),
        );
        url
    }

    pub fn publish_chapter(&self, slug: &str, chapter: u32, pages: usize) {
        let mut images = String::new();
        for page in 0..pages {
            let src = image_url(slug, chapter, page);
            images.push_str(&format!(r#"<img class="ts-main-image" src="{src}">"#));
            self.put(&src, png());
        }
        self.put(
            &chapter_url(slug, chapter),
            format!("<html><body><div>{images}</div></body></html>"),
        );
    }

    fn lookup(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push(url.to_string());
        if state.failing.contains(url) {
            return Err(MirrorError::HttpStatus {
                url: url.to_string(),
                status: 503,
            });
        }
        state
            .resources
            .get(url)
            .cloned()
            .ok_or_else(|| MirrorError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

impl SiteClient for MockSite {
    fn fetch_text(&self, url: &str) -> Result<String, MirrorError> {
        let bytes = self.lookup(url)?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        self.lookup(url)
    }

    fn probe(&self, url: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.resources.contains_key(url) && !state.failing.contains(url)
    }
}

pub fn series_url(slug: &str) -> String {
    format!("{SITE}/series/{slug}/")
}

pub fn chapter_url(slug: &str, chapter: u32) -> String {
    format!("{SITE}/{slug}-chapter-{chapter}/")
}

pub fn moved_chapter_url(slug: &str, chapter: u32) -> String {
    format!("{}moved-{chapter}/", series_url(slug))
}

pub fn moved_image_url(slug: &str, chapter: u32) -> String {
    format!("https://cdn.example/{slug}/moved-{chapter}/000.png")
}

pub fn image_url(slug: &str, chapter: u32, page: usize) -> String {
    format!("https://cdn.example/{slug}/{chapter}/{page:03}.png")
}

pub fn png() -> Vec<u8> {
    let img = RgbImage::from_pixel(3, 2, Rgb([20, 120, 220]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn store_in(temp: &TempDir) -> Store {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    Store::new(root.join("catalog"), root.join("library"))
}

pub fn test_options() -> MirrorOptions {
    MirrorOptions {
        oldest_first: true,
        probe_items: true,
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 0,
        },
    }
}

pub fn app(temp: &TempDir, site: &MockSite) -> App<MockSite> {
    app_with(temp, site, test_options())
}

pub fn app_with(temp: &TempDir, site: &MockSite, options: MirrorOptions) -> App<MockSite> {
    let index = IndexConfig {
        url_template: format!("{SITE}/list?page={{page}}"),
        pages: 1,
    };
    App::new(
        store_in(temp),
        site.clone(),
        &SiteLayout::default(),
        options,
        index,
    )
    .unwrap()
}

pub fn labels(work: &Work) -> Vec<String> {
    work.installments()
        .iter()
        .map(|installment| installment.label().to_string())
        .collect()
}

/// Every item flag agrees with the presence of its file.
pub fn assert_flags_match_disk(store: &Store, work: &Work) {
    for installment in work.installments() {
        for item in installment.items() {
            let present = store
                .item_path(work.title(), installment, item)
                .as_std_path()
                .is_file();
            assert_eq!(
                item.is_complete(),
                present,
                "{} / {}",
                installment.label(),
                item.label()
            );
        }
        assert_eq!(
            installment.is_complete(),
            installment.items().iter().all(|item| item.is_complete())
        );
    }
    assert_eq!(
        work.is_complete(),
        work.installments().iter().all(|inst| inst.is_complete())
    );
}
