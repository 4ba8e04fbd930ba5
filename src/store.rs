use std::fs;
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::catalog::{Installment, Item, Work};
use crate::error::MirrorError;

/// Durable catalog records (one JSON file per work) plus the layout of the
/// mirrored library on disk.
#[derive(Debug, Clone)]
pub struct Store {
    catalog_root: Utf8PathBuf,
    library_root: Utf8PathBuf,
}

impl Store {
    pub fn new(catalog_root: Utf8PathBuf, library_root: Utf8PathBuf) -> Self {
        Self {
            catalog_root,
            library_root,
        }
    }

    pub fn catalog_root(&self) -> &Utf8Path {
        &self.catalog_root
    }

    pub fn library_root(&self) -> &Utf8Path {
        &self.library_root
    }

    pub fn record_path(&self, title: &str) -> Utf8PathBuf {
        self.catalog_root.join(format!("{title}.json"))
    }

    pub fn exists(&self, title: &str) -> bool {
        self.record_path(title).as_std_path().is_file()
    }

    /// Writes the whole tree, replacing any previous record. The bytes land in
    /// a temp file first and are renamed over the record, so an interrupted
    /// save leaves the previous version readable.
    pub fn save(&self, work: &Work) -> Result<(), MirrorError> {
        fs::create_dir_all(self.catalog_root.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(work)
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".record")
            .suffix(".tmp")
            .tempfile_in(self.catalog_root.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        temp.persist(self.record_path(work.title()).as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn load(&self, title: &str) -> Result<Work, MirrorError> {
        let path = self.record_path(title);
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(MirrorError::CatalogNotFound(title.to_string()));
            }
            Err(err) => return Err(MirrorError::Filesystem(err.to_string())),
        };
        serde_json::from_str(&content).map_err(|err| MirrorError::Schema {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    /// Titles of every saved record, sorted.
    pub fn list(&self) -> Result<Vec<String>, MirrorError> {
        let entries = match fs::read_dir(self.catalog_root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(MirrorError::Filesystem(err.to_string())),
        };
        let mut titles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if !path.is_file() || path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                titles.push(stem.to_string());
            }
        }
        titles.sort();
        Ok(titles)
    }

    pub fn work_dir(&self, title: &str) -> Utf8PathBuf {
        self.library_root.join(title)
    }

    pub fn installment_dir(&self, title: &str, installment: &Installment) -> Utf8PathBuf {
        self.work_dir(title).join(installment.label())
    }

    pub fn item_path(&self, title: &str, installment: &Installment, item: &Item) -> Utf8PathBuf {
        self.installment_dir(title, installment).join(item.label())
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), MirrorError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("create {path}: {err}")))
    }
}
