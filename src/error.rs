use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MirrorError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("no catalog record for {0}")]
    #[diagnostic(help("run `smirror sync <url>` to bootstrap the catalog"))]
    CatalogNotFound(String),

    #[error("failed to decode image from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("malformed catalog record at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("installment {label:?} already exists in {title:?}")]
    DuplicateInstallment { title: String, label: String },

    #[error("could not extract {what} from {url}")]
    Extract { what: &'static str, url: String },

    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl MirrorError {
    /// True for failures reaching or reading from the remote site.
    pub fn is_fetch(&self) -> bool {
        matches!(self, MirrorError::Http { .. } | MirrorError::HttpStatus { .. })
    }
}
