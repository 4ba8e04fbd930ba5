use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

const ILLEGAL_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static pattern compiles"));

/// Which installment field identifies "the same installment" when diffing a
/// remote listing against the stored catalog. Mixing modes across runs of the
/// same work is unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    ByLabel,
    ByLocation,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::ByLabel => write!(f, "by-label"),
            MatchMode::ByLocation => write!(f, "by-location"),
        }
    }
}

impl FromStr for MatchMode {
    type Err = MirrorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "by-label" | "label" => Ok(MatchMode::ByLabel),
            "by-location" | "location" | "url" => Ok(MatchMode::ByLocation),
            other => Err(MirrorError::ConfigParse(format!("unknown match mode: {other}"))),
        }
    }
}

/// Strips characters that are illegal in file and directory names. A label
/// made only of dots would name the current or parent directory, so its dots
/// become underscores.
pub fn sanitize_label(value: &str) -> String {
    let cleaned = value
        .chars()
        .filter(|ch| !ILLEGAL_NAME_CHARS.contains(ch))
        .collect::<String>();
    let cleaned = cleaned.trim();
    if !cleaned.is_empty() && cleaned.chars().all(|ch| ch == '.') {
        return cleaned.replace('.', "_");
    }
    cleaned.to_string()
}

/// Sort key for installment labels: the first run of digits, or 0 when the
/// label has none.
pub fn numeric_key(label: &str) -> u64 {
    FIRST_NUMBER
        .find(label)
        .map(|found| found.as_str().parse::<u64>().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// File extension (with the leading dot) of the last path segment of a url,
/// ignoring query and fragment. Empty when the segment has no extension.
pub fn source_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}
