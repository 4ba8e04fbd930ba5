use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use serial_mirror::config::ConfigLoader;
use serial_mirror::download::RetryPolicy;
use serial_mirror::error::MirrorError;

#[test]
fn resolve_partial_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("smirror.json");
    std::fs::write(
        &path,
        r#"{
            "catalog_dir": "/srv/mirror/catalog",
            "library_dir": "/srv/mirror/library",
            "oldest_first": false,
            "retry": { "max_attempts": 5 },
            "layout": { "item_image": "div.reader img" },
            "poll_interval_secs": 600,
            "unknown_future_field": true
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.catalog_dir, Utf8PathBuf::from("/srv/mirror/catalog"));
    assert_eq!(resolved.library_dir, Utf8PathBuf::from("/srv/mirror/library"));
    assert!(!resolved.options.oldest_first);
    assert!(resolved.options.probe_items);
    assert_eq!(
        resolved.options.retry,
        RetryPolicy {
            max_attempts: 5,
            base_delay_ms: RetryPolicy::default().base_delay_ms,
        }
    );
    assert_eq!(resolved.layout.item_image, "div.reader img");
    assert_eq!(resolved.layout.title, "div.infox .entry-title");
    assert_eq!(resolved.poll_interval, Duration::from_secs(600));
}

#[test]
fn explicit_missing_file_is_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, MirrorError::ConfigRead(_));
}

#[test]
fn malformed_file_is_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("smirror.json");
    std::fs::write(&path, "{ \"retry\": 3 }").unwrap();
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, MirrorError::ConfigParse(_));
}
