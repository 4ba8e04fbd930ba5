mod common;

use serial_mirror::reconcile::reconcile;

use common::{MockSite, NoopSink, app, assert_flags_match_disk, png};

#[test]
fn deleted_file_downgrades_item_and_ancestors() {
    let temp = tempfile::tempdir().unwrap();
    let site = MockSite::default();
    let url = site.publish_work("tower", "Tower", &[1, 2], 5);
    let app = app(&temp, &site);
    app.bootstrap(&url, &NoopSink).unwrap();
    app.advance("Tower", &NoopSink).unwrap();

    let store = app.store();
    let work = store.load("Tower").unwrap();
    assert!(work.is_complete());
    let chapter = work.get("Chapter 2").unwrap();
    std::fs::remove_file(store.item_path("Tower", chapter, &chapter.items()[3]).as_std_path())
        .unwrap();

    let report = reconcile(store, "Tower").unwrap();
    assert_eq!(report.downgraded, 1);
    assert_eq!(report.upgraded, 0);
    assert!(!report.complete);

    let work = store.load("Tower").unwrap();
    let chapter = work.get("Chapter 2").unwrap();
    assert!(!chapter.items()[3].is_complete());
    assert!(!chapter.is_complete());
    assert!(work.get("Chapter 1").unwrap().is_complete());
    assert!(!work.is_complete());
    assert_flags_match_disk(store, &work);
}

#[test]
fn missing_work_directory_resets_every_flag() {
    let temp = tempfile::tempdir().unwrap();
    let site = MockSite::default();
    let url = site.publish_work("tower", "Tower", &[1, 2], 2);
    let app = app(&temp, &site);
    app.bootstrap(&url, &NoopSink).unwrap();
    app.advance("Tower", &NoopSink).unwrap();

    let store = app.store();
    std::fs::remove_dir_all(store.work_dir("Tower").as_std_path()).unwrap();

    let report = reconcile(store, "Tower").unwrap();
    assert!(report.work_dir_missing);
    assert_eq!(report.downgraded, 4);

    let work = store.load("Tower").unwrap();
    assert_eq!(work.complete_item_count(), 0);
    assert!(!work.is_complete());
    assert_flags_match_disk(store, &work);
}

#[test]
fn missing_installment_directory_resets_only_that_installment() {
    let temp = tempfile::tempdir().unwrap();
    let site = MockSite::default();
    let url = site.publish_work("tower", "Tower", &[1, 2], 2);
    let app = app(&temp, &site);
    app.bootstrap(&url, &NoopSink).unwrap();
    app.advance("Tower", &NoopSink).unwrap();

    let store = app.store();
    let work = store.load("Tower").unwrap();
    let chapter = work.get("Chapter 1").unwrap();
    std::fs::remove_dir_all(store.installment_dir("Tower", chapter).as_std_path()).unwrap();

    let report = reconcile(store, "Tower").unwrap();
    assert!(!report.work_dir_missing);
    assert_eq!(report.missing_installment_dirs, vec!["Chapter 1"]);
    assert_eq!(report.downgraded, 2);

    let work = store.load("Tower").unwrap();
    assert!(!work.get("Chapter 1").unwrap().is_complete());
    assert!(work.get("Chapter 2").unwrap().is_complete());
    assert_flags_match_disk(store, &work);
}

#[test]
fn files_present_on_disk_are_marked_complete() {
    let temp = tempfile::tempdir().unwrap();
    let site = MockSite::default();
    let url = site.publish_work("tower", "Tower", &[1], 3);
    let app = app(&temp, &site);
    app.bootstrap(&url, &NoopSink).unwrap();

    let store = app.store();
    let work = store.load("Tower").unwrap();
    let chapter = work.get("Chapter 1").unwrap();
    for item in chapter.items() {
        let path = store.item_path("Tower", chapter, item);
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), png()).unwrap();
    }

    let report = reconcile(store, "Tower").unwrap();
    assert_eq!(report.upgraded, 3);
    assert!(report.complete);

    let work = store.load("Tower").unwrap();
    assert!(work.is_complete());
    assert_flags_match_disk(store, &work);

    let bytes = std::fs::read(store.record_path("Tower").as_std_path()).unwrap();
    let second = reconcile(store, "Tower").unwrap();
    assert_eq!(second.upgraded + second.downgraded, 0);
    assert_eq!(
        bytes,
        std::fs::read(store.record_path("Tower").as_std_path()).unwrap()
    );
}
