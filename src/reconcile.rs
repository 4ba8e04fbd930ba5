//! Repairs drift between the completion flags of a stored tree and the files
//! actually present in the library.

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Work;
use crate::error::MirrorError;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub title: String,
    pub work_dir_missing: bool,
    pub missing_installment_dirs: Vec<String>,
    pub downgraded: usize,
    pub upgraded: usize,
    pub complete: bool,
}

/// Brings every item flag of `title` in line with the library on disk.
///
/// Passes run in order: missing work directory, missing installment
/// directories, complete items whose file is gone, incomplete items whose file
/// exists. Each flag change is saved as it happens.
pub fn reconcile(store: &Store, title: &str) -> Result<ReconcileReport, MirrorError> {
    let mut work = store.load(title)?;
    let loaded = work.clone();
    let title = work.title().to_string();
    let mut report = ReconcileReport {
        title: title.clone(),
        ..ReconcileReport::default()
    };

    if !store.work_dir(&title).as_std_path().is_dir() {
        warn!(%title, "work directory missing, treating every item as not downloaded");
        report.work_dir_missing = true;
        for pos in 0..work.installments().len() {
            report.downgraded += downgrade_installment(store, &mut work, pos)?;
        }
        work.refresh();
        store.save(&work)?;
    }

    for pos in 0..work.installments().len() {
        let installment = &work.installments()[pos];
        if store
            .installment_dir(&title, installment)
            .as_std_path()
            .is_dir()
        {
            continue;
        }
        report
            .missing_installment_dirs
            .push(installment.label().to_string());
        report.downgraded += downgrade_installment(store, &mut work, pos)?;
    }

    for want in [false, true] {
        for pos in 0..work.installments().len() {
            for item_pos in 0..work.installments()[pos].items().len() {
                let installment = &work.installments()[pos];
                let item = &installment.items()[item_pos];
                if item.is_complete() == want {
                    continue;
                }
                let present = store
                    .item_path(&title, installment, item)
                    .as_std_path()
                    .is_file();
                if present != want {
                    continue;
                }
                let label = item.label().to_string();
                set_item(store, &mut work, pos, item_pos, want)?;
                if want {
                    report.upgraded += 1;
                    info!(%title, item = %label, "found on disk, marked complete");
                } else {
                    report.downgraded += 1;
                    info!(%title, item = %label, "missing on disk, marked incomplete");
                }
            }
        }
    }

    report.complete = work.refresh();
    if work != loaded {
        store.save(&work)?;
    }
    Ok(report)
}

fn downgrade_installment(
    store: &Store,
    work: &mut Work,
    pos: usize,
) -> Result<usize, MirrorError> {
    let mut changed = 0;
    for item_pos in 0..work.installments()[pos].items().len() {
        if work.installments()[pos].items()[item_pos].is_complete() {
            set_item(store, work, pos, item_pos, false)?;
            changed += 1;
        }
    }
    work.installments_mut()[pos].refresh();
    Ok(changed)
}

fn set_item(
    store: &Store,
    work: &mut Work,
    pos: usize,
    item_pos: usize,
    complete: bool,
) -> Result<(), MirrorError> {
    let installment = &mut work.installments_mut()[pos];
    installment.items_mut()[item_pos].set_complete(complete);
    installment.refresh();
    work.refresh_work();
    store.save(work)
}
