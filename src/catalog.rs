//! In-memory catalog tree: a work, its ordered installments and their items,
//! each carrying a completion flag.
//!
//! Nothing here touches the disk. Callers persist through
//! [`crate::store::Store`] after every mutation.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{MatchMode, numeric_key, sanitize_label, source_extension};
use crate::error::MirrorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    label: String,
    url: String,
    #[serde(default)]
    complete: bool,
}

impl Item {
    /// File name of the item inside its installment directory.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns true when the flag actually changed.
    pub fn set_complete(&mut self, complete: bool) -> bool {
        let changed = self.complete != complete;
        self.complete = complete;
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    label: String,
    url: String,
    #[serde(default)]
    complete: bool,
    #[serde(default)]
    items: Vec<Item>,
}

impl Installment {
    pub fn new(label: &str, url: impl Into<String>) -> Self {
        Self {
            label: sanitize_label(label),
            url: url.into(),
            complete: false,
            items: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Items can have their flag flipped but never be added or removed here.
    pub fn items_mut(&mut self) -> &mut [Item] {
        &mut self.items
    }

    /// Appends an item labelled by its zero-based position plus the
    /// extension of its source url.
    pub fn push_item(&mut self, url: impl Into<String>) -> &Item {
        let url = url.into();
        let label = format!("{}{}", self.items.len(), source_extension(&url));
        self.items.push(Item {
            label,
            url,
            complete: false,
        });
        &self.items[self.items.len() - 1]
    }

    /// Recomputes `complete` from the items. An empty installment is complete.
    pub fn refresh(&mut self) -> bool {
        self.complete = self.items.iter().all(Item::is_complete);
        self.complete
    }

    /// Forces every item flag to `complete`; returns how many changed.
    pub fn mark_all(&mut self, complete: bool) -> usize {
        let changed = self
            .items
            .iter_mut()
            .map(|item| item.set_complete(complete))
            .filter(|changed| *changed)
            .count();
        self.refresh();
        changed
    }

    pub fn identity(&self, mode: MatchMode) -> &str {
        match mode {
            MatchMode::ByLabel => &self.label,
            MatchMode::ByLocation => &self.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WorkRecord")]
pub struct Work {
    title: String,
    url: String,
    complete: bool,
    needs_resync: bool,
    installments: Vec<Installment>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// On-disk shape of a [`Work`]; the label index is rebuilt from it.
#[derive(Deserialize)]
struct WorkRecord {
    title: String,
    url: String,
    #[serde(default)]
    complete: bool,
    #[serde(default)]
    needs_resync: bool,
    #[serde(default)]
    installments: Vec<Installment>,
}

impl TryFrom<WorkRecord> for Work {
    type Error = MirrorError;

    fn try_from(record: WorkRecord) -> Result<Self, Self::Error> {
        let mut work = Work {
            title: record.title,
            url: record.url,
            complete: record.complete,
            needs_resync: record.needs_resync,
            installments: Vec::with_capacity(record.installments.len()),
            index: HashMap::new(),
        };
        for installment in record.installments {
            work.insert_installment(installment)?;
        }
        Ok(work)
    }
}

impl Work {
    pub fn new(title: &str, url: impl Into<String>) -> Self {
        Self {
            title: sanitize_label(title),
            url: url.into(),
            complete: false,
            needs_resync: false,
            installments: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub fn set_needs_resync(&mut self, value: bool) {
        self.needs_resync = value;
    }

    pub fn installments(&self) -> &[Installment] {
        &self.installments
    }

    pub fn installments_mut(&mut self) -> &mut [Installment] {
        &mut self.installments
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn get(&self, label: &str) -> Option<&Installment> {
        self.index.get(label).map(|&pos| &self.installments[pos])
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Installment> {
        self.index.get(label).map(|&pos| &mut self.installments[pos])
    }

    pub fn find_by_url(&self, url: &str) -> Option<&Installment> {
        self.installments.iter().find(|inst| inst.url == url)
    }

    /// Appends an installment. A label already present is rejected rather
    /// than overwritten.
    pub fn insert_installment(
        &mut self,
        installment: Installment,
    ) -> Result<&mut Installment, MirrorError> {
        if self.index.contains_key(&installment.label) {
            return Err(MirrorError::DuplicateInstallment {
                title: self.title.clone(),
                label: installment.label,
            });
        }
        let pos = self.installments.len();
        self.index.insert(installment.label.clone(), pos);
        self.installments.push(installment);
        Ok(&mut self.installments[pos])
    }

    /// Swaps in `installment` for the recorded one with the same label,
    /// keeping its position. Returns the replaced installment, or hands the
    /// new one back when no such label is recorded.
    pub fn replace_installment(
        &mut self,
        installment: Installment,
    ) -> Result<Installment, Installment> {
        match self.index.get(&installment.label) {
            Some(&pos) => Ok(std::mem::replace(&mut self.installments[pos], installment)),
            None => Err(installment),
        }
    }

    /// Stable ascending sort by [`numeric_key`]; equal keys keep their
    /// current relative order.
    pub fn sort_installments(&mut self) {
        self.installments
            .sort_by_key(|installment| numeric_key(&installment.label));
        self.reindex();
    }

    /// Recomputes every installment flag, then the work flag.
    pub fn refresh(&mut self) -> bool {
        for installment in &mut self.installments {
            installment.refresh();
        }
        self.refresh_work()
    }

    /// Recomputes only the work flag from the installment flags.
    pub fn refresh_work(&mut self) -> bool {
        self.complete = self.installments.iter().all(Installment::is_complete);
        self.complete
    }

    pub fn identities(&self, mode: MatchMode) -> HashSet<&str> {
        self.installments
            .iter()
            .map(|installment| installment.identity(mode))
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.installments.iter().map(|inst| inst.items.len()).sum()
    }

    pub fn complete_item_count(&self) -> usize {
        self.installments
            .iter()
            .flat_map(|inst| inst.items.iter())
            .filter(|item| item.complete)
            .count()
    }

    fn reindex(&mut self) {
        self.index = self
            .installments
            .iter()
            .enumerate()
            .map(|(pos, installment)| (installment.label.clone(), pos))
            .collect();
    }
}
