//! Durable storage collaborator
//!
//! The shared document is the source of truth while an investigation is
//! open. Repositories seed a fresh document on open and keep a local copy
//! that survives without any peer.

use crate::patch::{ElementPatch, LinkPatch, TabPatch};
use crate::SyncError;
use chrono::Utc;
use sleuth_model::{CanvasTab, Element, Link};
use std::collections::BTreeMap;

/// A storable record
pub trait Record: Clone {
    type Patch;

    fn id(&self) -> &str;
    fn investigation_id(&self) -> &str;
    fn apply_patch(&mut self, patch: &Self::Patch);
}

impl Record for Element {
    type Patch = ElementPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn investigation_id(&self) -> &str {
        &self.investigation_id
    }

    fn apply_patch(&mut self, patch: &ElementPatch) {
        patch.apply_to(self, Utc::now());
    }
}

impl Record for Link {
    type Patch = LinkPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn investigation_id(&self) -> &str {
        &self.investigation_id
    }

    fn apply_patch(&mut self, patch: &LinkPatch) {
        patch.apply_to(self, Utc::now());
    }
}

impl Record for CanvasTab {
    type Patch = TabPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn investigation_id(&self) -> &str {
        &self.investigation_id
    }

    fn apply_patch(&mut self, patch: &TabPatch) {
        patch.apply_to(self, Utc::now());
    }
}

pub trait Repository<T: Record> {
    fn get_by_investigation(&self, investigation_id: &str) -> Result<Vec<T>, SyncError>;
    fn create(&mut self, record: T) -> Result<(), SyncError>;
    fn update(&mut self, id: &str, patch: &T::Patch) -> Result<(), SyncError>;
    fn delete(&mut self, id: &str) -> Result<(), SyncError>;
    fn bulk_upsert(&mut self, records: Vec<T>) -> Result<(), SyncError>;
}

/// In-process repository
#[derive(Debug, Clone)]
pub struct MemoryRepository<T> {
    records: BTreeMap<String, T>,
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: Record> Repository<T> for MemoryRepository<T> {
    fn get_by_investigation(&self, investigation_id: &str) -> Result<Vec<T>, SyncError> {
        Ok(self
            .records
            .values()
            .filter(|r| r.investigation_id() == investigation_id)
            .cloned()
            .collect())
    }

    fn create(&mut self, record: T) -> Result<(), SyncError> {
        if self.records.contains_key(record.id()) {
            return Err(SyncError::Repository(format!("duplicate id {}", record.id())));
        }
        self.records.insert(record.id().to_string(), record);
        Ok(())
    }

    fn update(&mut self, id: &str, patch: &T::Patch) -> Result<(), SyncError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| SyncError::Repository(format!("unknown id {}", id)))?;
        record.apply_patch(patch);
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), SyncError> {
        self.records.remove(id);
        Ok(())
    }

    fn bulk_upsert(&mut self, records: Vec<T>) -> Result<(), SyncError> {
        for record in records {
            self.records.insert(record.id().to_string(), record);
        }
        Ok(())
    }
}

/// The three repositories an investigation store persists into
pub struct Repositories {
    pub elements: Box<dyn Repository<Element>>,
    pub links: Box<dyn Repository<Link>>,
    pub tabs: Box<dyn Repository<CanvasTab>>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            elements: Box::new(MemoryRepository::<Element>::new()),
            links: Box::new(MemoryRepository::<Link>::new()),
            tabs: Box::new(MemoryRepository::<CanvasTab>::new()),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
