//! Shared-document accessor
//!
//! [`SyncContext`] owns one investigation's `Doc` and the handles to its
//! three top-level collections. It is created when an investigation is
//! opened and dropped when it closes. Every local transaction's update is
//! queued in an outbox for whatever transport broadcasts it.

use crate::codec::read::entry_fields;
use crate::codec::{decode_element, decode_link, decode_tab, FieldMap};
use crate::SyncError;
use sleuth_model::{CanvasTab, Element, InvestigationSnapshot, Link};
use std::cell::RefCell;
use tracing::{debug, info, warn};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Map, MapRef, ReadTxn, StateVector, Transact, TransactionMut, Update};

pub const ELEMENTS: &str = "elements";
pub const LINKS: &str = "links";
pub const TABS: &str = "tabs";

/// An update carrying no structs and an empty delete set
const EMPTY_UPDATE: [u8; 2] = [0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Element,
    Link,
    Tab,
}

/// Handles to the three named collections
#[derive(Debug, Clone)]
pub struct Collections {
    pub elements: MapRef,
    pub links: MapRef,
    pub tabs: MapRef,
}

impl Collections {
    pub fn of(&self, kind: EntityKind) -> &MapRef {
        match kind {
            EntityKind::Element => &self.elements,
            EntityKind::Link => &self.links,
            EntityKind::Tab => &self.tabs,
        }
    }
}

pub struct SyncContext {
    investigation_id: String,
    doc: Doc,
    collections: Collections,
    outbox: RefCell<Vec<Vec<u8>>>,
}

impl SyncContext {
    /// Open a fresh document for an investigation.
    ///
    /// A fixed `client_id` must never be reused for a document whose history
    /// already holds updates from that id: peers drop the repeated clock
    /// range. Long-lived sessions pass `None` and get a random id.
    pub fn open(investigation_id: impl Into<String>, client_id: Option<u64>) -> Self {
        let investigation_id = investigation_id.into();
        let doc = match client_id {
            Some(id) => Doc::with_client_id(id),
            None => Doc::new(),
        };
        let collections = Collections {
            elements: doc.get_or_insert_map(ELEMENTS),
            links: doc.get_or_insert_map(LINKS),
            tabs: doc.get_or_insert_map(TABS),
        };
        info!(
            investigation = %investigation_id,
            client_id = doc.client_id(),
            "Opened shared document"
        );
        Self {
            investigation_id,
            doc,
            collections,
            outbox: RefCell::new(Vec::new()),
        }
    }

    /// Open a document and load a full state update into it
    pub fn from_state(
        investigation_id: impl Into<String>,
        client_id: Option<u64>,
        state: &[u8],
    ) -> Result<Self, SyncError> {
        let ctx = Self::open(investigation_id, client_id);
        ctx.apply_remote_update(state)?;
        Ok(ctx)
    }

    pub fn investigation_id(&self) -> &str {
        &self.investigation_id
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    /// Run `f` inside one atomic transaction. The resulting update is queued
    /// in the outbox unless the transaction changed nothing.
    pub fn transact<R>(&self, f: impl FnOnce(&mut TransactionMut<'_>, &Collections) -> R) -> R {
        let mut txn = self.doc.transact_mut();
        let result = f(&mut txn, &self.collections);
        let update = txn.encode_update_v1();
        drop(txn);

        if update.as_slice() != EMPTY_UPDATE {
            debug!(bytes = update.len(), "Queued local update");
            self.outbox.borrow_mut().push(update);
        }
        result
    }

    /// Run a read-only closure against the current document state
    pub fn read<R>(&self, f: impl FnOnce(&yrs::Transaction<'_>, &Collections) -> R) -> R {
        let txn = self.doc.transact();
        f(&txn, &self.collections)
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.read(|txn, cols| cols.of(kind).get(txn, id).is_some())
    }

    fn fields(&self, kind: EntityKind, id: &str) -> Option<FieldMap> {
        self.read(|txn, cols| entry_fields(txn, cols.of(kind), id))
    }

    /// Authoritative read, straight from the document
    pub fn read_element(&self, id: &str) -> Option<Element> {
        self.fields(EntityKind::Element, id)
            .map(|fields| decode_element(id, &fields))
    }

    pub fn read_link(&self, id: &str) -> Option<Link> {
        self.fields(EntityKind::Link, id)
            .map(|fields| decode_link(id, &fields))
    }

    pub fn read_tab(&self, id: &str) -> Option<CanvasTab> {
        self.fields(EntityKind::Tab, id).map(|fields| decode_tab(id, &fields))
    }

    fn decode_all<T>(&self, kind: EntityKind, decode: impl Fn(&str, &FieldMap) -> T) -> Vec<T> {
        self.read(|txn, cols| {
            let collection = cols.of(kind);
            let mut ids: Vec<String> = collection.keys(txn).map(str::to_string).collect();
            ids.sort();
            ids.iter()
                .filter_map(|id| entry_fields(txn, collection, id).map(|fields| decode(id, &fields)))
                .collect()
        })
    }

    /// Every element, ordered by id
    pub fn elements(&self) -> Vec<Element> {
        self.decode_all(EntityKind::Element, decode_element)
    }

    pub fn links(&self) -> Vec<Link> {
        self.decode_all(EntityKind::Link, decode_link)
    }

    /// Every tab, ordered by (order, created_at, id)
    pub fn tabs(&self) -> Vec<CanvasTab> {
        let mut tabs = self.decode_all(EntityKind::Tab, decode_tab);
        tabs.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        tabs
    }

    pub fn snapshot(&self) -> InvestigationSnapshot {
        InvestigationSnapshot {
            investigation_id: self.investigation_id.clone(),
            elements: self.elements(),
            links: self.links(),
            tabs: self.tabs(),
        }
    }

    /// Drain the updates produced by local transactions since the last call
    pub fn take_outbox(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }

    pub fn pending_updates(&self) -> usize {
        self.outbox.borrow().len()
    }

    /// Full document state as one update
    pub fn encode_state(&self) -> Vec<u8> {
        self.encode_diff(&StateVector::default())
    }

    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Everything a peer with state vector `remote_sv` is missing
    pub fn encode_diff(&self, remote_sv: &StateVector) -> Vec<u8> {
        self.doc.transact().encode_state_as_update_v1(remote_sv)
    }

    pub fn encode_diff_from(&self, remote_sv: &[u8]) -> Result<Vec<u8>, SyncError> {
        let sv = StateVector::decode_v1(remote_sv).map_err(|e| SyncError::Decode(e.to_string()))?;
        Ok(self.encode_diff(&sv))
    }

    /// Merge an update received from a peer. Remote updates are not queued
    /// in the outbox.
    pub fn apply_remote_update(&self, bytes: &[u8]) -> Result<(), SyncError> {
        let update = Update::decode_v1(bytes).map_err(|e| {
            warn!(error = %e, bytes = bytes.len(), "Rejected remote update");
            SyncError::Decode(e.to_string())
        })?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update);
        Ok(())
    }

    pub fn close(self) {
        info!(investigation = %self.investigation_id, "Closed shared document");
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("investigation_id", &self.investigation_id)
            .field("client_id", &self.doc.client_id())
            .finish()
    }
}
