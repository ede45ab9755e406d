//! # Undo/Redo Stack
//!
//! Every user action records a symmetric pair of patches.
//!
//! ## Design
//!
//! - Undo applies the `undo` patch and moves the action to the redo stack
//! - Redo applies the `redo` patch
//! - Recording a new action clears the redo stack
//! - Batches group several actions into one undo step
//!
//! History is linear per client while the document converges through
//! merges, so every patch must tolerate a document it did not produce:
//! targets that vanished are skipped, snapshot inserts overwrite whatever
//! sits at that id, list edits are relative to the current list.

use crate::codec::read::entry_fields;
use crate::codec::{decode_element, encode_element, encode_link, insert_node};
use crate::context::{Collections, SyncContext};
use crate::patch::{apply_writes, ElementPatch, EntityPatch, FieldWrite};
use crate::tabs::{self, cascade_element_removal};
use chrono::Utc;
use sleuth_model::{CanvasTab, Element, Link, Timestamp};
use tracing::debug;
use yrs::{Map, TransactionMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    CreateElement,
    UpdateElement,
    DeleteElement,
    CreateLink,
    UpdateLink,
    DeleteLink,
    CreateTab,
    UpdateTab,
    DeleteTab,
    Membership,
    Group,
    Ungroup,
    ExtractProperty,
    ExtractEvent,
    Batch,
}

/// A tab membership edit, replayed against the current document
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipChange {
    Admit { tab_id: String, element_ids: Vec<String> },
    /// Elements no other tab holds at replay time stay members
    Remove { tab_id: String, element_ids: Vec<String> },
    Exclude { tab_id: String, element_ids: Vec<String> },
    Unexclude { tab_id: String, element_ids: Vec<String> },
}

/// Removal of one entry from a source element's current list
#[derive(Debug, Clone, PartialEq)]
pub enum Strip {
    Property { element_id: String, key: String },
    Event { element_id: String, event_id: String },
}

/// Multi-entity change applied in one transaction, in this order:
/// removals, snapshot inserts, membership edits, strips, field patches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositePatch {
    pub created_elements: Vec<Element>,
    pub created_links: Vec<Link>,
    pub created_tabs: Vec<CanvasTab>,
    pub removed_element_ids: Vec<String>,
    pub removed_link_ids: Vec<String>,
    pub removed_tab_ids: Vec<String>,
    pub memberships: Vec<MembershipChange>,
    pub strips: Vec<Strip>,
    pub patches: Vec<(String, EntityPatch)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionPatch {
    Entity { entity_id: String, changes: EntityPatch },
    Composite(CompositePatch),
    Sequence(Vec<ActionPatch>),
}

impl ActionPatch {
    pub fn apply(&self, txn: &mut TransactionMut<'_>, cols: &Collections, now: Timestamp) {
        match self {
            ActionPatch::Entity { entity_id, changes } => {
                changes.apply(txn, cols, entity_id, now);
            }
            ActionPatch::Composite(composite) => composite.apply(txn, cols, now),
            ActionPatch::Sequence(steps) => {
                for step in steps {
                    step.apply(txn, cols, now);
                }
            }
        }
    }
}

impl CompositePatch {
    pub fn apply(&self, txn: &mut TransactionMut<'_>, cols: &Collections, now: Timestamp) {
        for id in &self.removed_link_ids {
            cols.links.remove(txn, id);
        }
        for id in &self.removed_element_ids {
            if cols.elements.remove(txn, id).is_some() {
                cascade_element_removal(txn, cols, id, now);
            }
        }
        for id in &self.removed_tab_ids {
            cols.tabs.remove(txn, id);
        }

        for element in &self.created_elements {
            insert_node(txn, &cols.elements, &element.id, encode_element(element));
        }
        for link in &self.created_links {
            insert_node(txn, &cols.links, &link.id, encode_link(link));
        }
        for tab in &self.created_tabs {
            tabs::restore_tab(txn, cols, tab);
        }

        for change in &self.memberships {
            apply_membership(txn, cols, change, now);
        }
        for strip in &self.strips {
            apply_strip(txn, cols, strip, now);
        }
        for (id, patch) in &self.patches {
            patch.apply(txn, cols, id, now);
        }
    }
}

fn apply_membership(txn: &mut TransactionMut<'_>, cols: &Collections, change: &MembershipChange, now: Timestamp) {
    let (tab_id, key, write) = match change {
        MembershipChange::Admit { tab_id, element_ids } => {
            tabs::admit_members(txn, cols, tab_id, element_ids, now);
            return;
        }
        MembershipChange::Remove { tab_id, element_ids } => {
            tabs::remove_members(txn, cols, tab_id, element_ids, now);
            return;
        }
        MembershipChange::Exclude { tab_id, element_ids } => {
            (tab_id, "excludedElementIds", FieldWrite::ListAdd(element_ids.clone()))
        }
        MembershipChange::Unexclude { tab_id, element_ids } => {
            (tab_id, "excludedElementIds", FieldWrite::ListRemove(element_ids.clone()))
        }
    };
    apply_writes(txn, &cols.tabs, tab_id, vec![(key, write)], now);
}

fn apply_strip(txn: &mut TransactionMut<'_>, cols: &Collections, strip: &Strip, now: Timestamp) {
    let element_id = match strip {
        Strip::Property { element_id, .. } | Strip::Event { element_id, .. } => element_id,
    };
    let Some(fields) = entry_fields(txn, &cols.elements, element_id) else {
        debug!(element = %element_id, "Strip target missing, skipping");
        return;
    };
    let source = decode_element(element_id, &fields);
    let patch = match strip {
        Strip::Property { key, .. } => {
            if source.property(key).is_none() {
                return;
            }
            ElementPatch {
                properties: Some(source.properties.iter().filter(|p| &p.key != key).cloned().collect()),
                ..Default::default()
            }
        }
        Strip::Event { event_id, .. } => {
            if !source.events.iter().any(|e| &e.id == event_id) {
                return;
            }
            ElementPatch {
                events: Some(source.events.iter().filter(|e| &e.id != event_id).cloned().collect()),
                ..Default::default()
            }
        }
    };
    EntityPatch::Element(patch).apply(txn, cols, element_id, now);
}

/// One undoable user action
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub description: Option<String>,
    pub undo: ActionPatch,
    pub redo: ActionPatch,
}

impl Action {
    pub fn new(kind: ActionKind, undo: ActionPatch, redo: ActionPatch) -> Self {
        Self {
            kind,
            description: None,
            undo,
            redo,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug)]
pub struct UndoStack {
    /// Applied actions (most recent last)
    undo_stack: Vec<Action>,

    /// Undone actions (most recent last)
    redo_stack: Vec<Action>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    current_batch: Option<(Vec<Action>, Option<String>)>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
        }
    }

    /// Record an action that has already been applied
    pub fn record(&mut self, action: Action) {
        if let Some((batch, _)) = &mut self.current_batch {
            batch.push(action);
        } else {
            self.push(action);
        }
    }

    /// Start grouping actions into one undo step
    pub fn begin_batch(&mut self, description: Option<String>) {
        self.current_batch = Some((Vec::new(), description));
    }

    pub fn end_batch(&mut self) {
        let Some((mut actions, description)) = self.current_batch.take() else {
            return;
        };
        match actions.len() {
            0 => {}
            1 => self.push(actions.remove(0)),
            _ => {
                let redo = ActionPatch::Sequence(actions.iter().map(|a| a.redo.clone()).collect());
                let undo = ActionPatch::Sequence(actions.iter().rev().map(|a| a.undo.clone()).collect());
                let mut action = Action::new(ActionKind::Batch, undo, redo);
                action.description = description;
                self.push(action);
            }
        }
    }

    fn push(&mut self, action: Action) {
        self.undo_stack.push(action);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // new action invalidates the future
        self.redo_stack.clear();
    }

    /// Undo the most recent action. Returns false when there is none.
    pub fn undo(&mut self, ctx: &SyncContext) -> bool {
        let Some(action) = self.undo_stack.pop() else {
            return false;
        };
        let now = Utc::now();
        ctx.transact(|txn, cols| action.undo.apply(txn, cols, now));
        debug!(kind = ?action.kind, "Undid action");
        self.redo_stack.push(action);
        true
    }

    pub fn redo(&mut self, ctx: &SyncContext) -> bool {
        let Some(action) = self.redo_stack.pop() else {
            return false;
        };
        let now = Utc::now();
        ctx.transact(|txn, cols| action.redo.apply(txn, cols, now));
        debug!(kind = ?action.kind, "Redid action");
        self.undo_stack.push(action);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().and_then(|a| a.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().and_then(|a| a.description.as_deref())
    }

    pub fn peek_undo(&self) -> Option<&Action> {
        self.undo_stack.last()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
