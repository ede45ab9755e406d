//! # Investigation Store
//!
//! Everything an open investigation needs, wired together at construction:
//!
//! ```text
//!  edit surfaces ──► InvestigationStore ──► SyncContext (shared document)
//!                     │   records ▲                │ outbox
//!                     ▼           │                ▼
//!                  UndoStack   Mirror ◄──── refresh (throttled)
//!                              GhostView
//! ```
//!
//! Mutations read the current value from the document, apply a patch in
//! one transaction, and record the inverse on the undo stack. Reads for
//! display go through the mirror.

use crate::analytics::{Analytics, AnalyticsReport};
use crate::codec::{encode_element, encode_link, encode_tab, insert_node};
use crate::config::SyncConfig;
use crate::context::{EntityKind, SyncContext};
use crate::id_generator::IdGenerator;
use crate::mirror::{Mirror, MirrorChanges};
use crate::notify::{Notice, Notifier};
use crate::patch::{
    apply_element_patch, apply_link_patch, apply_tab_patch, ElementPatch, EntityPatch, LinkPatch,
    PatchOutcome, TabPatch,
};
use crate::reconcile::{EditHost, EditSession, EditTarget, Editable, Field, FieldValue};
use crate::repository::{Record, Repositories, Repository};
use crate::tabs::{self, tabs_for_element, GhostView, TabDeletion};
use crate::undo_stack::{Action, ActionKind, ActionPatch, CompositePatch, MembershipChange, Strip, UndoStack};
use crate::SyncError;
use chrono::Utc;
use sleuth_model::{
    remove_property, upsert_property, CanvasTab, DateRange, Element, Link, LinkDirection, Position, Property,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Horizontal distance between a source element and one extracted from it
const EXTRACT_OFFSET: f64 = 160.0;

pub struct InvestigationStore {
    ctx: SyncContext,
    config: SyncConfig,
    mirror: Mirror,
    undo: UndoStack,
    ids: IdGenerator,
    ghosts: GhostView,
    active_tab: Option<String>,
    notifier: Box<dyn Notifier>,
    repositories: Repositories,
    analytics: Option<Box<dyn Analytics>>,
    report: Option<AnalyticsReport>,
}

impl InvestigationStore {
    /// Open an investigation, seeding a fresh document from the repositories
    #[instrument(skip_all, fields(investigation = %investigation_id))]
    pub fn open(
        investigation_id: &str,
        repositories: Repositories,
        notifier: Box<dyn Notifier>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let elements = repositories.elements.get_by_investigation(investigation_id)?;
        let links = repositories.links.get_by_investigation(investigation_id)?;
        let tabs = repositories.tabs.get_by_investigation(investigation_id)?;

        // fresh client id: the seeded document restarts at clock 0
        let ctx = SyncContext::open(investigation_id, None);
        ctx.transact(|txn, cols| {
            for element in &elements {
                insert_node(txn, &cols.elements, &element.id, encode_element(element));
            }
            for link in &links {
                insert_node(txn, &cols.links, &link.id, encode_link(link));
            }
            for tab in &tabs {
                insert_node(txn, &cols.tabs, &tab.id, encode_tab(tab));
            }
        });
        info!(
            elements = elements.len(),
            links = links.len(),
            tabs = tabs.len(),
            "Seeded investigation from repositories"
        );

        let mut mirror = Mirror::new(config.mirror_throttle());
        mirror.force_refresh(&ctx, Instant::now());
        let active_tab = mirror.tabs().first().map(|tab| tab.id.clone());

        Ok(Self {
            ids: IdGenerator::new(investigation_id, ctx.client_id()),
            undo: UndoStack::with_max_levels(config.undo_max_levels),
            ghosts: GhostView::new(),
            ctx,
            config,
            mirror,
            active_tab,
            notifier,
            repositories,
            analytics: None,
            report: None,
        })
    }

    pub fn investigation_id(&self) -> &str {
        self.ctx.investigation_id()
    }

    /// Authoritative access to the shared document
    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn close(self) {
        self.ctx.close();
    }

    fn next_id(&mut self, kind: EntityKind) -> String {
        let prefix = match kind {
            EntityKind::Element => "el",
            EntityKind::Link => "ln",
            EntityKind::Tab => "tab",
        };
        let ctx = &self.ctx;
        self.ids.new_unique_id(prefix, |id| ctx.contains(kind, id))
    }

    fn record(&mut self, action: Action) {
        self.undo.record(action);
        self.mirror.mark_dirty();
    }

    fn apply_composite(&mut self, kind: ActionKind, description: String, undo: CompositePatch, redo: CompositePatch) {
        let now = Utc::now();
        self.ctx.transact(|txn, cols| redo.apply(txn, cols, now));
        self.record(
            Action::new(kind, ActionPatch::Composite(undo), ActionPatch::Composite(redo)).with_description(description),
        );
    }

    /// Create an element and admit it to the active tab
    pub fn create_element(&mut self, label: &str, position: Position) -> String {
        let id = self.next_id(EntityKind::Element);
        let mut element = Element::new(&id, self.investigation_id(), label, Utc::now());
        element.position = position;

        let memberships = self
            .active_tab
            .iter()
            .map(|tab_id| MembershipChange::Admit {
                tab_id: tab_id.clone(),
                element_ids: vec![id.clone()],
            })
            .collect();
        let redo = CompositePatch {
            created_elements: vec![element],
            memberships,
            ..Default::default()
        };
        let undo = CompositePatch {
            removed_element_ids: vec![id.clone()],
            ..Default::default()
        };
        self.apply_composite(ActionKind::CreateElement, format!("Create {}", label), undo, redo);
        debug!(element = %id, "Created element");
        id
    }

    /// Patch an element. Invalid values are rejected before anything is
    /// written.
    pub fn update_element(&mut self, id: &str, patch: ElementPatch) -> Result<PatchOutcome, SyncError> {
        if let Err(e) = patch.validate() {
            return Err(self.reject(e.into()));
        }
        let Some(current) = self.ctx.read_element(id) else {
            debug!(element = %id, "Update of missing element skipped");
            return Ok(PatchOutcome::Missing);
        };
        if patch.is_empty() {
            return Ok(PatchOutcome::Applied);
        }
        let inverse = patch.inverse(&current);
        let now = Utc::now();
        let outcome = self
            .ctx
            .transact(|txn, cols| apply_element_patch(txn, &cols.elements, id, &patch, now));
        if outcome.is_applied() {
            self.record(Action::new(
                ActionKind::UpdateElement,
                ActionPatch::Entity {
                    entity_id: id.to_string(),
                    changes: EntityPatch::Element(inverse),
                },
                ActionPatch::Entity {
                    entity_id: id.to_string(),
                    changes: EntityPatch::Element(patch),
                },
            ));
        }
        Ok(outcome)
    }

    /// Delete an element. Tab membership and group references are cleaned
    /// up, links to it are left dangling.
    pub fn delete_element(&mut self, id: &str) -> bool {
        self.remove_element(id, ActionKind::DeleteElement)
    }

    fn remove_element(&mut self, id: &str, kind: ActionKind) -> bool {
        let Some(element) = self.ctx.read_element(id) else {
            debug!(element = %id, "Delete of missing element skipped");
            return false;
        };

        let mut undo = CompositePatch {
            created_elements: vec![element.clone()],
            ..Default::default()
        };
        let mut redo = CompositePatch {
            removed_element_ids: vec![id.to_string()],
            ..Default::default()
        };
        for tab in self.ctx.tabs() {
            if tab.is_member(id) {
                undo.memberships.push(MembershipChange::Admit {
                    tab_id: tab.id.clone(),
                    element_ids: vec![id.to_string()],
                });
            }
            if tab.is_excluded(id) {
                undo.memberships.push(MembershipChange::Exclude {
                    tab_id: tab.id,
                    element_ids: vec![id.to_string()],
                });
            }
        }

        if let Some(parent) = element.parent_group_id.as_ref().and_then(|p| self.ctx.read_element(p)) {
            let remaining = parent.child_ids.iter().filter(|c| *c != id).cloned().collect();
            redo.patches.push(child_ids_patch(&parent.id, remaining));
            undo.patches.push(child_ids_patch(&parent.id, parent.child_ids.clone()));
        }
        if element.is_group {
            for child_id in &element.child_ids {
                let Some(child) = self.ctx.read_element(child_id) else {
                    continue;
                };
                if child.parent_group_id.as_deref() != Some(id) {
                    continue;
                }
                redo.patches.push(parent_patch(child_id, None));
                undo.patches.push(parent_patch(child_id, Some(id.to_string())));
            }
        }

        let description = format!("Delete {}", element.label);
        self.apply_composite(kind, description, undo, redo);
        debug!(element = %id, "Deleted element");
        true
    }

    pub fn add_tag(&mut self, element_id: &str, tag: &str) -> Result<PatchOutcome, SyncError> {
        let Some(mut element) = self.ctx.read_element(element_id) else {
            return Ok(PatchOutcome::Missing);
        };
        match element.add_tag(tag) {
            Ok(true) => self.update_element(
                element_id,
                ElementPatch {
                    tags: Some(element.tags),
                    ..Default::default()
                },
            ),
            Ok(false) => Ok(PatchOutcome::Applied),
            Err(e) => Err(self.reject(e.into())),
        }
    }

    pub fn remove_tag(&mut self, element_id: &str, tag: &str) -> Result<PatchOutcome, SyncError> {
        let Some(mut element) = self.ctx.read_element(element_id) else {
            return Ok(PatchOutcome::Missing);
        };
        if !element.remove_tag(tag) {
            return Ok(PatchOutcome::Applied);
        }
        self.update_element(
            element_id,
            ElementPatch {
                tags: Some(element.tags),
                ..Default::default()
            },
        )
    }

    /// Insert or replace a property, keeping its position when the key
    /// already exists
    pub fn set_property(&mut self, element_id: &str, property: Property) -> Result<PatchOutcome, SyncError> {
        let Some(mut element) = self.ctx.read_element(element_id) else {
            return Ok(PatchOutcome::Missing);
        };
        if let Err(e) = upsert_property(&mut element.properties, property) {
            return Err(self.reject(e.into()));
        }
        self.update_element(
            element_id,
            ElementPatch {
                properties: Some(element.properties),
                ..Default::default()
            },
        )
    }

    pub fn remove_property(&mut self, element_id: &str, key: &str) -> Result<PatchOutcome, SyncError> {
        let Some(mut element) = self.ctx.read_element(element_id) else {
            return Ok(PatchOutcome::Missing);
        };
        if remove_property(&mut element.properties, key).is_none() {
            return Ok(PatchOutcome::Applied);
        }
        self.update_element(
            element_id,
            ElementPatch {
                properties: Some(element.properties),
                ..Default::default()
            },
        )
    }

    fn reject(&self, error: SyncError) -> SyncError {
        warn!(error = %error, "Rejected edit");
        self.notifier.notify(Notice::warning(error.to_string()));
        error
    }

    pub fn create_link(&mut self, from_id: &str, to_id: &str, direction: LinkDirection) -> String {
        let id = self.next_id(EntityKind::Link);
        let link = Link::new(&id, self.investigation_id(), from_id, to_id, Utc::now()).with_direction(direction);
        let redo = CompositePatch {
            created_links: vec![link],
            ..Default::default()
        };
        let undo = CompositePatch {
            removed_link_ids: vec![id.clone()],
            ..Default::default()
        };
        self.apply_composite(ActionKind::CreateLink, "Create link".to_string(), undo, redo);
        debug!(link = %id, from = %from_id, to = %to_id, "Created link");
        id
    }

    pub fn update_link(&mut self, id: &str, patch: LinkPatch) -> Result<PatchOutcome, SyncError> {
        if let Err(e) = patch.validate() {
            return Err(self.reject(e.into()));
        }
        let Some(current) = self.ctx.read_link(id) else {
            debug!(link = %id, "Update of missing link skipped");
            return Ok(PatchOutcome::Missing);
        };
        if patch.is_empty() {
            return Ok(PatchOutcome::Applied);
        }
        let inverse = patch.inverse(&current);
        let now = Utc::now();
        let outcome = self
            .ctx
            .transact(|txn, cols| apply_link_patch(txn, &cols.links, id, &patch, now));
        if outcome.is_applied() {
            self.record(Action::new(
                ActionKind::UpdateLink,
                ActionPatch::Entity {
                    entity_id: id.to_string(),
                    changes: EntityPatch::Link(inverse),
                },
                ActionPatch::Entity {
                    entity_id: id.to_string(),
                    changes: EntityPatch::Link(patch),
                },
            ));
        }
        Ok(outcome)
    }

    pub fn delete_link(&mut self, id: &str) -> bool {
        let Some(link) = self.ctx.read_link(id) else {
            return false;
        };
        let undo = CompositePatch {
            created_links: vec![link],
            ..Default::default()
        };
        let redo = CompositePatch {
            removed_link_ids: vec![id.to_string()],
            ..Default::default()
        };
        self.apply_composite(ActionKind::DeleteLink, "Delete link".to_string(), undo, redo);
        true
    }

    /// Create a tab after the last one. The first tab becomes active and
    /// takes in every element, so none is left without a tab.
    pub fn create_tab(&mut self, name: &str) -> String {
        let id = self.next_id(EntityKind::Tab);
        let existing = self.ctx.tabs();
        let order = existing.iter().map(|t| t.order + 1).max().unwrap_or(0);
        let mut tab = CanvasTab::new(&id, self.investigation_id(), name, order, Utc::now());
        if existing.is_empty() {
            tab.member_element_ids = self.ctx.elements().into_iter().map(|e| e.id).collect();
        }
        let redo = CompositePatch {
            created_tabs: vec![tab],
            ..Default::default()
        };
        let undo = CompositePatch {
            removed_tab_ids: vec![id.clone()],
            ..Default::default()
        };
        self.apply_composite(ActionKind::CreateTab, format!("Create tab {}", name), undo, redo);
        if self.active_tab.is_none() {
            self.active_tab = Some(id.clone());
        }
        id
    }

    pub fn update_tab(&mut self, id: &str, patch: TabPatch) -> PatchOutcome {
        let Some(current) = self.ctx.read_tab(id) else {
            return PatchOutcome::Missing;
        };
        if patch.is_empty() {
            return PatchOutcome::Applied;
        }
        let inverse = patch.inverse(&current);
        let now = Utc::now();
        let outcome = self
            .ctx
            .transact(|txn, cols| apply_tab_patch(txn, &cols.tabs, id, &patch, now));
        if outcome.is_applied() {
            self.record(Action::new(
                ActionKind::UpdateTab,
                ActionPatch::Entity {
                    entity_id: id.to_string(),
                    changes: EntityPatch::Tab(inverse),
                },
                ActionPatch::Entity {
                    entity_id: id.to_string(),
                    changes: EntityPatch::Tab(patch),
                },
            ));
        }
        outcome
    }

    pub fn rename_tab(&mut self, id: &str, name: &str) -> PatchOutcome {
        self.update_tab(
            id,
            TabPatch {
                name: Some(name.to_string()),
                ..Default::default()
            },
        )
    }

    /// Give the listed tabs consecutive orders, as one undo step
    pub fn reorder_tabs(&mut self, ordered_ids: &[String]) {
        self.undo.begin_batch(Some("Reorder tabs".to_string()));
        for (order, id) in ordered_ids.iter().enumerate() {
            let order = order as i64;
            if self.ctx.read_tab(id).is_some_and(|tab| tab.order == order) {
                continue;
            }
            self.update_tab(
                id,
                TabPatch {
                    order: Some(order),
                    ..Default::default()
                },
            );
        }
        self.undo.end_batch();
    }

    /// Delete a tab, moving elements that would belong to no tab into the
    /// first remaining one
    pub fn delete_tab(&mut self, id: &str) -> Option<TabDeletion> {
        let now = Utc::now();
        let deletion = self.ctx.transact(|txn, cols| tabs::delete_tab(txn, cols, id, now))?;

        let mut undo = CompositePatch {
            created_tabs: vec![deletion.tab.clone()],
            ..Default::default()
        };
        let mut redo = CompositePatch {
            removed_tab_ids: vec![id.to_string()],
            ..Default::default()
        };
        if let Some(target) = &deletion.reassigned_to {
            undo.memberships.push(MembershipChange::Remove {
                tab_id: target.clone(),
                element_ids: deletion.reassigned.clone(),
            });
            redo.memberships.push(MembershipChange::Admit {
                tab_id: target.clone(),
                element_ids: deletion.reassigned.clone(),
            });
        }
        self.record(
            Action::new(ActionKind::DeleteTab, ActionPatch::Composite(undo), ActionPatch::Composite(redo))
                .with_description(format!("Delete tab {}", deletion.tab.name)),
        );
        self.ensure_active_tab();
        Some(deletion)
    }

    /// Reinsert a previously deleted tab under its id
    pub fn restore_tab(&mut self, tab: &CanvasTab) {
        let redo = CompositePatch {
            created_tabs: vec![tab.clone()],
            ..Default::default()
        };
        let undo = CompositePatch {
            removed_tab_ids: vec![tab.id.clone()],
            ..Default::default()
        };
        self.apply_composite(ActionKind::CreateTab, format!("Restore tab {}", tab.name), undo, redo);
        self.ensure_active_tab();
    }

    pub fn active_tab(&self) -> Option<&str> {
        self.active_tab.as_deref()
    }

    pub fn set_active_tab(&mut self, id: &str) -> bool {
        if !self.ctx.contains(EntityKind::Tab, id) {
            return false;
        }
        self.active_tab = Some(id.to_string());
        true
    }

    fn ensure_active_tab(&mut self) {
        let valid = self
            .active_tab
            .as_deref()
            .is_some_and(|id| self.ctx.contains(EntityKind::Tab, id));
        if !valid {
            self.active_tab = self.ctx.tabs().first().map(|tab| tab.id.clone());
        }
    }

    /// Admit elements to a tab, clearing any exclusion they had there
    pub fn add_members(&mut self, tab_id: &str, element_ids: &[String]) -> PatchOutcome {
        let Some(tab) = self.ctx.read_tab(tab_id) else {
            return PatchOutcome::Missing;
        };
        let added: Vec<String> = element_ids.iter().filter(|id| !tab.is_member(id)).cloned().collect();
        let unexcluded: Vec<String> = element_ids.iter().filter(|id| tab.is_excluded(id)).cloned().collect();
        if added.is_empty() {
            return PatchOutcome::Applied;
        }

        let mut undo = CompositePatch {
            memberships: vec![MembershipChange::Remove {
                tab_id: tab_id.to_string(),
                element_ids: added.clone(),
            }],
            ..Default::default()
        };
        if !unexcluded.is_empty() {
            undo.memberships.push(MembershipChange::Exclude {
                tab_id: tab_id.to_string(),
                element_ids: unexcluded,
            });
        }
        let redo = CompositePatch {
            memberships: vec![MembershipChange::Admit {
                tab_id: tab_id.to_string(),
                element_ids: added,
            }],
            ..Default::default()
        };
        self.apply_composite(ActionKind::Membership, "Add to tab".to_string(), undo, redo);
        PatchOutcome::Applied
    }

    /// Remove members from a tab. Elements whose only tab this is stay.
    pub fn remove_members(&mut self, tab_id: &str, element_ids: &[String]) -> Vec<String> {
        let now = Utc::now();
        let removed = self
            .ctx
            .transact(|txn, cols| tabs::remove_members(txn, cols, tab_id, element_ids, now));
        if removed.is_empty() {
            return removed;
        }
        let undo = CompositePatch {
            memberships: vec![MembershipChange::Admit {
                tab_id: tab_id.to_string(),
                element_ids: removed.clone(),
            }],
            ..Default::default()
        };
        let redo = CompositePatch {
            memberships: vec![MembershipChange::Remove {
                tab_id: tab_id.to_string(),
                element_ids: removed.clone(),
            }],
            ..Default::default()
        };
        self.record(
            Action::new(ActionKind::Membership, ActionPatch::Composite(undo), ActionPatch::Composite(redo))
                .with_description("Remove from tab"),
        );
        removed
    }

    /// Hide a ghost in one tab
    pub fn exclude_ghost(&mut self, tab_id: &str, element_id: &str) -> bool {
        let now = Utc::now();
        let excluded = self
            .ctx
            .transact(|txn, cols| tabs::exclude_element(txn, cols, tab_id, element_id, now));
        if excluded {
            let change = |exclude: bool| {
                let tab_id = tab_id.to_string();
                let element_ids = vec![element_id.to_string()];
                let change = if exclude {
                    MembershipChange::Exclude { tab_id, element_ids }
                } else {
                    MembershipChange::Unexclude { tab_id, element_ids }
                };
                ActionPatch::Composite(CompositePatch {
                    memberships: vec![change],
                    ..Default::default()
                })
            };
            self.record(
                Action::new(ActionKind::Membership, change(false), change(true)).with_description("Hide ghost"),
            );
        }
        excluded
    }

    pub fn is_member(&self, element_id: &str) -> bool {
        self.active_tab
            .as_deref()
            .and_then(|id| self.ctx.read_tab(id))
            .is_some_and(|tab| tab.is_member(element_id))
    }

    /// Ghosts of the active tab, as of the last mirror refresh
    pub fn ghosts(&mut self) -> BTreeSet<String> {
        self.mirror.refresh(&self.ctx, Instant::now());
        let Some(tab) = self.active_tab.as_deref().and_then(|id| self.mirror.tab(id)) else {
            return BTreeSet::new();
        };
        let mirror = &self.mirror;
        self.ghosts
            .ghosts(tab, mirror.graph_revision(), mirror.iter_links(), |id| mirror.has_element(id))
            .clone()
    }

    pub fn is_ghost(&mut self, element_id: &str) -> bool {
        self.ghosts().contains(element_id)
    }

    pub fn ghost_recomputations(&self) -> u64 {
        self.ghosts.recomputations()
    }

    pub fn tabs_for_element(&self, element_id: &str) -> Vec<String> {
        tabs_for_element(&self.ctx.tabs(), element_id)
    }

    /// Wrap existing elements in a new group element
    pub fn group_elements(&mut self, element_ids: &[String], label: &str) -> Option<String> {
        let children: Vec<Element> = element_ids.iter().filter_map(|id| self.ctx.read_element(id)).collect();
        if children.is_empty() {
            return None;
        }
        let id = self.next_id(EntityKind::Element);
        let mut group = Element::new(&id, self.investigation_id(), label, Utc::now());
        group.is_group = true;
        group.child_ids = children.iter().map(|c| c.id.clone()).collect();
        let count = children.len() as f64;
        group.position = Position::new(
            children.iter().map(|c| c.position.x).sum::<f64>() / count,
            children.iter().map(|c| c.position.y).sum::<f64>() / count,
        );

        let mut undo = CompositePatch {
            removed_element_ids: vec![id.clone()],
            ..Default::default()
        };
        let mut redo = CompositePatch::default();

        // children leave their previous group
        let mut old_parents: BTreeMap<String, (Vec<String>, Vec<String>)> = BTreeMap::new();
        for child in &children {
            if let Some(parent_id) = &child.parent_group_id {
                if let Some(parent) = self.ctx.read_element(parent_id) {
                    let entry = old_parents
                        .entry(parent_id.clone())
                        .or_insert_with(|| (parent.child_ids.clone(), parent.child_ids.clone()));
                    entry.1.retain(|c| *c != child.id);
                }
            }
            redo.patches.push(parent_patch(&child.id, Some(id.clone())));
            undo.patches.push(parent_patch(&child.id, child.parent_group_id.clone()));
        }
        for (parent_id, (before, after)) in old_parents {
            redo.patches.push(child_ids_patch(&parent_id, after));
            undo.patches.push(child_ids_patch(&parent_id, before));
        }

        if let Some(tab_id) = &self.active_tab {
            redo.memberships.push(MembershipChange::Admit {
                tab_id: tab_id.clone(),
                element_ids: vec![id.clone()],
            });
        }
        redo.created_elements.push(group);
        self.apply_composite(ActionKind::Group, format!("Group {}", label), undo, redo);
        Some(id)
    }

    /// Dissolve a group. Its children stay where they are.
    pub fn ungroup(&mut self, group_id: &str) -> bool {
        if !self.ctx.read_element(group_id).is_some_and(|e| e.is_group) {
            return false;
        }
        self.remove_element(group_id, ActionKind::Ungroup)
    }

    /// Turn a property into its own element, linked from the source.
    /// Returns the id of the new element.
    #[instrument(skip(self))]
    pub fn extract_property_to_element(&mut self, element_id: &str, key: &str) -> Option<String> {
        let source = self.ctx.read_element(element_id)?;
        let property = source.property(key)?.clone();
        let label = match property.value.display() {
            display if display.is_empty() => key.to_string(),
            display => display,
        };

        let now = Utc::now();
        let new_id = self.next_id(EntityKind::Element);
        let mut created = Element::new(&new_id, self.investigation_id(), label, now);
        created.position = Position::new(source.position.x + EXTRACT_OFFSET, source.position.y);

        let link_id = self.next_id(EntityKind::Link);
        let mut link = Link::new(&link_id, self.investigation_id(), element_id, &new_id, now)
            .with_direction(LinkDirection::Forward);
        link.label = key.to_string();

        let redo = CompositePatch {
            created_elements: vec![created],
            created_links: vec![link],
            memberships: self.admissions_alongside(element_id, &new_id),
            strips: vec![Strip::Property {
                element_id: element_id.to_string(),
                key: key.to_string(),
            }],
            ..Default::default()
        };
        let undo = CompositePatch {
            removed_link_ids: vec![link_id],
            removed_element_ids: vec![new_id.clone()],
            patches: vec![(
                element_id.to_string(),
                EntityPatch::Element(ElementPatch {
                    properties: Some(source.properties),
                    ..Default::default()
                }),
            )],
            ..Default::default()
        };
        self.apply_composite(ActionKind::ExtractProperty, format!("Extract {}", key), undo, redo);
        Some(new_id)
    }

    /// Turn a dated event into its own element, linked from the source
    #[instrument(skip(self))]
    pub fn extract_event_to_element(&mut self, element_id: &str, event_id: &str) -> Option<String> {
        let source = self.ctx.read_element(element_id)?;
        let event = source.events.iter().find(|e| e.id == event_id)?.clone();

        let now = Utc::now();
        let new_id = self.next_id(EntityKind::Element);
        let mut created = Element::new(&new_id, self.investigation_id(), &event.label, now);
        created.position = Position::new(source.position.x + EXTRACT_OFFSET, source.position.y);
        created.notes = event.description.clone();
        created.source = event.source.clone();
        created.date = Some(event.date);
        created.geo = event.geo;
        created.properties = event.properties.clone();
        if let Some(end) = event.end_date {
            created.date_range = Some(DateRange {
                start: Some(event.date),
                end: Some(end),
            });
        }

        let link_id = self.next_id(EntityKind::Link);
        let link = Link::new(&link_id, self.investigation_id(), element_id, &new_id, now)
            .with_direction(LinkDirection::Forward);

        let redo = CompositePatch {
            created_elements: vec![created],
            created_links: vec![link],
            memberships: self.admissions_alongside(element_id, &new_id),
            strips: vec![Strip::Event {
                element_id: element_id.to_string(),
                event_id: event_id.to_string(),
            }],
            ..Default::default()
        };
        let undo = CompositePatch {
            removed_link_ids: vec![link_id],
            removed_element_ids: vec![new_id.clone()],
            patches: vec![(
                element_id.to_string(),
                EntityPatch::Element(ElementPatch {
                    events: Some(source.events),
                    ..Default::default()
                }),
            )],
            ..Default::default()
        };
        self.apply_composite(ActionKind::ExtractEvent, format!("Extract {}", event.label), undo, redo);
        Some(new_id)
    }

    /// Admit `new_id` to every tab holding `source_id`, or to the active
    /// tab when the source is in none
    fn admissions_alongside(&self, source_id: &str, new_id: &str) -> Vec<MembershipChange> {
        let mut tab_ids = self.tabs_for_element(source_id);
        if tab_ids.is_empty() {
            tab_ids.extend(self.active_tab.clone());
        }
        tab_ids
            .into_iter()
            .map(|tab_id| MembershipChange::Admit {
                tab_id,
                element_ids: vec![new_id.to_string()],
            })
            .collect()
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.undo.undo(&self.ctx);
        if undone {
            self.mirror.mark_dirty();
            self.ensure_active_tab();
        }
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.undo.redo(&self.ctx);
        if redone {
            self.mirror.mark_dirty();
            self.ensure_active_tab();
        }
        redone
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn begin_batch(&mut self, description: Option<String>) {
        self.undo.begin_batch(description);
    }

    pub fn end_batch(&mut self) {
        self.undo.end_batch();
    }

    /// Merge a peer update. Bad bytes are reported and leave the session
    /// usable.
    pub fn apply_remote_update(&mut self, bytes: &[u8]) -> Result<(), SyncError> {
        match self.ctx.apply_remote_update(bytes) {
            Ok(()) => {
                self.mirror.mark_dirty();
                self.ensure_active_tab();
                Ok(())
            }
            Err(e) => {
                self.notifier.notify(Notice::error(format!("Could not apply a remote change: {}", e)));
                Err(e)
            }
        }
    }

    /// Updates produced locally since the last call, for the transport
    pub fn take_outbox(&self) -> Vec<Vec<u8>> {
        self.ctx.take_outbox()
    }

    /// Refresh the mirror if the throttle window allows
    pub fn refresh(&mut self, now: Instant) -> Option<MirrorChanges> {
        self.mirror.refresh(&self.ctx, now)
    }

    /// Start an edit session on an element or link
    pub fn open_session(&self, target: EditTarget) -> Option<EditSession> {
        EditSession::open(self, target, self.config.debounce())
    }

    /// Write the current document back into the repositories
    pub fn persist_snapshot(&mut self) -> Result<(), SyncError> {
        let snapshot = self.ctx.snapshot();
        let inv = snapshot.investigation_id.as_str();
        persist_into(self.repositories.elements.as_mut(), inv, snapshot.elements.clone())?;
        persist_into(self.repositories.links.as_mut(), inv, snapshot.links.clone())?;
        persist_into(self.repositories.tabs.as_mut(), inv, snapshot.tabs.clone())?;
        info!(
            investigation = %inv,
            elements = snapshot.elements.len(),
            links = snapshot.links.len(),
            tabs = snapshot.tabs.len(),
            "Persisted snapshot"
        );
        Ok(())
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn set_analytics(&mut self, analytics: Box<dyn Analytics>) {
        self.analytics = Some(analytics);
        self.report = None;
    }

    /// Run the analytics collaborator over the current graph
    pub fn run_analytics(&mut self) -> Option<&AnalyticsReport> {
        let analytics = self.analytics.as_ref()?;
        self.mirror.refresh(&self.ctx, Instant::now());
        let report = analytics.analyze(&self.mirror.elements(), &self.mirror.links());
        debug!(clusters = report.clusters.len(), "Analytics report updated");
        self.report = Some(report);
        self.report.as_ref()
    }

    /// The last analytics report
    pub fn analytics(&self) -> Option<&AnalyticsReport> {
        self.report.as_ref()
    }
}

fn child_ids_patch(group_id: &str, child_ids: Vec<String>) -> (String, EntityPatch) {
    (
        group_id.to_string(),
        EntityPatch::Element(ElementPatch {
            child_ids: Some(child_ids),
            ..Default::default()
        }),
    )
}

fn parent_patch(element_id: &str, parent: Option<String>) -> (String, EntityPatch) {
    (
        element_id.to_string(),
        EntityPatch::Element(ElementPatch {
            parent_group_id: Some(parent),
            ..Default::default()
        }),
    )
}

/// Make a repository hold exactly `records` for the investigation
fn persist_into<T: Record>(repo: &mut dyn Repository<T>, investigation_id: &str, records: Vec<T>) -> Result<(), SyncError> {
    let keep: BTreeSet<String> = records.iter().map(|r| r.id().to_string()).collect();
    for stale in repo.get_by_investigation(investigation_id)? {
        if !keep.contains(stale.id()) {
            repo.delete(stale.id())?;
        }
    }
    repo.bulk_upsert(records)
}

impl EditHost for InvestigationStore {
    fn commit(&mut self, target: &EditTarget, patch: EntityPatch) -> Result<PatchOutcome, SyncError> {
        match (target, patch) {
            (EditTarget::Element(id), EntityPatch::Element(patch)) => self.update_element(id, patch),
            (EditTarget::Link(id), EntityPatch::Link(patch)) => self.update_link(id, patch),
            (target, patch) => {
                warn!(target = ?target, kind = ?patch.kind(), "Patch kind does not match edit target");
                Ok(PatchOutcome::Missing)
            }
        }
    }

    fn load(&self, target: &EditTarget) -> Option<BTreeMap<Field, FieldValue>> {
        match target {
            EditTarget::Element(id) => self.ctx.read_element(id).map(|e| e.field_values()),
            EditTarget::Link(id) => self.ctx.read_link(id).map(|l| l.field_values()),
        }
    }

    fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }
}

impl std::fmt::Debug for InvestigationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvestigationStore")
            .field("ctx", &self.ctx)
            .field("active_tab", &self.active_tab)
            .field("undo_levels", &self.undo.undo_levels())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::repository::MemoryRepository;
    use crate::patch::LinkVisualPatch;
    use sleuth_model::{ElementEvent, Geo, PropertyValue};

    fn config() -> SyncConfig {
        SyncConfig {
            mirror_throttle_ms: 0,
            ..Default::default()
        }
    }

    fn store_with_tab() -> (InvestigationStore, RecordingNotifier) {
        let notifier = RecordingNotifier::new();
        let mut repos = Repositories::in_memory();
        repos
            .tabs
            .create(CanvasTab::new("main", "inv", "Main", 0, Utc::now()))
            .unwrap();
        let store = InvestigationStore::open("inv", repos, Box::new(notifier.clone()), config()).unwrap();
        (store, notifier)
    }

    fn ids<S: AsRef<str>>(items: &[S]) -> Vec<String> {
        items.iter().map(|s| s.as_ref().to_string()).collect()
    }

    #[test]
    fn test_open_seeds_document_and_picks_first_tab() {
        let mut repos = Repositories::in_memory();
        repos.elements.create(Element::new("e1", "inv", "Alice", Utc::now())).unwrap();
        repos.elements.create(Element::new("x", "other", "Elsewhere", Utc::now())).unwrap();
        repos.tabs.create(CanvasTab::new("b", "inv", "Second", 1, Utc::now())).unwrap();
        repos.tabs.create(CanvasTab::new("a", "inv", "First", 0, Utc::now())).unwrap();

        let store = InvestigationStore::open("inv", repos, Box::new(RecordingNotifier::new()), config()).unwrap();
        assert_eq!(store.context().elements().len(), 1);
        assert_eq!(store.active_tab(), Some("a"));
        assert!(!store.can_undo());
    }

    #[test]
    fn test_create_update_and_undo_element() {
        let (mut store, _) = store_with_tab();
        let id = store.create_element("Alice", Position::new(10.0, 20.0));
        assert!(store.is_member(&id));

        let outcome = store.update_element(
            &id,
            ElementPatch {
                label: Some("Alice Smith".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(store.context().read_element(&id).unwrap().label, "Alice Smith");

        store.undo();
        assert_eq!(store.context().read_element(&id).unwrap().label, "Alice");
        store.undo();
        assert!(store.context().read_element(&id).is_none());
        assert!(store.context().read_tab("main").unwrap().member_element_ids.is_empty());

        store.redo();
        assert!(store.is_member(&id));
    }

    #[test]
    fn test_update_missing_element_records_nothing() {
        let (mut store, _) = store_with_tab();
        let outcome = store.update_element(
            "ghost",
            ElementPatch {
                label: Some("x".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(outcome, PatchOutcome::Missing);
        assert!(!store.can_undo());
    }

    #[test]
    fn test_first_tab_takes_in_existing_elements() {
        let mut store = InvestigationStore::open(
            "inv",
            Repositories::in_memory(),
            Box::new(RecordingNotifier::new()),
            config(),
        )
        .unwrap();
        let loose = store.create_element("Loose", Position::default());
        assert!(store.tabs_for_element(&loose).is_empty());

        let first = store.create_tab("First");
        assert_eq!(store.tabs_for_element(&loose), vec![first.clone()]);
        let second = store.create_tab("Second");
        assert!(!store.context().read_tab(&second).unwrap().is_member(&loose));

        store.undo();
        store.undo();
        assert!(store.context().tabs().is_empty());
        store.redo();
        assert_eq!(store.tabs_for_element(&loose), vec![first]);
    }

    #[test]
    fn test_delete_element_undo_restores_memberships() {
        let (mut store, _) = store_with_tab();
        let second = store.create_tab("Second");
        let a = store.create_element("A", Position::default());
        let b = store.create_element("B", Position::default());
        store.add_members(&second, &ids(&[&a]));
        store.create_link(&a, &b, LinkDirection::Forward);
        store.exclude_ghost(&second, &b);

        assert!(store.delete_element(&b));
        assert!(!store.context().read_tab("main").unwrap().is_member(&b));
        assert!(!store.context().read_tab(&second).unwrap().is_excluded(&b));
        assert_eq!(store.context().links().len(), 1);

        store.undo();
        assert!(store.context().read_tab("main").unwrap().is_member(&b));
        assert!(store.context().read_tab(&second).unwrap().is_excluded(&b));
    }

    #[test]
    fn test_delete_tab_and_undo() {
        let (mut store, _) = store_with_tab();
        let side = store.create_tab("Side");
        store.set_active_tab(&side);
        let only_here = store.create_element("Only here", Position::default());

        let deletion = store.delete_tab(&side).unwrap();
        assert_eq!(deletion.reassigned, vec![only_here.clone()]);
        assert_eq!(store.active_tab(), Some("main"));
        assert!(store.context().read_tab("main").unwrap().is_member(&only_here));

        store.undo();
        assert!(store.context().read_tab(&side).unwrap().is_member(&only_here));
        assert!(!store.context().read_tab("main").unwrap().is_member(&only_here));
    }

    #[test]
    fn test_reorder_tabs_is_one_undo_step() {
        let (mut store, _) = store_with_tab();
        let b = store.create_tab("B");
        let c = store.create_tab("C");
        let before = store.undo_stack().undo_levels();

        store.reorder_tabs(&[c.clone(), b.clone(), "main".to_string()]);
        let names: Vec<String> = store.context().tabs().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["C", "B", "Main"]);
        assert_eq!(store.undo_stack().undo_levels(), before + 1);

        store.undo();
        let names: Vec<String> = store.context().tabs().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Main", "B", "C"]);
    }

    #[test]
    fn test_group_and_ungroup() {
        let (mut store, _) = store_with_tab();
        let a = store.create_element("A", Position::new(0.0, 0.0));
        let b = store.create_element("B", Position::new(100.0, 0.0));

        let group = store.group_elements(&ids(&[&a, &b]), "Team").unwrap();
        let g = store.context().read_element(&group).unwrap();
        assert!(g.is_group);
        assert_eq!(g.child_ids, vec![a.clone(), b.clone()]);
        assert_eq!(g.position, Position::new(50.0, 0.0));
        assert_eq!(store.context().read_element(&a).unwrap().parent_group_id, Some(group.clone()));

        assert!(store.ungroup(&group));
        assert!(store.context().read_element(&group).is_none());
        assert_eq!(store.context().read_element(&a).unwrap().parent_group_id, None);

        store.undo();
        assert_eq!(store.context().read_element(&b).unwrap().parent_group_id, Some(group));
    }

    #[test]
    fn test_extract_event_to_element() {
        let (mut store, _) = store_with_tab();
        let source = store.create_element("Alice", Position::default());
        let date = Utc::now();
        store.update_element(
            &source,
            ElementPatch {
                events: Some(vec![ElementEvent {
                    id: "ev1".into(),
                    date,
                    end_date: None,
                    label: "Meeting".into(),
                    description: "At the cafe".into(),
                    source: "witness".into(),
                    geo: None,
                    properties: Vec::new(),
                }]),
                ..Default::default()
            },
        )
        .unwrap();

        let new_id = store.extract_event_to_element(&source, "ev1").unwrap();
        let created = store.context().read_element(&new_id).unwrap();
        assert_eq!(created.label, "Meeting");
        assert_eq!(created.notes, "At the cafe");
        assert!(store.context().read_element(&source).unwrap().events.is_empty());
        assert!(store.is_member(&new_id));

        store.undo();
        assert_eq!(store.context().read_element(&source).unwrap().events.len(), 1);
        assert!(store.context().read_element(&new_id).is_none());
    }

    #[test]
    fn test_invalid_tag_is_rejected_and_notified() {
        let (mut store, notifier) = store_with_tab();
        let id = store.create_element("A", Position::default());

        assert!(store.add_tag(&id, "   ").is_err());
        assert_eq!(notifier.len(), 1);

        store.add_tag(&id, "suspect").unwrap();
        store.add_tag(&id, "suspect").unwrap();
        assert_eq!(store.context().read_element(&id).unwrap().tags, vec!["suspect"]);
    }

    #[test]
    fn test_out_of_range_values_are_never_written() {
        let (mut store, notifier) = store_with_tab();
        let a = store.create_element("A", Position::default());
        let b = store.create_element("B", Position::default());
        let link = store.create_link(&a, &b, LinkDirection::None);
        let levels = store.undo_stack().undo_levels();

        let thick = store.update_link(
            &link,
            LinkPatch {
                visual: Some(LinkVisualPatch {
                    thickness: Some(9),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert!(matches!(thick, Err(SyncError::Validation(_))));

        let element = store.update_element(
            &a,
            ElementPatch {
                confidence: Some(Some(250)),
                ..Default::default()
            },
        );
        assert!(element.is_err());
        let located = store.update_element(
            &a,
            ElementPatch {
                geo: Some(Some(Geo { lat: 120.0, lng: 0.0 })),
                ..Default::default()
            },
        );
        assert!(located.is_err());

        assert_eq!(notifier.len(), 3);
        assert_eq!(store.undo_stack().undo_levels(), levels);
        assert_eq!(store.context().read_link(&link).unwrap().visual.thickness, 2);
        let stored = store.context().read_element(&a).unwrap();
        assert_eq!(stored.confidence, None);
        assert_eq!(stored.geo, None);
    }

    #[test]
    fn test_label_edit_keeps_cached_ghosts() {
        let (mut store, _) = store_with_tab();
        let side = store.create_tab("Side");
        let a = store.create_element("A", Position::default());
        store.set_active_tab(&side);
        let b = store.create_element("B", Position::default());
        store.create_link(&a, &b, LinkDirection::None);
        store.set_active_tab("main");

        assert!(store.is_ghost(&b));
        let derived = store.ghost_recomputations();
        store
            .update_element(
                &b,
                ElementPatch {
                    label: Some("Bob".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.is_ghost(&b));
        assert_eq!(store.ghost_recomputations(), derived);

        store.create_link(&b, &a, LinkDirection::Forward);
        store.ghosts();
        assert_eq!(store.ghost_recomputations(), derived + 1);
    }

    #[test]
    fn test_set_property_keeps_position() {
        let (mut store, _) = store_with_tab();
        let id = store.create_element("A", Position::default());
        store.set_property(&id, Property::new("a", PropertyValue::Text("1".into()))).unwrap();
        store.set_property(&id, Property::new("b", PropertyValue::Number(2.0))).unwrap();
        store.set_property(&id, Property::new("a", PropertyValue::Text("updated".into()))).unwrap();

        let props = store.context().read_element(&id).unwrap().properties;
        assert_eq!(props[0].key, "a");
        assert_eq!(props[0].value, PropertyValue::Text("updated".into()));

        store.remove_property(&id, "a").unwrap();
        assert_eq!(store.context().read_element(&id).unwrap().properties.len(), 1);
    }

    #[test]
    fn test_bad_remote_update_notifies() {
        let (mut store, notifier) = store_with_tab();
        assert!(store.apply_remote_update(&[0xff, 0xff, 0xff]).is_err());
        assert_eq!(notifier.len(), 1);
        // still usable
        store.create_element("A", Position::default());
    }

    #[test]
    fn test_persist_snapshot_mirrors_document() {
        let mut repos = Repositories::in_memory();
        repos.elements.create(Element::new("old", "inv", "Old", Utc::now())).unwrap();
        let mut store = InvestigationStore::open("inv", repos, Box::new(RecordingNotifier::new()), config()).unwrap();
        let id = store.create_element("New", Position::default());
        store.delete_element("old");

        store.persist_snapshot().unwrap();
        let stored = store.repositories().elements.get_by_investigation("inv").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
    }

    struct DegreeAnalytics;

    impl Analytics for DegreeAnalytics {
        fn analyze(&self, elements: &[Element], links: &[Link]) -> AnalyticsReport {
            let isolated = elements
                .iter()
                .filter(|e| !links.iter().any(|l| l.touches(&e.id)))
                .map(|e| e.id.clone())
                .collect();
            AnalyticsReport {
                isolated,
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_analytics_report_is_carried() {
        let (mut store, _) = store_with_tab();
        let a = store.create_element("A", Position::default());
        let b = store.create_element("B", Position::default());
        let c = store.create_element("C", Position::default());
        store.create_link(&a, &b, LinkDirection::None);

        assert!(store.analytics().is_none());
        store.set_analytics(Box::new(DegreeAnalytics));
        let report = store.run_analytics().unwrap();
        assert!(report.is_isolated(&c));
        assert!(!report.is_isolated(&a));
        assert!(store.analytics().is_some());
    }

    #[test]
    fn test_edit_host_commits_record_undo() {
        let (mut store, _) = store_with_tab();
        let id = store.create_element("A", Position::default());
        let mut session = store.open_session(EditTarget::Element(id.clone())).unwrap();

        session.edit(&mut store, Field::Label, FieldValue::text("Alice"), Instant::now());
        session.blur(&mut store, Field::Label);
        assert_eq!(store.context().read_element(&id).unwrap().label, "Alice");

        store.undo();
        assert_eq!(store.context().read_element(&id).unwrap().label, "A");
    }

    #[test]
    fn test_memory_repository_is_usable_directly() {
        let mut repo = MemoryRepository::<Link>::new();
        repo.create(Link::new("l1", "inv", "a", "b", Utc::now())).unwrap();
        assert_eq!(repo.get_by_investigation("inv").unwrap().len(), 1);
    }
}
