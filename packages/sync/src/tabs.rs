//! # Tab / Ghost Engine
//!
//! A ghost of the active tab is an element that is not a member, is linked
//! to at least one member, and is not excluded in that tab.
//!
//! ```text
//!  members {A}     links (A,B) (B,C)     excluded {}
//!  ─────────────────────────────────────────────────
//!  ghosts = {B}    C is two hops away, so it stays hidden
//! ```
//!
//! Derivation is one pass over the links. [`GhostView`] caches the last
//! result and only recomputes when the active tab, its membership, its
//! exclusions or the link set changed.

use crate::codec::read::entry_fields;
use crate::codec::value::string_list_any;
use crate::codec::{decode_tab, encode_tab, insert_node};
use crate::context::Collections;
use crate::patch::{apply_writes, FieldWrite, PatchOutcome};
use sleuth_model::{CanvasTab, Link, Timestamp};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;
use yrs::{Map, TransactionMut};

/// Ghost ids of `tab`, given every link of the investigation.
/// `element_exists` filters out dangling endpoints.
pub fn compute_ghosts<'a>(
    tab: &CanvasTab,
    links: impl IntoIterator<Item = &'a Link>,
    element_exists: impl Fn(&str) -> bool,
) -> BTreeSet<String> {
    let members: HashSet<&str> = tab.member_element_ids.iter().map(String::as_str).collect();
    let excluded: HashSet<&str> = tab.excluded_element_ids.iter().map(String::as_str).collect();
    let mut ghosts = BTreeSet::new();

    for link in links {
        let from_in = members.contains(link.from_id.as_str());
        let to_in = members.contains(link.to_id.as_str());
        let candidate = match (from_in, to_in) {
            (true, false) => &link.to_id,
            (false, true) => &link.from_id,
            _ => continue,
        };
        if !excluded.contains(candidate.as_str()) && element_exists(candidate) {
            ghosts.insert(candidate.clone());
        }
    }
    ghosts
}

/// Ids of the tabs that list `element_id` as a member, in tab order
pub fn tabs_for_element(tabs: &[CanvasTab], element_id: &str) -> Vec<String> {
    tabs.iter()
        .filter(|tab| tab.is_member(element_id))
        .map(|tab| tab.id.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    tab_id: String,
    members: Vec<String>,
    excluded: Vec<String>,
    graph_revision: u64,
}

/// Cached ghost set of the active tab
#[derive(Debug, Default)]
pub struct GhostView {
    key: Option<Fingerprint>,
    ghosts: BTreeSet<String>,
    recomputations: u64,
}

impl GhostView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ghosts of `tab`. `graph_revision` must change whenever the element
    /// id set or a link endpoint changes.
    pub fn ghosts<'a>(
        &mut self,
        tab: &CanvasTab,
        graph_revision: u64,
        links: impl IntoIterator<Item = &'a Link>,
        element_exists: impl Fn(&str) -> bool,
    ) -> &BTreeSet<String> {
        let key = Fingerprint {
            tab_id: tab.id.clone(),
            members: tab.member_element_ids.clone(),
            excluded: tab.excluded_element_ids.clone(),
            graph_revision,
        };
        if self.key.as_ref() != Some(&key) {
            self.ghosts = compute_ghosts(tab, links, element_exists);
            self.recomputations += 1;
            self.key = Some(key);
            debug!(tab = %tab.id, ghosts = self.ghosts.len(), "Recomputed ghosts");
        }
        &self.ghosts
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// How many times the ghost set was actually derived
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

const MEMBERS: &str = "memberElementIds";
const EXCLUDED: &str = "excludedElementIds";

fn read_tabs(txn: &TransactionMut<'_>, cols: &Collections) -> Vec<CanvasTab> {
    let ids: Vec<String> = cols.tabs.keys(txn).map(str::to_string).collect();
    let mut tabs: Vec<CanvasTab> = ids
        .iter()
        .filter_map(|id| entry_fields(txn, &cols.tabs, id).map(|fields| decode_tab(id, &fields)))
        .collect();
    sort_tabs(&mut tabs);
    tabs
}

pub(crate) fn sort_tabs(tabs: &mut [CanvasTab]) {
    tabs.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Admit elements as members of a tab, clearing their exclusions there
pub fn admit_members(
    txn: &mut TransactionMut<'_>,
    cols: &Collections,
    tab_id: &str,
    element_ids: &[String],
    now: Timestamp,
) -> PatchOutcome {
    apply_writes(
        txn,
        &cols.tabs,
        tab_id,
        vec![
            (EXCLUDED, FieldWrite::ListRemove(element_ids.to_vec())),
            (MEMBERS, FieldWrite::ListAdd(element_ids.to_vec())),
        ],
        now,
    )
}

/// Remove members from a tab. An element whose only tab this is keeps its
/// membership. Returns the ids actually removed.
pub fn remove_members(
    txn: &mut TransactionMut<'_>,
    cols: &Collections,
    tab_id: &str,
    element_ids: &[String],
    now: Timestamp,
) -> Vec<String> {
    let tabs = read_tabs(txn, cols);
    let Some(tab) = tabs.iter().find(|t| t.id == tab_id) else {
        return Vec::new();
    };
    let removable: Vec<String> = element_ids
        .iter()
        .filter(|id| tab.is_member(id))
        .filter(|id| tabs.iter().any(|other| other.id != tab_id && other.is_member(id)))
        .cloned()
        .collect();
    let protected = element_ids.len() - removable.len();
    if protected > 0 {
        debug!(tab = %tab_id, protected, "Kept members that belong to no other tab");
    }
    if !removable.is_empty() {
        apply_writes(txn, &cols.tabs, tab_id, vec![(MEMBERS, FieldWrite::ListRemove(removable.clone()))], now);
    }
    removable
}

/// Suppress a ghost in one tab. Members cannot be excluded.
pub fn exclude_element(
    txn: &mut TransactionMut<'_>,
    cols: &Collections,
    tab_id: &str,
    element_id: &str,
    now: Timestamp,
) -> bool {
    let Some(tab) = entry_fields(txn, &cols.tabs, tab_id).map(|f| decode_tab(tab_id, &f)) else {
        return false;
    };
    if tab.is_member(element_id) || tab.is_excluded(element_id) {
        return false;
    }
    apply_writes(
        txn,
        &cols.tabs,
        tab_id,
        vec![(EXCLUDED, FieldWrite::ListAdd(vec![element_id.to_string()]))],
        now,
    )
    .is_applied()
}

/// Where a deleted element appeared, so it can be put back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementTabTrace {
    pub member_of: Vec<String>,
    pub excluded_in: Vec<String>,
}

/// Drop an element from every tab's membership and exclusions
pub fn cascade_element_removal(
    txn: &mut TransactionMut<'_>,
    cols: &Collections,
    element_id: &str,
    now: Timestamp,
) -> ElementTabTrace {
    let mut trace = ElementTabTrace::default();
    for tab in read_tabs(txn, cols) {
        let member = tab.is_member(element_id);
        let excluded = tab.is_excluded(element_id);
        if !member && !excluded {
            continue;
        }
        let ids = vec![element_id.to_string()];
        apply_writes(
            txn,
            &cols.tabs,
            &tab.id,
            vec![(MEMBERS, FieldWrite::ListRemove(ids.clone())), (EXCLUDED, FieldWrite::ListRemove(ids))],
            now,
        );
        if member {
            trace.member_of.push(tab.id.clone());
        }
        if excluded {
            trace.excluded_in.push(tab.id);
        }
    }
    trace
}

/// Outcome of deleting a tab
#[derive(Debug, Clone, PartialEq)]
pub struct TabDeletion {
    pub tab: CanvasTab,
    /// Tab that received the orphans, if any
    pub reassigned_to: Option<String>,
    pub reassigned: Vec<String>,
}

/// Delete a tab. Members that belong to no remaining tab move to the first
/// remaining tab. With no tabs left nothing is reassigned.
pub fn delete_tab(
    txn: &mut TransactionMut<'_>,
    cols: &Collections,
    tab_id: &str,
    now: Timestamp,
) -> Option<TabDeletion> {
    let tabs = read_tabs(txn, cols);
    let tab = tabs.iter().find(|t| t.id == tab_id)?.clone();
    let remaining: Vec<&CanvasTab> = tabs.iter().filter(|t| t.id != tab_id).collect();

    let orphans: Vec<String> = tab
        .member_element_ids
        .iter()
        .filter(|id| cols.elements.get(txn, id).is_some())
        .filter(|id| !remaining.iter().any(|t| t.is_member(id)))
        .cloned()
        .collect();

    cols.tabs.remove(txn, tab_id);

    let reassigned_to = match remaining.first() {
        Some(first) if !orphans.is_empty() => {
            admit_members(txn, cols, &first.id, &orphans, now);
            Some(first.id.clone())
        }
        _ => None,
    };
    debug!(tab = %tab_id, orphans = orphans.len(), "Deleted tab");
    Some(TabDeletion {
        tab,
        reassigned: if reassigned_to.is_some() { orphans } else { Vec::new() },
        reassigned_to,
    })
}

/// Reinsert a deleted tab under its original id
pub fn restore_tab(txn: &mut TransactionMut<'_>, cols: &Collections, tab: &CanvasTab) {
    insert_node(txn, &cols.tabs, &tab.id, encode_tab(tab));
}

/// Replace the membership lists of a tab wholesale
pub(crate) fn set_membership(
    txn: &mut TransactionMut<'_>,
    cols: &Collections,
    tab_id: &str,
    members: &[String],
    excluded: &[String],
    now: Timestamp,
) -> PatchOutcome {
    apply_writes(
        txn,
        &cols.tabs,
        tab_id,
        vec![
            (MEMBERS, FieldWrite::Plain(string_list_any(members))),
            (EXCLUDED, FieldWrite::Plain(string_list_any(excluded))),
        ],
        now,
    )
}
