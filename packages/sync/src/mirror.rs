//! Local read cache of the shared document
//!
//! The mirror is refreshed at most once per throttle window. It is never
//! written directly: mutations go through the patch applier, then the
//! mirror is marked dirty and picks the change up on its next refresh.
//! Code that needs the current value reads [`SyncContext`] instead.

use crate::context::SyncContext;
use crate::tabs::sort_tabs;
use sleuth_model::{CanvasTab, Element, Link};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Ids that changed between two refreshes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorChanges {
    pub elements: Vec<String>,
    pub links: Vec<String>,
    pub tabs: Vec<String>,
}

impl MirrorChanges {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.links.is_empty() && self.tabs.is_empty()
    }
}

fn diff<T: PartialEq>(old: &BTreeMap<String, T>, new: &BTreeMap<String, T>) -> Vec<String> {
    let mut changed: Vec<String> = new
        .iter()
        .filter(|(id, value)| old.get(*id) != Some(*value))
        .map(|(id, _)| id.clone())
        .collect();
    changed.extend(old.keys().filter(|id| !new.contains_key(*id)).cloned());
    changed.sort();
    changed
}

/// Whether ghost derivation could give a different answer: the element id
/// set or some link's endpoints changed. Field edits do not count.
fn graph_changed(
    old_elements: &BTreeMap<String, Element>,
    new_elements: &BTreeMap<String, Element>,
    old_links: &BTreeMap<String, Link>,
    new_links: &BTreeMap<String, Link>,
) -> bool {
    if !old_elements.keys().eq(new_elements.keys()) {
        return true;
    }
    old_links.len() != new_links.len()
        || old_links
            .iter()
            .zip(new_links)
            .any(|((old_id, old), (new_id, new))| {
                old_id != new_id || old.from_id != new.from_id || old.to_id != new.to_id
            })
}

#[derive(Debug)]
pub struct Mirror {
    throttle: Duration,
    last_refresh: Option<Instant>,
    dirty: bool,
    elements: BTreeMap<String, Element>,
    links: BTreeMap<String, Link>,
    tabs: BTreeMap<String, CanvasTab>,
    graph_revision: u64,
}

impl Mirror {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            last_refresh: None,
            dirty: true,
            elements: BTreeMap::new(),
            links: BTreeMap::new(),
            tabs: BTreeMap::new(),
            graph_revision: 0,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Refresh if dirty and the throttle window has elapsed
    pub fn refresh(&mut self, ctx: &SyncContext, now: Instant) -> Option<MirrorChanges> {
        if !self.dirty {
            return None;
        }
        if let Some(last) = self.last_refresh {
            if now.saturating_duration_since(last) < self.throttle {
                trace!("Mirror refresh throttled");
                return None;
            }
        }
        Some(self.force_refresh(ctx, now))
    }

    /// Re-read everything regardless of the throttle
    pub fn force_refresh(&mut self, ctx: &SyncContext, now: Instant) -> MirrorChanges {
        let elements: BTreeMap<String, Element> =
            ctx.elements().into_iter().map(|e| (e.id.clone(), e)).collect();
        let links: BTreeMap<String, Link> = ctx.links().into_iter().map(|l| (l.id.clone(), l)).collect();
        let tabs: BTreeMap<String, CanvasTab> = ctx.tabs().into_iter().map(|t| (t.id.clone(), t)).collect();

        let changes = MirrorChanges {
            elements: diff(&self.elements, &elements),
            links: diff(&self.links, &links),
            tabs: diff(&self.tabs, &tabs),
        };
        if graph_changed(&self.elements, &elements, &self.links, &links) {
            self.graph_revision += 1;
        }

        self.elements = elements;
        self.links = links;
        self.tabs = tabs;
        self.dirty = false;
        self.last_refresh = Some(now);
        trace!(
            elements = changes.elements.len(),
            links = changes.links.len(),
            tabs = changes.tabs.len(),
            "Mirror refreshed"
        );
        changes
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn tab(&self, id: &str) -> Option<&CanvasTab> {
        self.tabs.get(id)
    }

    pub fn has_element(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn elements(&self) -> Vec<Element> {
        self.elements.values().cloned().collect()
    }

    pub fn links(&self) -> Vec<Link> {
        self.links.values().cloned().collect()
    }

    pub fn iter_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Tabs in display order
    pub fn tabs(&self) -> Vec<CanvasTab> {
        let mut tabs: Vec<CanvasTab> = self.tabs.values().cloned().collect();
        sort_tabs(&mut tabs);
        tabs
    }

    /// Bumped whenever the element id set or a link endpoint changes
    pub fn graph_revision(&self) -> u64 {
        self.graph_revision
    }
}
