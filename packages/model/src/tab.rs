//! Canvas tabs (named subset views)

use crate::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasTab {
    pub id: String,
    pub investigation_id: String,
    pub name: String,

    /// Sort key, not unique
    #[serde(default)]
    pub order: i64,

    /// Explicit members, insertion ordered, no duplicates
    #[serde(default)]
    pub member_element_ids: Vec<String>,

    /// Elements suppressed from appearing as ghosts in this tab
    #[serde(default)]
    pub excluded_element_ids: Vec<String>,

    /// Local-only, never synchronized
    #[serde(default)]
    pub viewport: Viewport,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CanvasTab {
    pub fn new(
        id: impl Into<String>,
        investigation_id: impl Into<String>,
        name: impl Into<String>,
        order: i64,
        now: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            investigation_id: investigation_id.into(),
            name: name.into(),
            order,
            member_element_ids: Vec::new(),
            excluded_element_ids: Vec::new(),
            viewport: Viewport::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_member(&self, element_id: &str) -> bool {
        self.member_element_ids.iter().any(|id| id == element_id)
    }

    pub fn is_excluded(&self, element_id: &str) -> bool {
        self.excluded_element_ids.iter().any(|id| id == element_id)
    }

    /// Admit an element as a member. Admission clears any prior exclusion.
    /// Returns whether anything changed.
    pub fn admit(&mut self, element_id: &str) -> bool {
        let excluded_before = self.excluded_element_ids.len();
        self.excluded_element_ids.retain(|id| id != element_id);
        let mut changed = excluded_before != self.excluded_element_ids.len();
        if !self.is_member(element_id) {
            self.member_element_ids.push(element_id.to_string());
            changed = true;
        }
        changed
    }

    pub fn remove_member(&mut self, element_id: &str) -> bool {
        let before = self.member_element_ids.len();
        self.member_element_ids.retain(|id| id != element_id);
        before != self.member_element_ids.len()
    }

    pub fn exclude(&mut self, element_id: &str) -> bool {
        if self.is_excluded(element_id) {
            return false;
        }
        self.excluded_element_ids.push(element_id.to_string());
        true
    }

    /// Drop an element from both membership and exclusions
    pub fn forget(&mut self, element_id: &str) -> bool {
        let removed = self.remove_member(element_id);
        let before = self.excluded_element_ids.len();
        self.excluded_element_ids.retain(|id| id != element_id);
        removed || before != self.excluded_element_ids.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}
