use crate::{CanvasTab, Element, Link};
use serde::{Deserialize, Serialize};

/// Full plain-data view of one investigation.
///
/// Used for repository seeding, JSON import/export, and as the decoded
/// form of an entire shared document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationSnapshot {
    pub investigation_id: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub tabs: Vec<CanvasTab>,
}

impl InvestigationSnapshot {
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn tab(&self, id: &str) -> Option<&CanvasTab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    /// Links whose endpoints reference at least one missing element
    pub fn dangling_links(&self) -> Vec<&Link> {
        self.links
            .iter()
            .filter(|l| self.element(&l.from_id).is_none() || self.element(&l.to_id).is_none())
            .collect()
    }
}
