//! Links (relationships between elements)

use crate::{DateRange, Property, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

/// A relationship between two elements.
///
/// Endpoints may reference elements that no longer exist. Such links are
/// valid and render as pointing at a deleted element; they are never
/// healed automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    pub investigation_id: String,
    pub from_id: String,
    pub to_id: String,
    #[serde(default)]
    pub direction: LinkDirection,

    /// Legacy flag kept alongside `direction`
    #[serde(default)]
    pub directed: bool,

    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub confidence: Option<u8>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub visual: LinkVisual,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Link {
    pub fn new(
        id: impl Into<String>,
        investigation_id: impl Into<String>,
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            investigation_id: investigation_id.into(),
            from_id: from_id.into(),
            to_id: to_id.into(),
            direction: LinkDirection::None,
            directed: false,
            label: String::new(),
            notes: String::new(),
            tags: Vec::new(),
            properties: Vec::new(),
            confidence: None,
            source: String::new(),
            date_range: None,
            visual: LinkVisual::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the direction and keep the legacy flag in step
    pub fn set_direction(&mut self, direction: LinkDirection) {
        self.direction = direction;
        self.directed = direction.is_directed();
    }

    pub fn with_direction(mut self, direction: LinkDirection) -> Self {
        self.set_direction(direction);
        self
    }

    pub fn touches(&self, element_id: &str) -> bool {
        self.from_id == element_id || self.to_id == element_id
    }

    /// The endpoint opposite `element_id`, if the link touches it
    pub fn other_end(&self, element_id: &str) -> Option<&str> {
        if self.from_id == element_id {
            Some(&self.to_id)
        } else if self.to_id == element_id {
            Some(&self.from_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    #[default]
    None,
    Forward,
    Backward,
    Both,
}

impl LinkDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkDirection::None => "none",
            LinkDirection::Forward => "forward",
            LinkDirection::Backward => "backward",
            LinkDirection::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(LinkDirection::None),
            "forward" => Some(LinkDirection::Forward),
            "backward" => Some(LinkDirection::Backward),
            "both" => Some(LinkDirection::Both),
            _ => None,
        }
    }

    /// Resolve the effective direction from a stored direction and the
    /// legacy `directed` flag: `forward` iff directed with no direction.
    pub fn resolve(stored: Option<LinkDirection>, directed: bool) -> Self {
        match stored {
            Some(direction) => direction,
            None if directed => LinkDirection::Forward,
            None => LinkDirection::None,
        }
    }

    pub fn is_directed(&self) -> bool {
        !matches!(self, LinkDirection::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl LinkStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStyle::Solid => "solid",
            LinkStyle::Dashed => "dashed",
            LinkStyle::Dotted => "dotted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "solid" => Some(LinkStyle::Solid),
            "dashed" => Some(LinkStyle::Dashed),
            "dotted" => Some(LinkStyle::Dotted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkVisual {
    pub color: String,
    pub style: LinkStyle,
    pub thickness: u8,
}

impl LinkVisual {
    pub const MIN_THICKNESS: u8 = 1;
    pub const MAX_THICKNESS: u8 = 5;

    pub fn validate_thickness(thickness: u8) -> Result<u8, ValidationError> {
        if (Self::MIN_THICKNESS..=Self::MAX_THICKNESS).contains(&thickness) {
            Ok(thickness)
        } else {
            Err(ValidationError::ThicknessOutOfRange(thickness))
        }
    }
}

impl Default for LinkVisual {
    fn default() -> Self {
        Self {
            color: "#6b7280".to_string(),
            style: LinkStyle::Solid,
            thickness: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_legacy_direction_resolution() {
        assert_eq!(LinkDirection::resolve(None, true), LinkDirection::Forward);
        assert_eq!(LinkDirection::resolve(None, false), LinkDirection::None);
        assert_eq!(
            LinkDirection::resolve(Some(LinkDirection::Backward), false),
            LinkDirection::Backward
        );
        assert_eq!(
            LinkDirection::resolve(Some(LinkDirection::None), true),
            LinkDirection::None
        );
    }

    #[test]
    fn test_set_direction_keeps_flag() {
        let mut link = Link::new("l1", "inv", "a", "b", Utc::now());
        link.set_direction(LinkDirection::Both);
        assert!(link.directed);
        link.set_direction(LinkDirection::None);
        assert!(!link.directed);
    }

    #[test]
    fn test_other_end() {
        let link = Link::new("l1", "inv", "a", "b", Utc::now());
        assert_eq!(link.other_end("a"), Some("b"));
        assert_eq!(link.other_end("b"), Some("a"));
        assert_eq!(link.other_end("c"), None);
    }

    #[test]
    fn test_thickness_bounds() {
        assert_eq!(LinkVisual::validate_thickness(1), Ok(1));
        assert_eq!(LinkVisual::validate_thickness(5), Ok(5));
        assert!(LinkVisual::validate_thickness(0).is_err());
        assert!(LinkVisual::validate_thickness(6).is_err());
    }
}
