//! Elements (graph entities)

use crate::{Property, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

/// An entity on the investigation canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub investigation_id: String,
    pub label: String,
    #[serde(default)]
    pub notes: String,

    /// Ordered set: insertion order is display order, no duplicates
    #[serde(default)]
    pub tags: Vec<String>,

    /// Ordered list, keys unique
    #[serde(default)]
    pub properties: Vec<Property>,

    /// 0..=100 in steps of 10
    #[serde(default)]
    pub confidence: Option<u8>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub date: Option<Timestamp>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub geo: Option<Geo>,
    #[serde(default)]
    pub events: Vec<ElementEvent>,
    #[serde(default)]
    pub visual: ElementVisual,

    /// Display order is user-significant (first asset is the thumbnail)
    #[serde(default)]
    pub asset_ids: Vec<String>,

    /// Back-reference to the containing group, not ownership
    #[serde(default)]
    pub parent_group_id: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub child_ids: Vec<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Element {
    pub fn new(
        id: impl Into<String>,
        investigation_id: impl Into<String>,
        label: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            investigation_id: investigation_id.into(),
            label: label.into(),
            notes: String::new(),
            tags: Vec::new(),
            properties: Vec::new(),
            confidence: None,
            source: String::new(),
            date: None,
            date_range: None,
            position: Position::default(),
            geo: None,
            events: Vec::new(),
            visual: ElementVisual::default(),
            asset_ids: Vec::new(),
            parent_group_id: None,
            is_group: false,
            child_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a tag unless it is already present. Returns whether it was added.
    pub fn add_tag(&mut self, tag: &str) -> Result<bool, ValidationError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ValidationError::EmptyTag);
        }
        if self.tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        self.tags.push(tag.to_string());
        Ok(true)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        before != self.tags.len()
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }
}

/// A dated sub-record of an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementEvent {
    pub id: String,
    pub date: Timestamp,
    #[serde(default)]
    pub end_date: Option<Timestamp>,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub geo: Option<Geo>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub lat: f64,
    pub lng: f64,
}

impl Geo {
    /// Validated constructor. Out-of-range coordinates are rejected, not clamped.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite() {
            return Err(ValidationError::NotFinite("latitude"));
        }
        if !lng.is_finite() {
            return Err(ValidationError::NotFinite("longitude"));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<Timestamp>,
    #[serde(default)]
    pub end: Option<Timestamp>,
}

impl DateRange {
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Result<Self, ValidationError> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(ValidationError::InvalidDateRange);
            }
        }
        Ok(Self { start, end })
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Round a raw slider value to the nearest 10.
///
/// Values outside 0..=100 are rejected rather than clamped.
pub fn normalize_confidence(raw: f64) -> Result<u8, ValidationError> {
    if !raw.is_finite() {
        return Err(ValidationError::NotFinite("confidence"));
    }
    if !(0.0..=100.0).contains(&raw) {
        return Err(ValidationError::ConfidenceOutOfRange(raw));
    }
    Ok(((raw / 10.0).round() * 10.0) as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementShape {
    #[default]
    Circle,
    Square,
    Diamond,
    Rectangle,
}

impl ElementShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementShape::Circle => "circle",
            ElementShape::Square => "square",
            ElementShape::Diamond => "diamond",
            ElementShape::Rectangle => "rectangle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "circle" => Some(ElementShape::Circle),
            "square" => Some(ElementShape::Square),
            "diamond" => Some(ElementShape::Diamond),
            "rectangle" => Some(ElementShape::Rectangle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl ElementSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementSize::Small => "small",
            ElementSize::Medium => "medium",
            ElementSize::Large => "large",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "small" => Some(ElementSize::Small),
            "medium" => Some(ElementSize::Medium),
            "large" => Some(ElementSize::Large),
            _ => None,
        }
    }
}

/// Visual style of an element node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementVisual {
    pub color: String,
    pub border_color: String,
    pub shape: ElementShape,
    pub size: ElementSize,
    pub icon: Option<String>,
    pub image: Option<String>,
}

impl Default for ElementVisual {
    fn default() -> Self {
        Self {
            color: "#ffffff".to_string(),
            border_color: "#374151".to_string(),
            shape: ElementShape::Circle,
            size: ElementSize::Medium,
            icon: None,
            image: None,
        }
    }
}
