//! # Sleuth Model
//!
//! Plain domain records for a link-analysis investigation.
//!
//! ```text
//! Investigation
//!   ├── Element  (entity: label, tags, properties, events, geo, ...)
//!   ├── Link     (relationship between two elements, may dangle)
//!   └── CanvasTab (named subset view over elements)
//! ```
//!
//! These types carry no synchronization logic. They are what the edit
//! surfaces read and what the shared-document codec produces.

mod element;
mod error;
mod link;
mod snapshot;
mod tab;
mod value;

pub use element::{
    normalize_confidence, DateRange, Element, ElementEvent, ElementShape, ElementSize,
    ElementVisual, Geo, Position,
};
pub use error::ValidationError;
pub use link::{Link, LinkDirection, LinkStyle, LinkVisual};
pub use snapshot::InvestigationSnapshot;
pub use tab::{CanvasTab, Viewport};
pub use value::{remove_property, upsert_property, Property, PropertyType, PropertyValue};

/// Timestamp type used for every date-like field.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
