//! # Entity Codec
//!
//! Bidirectional mapping between plain model records and shared-document
//! nodes.
//!
//! ## Node layout
//!
//! ```text
//! YMap "elements" {
//!   "<id>": YMap {
//!     "label": "Alice"                 plain
//!     "notes": "Seen at the port"      plain (a YText from another writer is read too)
//!     "tags": ["person", "suspect"]
//!     "visual": { "color": ... }       plain, or YMap once patched
//!     ...
//!   }
//! }
//! ```
//!
//! Encoding only ever produces plain `Any` values. Structured children can
//! only be authored after their parent is attached to the document, so the
//! patch applier upgrades a field to a structured type the first time it
//! edits it in place. Decoding accepts both encodings for every field.

mod element;
mod link;
pub mod read;
mod tab;
pub mod value;

pub use element::{decode_element, encode_element};
pub use link::{decode_link, encode_link};
pub use read::FieldMap;
pub use tab::{decode_tab, encode_tab};

use yrs::{Any, Map, MapPrelim, MapRef, TransactionMut};

/// A node made only of plain values, ready to be attached
#[derive(Debug, Clone, PartialEq)]
pub struct NodePrelim {
    fields: Vec<(&'static str, Any)>,
}

impl NodePrelim {
    pub(crate) fn new(fields: Vec<(&'static str, Any)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Any> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Plain field map, as a decoder would see the node right after insertion
    pub fn to_fields(&self) -> FieldMap {
        self.fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

/// Attach a node under `id`, replacing whatever was stored there
pub fn insert_node(
    txn: &mut TransactionMut<'_>,
    collection: &MapRef,
    id: &str,
    prelim: NodePrelim,
) -> MapRef {
    let node = collection.insert(txn, id, MapPrelim::<Any>::new());
    for (key, value) in prelim.fields {
        node.insert(txn, key, value);
    }
    node
}
