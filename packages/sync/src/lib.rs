//! # Sleuth Sync
//!
//! Collaborative synchronization layer for investigations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ reconcile: per-field echo protocol          │
//! │  - debounced vs immediate commits           │
//! │  - echo / remote disambiguation             │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ store: InvestigationStore                   │
//! │  - CRUD, tabs, groups, extraction           │
//! │  - undo/redo with composite actions         │
//! │  - ghost derivation over the mirror         │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ patch + codec: partial writes on yrs nodes  │
//! │ context: Doc, collections, outbox           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Document is source of truth**: the mirror and ghost set are derived
//! 2. **Patches, not rewrites**: only the fields that changed are written
//! 3. **Echoes are recognised**: a session never resets input on its own write
//! 4. **Undo tolerates merges**: replay never assumes a sole writer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sleuth_sync::{InvestigationStore, Repositories, SyncConfig, TracingNotifier};
//!
//! let mut store = InvestigationStore::open(
//!     "inv-1",
//!     Repositories::in_memory(),
//!     Box::new(TracingNotifier),
//!     SyncConfig::default(),
//! )?;
//! let tab = store.create_tab("Main");
//! let alice = store.create_element("Alice", Position::new(0.0, 0.0));
//!
//! // ship local updates to peers
//! for update in store.take_outbox() {
//!     transport.send(update);
//! }
//! ```

mod analytics;
pub mod codec;
mod config;
mod context;
mod debounce;
mod errors;
mod id_generator;
mod mirror;
mod notify;
mod patch;
mod reconcile;
mod repository;
mod store;
pub mod tabs;
mod undo_stack;

pub use analytics::{Analytics, AnalyticsReport, CentralityScore, PathResult};
pub use config::{SyncConfig, DEFAULT_CONFIG_NAME};
pub use context::{Collections, EntityKind, SyncContext, ELEMENTS, LINKS, TABS};
pub use debounce::{DebounceDriver, Debouncer};
pub use errors::SyncError;
pub use id_generator::{get_client_seed, IdGenerator};
pub use mirror::{Mirror, MirrorChanges};
pub use notify::{Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use patch::{
    apply_element_patch, apply_link_patch, apply_tab_patch, apply_writes, ElementPatch,
    ElementVisualPatch, EntityPatch, FieldWrite, LinkPatch, LinkVisualPatch, PatchOutcome,
    TabPatch,
};
pub use reconcile::{
    CommitPolicy, EditHost, EditOutcome, EditSession, EditTarget, Editable, Field, FieldState,
    FieldValue, RemoteOutcome,
};
pub use repository::{MemoryRepository, Record, Repositories, Repository};
pub use store::InvestigationStore;
pub use tabs::{compute_ghosts, tabs_for_element, ElementTabTrace, GhostView, TabDeletion};
pub use undo_stack::{
    Action, ActionKind, ActionPatch, CompositePatch, MembershipChange, Strip, UndoStack,
};
