//! # Echo Reconciliation
//!
//! One [`EditSession`] per edited entity. For every editable field it keeps
//! what the input shows (`local`) and the last value this client pushed
//! (`last_synced`).
//!
//! ```text
//!  local edit ──► last_synced = v ──► patch ──► document ──► peers
//!                                                   │
//!  change notification ◄────────────────────────────┘
//!     value == last_synced  → echo of our own write, dropped
//!     value != last_synced  → remote edit, local = last_synced = value
//! ```
//!
//! Free-text fields commit after a quiet period. Structured fields commit
//! the moment they change. Anything pending is flushed before the session
//! switches to another entity.

use crate::debounce::Debouncer;
use crate::notify::Notice;
use crate::patch::{ElementPatch, EntityPatch, LinkPatch, PatchOutcome};
use crate::SyncError;
use sleuth_model::{
    normalize_confidence, DateRange, Element, Geo, Link, LinkDirection, Timestamp,
};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Editable fields shared by the element and link inspectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Label,
    Notes,
    Source,
    Tags,
    Confidence,
    Date,
    DateRange,
    Geo,
    Direction,
}

/// How an edit to a field reaches the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Commit after the session's quiet period
    Debounced,
    /// Commit synchronously
    Immediate,
}

impl Field {
    pub fn policy(&self) -> CommitPolicy {
        match self {
            Field::Label | Field::Notes | Field::Source => CommitPolicy::Debounced,
            _ => CommitPolicy::Immediate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Tags(Vec<String>),
    Confidence(Option<u8>),
    Date(Option<Timestamp>),
    DateRange(Option<DateRange>),
    Geo(Option<Geo>),
    Direction(LinkDirection),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Per-field reconciliation state
#[derive(Debug, Clone, PartialEq)]
pub struct FieldState {
    pub local: FieldValue,
    pub last_synced: FieldValue,
}

impl FieldState {
    fn seeded(value: FieldValue) -> Self {
        Self {
            local: value.clone(),
            last_synced: value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Our own write coming back. Local state untouched.
    Echo,
    /// A peer's edit. Local state overwritten.
    Applied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Waiting for the quiet period
    Scheduled,
    Committed,
    /// Value already matches what was last pushed
    Unchanged,
    /// The target no longer exists in the document
    Missing,
    /// The target has no such field
    Unsupported,
    /// The host refused the value. Nothing was written.
    Rejected,
}

/// A record whose fields an edit session can reconcile
pub trait Editable {
    const FIELDS: &'static [Field];

    fn field_value(&self, field: Field) -> Option<FieldValue>;

    fn field_values(&self) -> BTreeMap<Field, FieldValue> {
        Self::FIELDS
            .iter()
            .filter_map(|field| self.field_value(*field).map(|value| (*field, value)))
            .collect()
    }
}

impl Editable for Element {
    const FIELDS: &'static [Field] = &[
        Field::Label,
        Field::Notes,
        Field::Source,
        Field::Tags,
        Field::Confidence,
        Field::Date,
        Field::DateRange,
        Field::Geo,
    ];

    fn field_value(&self, field: Field) -> Option<FieldValue> {
        Some(match field {
            Field::Label => FieldValue::Text(self.label.clone()),
            Field::Notes => FieldValue::Text(self.notes.clone()),
            Field::Source => FieldValue::Text(self.source.clone()),
            Field::Tags => FieldValue::Tags(self.tags.clone()),
            Field::Confidence => FieldValue::Confidence(self.confidence),
            Field::Date => FieldValue::Date(self.date),
            Field::DateRange => FieldValue::DateRange(self.date_range),
            Field::Geo => FieldValue::Geo(self.geo),
            Field::Direction => return None,
        })
    }
}

impl Editable for Link {
    const FIELDS: &'static [Field] = &[
        Field::Label,
        Field::Notes,
        Field::Source,
        Field::Tags,
        Field::Confidence,
        Field::DateRange,
        Field::Direction,
    ];

    fn field_value(&self, field: Field) -> Option<FieldValue> {
        Some(match field {
            Field::Label => FieldValue::Text(self.label.clone()),
            Field::Notes => FieldValue::Text(self.notes.clone()),
            Field::Source => FieldValue::Text(self.source.clone()),
            Field::Tags => FieldValue::Tags(self.tags.clone()),
            Field::Confidence => FieldValue::Confidence(self.confidence),
            Field::DateRange => FieldValue::DateRange(self.date_range),
            Field::Direction => FieldValue::Direction(self.direction),
            Field::Date | Field::Geo => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    Element(String),
    Link(String),
}

impl EditTarget {
    pub fn id(&self) -> &str {
        match self {
            EditTarget::Element(id) | EditTarget::Link(id) => id,
        }
    }

    /// Patch writing a single field, if the target kind has it
    pub fn field_patch(&self, field: Field, value: &FieldValue) -> Option<EntityPatch> {
        match self {
            EditTarget::Element(_) => element_field_patch(field, value).map(EntityPatch::Element),
            EditTarget::Link(_) => link_field_patch(field, value).map(EntityPatch::Link),
        }
    }
}

fn element_field_patch(field: Field, value: &FieldValue) -> Option<ElementPatch> {
    let mut patch = ElementPatch::default();
    match (field, value) {
        (Field::Label, FieldValue::Text(s)) => patch.label = Some(s.clone()),
        (Field::Notes, FieldValue::Text(s)) => patch.notes = Some(s.clone()),
        (Field::Source, FieldValue::Text(s)) => patch.source = Some(s.clone()),
        (Field::Tags, FieldValue::Tags(tags)) => patch.tags = Some(tags.clone()),
        (Field::Confidence, FieldValue::Confidence(c)) => patch.confidence = Some(*c),
        (Field::Date, FieldValue::Date(d)) => patch.date = Some(*d),
        (Field::DateRange, FieldValue::DateRange(r)) => patch.date_range = Some(*r),
        (Field::Geo, FieldValue::Geo(g)) => patch.geo = Some(*g),
        _ => return None,
    }
    Some(patch)
}

fn link_field_patch(field: Field, value: &FieldValue) -> Option<LinkPatch> {
    let mut patch = LinkPatch::default();
    match (field, value) {
        (Field::Label, FieldValue::Text(s)) => patch.label = Some(s.clone()),
        (Field::Notes, FieldValue::Text(s)) => patch.notes = Some(s.clone()),
        (Field::Source, FieldValue::Text(s)) => patch.source = Some(s.clone()),
        (Field::Tags, FieldValue::Tags(tags)) => patch.tags = Some(tags.clone()),
        (Field::Confidence, FieldValue::Confidence(c)) => patch.confidence = Some(*c),
        (Field::DateRange, FieldValue::DateRange(r)) => patch.date_range = Some(*r),
        (Field::Direction, FieldValue::Direction(d)) => patch.direction = Some(*d),
        _ => return None,
    }
    Some(patch)
}

/// What an edit session needs from its surroundings
pub trait EditHost {
    /// Issue an outbound mutation. Invalid values are refused with an error
    /// and never written.
    fn commit(&mut self, target: &EditTarget, patch: EntityPatch) -> Result<PatchOutcome, SyncError>;

    /// Current field values read from the shared document, bypassing any
    /// cache
    fn load(&self, target: &EditTarget) -> Option<BTreeMap<Field, FieldValue>>;

    fn notify(&self, notice: Notice);
}

pub struct EditSession {
    target: EditTarget,
    fields: BTreeMap<Field, FieldState>,
    debouncer: Debouncer<Field>,
    commits: usize,
}

impl EditSession {
    /// Start editing `target`. Returns `None` when it does not exist.
    pub fn open(host: &impl EditHost, target: EditTarget, quiet: Duration) -> Option<Self> {
        let values = host.load(&target)?;
        Some(Self {
            target,
            fields: values
                .into_iter()
                .map(|(field, value)| (field, FieldState::seeded(value)))
                .collect(),
            debouncer: Debouncer::new(quiet),
            commits: 0,
        })
    }

    pub fn target(&self) -> &EditTarget {
        &self.target
    }

    pub fn state(&self, field: Field) -> Option<&FieldState> {
        self.fields.get(&field)
    }

    /// What the input for `field` shows
    pub fn local(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field).map(|state| &state.local)
    }

    pub fn last_synced(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field).map(|state| &state.last_synced)
    }

    pub fn is_pending(&self, field: Field) -> bool {
        self.debouncer.is_pending(&field)
    }

    pub fn has_pending(&self) -> bool {
        self.debouncer.has_pending()
    }

    /// Number of outbound mutations issued by this session
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// A local edit, committed according to the field's policy
    pub fn edit(
        &mut self,
        host: &mut impl EditHost,
        field: Field,
        value: FieldValue,
        now: Instant,
    ) -> EditOutcome {
        let Some(state) = self.fields.get_mut(&field) else {
            return EditOutcome::Unsupported;
        };
        state.local = value;
        match field.policy() {
            CommitPolicy::Debounced => {
                self.debouncer.schedule(field, now);
                EditOutcome::Scheduled
            }
            CommitPolicy::Immediate => self.commit(host, field),
        }
    }

    /// Confidence from a raw slider value, rounded to the nearest 10.
    /// Out-of-range input is rejected and never written.
    pub fn edit_confidence(
        &mut self,
        host: &mut impl EditHost,
        raw: Option<f64>,
        now: Instant,
    ) -> Result<EditOutcome, SyncError> {
        let value = match raw {
            Some(raw) => Some(self.validated(&*host, normalize_confidence(raw))?),
            None => None,
        };
        Ok(self.edit(host, Field::Confidence, FieldValue::Confidence(value), now))
    }

    /// Geo from raw coordinates. `None` clears the location.
    pub fn edit_geo(
        &mut self,
        host: &mut impl EditHost,
        coords: Option<(f64, f64)>,
        now: Instant,
    ) -> Result<EditOutcome, SyncError> {
        let value = match coords {
            Some((lat, lng)) => Some(self.validated(&*host, Geo::new(lat, lng))?),
            None => None,
        };
        Ok(self.edit(host, Field::Geo, FieldValue::Geo(value), now))
    }

    fn validated<T>(
        &self,
        host: &impl EditHost,
        result: Result<T, sleuth_model::ValidationError>,
    ) -> Result<T, SyncError> {
        result.map_err(|e| {
            warn!(target_id = %self.target.id(), error = %e, "Rejected edit");
            host.notify(Notice::warning(e.to_string()));
            SyncError::from(e)
        })
    }

    /// Blur commits a pending text field right away
    pub fn blur(&mut self, host: &mut impl EditHost, field: Field) -> EditOutcome {
        if self.debouncer.cancel(&field) {
            self.commit(host, field)
        } else {
            EditOutcome::Unchanged
        }
    }

    /// Commit every field whose quiet period has elapsed
    pub fn poll(&mut self, host: &mut impl EditHost, now: Instant) -> Vec<(Field, EditOutcome)> {
        let mut out = Vec::new();
        for field in self.debouncer.due(now) {
            out.push((field, self.commit(host, field)));
        }
        out
    }

    /// Commit everything pending now, regardless of quiet periods
    pub fn flush(&mut self, host: &mut impl EditHost) -> Vec<(Field, EditOutcome)> {
        let mut out = Vec::new();
        for field in self.debouncer.drain() {
            out.push((field, self.commit(host, field)));
        }
        out
    }

    fn commit(&mut self, host: &mut impl EditHost, field: Field) -> EditOutcome {
        let Some(state) = self.fields.get_mut(&field) else {
            return EditOutcome::Unsupported;
        };
        if state.local == state.last_synced {
            return EditOutcome::Unchanged;
        }
        let Some(patch) = self.target.field_patch(field, &state.local) else {
            return EditOutcome::Unsupported;
        };
        // before the mutation, so the echo is recognised
        let previous = std::mem::replace(&mut state.last_synced, state.local.clone());
        self.commits += 1;
        match host.commit(&self.target, patch) {
            Ok(PatchOutcome::Applied) => EditOutcome::Committed,
            Ok(PatchOutcome::Missing) => EditOutcome::Missing,
            Err(e) => {
                debug!(target_id = %self.target.id(), ?field, error = %e, "Commit refused");
                state.last_synced = previous;
                EditOutcome::Rejected
            }
        }
    }

    /// Handle a change notification for one field
    pub fn receive_remote_field(&mut self, field: Field, value: FieldValue) -> RemoteOutcome {
        let Some(state) = self.fields.get_mut(&field) else {
            return RemoteOutcome::Echo;
        };
        if value == state.last_synced {
            return RemoteOutcome::Echo;
        }
        debug!(target_id = %self.target.id(), ?field, "Accepted remote edit");
        state.local = value.clone();
        state.last_synced = value;
        self.debouncer.cancel(&field);
        RemoteOutcome::Applied
    }

    /// Handle a change notification carrying the whole entity
    pub fn receive_remote(&mut self, values: &BTreeMap<Field, FieldValue>) -> Vec<(Field, RemoteOutcome)> {
        values
            .iter()
            .map(|(field, value)| (*field, self.receive_remote_field(*field, value.clone())))
            .collect()
    }

    /// Switch to another entity. Pending edits of the current target are
    /// committed first, then every field is re-seeded from the document.
    /// Returns false when the new target does not exist.
    pub fn switch_target(&mut self, host: &mut impl EditHost, target: EditTarget) -> bool {
        self.flush(host);
        self.debouncer.cancel_all();
        self.target = target;
        match host.load(&self.target) {
            Some(values) => {
                self.fields = values
                    .into_iter()
                    .map(|(field, value)| (field, FieldState::seeded(value)))
                    .collect();
                true
            }
            None => {
                self.fields.clear();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Host backed by plain records
    #[derive(Default)]
    struct FakeHost {
        elements: BTreeMap<String, Element>,
        commits: Vec<(EditTarget, EntityPatch)>,
        notices: std::cell::RefCell<Vec<Notice>>,
    }

    impl FakeHost {
        fn with(ids: &[&str]) -> Self {
            let mut host = Self::default();
            for id in ids {
                host.elements.insert(id.to_string(), Element::new(*id, "inv", *id, Utc::now()));
            }
            host
        }
    }

    impl EditHost for FakeHost {
        fn commit(&mut self, target: &EditTarget, patch: EntityPatch) -> Result<PatchOutcome, SyncError> {
            self.commits.push((target.clone(), patch.clone()));
            match (self.elements.get_mut(target.id()), patch) {
                (Some(el), EntityPatch::Element(p)) => {
                    p.validate()?;
                    p.apply_to(el, Utc::now());
                    Ok(PatchOutcome::Applied)
                }
                _ => Ok(PatchOutcome::Missing),
            }
        }

        fn load(&self, target: &EditTarget) -> Option<BTreeMap<Field, FieldValue>> {
            self.elements.get(target.id()).map(|el| el.field_values())
        }

        fn notify(&self, notice: Notice) {
            self.notices.borrow_mut().push(notice);
        }
    }

    const QUIET: Duration = Duration::from_millis(500);

    fn target(id: &str) -> EditTarget {
        EditTarget::Element(id.to_string())
    }

    #[test]
    fn test_echo_is_discarded() {
        let mut host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();
        let t0 = Instant::now();

        session.edit(&mut host, Field::Label, FieldValue::text("A"), t0);
        session.blur(&mut host, Field::Label);
        assert_eq!(host.commits.len(), 1);

        let outcome = session.receive_remote_field(Field::Label, FieldValue::text("A"));
        assert_eq!(outcome, RemoteOutcome::Echo);
        assert_eq!(session.local(Field::Label), Some(&FieldValue::text("A")));

        session.poll(&mut host, t0 + QUIET * 2);
        assert_eq!(host.commits.len(), 1);
    }

    #[test]
    fn test_remote_value_is_applied() {
        let host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();

        let outcome = session.receive_remote_field(Field::Label, FieldValue::text("B"));
        assert_eq!(outcome, RemoteOutcome::Applied);
        assert_eq!(session.local(Field::Label), Some(&FieldValue::text("B")));
        assert_eq!(session.last_synced(Field::Label), Some(&FieldValue::text("B")));
    }

    #[test]
    fn test_unrelated_notification_keeps_typing() {
        let mut host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();
        session.edit(&mut host, Field::Label, FieldValue::text("Ali"), Instant::now());

        // a peer changed tags; the label in the notification is the old one
        let mut remote = host.elements["e1"].clone();
        remote.tags = vec!["person".into()];
        session.receive_remote(&remote.field_values());

        assert_eq!(session.local(Field::Label), Some(&FieldValue::text("Ali")));
        assert!(session.is_pending(Field::Label));
        assert_eq!(session.local(Field::Tags), Some(&FieldValue::Tags(vec!["person".into()])));
    }

    #[test]
    fn test_debounce_coalesces_keystrokes() {
        let mut host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();
        let t0 = Instant::now();

        for (i, text) in ["A", "Al", "Ali"].iter().enumerate() {
            let at = t0 + Duration::from_millis(100 * i as u64);
            assert_eq!(session.edit(&mut host, Field::Label, FieldValue::text(*text), at), EditOutcome::Scheduled);
        }
        assert!(session.poll(&mut host, t0 + Duration::from_millis(600)).is_empty());

        let fired = session.poll(&mut host, t0 + Duration::from_millis(700));
        assert_eq!(fired, vec![(Field::Label, EditOutcome::Committed)]);
        assert_eq!(host.commits.len(), 1);
        assert_eq!(host.elements["e1"].label, "Ali");
    }

    #[test]
    fn test_structured_fields_commit_immediately() {
        let mut host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();

        let outcome = session.edit_confidence(&mut host, Some(67.0), Instant::now()).unwrap();
        assert_eq!(outcome, EditOutcome::Committed);
        assert_eq!(host.elements["e1"].confidence, Some(70));
    }

    #[test]
    fn test_invalid_geo_is_rejected_and_notified() {
        let mut host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();

        let err = session.edit_geo(&mut host, Some((95.0, 0.0)), Instant::now()).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(host.commits.is_empty());
        assert_eq!(host.notices.borrow().len(), 1);
        assert_eq!(session.local(Field::Geo), Some(&FieldValue::Geo(None)));
    }

    #[test]
    fn test_switch_flushes_pending_edit() {
        let mut host = FakeHost::with(&["e1", "e2"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();
        session.edit(&mut host, Field::Notes, FieldValue::text("half typed"), Instant::now());

        assert!(session.switch_target(&mut host, target("e2")));
        assert_eq!(host.elements["e1"].notes, "half typed");
        assert!(!session.has_pending());
        assert_eq!(session.local(Field::Label), Some(&FieldValue::text("e2")));
    }

    #[test]
    fn test_switch_reads_current_document_value() {
        let mut host = FakeHost::with(&["e1", "e2"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();
        host.elements.get_mut("e2").unwrap().label = "renamed by peer".into();

        session.switch_target(&mut host, target("e2"));
        assert_eq!(session.last_synced(Field::Label), Some(&FieldValue::text("renamed by peer")));
    }

    #[test]
    fn test_commit_to_deleted_target_is_missing() {
        let mut host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();
        host.elements.remove("e1");

        let outcome = session.edit(&mut host, Field::Tags, FieldValue::Tags(vec!["x".into()]), Instant::now());
        assert_eq!(outcome, EditOutcome::Missing);
    }

    #[test]
    fn test_refused_commit_keeps_last_synced() {
        let mut host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();

        let outcome = session.edit(&mut host, Field::Tags, FieldValue::Tags(vec!["  ".into()]), Instant::now());
        assert_eq!(outcome, EditOutcome::Rejected);
        assert_eq!(session.last_synced(Field::Tags), Some(&FieldValue::Tags(Vec::new())));
        assert!(host.elements["e1"].tags.is_empty());
    }

    #[test]
    fn test_element_has_no_direction() {
        let mut host = FakeHost::with(&["e1"]);
        let mut session = EditSession::open(&host, target("e1"), QUIET).unwrap();
        let outcome = session.edit(
            &mut host,
            Field::Direction,
            FieldValue::Direction(LinkDirection::Both),
            Instant::now(),
        );
        assert_eq!(outcome, EditOutcome::Unsupported);
    }
}
