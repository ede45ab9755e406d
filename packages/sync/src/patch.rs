//! # Transactional Patch Applier
//!
//! Partial field diffs applied to an attached node.
//!
//! A patch only touches the fields it carries. Nested records (`visual`)
//! merge key by key so a concurrent change to a sibling key survives.
//! Scalar fields, `notes` included, are replaced whole so concurrent writers
//! resolve last-writer-wins per key. Every applied patch stamps
//! `updatedAt`. A patch whose target id is gone is a no-op: deletions win
//! races with updates.

use crate::codec::read::{as_list, normalize};
use crate::codec::value::*;
use crate::context::{Collections, EntityKind};
use sleuth_model::{
    normalize_confidence, DateRange, Element, ElementEvent, ElementShape, ElementSize, Geo, Link,
    LinkDirection, LinkStyle, LinkVisual, Position, Property, Timestamp, CanvasTab, ValidationError,
};
use tracing::debug;
use yrs::{Any, Array, ArrayPrelim, Map, MapPrelim, MapRef, TransactionMut, Value};

/// Result of applying a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// The target was deleted (possibly by a peer). Nothing was written.
    Missing,
}

impl PatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied)
    }
}

/// One low-level write against a node field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    /// Replace the field with a plain value
    Plain(Any),
    /// Shallow merge into a nested map, upgrading a plain map
    Merge(Vec<(&'static str, Any)>),
    /// Append ids missing from a shared list, upgrading a plain list
    ListAdd(Vec<String>),
    /// Remove every occurrence of the ids from a shared list
    ListRemove(Vec<String>),
}

/// Apply a list of writes to the node stored under `id`
pub fn apply_writes(
    txn: &mut TransactionMut<'_>,
    collection: &MapRef,
    id: &str,
    writes: Vec<(&'static str, FieldWrite)>,
    now: Timestamp,
) -> PatchOutcome {
    let node = match collection.get(txn, id) {
        Some(Value::YMap(node)) => node,
        Some(Value::Any(Any::Map(plain))) => {
            // plain map left by an older writer: attach it as a live node first
            let node = collection.insert(txn, id, MapPrelim::<Any>::new());
            for (key, value) in plain.iter() {
                node.insert(txn, key.as_str(), value.clone());
            }
            node
        }
        _ => {
            debug!(id = %id, "Patch target missing, skipping");
            return PatchOutcome::Missing;
        }
    };

    for (key, write) in writes {
        match write {
            FieldWrite::Plain(value) => {
                node.insert(txn, key, value);
            }
            FieldWrite::Merge(entries) => merge_map(txn, &node, key, entries),
            FieldWrite::ListAdd(ids) => list_add(txn, &node, key, &ids),
            FieldWrite::ListRemove(ids) => list_remove(txn, &node, key, &ids),
        }
    }
    node.insert(txn, "updatedAt", datetime_any(&now));
    PatchOutcome::Applied
}

fn merge_map(txn: &mut TransactionMut<'_>, node: &MapRef, key: &str, entries: Vec<(&'static str, Any)>) {
    let target = match node.get(txn, key) {
        Some(Value::YMap(map)) => map,
        existing => {
            let current = existing.map(|value| normalize(&*txn, value));
            let map = node.insert(txn, key, MapPrelim::<Any>::new());
            if let Some(Any::Map(plain)) = current {
                for (k, v) in plain.iter() {
                    map.insert(txn, k.as_str(), v.clone());
                }
            }
            map
        }
    };
    for (k, v) in entries {
        target.insert(txn, k, v);
    }
}

fn current_strings(txn: &TransactionMut<'_>, value: Option<Value>) -> Vec<String> {
    let any = value.map(|v| normalize(txn, v));
    as_list_strings(any.as_ref())
}

fn as_list_strings(value: Option<&Any>) -> Vec<String> {
    as_list(value)
        .iter()
        .filter_map(|item| match item {
            Any::String(s) => Some(s.to_string()),
            _ => None,
        })
        .collect()
}

/// Live array under `key`, created from the current plain value when needed
fn ensure_array(txn: &mut TransactionMut<'_>, node: &MapRef, key: &str) -> yrs::ArrayRef {
    match node.get(txn, key) {
        Some(Value::YArray(array)) => array,
        existing => {
            let items: Vec<Any> = current_strings(txn, existing)
                .iter()
                .map(|s| string_any(s))
                .collect();
            node.insert(txn, key, ArrayPrelim::from(items))
        }
    }
}

fn list_add(txn: &mut TransactionMut<'_>, node: &MapRef, key: &str, ids: &[String]) {
    let array = ensure_array(txn, node, key);
    let mut present = as_list_strings(Some(&yrs::types::ToJson::to_json(&array, txn)));
    for id in ids {
        if !present.contains(id) {
            array.push_back(txn, string_any(id));
            present.push(id.clone());
        }
    }
}

fn list_remove(txn: &mut TransactionMut<'_>, node: &MapRef, key: &str, ids: &[String]) {
    if node.get(txn, key).is_none() {
        return;
    }
    let array = ensure_array(txn, node, key);
    let items = yrs::types::ToJson::to_json(&array, txn);
    let doomed: Vec<u32> = as_list(Some(&items))
        .iter()
        .enumerate()
        .filter(|(_, item)| matches!(item, Any::String(s) if ids.iter().any(|id| id.as_str() == s.as_ref())))
        .map(|(index, _)| index as u32)
        .collect();
    for index in doomed.into_iter().rev() {
        array.remove(txn, index);
    }
}

/// Partial visual update for an element. Only provided keys are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementVisualPatch {
    pub color: Option<String>,
    pub border_color: Option<String>,
    pub shape: Option<ElementShape>,
    pub size: Option<ElementSize>,
    pub icon: Option<Option<String>>,
    pub image: Option<Option<String>>,
}

impl ElementVisualPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn entries(&self) -> Vec<(&'static str, Any)> {
        let mut out = Vec::new();
        if let Some(color) = &self.color {
            out.push(("color", string_any(color)));
        }
        if let Some(border) = &self.border_color {
            out.push(("borderColor", string_any(border)));
        }
        if let Some(shape) = self.shape {
            out.push(("shape", string_any(shape.as_str())));
        }
        if let Some(size) = self.size {
            out.push(("size", string_any(size.as_str())));
        }
        if let Some(icon) = &self.icon {
            out.push(("icon", opt_string_any(icon.as_deref())));
        }
        if let Some(image) = &self.image {
            out.push(("image", opt_string_any(image.as_deref())));
        }
        out
    }
}

/// Partial update of an element. Nullable fields use `Option<Option<_>>`
/// so that clearing a value is expressible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPatch {
    pub label: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub properties: Option<Vec<Property>>,
    pub confidence: Option<Option<u8>>,
    pub source: Option<String>,
    pub date: Option<Option<Timestamp>>,
    pub date_range: Option<Option<DateRange>>,
    pub position: Option<Position>,
    pub geo: Option<Option<Geo>>,
    pub events: Option<Vec<ElementEvent>>,
    pub visual: Option<ElementVisualPatch>,
    pub asset_ids: Option<Vec<String>>,
    pub parent_group_id: Option<Option<String>>,
    pub is_group: Option<bool>,
    pub child_ids: Option<Vec<String>>,
}

impl ElementPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Reject values the model refuses, before anything is written
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_confidence(self.confidence)?;
        check_tags(self.tags.as_deref())?;
        check_properties(self.properties.as_deref())?;
        check_date_range(self.date_range)?;
        if let Some(Some(geo)) = self.geo {
            check_geo(geo)?;
        }
        for event in self.events.iter().flatten() {
            if let Some(geo) = event.geo {
                check_geo(geo)?;
            }
            check_properties(Some(&event.properties))?;
        }
        Ok(())
    }

    /// Every field of `element`, as a patch that rewrites the whole record
    pub fn full(element: &Element) -> Self {
        let visual = &element.visual;
        Self {
            label: Some(element.label.clone()),
            notes: Some(element.notes.clone()),
            tags: Some(element.tags.clone()),
            properties: Some(element.properties.clone()),
            confidence: Some(element.confidence),
            source: Some(element.source.clone()),
            date: Some(element.date),
            date_range: Some(element.date_range),
            position: Some(element.position),
            geo: Some(element.geo),
            events: Some(element.events.clone()),
            visual: Some(ElementVisualPatch {
                color: Some(visual.color.clone()),
                border_color: Some(visual.border_color.clone()),
                shape: Some(visual.shape),
                size: Some(visual.size),
                icon: Some(visual.icon.clone()),
                image: Some(visual.image.clone()),
            }),
            asset_ids: Some(element.asset_ids.clone()),
            parent_group_id: Some(element.parent_group_id.clone()),
            is_group: Some(element.is_group),
            child_ids: Some(element.child_ids.clone()),
        }
    }

    pub fn writes(&self) -> Vec<(&'static str, FieldWrite)> {
        let mut out = Vec::new();
        if let Some(label) = &self.label {
            out.push(("label", FieldWrite::Plain(string_any(label))));
        }
        if let Some(notes) = &self.notes {
            out.push(("notes", FieldWrite::Plain(string_any(notes))));
        }
        if let Some(tags) = &self.tags {
            out.push(("tags", FieldWrite::Plain(string_list_any(tags))));
        }
        if let Some(properties) = &self.properties {
            out.push(("properties", FieldWrite::Plain(properties_any(properties))));
        }
        if let Some(confidence) = self.confidence {
            out.push(("confidence", FieldWrite::Plain(confidence_any(confidence))));
        }
        if let Some(source) = &self.source {
            out.push(("source", FieldWrite::Plain(string_any(source))));
        }
        if let Some(date) = &self.date {
            out.push(("date", FieldWrite::Plain(opt_datetime_any(date.as_ref()))));
        }
        if let Some(range) = &self.date_range {
            out.push(("dateRange", FieldWrite::Plain(date_range_any(range.as_ref()))));
        }
        if let Some(position) = &self.position {
            out.push(("position", FieldWrite::Plain(position_any(position))));
        }
        if let Some(geo) = &self.geo {
            out.push(("geo", FieldWrite::Plain(geo_any(geo.as_ref()))));
        }
        if let Some(events) = &self.events {
            out.push(("events", FieldWrite::Plain(events_any(events))));
        }
        if let Some(visual) = &self.visual {
            if !visual.is_empty() {
                out.push(("visual", FieldWrite::Merge(visual.entries())));
            }
        }
        if let Some(asset_ids) = &self.asset_ids {
            out.push(("assetIds", FieldWrite::Plain(string_list_any(asset_ids))));
        }
        if let Some(parent) = &self.parent_group_id {
            out.push(("parentGroupId", FieldWrite::Plain(opt_string_any(parent.as_deref()))));
        }
        if let Some(is_group) = self.is_group {
            out.push(("isGroup", FieldWrite::Plain(Any::Bool(is_group))));
        }
        if let Some(child_ids) = &self.child_ids {
            out.push(("childIds", FieldWrite::Plain(string_list_any(child_ids))));
        }
        out
    }

    /// Apply to a plain record (repositories, optimistic copies)
    pub fn apply_to(&self, element: &mut Element, now: Timestamp) {
        if let Some(label) = &self.label {
            element.label = label.clone();
        }
        if let Some(notes) = &self.notes {
            element.notes = notes.clone();
        }
        if let Some(tags) = &self.tags {
            element.tags = tags.clone();
        }
        if let Some(properties) = &self.properties {
            element.properties = properties.clone();
        }
        if let Some(confidence) = self.confidence {
            element.confidence = confidence;
        }
        if let Some(source) = &self.source {
            element.source = source.clone();
        }
        if let Some(date) = self.date {
            element.date = date;
        }
        if let Some(range) = self.date_range {
            element.date_range = range;
        }
        if let Some(position) = self.position {
            element.position = position;
        }
        if let Some(geo) = self.geo {
            element.geo = geo;
        }
        if let Some(events) = &self.events {
            element.events = events.clone();
        }
        if let Some(visual) = &self.visual {
            let target = &mut element.visual;
            if let Some(color) = &visual.color {
                target.color = color.clone();
            }
            if let Some(border) = &visual.border_color {
                target.border_color = border.clone();
            }
            if let Some(shape) = visual.shape {
                target.shape = shape;
            }
            if let Some(size) = visual.size {
                target.size = size;
            }
            if let Some(icon) = &visual.icon {
                target.icon = icon.clone();
            }
            if let Some(image) = &visual.image {
                target.image = image.clone();
            }
        }
        if let Some(asset_ids) = &self.asset_ids {
            element.asset_ids = asset_ids.clone();
        }
        if let Some(parent) = &self.parent_group_id {
            element.parent_group_id = parent.clone();
        }
        if let Some(is_group) = self.is_group {
            element.is_group = is_group;
        }
        if let Some(child_ids) = &self.child_ids {
            element.child_ids = child_ids.clone();
        }
        element.updated_at = now;
    }

    /// The patch that restores `current`'s values for every field this
    /// patch touches
    pub fn inverse(&self, current: &Element) -> Self {
        let full = Self::full(current);
        let visual = self.visual.as_ref().map(|v| {
            let cur = full.visual.clone().unwrap_or_default();
            ElementVisualPatch {
                color: v.color.as_ref().and(cur.color),
                border_color: v.border_color.as_ref().and(cur.border_color),
                shape: v.shape.and(cur.shape),
                size: v.size.and(cur.size),
                icon: v.icon.as_ref().and(cur.icon),
                image: v.image.as_ref().and(cur.image),
            }
        });
        Self {
            label: self.label.as_ref().and(full.label),
            notes: self.notes.as_ref().and(full.notes),
            tags: self.tags.as_ref().and(full.tags),
            properties: self.properties.as_ref().and(full.properties),
            confidence: self.confidence.and(full.confidence),
            source: self.source.as_ref().and(full.source),
            date: self.date.and(full.date),
            date_range: self.date_range.and(full.date_range),
            position: self.position.and(full.position),
            geo: self.geo.and(full.geo),
            events: self.events.as_ref().and(full.events),
            visual,
            asset_ids: self.asset_ids.as_ref().and(full.asset_ids),
            parent_group_id: self.parent_group_id.as_ref().and(full.parent_group_id),
            is_group: self.is_group.and(full.is_group),
            child_ids: self.child_ids.as_ref().and(full.child_ids),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkVisualPatch {
    pub color: Option<String>,
    pub style: Option<LinkStyle>,
    pub thickness: Option<u8>,
}

impl LinkVisualPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn entries(&self) -> Vec<(&'static str, Any)> {
        let mut out = Vec::new();
        if let Some(color) = &self.color {
            out.push(("color", string_any(color)));
        }
        if let Some(style) = self.style {
            out.push(("style", string_any(style.as_str())));
        }
        if let Some(thickness) = self.thickness {
            out.push(("thickness", Any::Number(thickness as f64)));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkPatch {
    pub from_id: Option<String>,
    pub to_id: Option<String>,
    pub direction: Option<LinkDirection>,
    pub label: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub properties: Option<Vec<Property>>,
    pub confidence: Option<Option<u8>>,
    pub source: Option<String>,
    pub date_range: Option<Option<DateRange>>,
    pub visual: Option<LinkVisualPatch>,
}

impl LinkPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_confidence(self.confidence)?;
        check_tags(self.tags.as_deref())?;
        check_properties(self.properties.as_deref())?;
        check_date_range(self.date_range)?;
        if let Some(thickness) = self.visual.as_ref().and_then(|v| v.thickness) {
            LinkVisual::validate_thickness(thickness)?;
        }
        Ok(())
    }

    pub fn full(link: &Link) -> Self {
        Self {
            from_id: Some(link.from_id.clone()),
            to_id: Some(link.to_id.clone()),
            direction: Some(link.direction),
            label: Some(link.label.clone()),
            notes: Some(link.notes.clone()),
            tags: Some(link.tags.clone()),
            properties: Some(link.properties.clone()),
            confidence: Some(link.confidence),
            source: Some(link.source.clone()),
            date_range: Some(link.date_range),
            visual: Some(LinkVisualPatch {
                color: Some(link.visual.color.clone()),
                style: Some(link.visual.style),
                thickness: Some(link.visual.thickness),
            }),
        }
    }

    pub fn writes(&self) -> Vec<(&'static str, FieldWrite)> {
        let mut out = Vec::new();
        if let Some(from_id) = &self.from_id {
            out.push(("fromId", FieldWrite::Plain(string_any(from_id))));
        }
        if let Some(to_id) = &self.to_id {
            out.push(("toId", FieldWrite::Plain(string_any(to_id))));
        }
        if let Some(direction) = self.direction {
            out.push(("direction", FieldWrite::Plain(string_any(direction.as_str()))));
            out.push(("directed", FieldWrite::Plain(Any::Bool(direction.is_directed()))));
        }
        if let Some(label) = &self.label {
            out.push(("label", FieldWrite::Plain(string_any(label))));
        }
        if let Some(notes) = &self.notes {
            out.push(("notes", FieldWrite::Plain(string_any(notes))));
        }
        if let Some(tags) = &self.tags {
            out.push(("tags", FieldWrite::Plain(string_list_any(tags))));
        }
        if let Some(properties) = &self.properties {
            out.push(("properties", FieldWrite::Plain(properties_any(properties))));
        }
        if let Some(confidence) = self.confidence {
            out.push(("confidence", FieldWrite::Plain(confidence_any(confidence))));
        }
        if let Some(source) = &self.source {
            out.push(("source", FieldWrite::Plain(string_any(source))));
        }
        if let Some(range) = &self.date_range {
            out.push(("dateRange", FieldWrite::Plain(date_range_any(range.as_ref()))));
        }
        if let Some(visual) = &self.visual {
            if !visual.is_empty() {
                out.push(("visual", FieldWrite::Merge(visual.entries())));
            }
        }
        out
    }

    pub fn apply_to(&self, link: &mut Link, now: Timestamp) {
        if let Some(from_id) = &self.from_id {
            link.from_id = from_id.clone();
        }
        if let Some(to_id) = &self.to_id {
            link.to_id = to_id.clone();
        }
        if let Some(direction) = self.direction {
            link.set_direction(direction);
        }
        if let Some(label) = &self.label {
            link.label = label.clone();
        }
        if let Some(notes) = &self.notes {
            link.notes = notes.clone();
        }
        if let Some(tags) = &self.tags {
            link.tags = tags.clone();
        }
        if let Some(properties) = &self.properties {
            link.properties = properties.clone();
        }
        if let Some(confidence) = self.confidence {
            link.confidence = confidence;
        }
        if let Some(source) = &self.source {
            link.source = source.clone();
        }
        if let Some(range) = self.date_range {
            link.date_range = range;
        }
        if let Some(visual) = &self.visual {
            if let Some(color) = &visual.color {
                link.visual.color = color.clone();
            }
            if let Some(style) = visual.style {
                link.visual.style = style;
            }
            if let Some(thickness) = visual.thickness {
                link.visual.thickness = thickness;
            }
        }
        link.updated_at = now;
    }

    pub fn inverse(&self, current: &Link) -> Self {
        let full = Self::full(current);
        let visual = self.visual.as_ref().map(|v| {
            let cur = full.visual.clone().unwrap_or_default();
            LinkVisualPatch {
                color: v.color.as_ref().and(cur.color),
                style: v.style.and(cur.style),
                thickness: v.thickness.and(cur.thickness),
            }
        });
        Self {
            from_id: self.from_id.as_ref().and(full.from_id),
            to_id: self.to_id.as_ref().and(full.to_id),
            direction: self.direction.and(full.direction),
            label: self.label.as_ref().and(full.label),
            notes: self.notes.as_ref().and(full.notes),
            tags: self.tags.as_ref().and(full.tags),
            properties: self.properties.as_ref().and(full.properties),
            confidence: self.confidence.and(full.confidence),
            source: self.source.as_ref().and(full.source),
            date_range: self.date_range.and(full.date_range),
            visual,
        }
    }
}

/// Partial update of a tab. Membership lists are replaced wholesale here;
/// additive membership changes go through the tab engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabPatch {
    pub name: Option<String>,
    pub order: Option<i64>,
    pub member_element_ids: Option<Vec<String>>,
    pub excluded_element_ids: Option<Vec<String>>,
}

impl TabPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn writes(&self) -> Vec<(&'static str, FieldWrite)> {
        let mut out = Vec::new();
        if let Some(name) = &self.name {
            out.push(("name", FieldWrite::Plain(string_any(name))));
        }
        if let Some(order) = self.order {
            out.push(("order", FieldWrite::Plain(Any::Number(order as f64))));
        }
        if let Some(members) = &self.member_element_ids {
            out.push(("memberElementIds", FieldWrite::Plain(string_list_any(members))));
        }
        if let Some(excluded) = &self.excluded_element_ids {
            out.push(("excludedElementIds", FieldWrite::Plain(string_list_any(excluded))));
        }
        out
    }

    pub fn apply_to(&self, tab: &mut CanvasTab, now: Timestamp) {
        if let Some(name) = &self.name {
            tab.name = name.clone();
        }
        if let Some(order) = self.order {
            tab.order = order;
        }
        if let Some(members) = &self.member_element_ids {
            tab.member_element_ids = members.clone();
        }
        if let Some(excluded) = &self.excluded_element_ids {
            tab.excluded_element_ids = excluded.clone();
        }
        tab.updated_at = now;
    }

    pub fn inverse(&self, current: &CanvasTab) -> Self {
        Self {
            name: self.name.as_ref().map(|_| current.name.clone()),
            order: self.order.map(|_| current.order),
            member_element_ids: self
                .member_element_ids
                .as_ref()
                .map(|_| current.member_element_ids.clone()),
            excluded_element_ids: self
                .excluded_element_ids
                .as_ref()
                .map(|_| current.excluded_element_ids.clone()),
        }
    }
}

/// A patch addressed to one entity of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPatch {
    Element(ElementPatch),
    Link(LinkPatch),
    Tab(TabPatch),
}

impl EntityPatch {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPatch::Element(_) => EntityKind::Element,
            EntityPatch::Link(_) => EntityKind::Link,
            EntityPatch::Tab(_) => EntityKind::Tab,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            EntityPatch::Element(p) => p.is_empty(),
            EntityPatch::Link(p) => p.is_empty(),
            EntityPatch::Tab(p) => p.is_empty(),
        }
    }

    pub fn writes(&self) -> Vec<(&'static str, FieldWrite)> {
        match self {
            EntityPatch::Element(p) => p.writes(),
            EntityPatch::Link(p) => p.writes(),
            EntityPatch::Tab(p) => p.writes(),
        }
    }

    /// Apply against the collection matching the patch kind
    pub fn apply(
        &self,
        txn: &mut TransactionMut<'_>,
        cols: &Collections,
        id: &str,
        now: Timestamp,
    ) -> PatchOutcome {
        apply_writes(txn, cols.of(self.kind()), id, self.writes(), now)
    }
}

fn check_confidence(confidence: Option<Option<u8>>) -> Result<(), ValidationError> {
    if let Some(Some(value)) = confidence {
        normalize_confidence(f64::from(value))?;
    }
    Ok(())
}

fn check_tags(tags: Option<&[String]>) -> Result<(), ValidationError> {
    if tags.is_some_and(|tags| tags.iter().any(|t| t.trim().is_empty())) {
        return Err(ValidationError::EmptyTag);
    }
    Ok(())
}

fn check_properties(properties: Option<&[Property]>) -> Result<(), ValidationError> {
    if properties.is_some_and(|props| props.iter().any(|p| p.key.trim().is_empty())) {
        return Err(ValidationError::EmptyPropertyKey);
    }
    Ok(())
}

fn check_date_range(range: Option<Option<DateRange>>) -> Result<(), ValidationError> {
    if let Some(Some(range)) = range {
        DateRange::new(range.start, range.end)?;
    }
    Ok(())
}

fn check_geo(geo: Geo) -> Result<(), ValidationError> {
    Geo::new(geo.lat, geo.lng).map(|_| ())
}

pub fn apply_element_patch(
    txn: &mut TransactionMut<'_>,
    elements: &MapRef,
    id: &str,
    patch: &ElementPatch,
    now: Timestamp,
) -> PatchOutcome {
    apply_writes(txn, elements, id, patch.writes(), now)
}

pub fn apply_link_patch(
    txn: &mut TransactionMut<'_>,
    links: &MapRef,
    id: &str,
    patch: &LinkPatch,
    now: Timestamp,
) -> PatchOutcome {
    apply_writes(txn, links, id, patch.writes(), now)
}

pub fn apply_tab_patch(
    txn: &mut TransactionMut<'_>,
    tabs: &MapRef,
    id: &str,
    patch: &TabPatch,
    now: Timestamp,
) -> PatchOutcome {
    apply_writes(txn, tabs, id, patch.writes(), now)
}
