use super::read::{
    as_object, as_str, read_bool, read_datetime, read_opt_string, read_string, read_string_list,
    read_string_set, FieldMap,
};
use super::value::*;
use super::NodePrelim;
use chrono::Utc;
use sleuth_model::{Element, ElementShape, ElementSize, ElementVisual};
use std::collections::HashMap;
use yrs::Any;

pub fn encode_element(element: &Element) -> NodePrelim {
    NodePrelim::new(vec![
        ("id", string_any(&element.id)),
        ("investigationId", string_any(&element.investigation_id)),
        ("label", string_any(&element.label)),
        ("notes", string_any(&element.notes)),
        ("tags", string_list_any(&element.tags)),
        ("properties", properties_any(&element.properties)),
        ("confidence", confidence_any(element.confidence)),
        ("source", string_any(&element.source)),
        ("date", opt_datetime_any(element.date.as_ref())),
        ("dateRange", date_range_any(element.date_range.as_ref())),
        ("position", position_any(&element.position)),
        ("geo", geo_any(element.geo.as_ref())),
        ("events", events_any(&element.events)),
        ("visual", element_visual_any(&element.visual)),
        ("assetIds", string_list_any(&element.asset_ids)),
        ("parentGroupId", opt_string_any(element.parent_group_id.as_deref())),
        ("isGroup", Any::Bool(element.is_group)),
        ("childIds", string_list_any(&element.child_ids)),
        ("createdAt", datetime_any(&element.created_at)),
        ("updatedAt", datetime_any(&element.updated_at)),
    ])
}

/// Decode an element node. `id` is the collection key and wins over a
/// missing or mismatched `id` field.
pub fn decode_element(id: &str, fields: &FieldMap) -> Element {
    let created_at = read_datetime(fields, "createdAt").unwrap_or_else(Utc::now);
    Element {
        id: id.to_string(),
        investigation_id: read_string(fields, "investigationId"),
        label: read_string(fields, "label"),
        notes: read_string(fields, "notes"),
        tags: read_string_set(fields, "tags"),
        properties: decode_properties(fields.get("properties")),
        confidence: decode_confidence(fields.get("confidence")),
        source: read_string(fields, "source"),
        date: read_datetime(fields, "date"),
        date_range: decode_date_range(fields.get("dateRange")),
        position: decode_position(fields.get("position")),
        geo: decode_geo(fields.get("geo")),
        events: decode_events(fields.get("events")),
        visual: decode_element_visual(fields.get("visual")),
        asset_ids: read_string_list(fields, "assetIds"),
        parent_group_id: read_opt_string(fields, "parentGroupId"),
        is_group: read_bool(fields, "isGroup"),
        child_ids: read_string_set(fields, "childIds"),
        created_at,
        updated_at: read_datetime(fields, "updatedAt").unwrap_or(created_at),
    }
}

pub(crate) fn element_visual_entries(visual: &ElementVisual) -> Vec<(&'static str, Any)> {
    vec![
        ("color", string_any(&visual.color)),
        ("borderColor", string_any(&visual.border_color)),
        ("shape", string_any(visual.shape.as_str())),
        ("size", string_any(visual.size.as_str())),
        ("icon", opt_string_any(visual.icon.as_deref())),
        ("image", opt_string_any(visual.image.as_deref())),
    ]
}

fn element_visual_any(visual: &ElementVisual) -> Any {
    object_any(element_visual_entries(visual))
}

/// Missing keys keep their default so a partially written visual still decodes
fn decode_element_visual(value: Option<&Any>) -> ElementVisual {
    let mut visual = ElementVisual::default();
    let Some(obj) = as_object(value) else {
        return visual;
    };
    let text = |obj: &HashMap<String, Any>, key: &str| as_str(obj.get(key)).map(str::to_string);

    if let Some(color) = text(obj, "color") {
        visual.color = color;
    }
    if let Some(border) = text(obj, "borderColor") {
        visual.border_color = border;
    }
    if let Some(shape) = as_str(obj.get("shape")).and_then(ElementShape::parse) {
        visual.shape = shape;
    }
    if let Some(size) = as_str(obj.get("size")).and_then(ElementSize::parse) {
        visual.size = size;
    }
    visual.icon = text(obj, "icon");
    visual.image = text(obj, "image");
    visual
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{insert_node, read::entry_fields};
    use chrono::TimeZone;
    use sleuth_model::{
        DateRange, ElementEvent, Geo, Position, Property, PropertyValue,
    };
    use yrs::{Doc, Transact};

    fn sample_element() -> Element {
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut el = Element::new("e1", "inv-1", "Alice", created);
        el.notes = "Met at the harbour".into();
        el.tags = vec!["person".into(), "suspect".into()];
        el.properties = vec![
            Property::new("born", PropertyValue::Date(Utc.with_ymd_and_hms(1990, 5, 17, 0, 0, 0).unwrap())),
            Property::new("nationality", PropertyValue::Country("FR".into())),
            Property::new("site", PropertyValue::Url("https://example.org".into())),
            Property::new("height", PropertyValue::Number(1.72)),
            Property::new("active", PropertyValue::Boolean(true)),
            Property::new("alias", PropertyValue::Text("A.".into())),
            Property::new("unknown", PropertyValue::Null),
        ];
        el.confidence = Some(70);
        el.source = "Interview".into();
        el.date = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        el.date_range = Some(DateRange {
            start: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            end: None,
        });
        el.position = Position::new(120.5, -40.0);
        el.geo = Some(Geo { lat: 48.85, lng: 2.35 });
        el.events = vec![ElementEvent {
            id: "ev1".into(),
            date: Utc.with_ymd_and_hms(2024, 2, 3, 10, 30, 0).unwrap(),
            end_date: None,
            label: "Arrival".into(),
            description: "Landed at CDG".into(),
            source: "Flight log".into(),
            geo: Some(Geo { lat: 49.0, lng: 2.55 }),
            properties: vec![Property::new("flight", PropertyValue::Text("AF123".into()))],
        }];
        el.visual.color = "#ff0000".into();
        el.visual.shape = ElementShape::Diamond;
        el.visual.icon = Some("user".into());
        el.asset_ids = vec!["asset-2".into(), "asset-1".into()];
        el.parent_group_id = Some("g1".into());
        el.updated_at = created + chrono::Duration::milliseconds(1500);
        el
    }

    #[test]
    fn test_round_trip_through_prelim() {
        let el = sample_element();
        let decoded = decode_element(&el.id, &encode_element(&el).to_fields());
        assert_eq!(decoded, el);
    }

    #[test]
    fn test_round_trip_through_document() {
        let el = sample_element();
        let doc = Doc::new();
        let elements = doc.get_or_insert_map("elements");
        {
            let mut txn = doc.transact_mut();
            insert_node(&mut txn, &elements, &el.id, encode_element(&el));
        }

        let txn = doc.transact();
        let fields = entry_fields(&txn, &elements, "e1").unwrap();
        assert_eq!(decode_element("e1", &fields), el);
    }

    #[test]
    fn test_group_round_trip() {
        let mut group = Element::new("g1", "inv-1", "Crew", Utc::now());
        group.is_group = true;
        group.child_ids = vec!["e1".into(), "e2".into()];

        let decoded = decode_element("g1", &encode_element(&group).to_fields());
        assert_eq!(decoded, group);
    }

    #[test]
    fn test_empty_node_decodes_with_defaults() {
        let decoded = decode_element("e9", &FieldMap::new());
        assert_eq!(decoded.id, "e9");
        assert_eq!(decoded.label, "");
        assert!(decoded.tags.is_empty());
        assert_eq!(decoded.visual, ElementVisual::default());
        assert_eq!(decoded.updated_at, decoded.created_at);
    }

    #[test]
    fn test_partial_visual_keeps_defaults() {
        let mut fields = FieldMap::new();
        fields.insert("visual".into(), object_any(vec![("color", string_any("#000"))]));
        let decoded = decode_element("e1", &fields);
        assert_eq!(decoded.visual.color, "#000");
        assert_eq!(decoded.visual.border_color, ElementVisual::default().border_color);
    }
}
