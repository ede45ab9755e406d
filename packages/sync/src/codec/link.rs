use super::read::{as_f64, as_object, as_str, read_bool, read_datetime, read_string, read_string_set, FieldMap};
use super::value::*;
use super::NodePrelim;
use chrono::Utc;
use sleuth_model::{Link, LinkDirection, LinkStyle, LinkVisual};
use yrs::Any;

/// Both `direction` and the legacy `directed` flag are written, so older
/// readers that only know `directed` still render arrows.
pub fn encode_link(link: &Link) -> NodePrelim {
    NodePrelim::new(vec![
        ("id", string_any(&link.id)),
        ("investigationId", string_any(&link.investigation_id)),
        ("fromId", string_any(&link.from_id)),
        ("toId", string_any(&link.to_id)),
        ("direction", string_any(link.direction.as_str())),
        ("directed", Any::Bool(link.direction.is_directed())),
        ("label", string_any(&link.label)),
        ("notes", string_any(&link.notes)),
        ("tags", string_list_any(&link.tags)),
        ("properties", properties_any(&link.properties)),
        ("confidence", confidence_any(link.confidence)),
        ("source", string_any(&link.source)),
        ("dateRange", date_range_any(link.date_range.as_ref())),
        ("visual", link_visual_any(&link.visual)),
        ("createdAt", datetime_any(&link.created_at)),
        ("updatedAt", datetime_any(&link.updated_at)),
    ])
}

pub fn decode_link(id: &str, fields: &FieldMap) -> Link {
    let stored = as_str(fields.get("direction")).and_then(LinkDirection::parse);
    let direction = LinkDirection::resolve(stored, read_bool(fields, "directed"));
    let created_at = read_datetime(fields, "createdAt").unwrap_or_else(Utc::now);
    Link {
        id: id.to_string(),
        investigation_id: read_string(fields, "investigationId"),
        from_id: read_string(fields, "fromId"),
        to_id: read_string(fields, "toId"),
        direction,
        directed: direction.is_directed(),
        label: read_string(fields, "label"),
        notes: read_string(fields, "notes"),
        tags: read_string_set(fields, "tags"),
        properties: decode_properties(fields.get("properties")),
        confidence: decode_confidence(fields.get("confidence")),
        source: read_string(fields, "source"),
        date_range: decode_date_range(fields.get("dateRange")),
        visual: decode_link_visual(fields.get("visual")),
        created_at,
        updated_at: read_datetime(fields, "updatedAt").unwrap_or(created_at),
    }
}

pub(crate) fn link_visual_entries(visual: &LinkVisual) -> Vec<(&'static str, Any)> {
    vec![
        ("color", string_any(&visual.color)),
        ("style", string_any(visual.style.as_str())),
        ("thickness", Any::Number(visual.thickness as f64)),
    ]
}

fn link_visual_any(visual: &LinkVisual) -> Any {
    object_any(link_visual_entries(visual))
}

fn decode_link_visual(value: Option<&Any>) -> LinkVisual {
    let mut visual = LinkVisual::default();
    let Some(obj) = as_object(value) else {
        return visual;
    };
    if let Some(color) = as_str(obj.get("color")) {
        visual.color = color.to_string();
    }
    if let Some(style) = as_str(obj.get("style")).and_then(LinkStyle::parse) {
        visual.style = style;
    }
    // out-of-range thickness keeps the default
    if let Some(thickness) = as_f64(obj.get("thickness")) {
        if let Ok(valid) = LinkVisual::validate_thickness(thickness.round().clamp(0.0, 255.0) as u8) {
            visual.thickness = valid;
        }
    }
    visual
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sleuth_model::{Property, PropertyValue};

    fn sample_link() -> Link {
        let created = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
        let mut link = Link::new("l1", "inv-1", "e1", "e2", created).with_direction(LinkDirection::Backward);
        link.label = "knows".into();
        link.tags = vec!["family".into()];
        link.properties = vec![Property::new(
            "since",
            PropertyValue::Date(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()),
        )];
        link.confidence = Some(40);
        link.visual.style = LinkStyle::Dashed;
        link.visual.thickness = 4;
        link
    }

    #[test]
    fn test_round_trip() {
        let link = sample_link();
        let decoded = decode_link("l1", &encode_link(&link).to_fields());
        assert_eq!(decoded, link);
    }

    #[test]
    fn test_encode_writes_legacy_flag() {
        let prelim = encode_link(&sample_link());
        assert_eq!(prelim.get("directed"), Some(&Any::Bool(true)));
        assert_eq!(prelim.get("direction"), Some(&string_any("backward")));
    }

    #[test]
    fn test_legacy_directed_flag_resolves_forward() {
        let mut fields = FieldMap::new();
        fields.insert("directed".into(), Any::Bool(true));
        let link = decode_link("l9", &fields);
        assert_eq!(link.direction, LinkDirection::Forward);
        assert!(link.directed);

        fields.insert("directed".into(), Any::Bool(false));
        assert_eq!(decode_link("l9", &fields).direction, LinkDirection::None);
    }

    #[test]
    fn test_unknown_direction_falls_back_to_flag() {
        let mut fields = FieldMap::new();
        fields.insert("direction".into(), string_any("sideways"));
        fields.insert("directed".into(), Any::Bool(true));
        assert_eq!(decode_link("l9", &fields).direction, LinkDirection::Forward);
    }

    #[test]
    fn test_bad_thickness_keeps_default() {
        let mut fields = FieldMap::new();
        fields.insert("visual".into(), object_any(vec![("thickness", Any::Number(12.0))]));
        assert_eq!(decode_link("l9", &fields).visual.thickness, 2);
    }
}
