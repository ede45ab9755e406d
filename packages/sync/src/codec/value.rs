//! Shared encoders/decoders for composite field values
//!
//! Typed property values that would otherwise collapse into a plain string
//! use a `{_type, value}` envelope:
//!
//! ```text
//! Date     -> { "_type": "date",    "value": "2024-03-01T12:00:00Z" }
//! Country  -> { "_type": "country", "value": "FR" }
//! Url      -> { "_type": "url",     "value": "https://..." }
//! ```

use super::read::{as_datetime, as_f64, as_list, as_object, as_str};
use chrono::SecondsFormat;
use sleuth_model::{
    DateRange, ElementEvent, Geo, Position, Property, PropertyType, PropertyValue, Timestamp,
};
use std::collections::HashMap;
use tracing::trace;
use yrs::Any;

const TYPE_TAG: &str = "_type";

pub fn string_any(s: &str) -> Any {
    Any::String(s.into())
}

pub fn opt_string_any(s: Option<&str>) -> Any {
    match s {
        Some(s) => string_any(s),
        None => Any::Null,
    }
}

pub fn datetime_any(ts: &Timestamp) -> Any {
    Any::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true).into())
}

pub fn opt_datetime_any(ts: Option<&Timestamp>) -> Any {
    match ts {
        Some(ts) => datetime_any(ts),
        None => Any::Null,
    }
}

pub fn string_list_any(items: &[String]) -> Any {
    let items: Vec<Any> = items.iter().map(|s| string_any(s)).collect();
    Any::Array(items.into())
}

pub fn object_any(entries: Vec<(&str, Any)>) -> Any {
    let map: HashMap<String, Any> = entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    Any::Map(map.into())
}

pub fn position_any(position: &Position) -> Any {
    object_any(vec![
        ("x", Any::Number(position.x)),
        ("y", Any::Number(position.y)),
    ])
}

pub fn decode_position(value: Option<&Any>) -> Position {
    match as_object(value) {
        Some(obj) => Position::new(
            as_f64(obj.get("x")).unwrap_or_default(),
            as_f64(obj.get("y")).unwrap_or_default(),
        ),
        None => Position::default(),
    }
}

pub fn geo_any(geo: Option<&Geo>) -> Any {
    match geo {
        Some(geo) => object_any(vec![("lat", Any::Number(geo.lat)), ("lng", Any::Number(geo.lng))]),
        None => Any::Null,
    }
}

/// Out-of-range coordinates in the document decode as "no geo"
pub fn decode_geo(value: Option<&Any>) -> Option<Geo> {
    let obj = as_object(value)?;
    let lat = as_f64(obj.get("lat"))?;
    let lng = as_f64(obj.get("lng"))?;
    match Geo::new(lat, lng) {
        Ok(geo) => Some(geo),
        Err(e) => {
            trace!(error = %e, "Dropping invalid geo");
            None
        }
    }
}

pub fn date_range_any(range: Option<&DateRange>) -> Any {
    match range {
        Some(range) => object_any(vec![
            ("start", opt_datetime_any(range.start.as_ref())),
            ("end", opt_datetime_any(range.end.as_ref())),
        ]),
        None => Any::Null,
    }
}

pub fn decode_date_range(value: Option<&Any>) -> Option<DateRange> {
    let obj = as_object(value)?;
    Some(DateRange {
        start: as_datetime(obj.get("start")),
        end: as_datetime(obj.get("end")),
    })
}

pub fn confidence_any(confidence: Option<u8>) -> Any {
    match confidence {
        Some(c) => Any::Number(c as f64),
        None => Any::Null,
    }
}

pub fn decode_confidence(value: Option<&Any>) -> Option<u8> {
    as_f64(value).and_then(|raw| sleuth_model::normalize_confidence(raw).ok())
}

fn envelope(tag: &str, value: Any) -> Any {
    object_any(vec![(TYPE_TAG, string_any(tag)), ("value", value)])
}

pub fn property_value_any(value: &PropertyValue) -> Any {
    match value {
        PropertyValue::Null => Any::Null,
        PropertyValue::Text(s) => string_any(s),
        PropertyValue::Number(n) => Any::Number(*n),
        PropertyValue::Boolean(b) => Any::Bool(*b),
        PropertyValue::Date(d) => envelope("date", datetime_any(d)),
        PropertyValue::Country(code) => envelope("country", string_any(code)),
        PropertyValue::Url(url) => envelope("url", string_any(url)),
    }
}

/// Decode a property value. Plain strings take their meaning from the
/// declared property type, so country and url values written without an
/// envelope still decode correctly.
pub fn decode_property_value(value: Option<&Any>, declared: PropertyType) -> PropertyValue {
    match value {
        Some(Any::String(s)) => match declared {
            PropertyType::Country => PropertyValue::Country(s.to_string()),
            PropertyType::Url => PropertyValue::Url(s.to_string()),
            PropertyType::Date => as_datetime(value)
                .map(PropertyValue::Date)
                .unwrap_or_else(|| PropertyValue::Text(s.to_string())),
            _ => PropertyValue::Text(s.to_string()),
        },
        Some(Any::Number(n)) => PropertyValue::Number(*n),
        Some(Any::BigInt(n)) => PropertyValue::Number(*n as f64),
        Some(Any::Bool(b)) => PropertyValue::Boolean(*b),
        Some(Any::Map(obj)) => {
            let inner = obj.get("value");
            match as_str(obj.get(TYPE_TAG)) {
                Some("date") => as_datetime(inner)
                    .map(PropertyValue::Date)
                    .unwrap_or(PropertyValue::Null),
                Some("country") => as_str(inner)
                    .map(|s| PropertyValue::Country(s.to_string()))
                    .unwrap_or(PropertyValue::Null),
                Some("url") => as_str(inner)
                    .map(|s| PropertyValue::Url(s.to_string()))
                    .unwrap_or(PropertyValue::Null),
                _ => PropertyValue::Null,
            }
        }
        _ => PropertyValue::Null,
    }
}

pub fn property_any(property: &Property) -> Any {
    object_any(vec![
        ("key", string_any(&property.key)),
        ("type", string_any(property.property_type.as_str())),
        ("value", property_value_any(&property.value)),
    ])
}

fn decode_property(value: &Any) -> Option<Property> {
    let obj = as_object(Some(value))?;
    let key = as_str(obj.get("key"))?.to_string();
    let value_any = obj.get("value");
    let declared = as_str(obj.get("type"))
        .and_then(PropertyType::parse)
        .or_else(|| decode_property_value(value_any, PropertyType::Text).implied_type())
        .unwrap_or_default();
    Some(Property {
        key,
        value: decode_property_value(value_any, declared),
        property_type: declared,
    })
}

pub fn properties_any(properties: &[Property]) -> Any {
    let items: Vec<Any> = properties.iter().map(property_any).collect();
    Any::Array(items.into())
}

/// Malformed entries are skipped. Keys stay unique (first one wins).
pub fn decode_properties(value: Option<&Any>) -> Vec<Property> {
    let mut out: Vec<Property> = Vec::new();
    for item in as_list(value) {
        if let Some(property) = decode_property(item) {
            if !out.iter().any(|p| p.key == property.key) {
                out.push(property);
            }
        }
    }
    out
}

pub fn event_any(event: &ElementEvent) -> Any {
    object_any(vec![
        ("id", string_any(&event.id)),
        ("date", datetime_any(&event.date)),
        ("endDate", opt_datetime_any(event.end_date.as_ref())),
        ("label", string_any(&event.label)),
        ("description", string_any(&event.description)),
        ("source", string_any(&event.source)),
        ("geo", geo_any(event.geo.as_ref())),
        ("properties", properties_any(&event.properties)),
    ])
}

fn decode_event(value: &Any) -> Option<ElementEvent> {
    let obj = as_object(Some(value))?;
    let id = as_str(obj.get("id"))?.to_string();
    let date = as_datetime(obj.get("date"))?;
    let text = |key: &str| as_str(obj.get(key)).unwrap_or_default().to_string();
    Some(ElementEvent {
        id,
        date,
        end_date: as_datetime(obj.get("endDate")),
        label: text("label"),
        description: text("description"),
        source: text("source"),
        geo: decode_geo(obj.get("geo")),
        properties: decode_properties(obj.get("properties")),
    })
}

pub fn events_any(events: &[ElementEvent]) -> Any {
    let items: Vec<Any> = events.iter().map(event_any).collect();
    Any::Array(items.into())
}

pub fn decode_events(value: Option<&Any>) -> Vec<ElementEvent> {
    as_list(value).iter().filter_map(decode_event).collect()
}
