use super::read::{read_datetime, read_f64, read_string, read_string_set, FieldMap};
use super::value::{datetime_any, string_any, string_list_any};
use super::NodePrelim;
use chrono::Utc;
use sleuth_model::{CanvasTab, Viewport};
use yrs::Any;

/// The viewport is per-client view state and is never written to the
/// shared document.
pub fn encode_tab(tab: &CanvasTab) -> NodePrelim {
    NodePrelim::new(vec![
        ("id", string_any(&tab.id)),
        ("investigationId", string_any(&tab.investigation_id)),
        ("name", string_any(&tab.name)),
        ("order", Any::Number(tab.order as f64)),
        ("memberElementIds", string_list_any(&tab.member_element_ids)),
        ("excludedElementIds", string_list_any(&tab.excluded_element_ids)),
        ("createdAt", datetime_any(&tab.created_at)),
        ("updatedAt", datetime_any(&tab.updated_at)),
    ])
}

pub fn decode_tab(id: &str, fields: &FieldMap) -> CanvasTab {
    let created_at = read_datetime(fields, "createdAt").unwrap_or_else(Utc::now);
    let member_element_ids = read_string_set(fields, "memberElementIds");
    // membership wins over a stale exclusion of the same id
    let excluded_element_ids = read_string_set(fields, "excludedElementIds")
        .into_iter()
        .filter(|id| !member_element_ids.contains(id))
        .collect();
    CanvasTab {
        id: id.to_string(),
        investigation_id: read_string(fields, "investigationId"),
        name: read_string(fields, "name"),
        order: read_f64(fields, "order").map(|o| o.round() as i64).unwrap_or_default(),
        member_element_ids,
        excluded_element_ids,
        viewport: Viewport::default(),
        created_at,
        updated_at: read_datetime(fields, "updatedAt").unwrap_or(created_at),
    }
}
