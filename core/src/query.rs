use crate::requests::SearchFilter;

const PROJECTION: &str = "| project id, name, type, location, resourceGroup, tags";

/// KQL predicates for every populated filter, in a fixed order.
///
/// Values are interpolated as given. A quote inside a value ends the KQL
/// string literal early.
pub fn search_conditions(filter: &SearchFilter) -> Vec<String> {
    let mut conditions = Vec::new();
    if let Some(resource_type) = non_empty(&filter.resource_type) {
        conditions.push(format!("type =~ '{resource_type}'"));
    }
    if let Some(location) = non_empty(&filter.location) {
        conditions.push(format!("location =~ '{location}'"));
    }
    if let Some(resource_group) = non_empty(&filter.resource_group) {
        conditions.push(format!("resourceGroup =~ '{resource_group}'"));
    }
    if let Some(name) = non_empty(&filter.name_filter) {
        conditions.push(format!("name contains '{name}'"));
    }
    if let Some(tag) = non_empty(&filter.tag_filter) {
        conditions.push(match tag.split_once('=') {
            Some((key, value)) => format!("tags['{}'] =~ '{}'", key.trim(), value.trim()),
            None => format!("tags has '{tag}'"),
        });
    }
    conditions
}

/// Builds the KQL query the search tool sends upstream.
pub fn build_search_query(filter: &SearchFilter) -> String {
    let mut segments = vec!["Resources".to_string()];
    let conditions = search_conditions(filter);
    if !conditions.is_empty() {
        segments.push(format!("| where {}", conditions.join(" and ")));
    }
    if filter.include_properties {
        segments.push(format!("{PROJECTION}, properties"));
    } else {
        segments.push(PROJECTION.to_string());
    }
    segments.push(format!("| limit {}", filter.limit));
    segments.join(" ")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
