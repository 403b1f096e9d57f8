//! Markdown and JSON rendering of Resource Graph responses.

use serde_json::{Map, Value, json};

use crate::requests::{ResponseFormat, SearchFilter};
use crate::result::{ApiResult, FacetOutcome, display_value, record_field};

/// Upper bound, in characters, of any markdown document handed to a client.
pub const CHARACTER_LIMIT: usize = 25_000;
/// Characters kept free at the end of a capped document for the notice.
pub const TRUNCATION_RESERVE: usize = 200;
pub const MAX_DISPLAYED_RECORDS: usize = 20;
pub const MAX_DISPLAYED_FACET_ROWS: usize = 10;
pub const SKIP_TOKEN_PREVIEW_CHARS: usize = 50;

/// Exactly `TRUNCATION_RESERVE` characters long.
pub const TRUNCATION_NOTICE: &str = "\n\n⚠️ **Response truncated at 25000 characters.** Use response_format=\"json\" for complete data, or narrow the query with filters (type, location, resource group, tags) or a lower limit to trim results.";

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Renders a query or history response. JSON output is never truncated.
pub fn format_response(body: &Value, format: ResponseFormat, title: &str) -> String {
    match format {
        ResponseFormat::Json => to_pretty_json(body),
        ResponseFormat::Markdown => enforce_character_limit(render_markdown(body, title)),
    }
}

/// Cuts `text` to `CHARACTER_LIMIT` characters, ending with the notice.
/// Counts characters, never bytes, so multi-byte text is never split.
pub fn enforce_character_limit(text: String) -> String {
    if text.chars().count() <= CHARACTER_LIMIT {
        return text;
    }
    let keep = CHARACTER_LIMIT - TRUNCATION_RESERVE;
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    let mut capped = String::with_capacity(cut + TRUNCATION_NOTICE.len());
    capped.push_str(&text[..cut]);
    capped.push_str(TRUNCATION_NOTICE);
    capped
}

fn render_markdown(body: &Value, title: &str) -> String {
    let result = ApiResult::new(body);
    let mut lines = vec![format!("# {title}\n")];

    if let Some(total) = result.total_records() {
        lines.push(format!("**Total Records:** {}", display_value(total)));
    }
    if let Some(count) = result.count() {
        lines.push(format!("**Returned:** {}", display_value(count)));
    }
    if result.result_truncated() {
        lines.push(
            "⚠️ **Results truncated** - use pagination or filters for complete data".into(),
        );
    }
    if let Some(token) = result.skip_token() {
        let preview: String = token.chars().take(SKIP_TOKEN_PREVIEW_CHARS).collect();
        lines.push(format!("📄 **Next Page Available** - use skipToken: `{preview}...`"));
    }
    lines.push(String::new());

    let records = result.records();
    if !records.is_empty() {
        lines.push("## Resources\n".into());
        for (index, record) in records.iter().take(MAX_DISPLAYED_RECORDS).enumerate() {
            // Non-object rows keep their slot in the numbering.
            if let Value::Object(record) = record {
                push_record(&mut lines, index + 1, record);
            }
        }
        if records.len() > MAX_DISPLAYED_RECORDS {
            lines.push(format!(
                "... and {} more items (use JSON format for complete data)\n",
                records.len() - MAX_DISPLAYED_RECORDS
            ));
        }
    }

    let facets = result.facets();
    if !facets.is_empty() {
        lines.push("## Facets\n".into());
        for facet in facets {
            push_facet(&mut lines, facet);
        }
    }

    lines.join("\n")
}

fn push_record(lines: &mut Vec<String>, position: usize, record: &Map<String, Value>) {
    let name = record_field(record, "name").unwrap_or_else(|| "Unknown".to_string());
    lines.push(format!("### {position}. {name}"));
    if let Some(kind) = record_field(record, "type") {
        lines.push(format!("**Type:** {kind}"));
    }
    if let Some(location) = record_field(record, "location") {
        lines.push(format!("**Location:** {location}"));
    }
    if let Some(group) = record_field(record, "resourceGroup") {
        lines.push(format!("**Resource Group:** {group}"));
    }
    if let Some(id) = record_field(record, "id") {
        lines.push(format!("**ID:** `{id}`"));
    }
    if let Some(Value::Object(tags)) = record.get("tags") {
        if !tags.is_empty() {
            let pairs: Vec<String> = tags
                .iter()
                .map(|(key, value)| format!("{key}={}", display_value(value)))
                .collect();
            lines.push(format!("**Tags:** {}", pairs.join(", ")));
        }
    }
    lines.push(String::new());
}

fn push_facet(lines: &mut Vec<String>, facet: FacetOutcome<'_>) {
    match facet {
        FacetOutcome::Rows { expression, rows } => {
            lines.push(format!("### {expression}"));
            for row in rows.iter().take(MAX_DISPLAYED_FACET_ROWS) {
                let Value::Object(row) = row else { continue };
                let count = record_field(row, "count")
                    .or_else(|| record_field(row, "count_"))
                    .unwrap_or_else(|| "N/A".to_string());
                let key = row
                    .iter()
                    .find(|(name, _)| name.as_str() != "count" && name.as_str() != "count_")
                    .map(|(_, value)| display_value(value))
                    .unwrap_or_else(|| "Unknown".to_string());
                lines.push(format!("- **{key}:** {count}"));
            }
            lines.push(String::new());
        }
        FacetOutcome::Error {
            expression,
            messages,
        } => {
            lines.push(format!("### ❌ {expression} (Error)"));
            for message in messages {
                lines.push(format!("- {message}"));
            }
            lines.push(String::new());
        }
        FacetOutcome::Other => {}
    }
}

/// Renders the `operations` listing (`value[]` of name + display block).
pub fn format_operations(body: &Value, format: ResponseFormat) -> String {
    if format == ResponseFormat::Json {
        return to_pretty_json(body);
    }
    let mut lines = vec!["# Azure Resource Graph Operations\n".to_string()];
    if let Some(operations) = body.get("value").and_then(Value::as_array) {
        for operation in operations {
            let name = operation
                .get("name")
                .filter(|v| !v.is_null())
                .map(display_value)
                .unwrap_or_else(|| "Unknown".to_string());
            lines.push(format!("## {name}"));
            let display = operation.get("display");
            for (label, field) in [
                ("Provider", "provider"),
                ("Resource", "resource"),
                ("Operation", "operation"),
                ("Description", "description"),
            ] {
                let value = display
                    .and_then(|d| d.get(field))
                    .filter(|v| !v.is_null())
                    .map(display_value)
                    .unwrap_or_default();
                if !value.is_empty() {
                    lines.push(format!("**{label}:** {value}"));
                }
            }
            lines.push(String::new());
        }
    }
    enforce_character_limit(lines.join("\n"))
}

/// Renders a search response together with the criteria that produced it.
pub fn format_search_response(
    body: Value,
    filter: &SearchFilter,
    generated_query: &str,
) -> String {
    match filter.response_format {
        ResponseFormat::Markdown => {
            let mut lines = vec![
                "# Azure Resource Search Results\n".to_string(),
                "## Search Criteria".to_string(),
            ];
            for (label, value) in [
                ("Resource Type", &filter.resource_type),
                ("Location", &filter.location),
                ("Resource Group", &filter.resource_group),
                ("Name Contains", &filter.name_filter),
                ("Tag Filter", &filter.tag_filter),
            ] {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    lines.push(format!("**{label}:** {value}"));
                }
            }
            if let Some(subscriptions) = filter.subscriptions.as_ref().filter(|s| !s.is_empty()) {
                let shown: Vec<&str> = subscriptions.iter().take(3).map(String::as_str).collect();
                let more = if subscriptions.len() > 3 { "..." } else { "" };
                lines.push(format!("**Subscriptions:** {}{more}", shown.join(", ")));
            }
            lines.push(format!("**Generated Query:** `{generated_query}`\n"));

            let results = format_response(&body, ResponseFormat::Markdown, "Search Results");
            enforce_character_limit(format!("{}\n{results}", lines.join("\n")))
        }
        ResponseFormat::Json => {
            let criteria = json!({
                "resource_type": filter.resource_type,
                "location": filter.location,
                "resource_group": filter.resource_group,
                "name_filter": filter.name_filter,
                "tag_filter": filter.tag_filter,
                "subscriptions": filter.subscriptions,
                "generated_query": generated_query,
            });
            let body = match body {
                Value::Object(mut object) => {
                    object.insert("search_criteria".to_string(), criteria);
                    Value::Object(object)
                }
                other => json!({ "result": other, "search_criteria": criteria }),
            };
            to_pretty_json(&body)
        }
    }
}
