use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

pub const QUERY_MAX_CHARS: usize = 10_000;
pub const SCOPE_MAX_ITEMS: usize = 1000;
pub const FACETS_MAX_ITEMS: usize = 10;
pub const TOP_MIN: u32 = 1;
pub const TOP_MAX: u32 = 1000;
pub const SEARCH_LIMIT_DEFAULT: u32 = 50;

/// How a tool renders its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Markdown,
    Json,
}

/// Row layout requested from the upstream API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultFormat {
    #[serde(rename = "table")]
    Table,
    #[default]
    #[serde(rename = "objectArray")]
    ObjectArray,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationScopeFilter {
    #[default]
    AtScopeAndBelow,
    AtScopeAndAbove,
    AtScopeExact,
    AtScopeAboveAndBelow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Pagination, scope and format options for query and history calls.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryOptions {
    #[serde(default, alias = "$top")]
    pub top: Option<u32>,
    #[serde(default, alias = "$skip")]
    pub skip: Option<u64>,
    #[serde(default, alias = "$skipToken", alias = "skipToken")]
    pub skip_token: Option<String>,
    #[serde(default, alias = "allowPartialScopes")]
    pub allow_partial_scopes: bool,
    #[serde(default, alias = "authorizationScopeFilter")]
    pub authorization_scope_filter: AuthorizationScopeFilter,
    #[serde(default, alias = "resultFormat")]
    pub result_format: ResultFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FacetOptions {
    #[serde(default, alias = "$top")]
    pub top: Option<u32>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default, alias = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(default, alias = "sortOrder")]
    pub sort_order: SortOrder,
}

/// An aggregate the upstream API should compute over the query result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FacetRequest {
    pub expression: String,
    #[serde(default)]
    pub options: Option<FacetOptions>,
}

/// Arguments of the raw query tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub subscriptions: Option<Vec<String>>,
    #[serde(default, alias = "managementGroups")]
    pub management_groups: Option<Vec<String>>,
    #[serde(default)]
    pub facets: Option<Vec<FacetRequest>>,
    #[serde(default)]
    pub options: Option<QueryOptions>,
    #[serde(default, alias = "responseFormat")]
    pub response_format: ResponseFormat,
}

/// Arguments of the resource history tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryRequest {
    pub query: String,
    #[serde(default)]
    pub subscriptions: Option<Vec<String>>,
    #[serde(default, alias = "managementGroups")]
    pub management_groups: Option<Vec<String>>,
    #[serde(default)]
    pub options: Option<QueryOptions>,
    /// ISO 8601 duration, forwarded untouched.
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default, alias = "responseFormat")]
    pub response_format: ResponseFormat,
}

/// Simplified filter the search tool turns into a KQL query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchFilter {
    #[serde(default, alias = "resourceType")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "resourceGroup")]
    pub resource_group: Option<String>,
    #[serde(default, alias = "nameFilter")]
    pub name_filter: Option<String>,
    /// `key=value` for an equality match on one tag, or a bare key.
    #[serde(default, alias = "tagFilter")]
    pub tag_filter: Option<String>,
    #[serde(default)]
    pub subscriptions: Option<Vec<String>>,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
    #[serde(default, alias = "includeProperties")]
    pub include_properties: bool,
    #[serde(default, alias = "responseFormat")]
    pub response_format: ResponseFormat,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            resource_type: None,
            location: None,
            resource_group: None,
            name_filter: None,
            tag_filter: None,
            subscriptions: None,
            limit: SEARCH_LIMIT_DEFAULT,
            include_properties: false,
            response_format: ResponseFormat::Markdown,
        }
    }
}

fn default_search_limit() -> u32 {
    SEARCH_LIMIT_DEFAULT
}

/// Arguments of the operations listing tool.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationsRequest {
    #[serde(default, alias = "responseFormat")]
    pub response_format: ResponseFormat,
}

/// Typed tool arguments: deserialized from the JSON-RPC `arguments` object,
/// then checked and normalized before the tool runs.
pub trait ToolArguments: DeserializeOwned + Sized {
    fn normalized(self) -> Result<Self, ValidationError>;
}

pub fn parse_arguments<T: ToolArguments>(arguments: Value) -> Result<T, ValidationError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    let parsed: T = serde_json::from_value(arguments)
        .map_err(|e| ValidationError::new(format!("Invalid arguments: {e}")))?;
    parsed.normalized()
}

impl ToolArguments for QueryRequest {
    fn normalized(mut self) -> Result<Self, ValidationError> {
        self.query = normalize_query(&self.query)?;
        self.subscriptions = normalize_scope_list("subscriptions", self.subscriptions)?;
        self.management_groups =
            normalize_scope_list("management_groups", self.management_groups)?;
        if let Some(facets) = &self.facets {
            if facets.len() > FACETS_MAX_ITEMS {
                return Err(ValidationError::new(format!(
                    "'facets' accepts at most {FACETS_MAX_ITEMS} entries"
                ))
                .with_field("facets"));
            }
            for facet in facets {
                validate_facet(facet)?;
            }
        }
        if self.facets.as_ref().is_some_and(Vec::is_empty) {
            self.facets = None;
        }
        if let Some(options) = &self.options {
            validate_options(options)?;
        }
        Ok(self)
    }
}

impl ToolArguments for HistoryRequest {
    fn normalized(mut self) -> Result<Self, ValidationError> {
        self.query = normalize_query(&self.query)?;
        self.subscriptions = normalize_scope_list("subscriptions", self.subscriptions)?;
        self.management_groups =
            normalize_scope_list("management_groups", self.management_groups)?;
        if let Some(options) = &self.options {
            validate_options(options)?;
        }
        self.interval = self
            .interval
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        Ok(self)
    }
}

impl ToolArguments for SearchFilter {
    fn normalized(mut self) -> Result<Self, ValidationError> {
        if !(TOP_MIN..=TOP_MAX).contains(&self.limit) {
            return Err(ValidationError::new(format!(
                "'limit' must be between {TOP_MIN} and {TOP_MAX}"
            ))
            .with_field("limit"));
        }
        // Values are not trimmed: a bare tag key is matched exactly as given.
        for value in [
            &mut self.resource_type,
            &mut self.location,
            &mut self.resource_group,
            &mut self.name_filter,
            &mut self.tag_filter,
        ] {
            if value.as_deref().is_some_and(str::is_empty) {
                *value = None;
            }
        }
        self.subscriptions = normalize_scope_list("subscriptions", self.subscriptions)?;
        Ok(self)
    }
}

impl ToolArguments for OperationsRequest {
    fn normalized(self) -> Result<Self, ValidationError> {
        Ok(self)
    }
}

fn normalize_query(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("Query cannot be empty").with_field("query"));
    }
    if trimmed.chars().count() > QUERY_MAX_CHARS {
        return Err(ValidationError::new(format!(
            "'query' must be at most {QUERY_MAX_CHARS} characters"
        ))
        .with_field("query"));
    }
    Ok(trimmed.to_string())
}

/// Trims entries, drops blanks, and collapses an empty list to `None` so the
/// upstream default scope applies.
fn normalize_scope_list(
    field: &str,
    items: Option<Vec<String>>,
) -> Result<Option<Vec<String>>, ValidationError> {
    let Some(items) = items else {
        return Ok(None);
    };
    if items.len() > SCOPE_MAX_ITEMS {
        return Err(ValidationError::new(format!(
            "'{field}' accepts at most {SCOPE_MAX_ITEMS} entries"
        ))
        .with_field(field));
    }
    let cleaned: Vec<String> = items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    Ok(if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    })
}

fn validate_top(field: &str, top: Option<u32>) -> Result<(), ValidationError> {
    match top {
        Some(value) if !(TOP_MIN..=TOP_MAX).contains(&value) => Err(ValidationError::new(
            format!("'{field}' must be between {TOP_MIN} and {TOP_MAX}"),
        )
        .with_field(field)),
        _ => Ok(()),
    }
}

fn validate_options(options: &QueryOptions) -> Result<(), ValidationError> {
    validate_top("options.top", options.top)
}

fn validate_facet(facet: &FacetRequest) -> Result<(), ValidationError> {
    if facet.expression.trim().is_empty() {
        return Err(
            ValidationError::new("Facet expression cannot be empty").with_field("facets.expression")
        );
    }
    if let Some(options) = &facet.options {
        validate_top("facets.options.top", options.top)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_request_accepts_upstream_spellings_as_aliases() {
        let request: QueryRequest = parse_arguments(json!({
            "query": "  Resources | limit 5  ",
            "managementGroups": ["ProductionMG"],
            "options": { "$top": 10, "skipToken": "abc", "resultFormat": "table" },
            "facets": [{ "expression": "location", "options": { "sortOrder": "asc" } }]
        }))
        .unwrap();

        assert_eq!(request.query, "Resources | limit 5");
        assert_eq!(
            request.management_groups,
            Some(vec!["ProductionMG".to_string()])
        );
        let options = request.options.unwrap();
        assert_eq!(options.top, Some(10));
        assert_eq!(options.skip_token.as_deref(), Some("abc"));
        assert_eq!(options.result_format, ResultFormat::Table);
        assert_eq!(
            options.authorization_scope_filter,
            AuthorizationScopeFilter::AtScopeAndBelow
        );
        let facets = request.facets.unwrap();
        assert_eq!(facets[0].options.as_ref().unwrap().sort_order, SortOrder::Asc);
        assert_eq!(request.response_format, ResponseFormat::Markdown);
    }

    #[test]
    fn blank_query_is_rejected_on_the_query_field() {
        let err = parse_arguments::<QueryRequest>(json!({ "query": "   " })).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("query"));
    }

    #[test]
    fn oversized_query_is_rejected() {
        let query = "a".repeat(QUERY_MAX_CHARS + 1);
        let err = parse_arguments::<HistoryRequest>(json!({ "query": query })).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("query"));
    }

    #[test]
    fn scope_lists_are_trimmed_and_blank_entries_dropped() {
        let request: QueryRequest = parse_arguments(json!({
            "query": "Resources",
            "subscriptions": [" sub-1 ", "", "   "],
            "management_groups": ["  "]
        }))
        .unwrap();
        assert_eq!(request.subscriptions, Some(vec!["sub-1".to_string()]));
        assert_eq!(request.management_groups, None);
    }

    #[test]
    fn more_than_ten_facets_is_rejected() {
        let facets: Vec<Value> = (0..11)
            .map(|i| json!({ "expression": format!("col{i}") }))
            .collect();
        let err =
            parse_arguments::<QueryRequest>(json!({ "query": "Resources", "facets": facets }))
                .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("facets"));
    }

    #[test]
    fn top_outside_range_is_rejected() {
        let err = parse_arguments::<QueryRequest>(json!({
            "query": "Resources",
            "options": { "top": 0 }
        }))
        .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("options.top"));
    }

    #[test]
    fn unknown_option_fields_are_rejected() {
        let err = parse_arguments::<QueryRequest>(json!({
            "query": "Resources",
            "options": { "pageSize": 5 }
        }))
        .unwrap_err();
        assert!(err.message.contains("pageSize"));
    }

    #[test]
    fn search_filter_defaults_and_empty_strings() {
        let filter: SearchFilter = parse_arguments(json!({
            "location": "",
            "tag_filter": "critical "
        }))
        .unwrap();
        assert_eq!(filter.limit, SEARCH_LIMIT_DEFAULT);
        assert_eq!(filter.location, None);
        assert_eq!(filter.tag_filter.as_deref(), Some("critical "));
        assert!(!filter.include_properties);
    }

    #[test]
    fn search_limit_outside_range_is_rejected() {
        let err = parse_arguments::<SearchFilter>(json!({ "limit": 1001 })).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("limit"));
    }

    #[test]
    fn history_interval_is_trimmed_and_blank_dropped() {
        let request: HistoryRequest = parse_arguments(json!({
            "query": "Resources",
            "interval": "  "
        }))
        .unwrap();
        assert_eq!(request.interval, None);
    }

    #[test]
    fn operations_request_accepts_null_arguments() {
        let request: OperationsRequest = parse_arguments(Value::Null).unwrap();
        assert_eq!(request.response_format, ResponseFormat::Markdown);
    }
}
