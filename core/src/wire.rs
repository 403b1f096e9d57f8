//! Upstream request bodies.
//!
//! Tool arguments are snake_case; the Resource Graph REST API mixes
//! camelCase with `$`-prefixed OData names. Every rename happens here and
//! nowhere else.

use serde::Serialize;

use crate::requests::{
    AuthorizationScopeFilter, FacetOptions, FacetRequest, HistoryRequest, QueryOptions,
    QueryRequest, ResultFormat, SearchFilter, SortOrder,
};

/// Body of `POST /providers/Microsoft.ResourceGraph/resources` and
/// `.../resourcesHistory`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryBody {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriptions: Option<Vec<String>>,
    #[serde(rename = "managementGroups", skip_serializing_if = "Option::is_none")]
    pub management_groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<WireFacet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<WireOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireOptions {
    #[serde(rename = "$top", skip_serializing_if = "Option::is_none")]
    pub top: Option<u32>,
    #[serde(rename = "$skip", skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(rename = "$skipToken", skip_serializing_if = "Option::is_none")]
    pub skip_token: Option<String>,
    #[serde(rename = "allowPartialScopes")]
    pub allow_partial_scopes: bool,
    #[serde(rename = "authorizationScopeFilter")]
    pub authorization_scope_filter: AuthorizationScopeFilter,
    #[serde(rename = "resultFormat")]
    pub result_format: ResultFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireFacet {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<WireFacetOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireFacetOptions {
    #[serde(rename = "$top", skip_serializing_if = "Option::is_none")]
    pub top: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(rename = "sortBy", skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: SortOrder,
}

impl From<QueryOptions> for WireOptions {
    fn from(options: QueryOptions) -> Self {
        Self {
            top: options.top,
            skip: options.skip,
            skip_token: options.skip_token,
            allow_partial_scopes: options.allow_partial_scopes,
            authorization_scope_filter: options.authorization_scope_filter,
            result_format: options.result_format,
        }
    }
}

impl From<FacetOptions> for WireFacetOptions {
    fn from(options: FacetOptions) -> Self {
        Self {
            top: options.top,
            filter: options.filter,
            sort_by: options.sort_by,
            sort_order: options.sort_order,
        }
    }
}

impl From<FacetRequest> for WireFacet {
    fn from(facet: FacetRequest) -> Self {
        Self {
            expression: facet.expression,
            options: facet.options.map(Into::into),
        }
    }
}

impl From<QueryRequest> for QueryBody {
    fn from(request: QueryRequest) -> Self {
        Self {
            query: request.query,
            subscriptions: request.subscriptions,
            management_groups: request.management_groups,
            facets: request
                .facets
                .map(|facets| facets.into_iter().map(Into::into).collect()),
            options: request.options.map(Into::into),
            interval: None,
        }
    }
}

impl From<HistoryRequest> for QueryBody {
    fn from(request: HistoryRequest) -> Self {
        Self {
            query: request.query,
            subscriptions: request.subscriptions,
            management_groups: request.management_groups,
            facets: None,
            options: request.options.map(Into::into),
            interval: request.interval,
        }
    }
}

impl QueryBody {
    /// Search sends only the generated query and the subscription scope.
    pub fn for_search(filter: &SearchFilter, generated_query: String) -> Self {
        Self {
            query: generated_query,
            subscriptions: filter.subscriptions.clone(),
            management_groups: None,
            facets: None,
            options: None,
            interval: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::parse_arguments;
    use serde_json::json;

    #[test]
    fn query_body_uses_upstream_field_names() {
        let request: QueryRequest = parse_arguments(json!({
            "query": "Resources | summarize count() by location",
            "management_groups": ["mg-prod"],
            "facets": [{ "expression": "location", "options": { "top": 3, "sort_by": "count" } }],
            "options": { "top": 100, "skip": 10, "skip_token": "tok", "allow_partial_scopes": true }
        }))
        .unwrap();

        let body = serde_json::to_value(QueryBody::from(request)).unwrap();
        assert_eq!(
            body,
            json!({
                "query": "Resources | summarize count() by location",
                "managementGroups": ["mg-prod"],
                "facets": [{
                    "expression": "location",
                    "options": { "$top": 3, "sortBy": "count", "sortOrder": "desc" }
                }],
                "options": {
                    "$top": 100,
                    "$skip": 10,
                    "$skipToken": "tok",
                    "allowPartialScopes": true,
                    "authorizationScopeFilter": "AtScopeAndBelow",
                    "resultFormat": "objectArray"
                }
            })
        );
    }

    #[test]
    fn history_body_forwards_interval_and_omits_absent_scopes() {
        let request: HistoryRequest = parse_arguments(json!({
            "query": "Resources",
            "interval": "P7D"
        }))
        .unwrap();
        let body = serde_json::to_value(QueryBody::from(request)).unwrap();
        assert_eq!(body, json!({ "query": "Resources", "interval": "P7D" }));
    }

    #[test]
    fn search_body_carries_only_query_and_subscriptions() {
        let filter = SearchFilter {
            subscriptions: Some(vec!["sub-a".to_string()]),
            location: Some("eastus".to_string()),
            ..SearchFilter::default()
        };
        let body =
            serde_json::to_value(QueryBody::for_search(&filter, "Resources".into())).unwrap();
        assert_eq!(body, json!({ "query": "Resources", "subscriptions": ["sub-a"] }));
    }
}
