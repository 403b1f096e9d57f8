use std::borrow::Cow;

use serde_json::{Map, Value};

/// Typed read-only view over a Resource Graph response body.
///
/// The body itself stays a `serde_json::Value` so JSON output reproduces
/// the upstream payload field for field.
#[derive(Debug, Clone, Copy)]
pub struct ApiResult<'a> {
    body: &'a Value,
}

/// One entry of the `facets` array.
#[derive(Debug, Clone, PartialEq)]
pub enum FacetOutcome<'a> {
    Rows {
        expression: String,
        rows: &'a [Value],
    },
    Error {
        expression: String,
        messages: Vec<String>,
    },
    /// `resultType` missing or unrecognised; not rendered.
    Other,
}

impl<'a> ApiResult<'a> {
    pub fn new(body: &'a Value) -> Self {
        Self { body }
    }

    fn field(&self, name: &str) -> Option<&'a Value> {
        self.body.get(name).filter(|value| !value.is_null())
    }

    pub fn total_records(&self) -> Option<&'a Value> {
        self.field("totalRecords")
    }

    pub fn count(&self) -> Option<&'a Value> {
        self.field("count")
    }

    /// `true` for a JSON `true` or the string `"true"` in any case.
    pub fn result_truncated(&self) -> bool {
        match self.field("resultTruncated") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(raw)) => raw.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Continuation cursor; `$skipToken` wins over `skipToken`.
    pub fn skip_token(&self) -> Option<&'a str> {
        self.field("$skipToken")
            .or_else(|| self.field("skipToken"))
            .and_then(Value::as_str)
    }

    /// Records for the `objectArray` layout. A `table` layout yields nothing.
    /// Object rows. A `table` result has its rows keyed by column name.
    pub fn records(&self) -> Cow<'a, [Value]> {
        match self.field("data") {
            Some(Value::Array(items)) => Cow::Borrowed(items.as_slice()),
            Some(Value::Object(table)) => Cow::Owned(table_records(table)),
            _ => Cow::Borrowed(&[]),
        }
    }

    pub fn facets(&self) -> Vec<FacetOutcome<'a>> {
        let Some(Value::Array(facets)) = self.field("facets") else {
            return Vec::new();
        };
        facets.iter().map(facet_outcome).collect()
    }
}

fn facet_outcome(facet: &Value) -> FacetOutcome<'_> {
    let expression = facet
        .get("expression")
        .map(display_value)
        .unwrap_or_default();
    match facet.get("resultType").and_then(Value::as_str) {
        Some("FacetResult") => FacetOutcome::Rows {
            expression,
            rows: facet
                .get("data")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        },
        Some("FacetError") => FacetOutcome::Error {
            expression,
            messages: facet
                .get("errors")
                .and_then(Value::as_array)
                .map(|errors| {
                    errors
                        .iter()
                        .map(|error| {
                            error
                                .get("message")
                                .filter(|m| !m.is_null())
                                .map(display_value)
                                .unwrap_or_else(|| "Unknown error".to_string())
                        })
                        .collect()
                })
                .unwrap_or_default(),
        },
        _ => FacetOutcome::Other,
    }
}

/// Renders a JSON scalar without quotes; containers fall back to compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Non-null string-ish field of a record, rendered for display.
pub(crate) fn record_field(record: &Map<String, Value>, name: &str) -> Option<String> {
    record
        .get(name)
        .filter(|value| !value.is_null())
        .map(display_value)
}

fn table_records(table: &Map<String, Value>) -> Vec<Value> {
    let columns: Vec<&str> = table
        .get("columns")
        .and_then(Value::as_array)
        .map(|columns| {
            columns
                .iter()
                .map(|column| column.get("name").and_then(Value::as_str).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();
    let Some(rows) = table.get("rows").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| match row {
            Value::Array(cells) => Value::Object(
                columns
                    .iter()
                    .zip(cells)
                    .map(|(name, cell)| (name.to_string(), cell.clone()))
                    .collect(),
            ),
            other => other.clone(),
        })
        .collect()
}
