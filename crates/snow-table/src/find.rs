//! Multi-condition record lookup
//!
//! Builds ServiceNow encoded queries (`sysparm_query`) from typed
//! conditions instead of a single field/value equality: eight comparison
//! operators, AND/OR chaining, result limit, ordering and field selection.
//! Encoding follows the ServiceNow operator tokens (`LIKE`, `STARTSWITH`,
//! `ORDERBYDESC`, ...) with `^`/`^OR` as connectives.

use serde_json::Value;
use tracing::debug;

use crate::client::TableClient;
use crate::error::Result;

/// Comparison operator for one query condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
}

impl Operator {
    fn encode(self, field: &str, value: &str) -> String {
        let token = match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::Contains => "LIKE",
            Self::NotContains => "NOT LIKE",
            Self::StartsWith => "STARTSWITH",
            Self::EndsWith => "ENDSWITH",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
        };
        format!("{field}{token}{value}")
    }
}

/// Chainable condition set for one lookup.
///
/// Conditions added with [`and`](Self::and) are joined with `^`, those
/// added with [`or`](Self::or) with `^OR`; the first condition carries no
/// connective either way.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    encoded: String,
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, field: &str, operator: Operator, value: &str) -> Self {
        self.push("^", field, operator, value);
        self
    }

    pub fn or(mut self, field: &str, operator: Operator, value: &str) -> Self {
        self.push("^OR", field, operator, value);
        self
    }

    fn push(&mut self, connective: &str, field: &str, operator: Operator, value: &str) {
        if !self.encoded.is_empty() {
            self.encoded.push_str(connective);
        }
        self.encoded.push_str(&operator.encode(field, value));
    }

    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    pub fn encode(&self) -> &str {
        &self.encoded
    }
}

/// One multi-record lookup request.
#[derive(Debug, Clone)]
pub struct FindRequest {
    pub query: FindQuery,
    /// Cap on returned records.
    pub max_records: u32,
    /// Sort field; a `-` prefix sorts descending.
    pub order_by: String,
    /// Restrict returned records to these fields; empty means all.
    pub return_fields: Vec<String>,
}

impl FindRequest {
    pub fn new(query: FindQuery) -> Self {
        Self {
            query,
            max_records: 20,
            order_by: "-created_on".into(),
            return_fields: Vec::new(),
        }
    }

    /// The full `sysparm_query` value: conditions plus the order clause.
    pub fn sysparm_query(&self) -> String {
        let order = match self.order_by.strip_prefix('-') {
            Some(field) => format!("ORDERBYDESC{field}"),
            None => format!("ORDERBY{}", self.order_by),
        };
        if self.query.is_empty() {
            order
        } else {
            format!("{}^{order}", self.query.encode())
        }
    }
}

impl TableClient<'_> {
    /// Fetch all records matching a [`FindRequest`].
    ///
    /// No match is an empty list, not an error.
    pub async fn find(&self, request: &FindRequest) -> Result<Vec<Value>> {
        debug!(table = %self.table(), query = %request.sysparm_query(), "finding records");
        let mut params = vec![
            ("sysparm_query", request.sysparm_query()),
            ("sysparm_limit", request.max_records.to_string()),
        ];
        if !request.return_fields.is_empty() {
            params.push(("sysparm_fields", request.return_fields.join(",")));
        }
        self.query_with_params(&params).await
    }
}
