//! Transaction search by id, token, content type and time range.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::tags::{self, Tag};

/// Page size the transaction feed has always used.
pub const DEFAULT_LIMIT: usize = 42;

/// Search filters. Every provided filter must match; omitted ones match all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Restrict results to these transaction ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    pub token: Option<String>,
    pub content_type: Option<String>,
    /// Inclusive lower bound, unix milliseconds.
    pub from: Option<u64>,
    /// Inclusive upper bound, unix milliseconds.
    pub to: Option<u64>,
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Filter selecting a single transaction.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            ids: vec![id.into()],
            limit: Some(1),
            ..Self::default()
        }
    }

    pub fn matches(&self, tx: &QueryResult) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&tx.id) {
            return false;
        }
        if let Some(token) = &self.token {
            if !tx.token.eq_ignore_ascii_case(token) {
                return false;
            }
        }
        if let Some(content_type) = &self.content_type {
            let found = tx
                .tags
                .iter()
                .any(|t| t.name == tags::CONTENT_TYPE && &t.value == content_type);
            if !found {
                return false;
            }
        }
        if self.from.is_some_and(|from| tx.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| tx.timestamp > to) {
            return false;
        }
        true
    }

    /// GraphQL request body understood by bundler nodes.
    pub fn to_graphql(&self) -> serde_json::Value {
        let mut args = vec![format!("limit: {}", self.limit())];
        if !self.ids.is_empty() {
            args.push(format!("ids: {}", json!(self.ids)));
        }
        if let Some(token) = &self.token {
            args.push(format!("token: {}", json!(token)));
        }
        if let Some(content_type) = &self.content_type {
            args.push(format!(
                "tags: [{{ name: {}, values: [{}] }}]",
                json!(tags::CONTENT_TYPE),
                json!(content_type)
            ));
        }
        if self.from.is_some() || self.to.is_some() {
            let mut range = Vec::new();
            if let Some(from) = self.from {
                range.push(format!("from: {from}"));
            }
            if let Some(to) = self.to {
                range.push(format!("to: {to}"));
            }
            args.push(format!("timestamp: {{ {} }}", range.join(", ")));
        }
        let query = format!(
            "query {{ transactions({}) {{ edges {{ node {{ id timestamp token tags {{ name value }} }} }} }} }}",
            args.join(", ")
        );
        json!({ "query": query })
    }
}

/// One transaction returned by a search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub timestamp: u64,
    pub token: String,
    pub tags: Vec<Tag>,
}

/// Anything that can answer a transaction search.
#[async_trait]
pub trait TransactionQuery: Send + Sync {
    async fn search(&self, filter: &QueryFilter) -> Result<Vec<QueryResult>>;
}

/// Apply `filter` to an in-memory result set, newest first.
pub fn filter_results<I>(results: I, filter: &QueryFilter) -> Vec<QueryResult>
where
    I: IntoIterator<Item = QueryResult>,
{
    let mut matched: Vec<QueryResult> = results.into_iter().filter(|r| filter.matches(r)).collect();
    matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matched.truncate(filter.limit());
    matched
}
