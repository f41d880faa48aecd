use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::ClientError;
use crate::domain::Authorization;

/// Where a table lives: the contract account, the scope inside it, and the table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    pub code: String,
    pub scope: String,
    pub table: String,
}

impl TableId {
    pub fn new(code: impl Into<String>, scope: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            scope: scope.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.code, self.scope, self.table)
    }
}

/// One page request against the read endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub table: TableId,
    pub lower_bound: Option<String>,
    pub limit: u32,
}

/// Rows in primary-key order plus how to continue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePage {
    pub rows: Vec<Value>,
    #[serde(default)]
    pub more: bool,
    #[serde(default)]
    pub next_key: Option<String>,
}

/// A contract action ready to be signed and pushed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPayload {
    pub account: String,
    pub name: String,
    pub authorization: Vec<Authorization>,
    pub data: Value,
}

/// What the write endpoint hands back when it accepted a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// The remote ledger as the client sees it: a table reader and an action sink.
///
/// Reads fail with `LedgerUnavailable` or `LedgerQueryError`. Pushes fail with
/// `TransactionRejected` when the ledger declined, and `TransportFailure` when the
/// outcome cannot be known.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    async fn get_table_rows(&self, query: &TableQuery) -> Result<TablePage, ClientError>;

    async fn push_action(&self, action: &ActionPayload) -> Result<PushReceipt, ClientError>;
}
