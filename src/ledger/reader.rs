use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::application::ClientError;
use crate::domain::{
    AllowanceApplication, Department, DepartmentId, Expenditure, Expense, LedgerConfig,
};

use super::{LedgerBackend, TableId, TableQuery};

pub const CONFIGS_TABLE: &str = "configs";
pub const DEPARTMENTS_TABLE: &str = "departments";
pub const EXPENDITURES_TABLE: &str = "expenditures";
pub const EXPENSES_TABLE: &str = "expenses";
pub const APPLICATIONS_TABLE: &str = "applications";

/// Typed access to the budget contract's tables. Decodes structure, nothing more.
#[derive(Clone)]
pub struct LedgerReader {
    backend: Arc<dyn LedgerBackend>,
    contract: String,
    page_size: u32,
}

impl LedgerReader {
    pub fn new(backend: Arc<dyn LedgerBackend>, contract: impl Into<String>, page_size: u32) -> Self {
        Self {
            backend,
            contract: contract.into(),
            page_size: page_size.max(1),
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Read every row of a table, following pages until the node reports no more.
    pub async fn read_table<T: DeserializeOwned>(&self, table: TableId) -> Result<Vec<T>, ClientError> {
        let mut rows = Vec::new();
        let mut lower_bound = None;

        loop {
            let query = TableQuery {
                table: table.clone(),
                lower_bound: lower_bound.take(),
                limit: self.page_size,
            };
            let page = self.backend.get_table_rows(&query).await?;
            let continuation = match (page.more, page.next_key) {
                (false, _) => None,
                (true, Some(key)) => Some(key),
                (true, None) => Some(next_id_after(page.rows.last()).ok_or_else(|| {
                    ClientError::LedgerQueryError(format!(
                        "{}: more rows reported without a continuation key",
                        table
                    ))
                })?),
            };

            for row in page.rows {
                rows.push(decode_row(&table, row)?);
            }

            match continuation {
                Some(key) if query.lower_bound.as_ref() == Some(&key) => {
                    return Err(ClientError::LedgerQueryError(format!(
                        "{}: pagination did not advance past {}",
                        table, key
                    )));
                }
                Some(key) => {
                    debug!(table = %table, next = %key, fetched = rows.len(), "continuing to next page");
                    lower_bound = Some(key);
                }
                None => break,
            }
        }

        Ok(rows)
    }

    fn global_table(&self, table: &str) -> TableId {
        TableId::new(&self.contract, &self.contract, table)
    }

    /// The contract's configuration, or `None` before `init` ran.
    pub async fn config(&self) -> Result<Option<LedgerConfig>, ClientError> {
        let rows = self.read_table(self.global_table(CONFIGS_TABLE)).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn departments(&self) -> Result<Vec<Department>, ClientError> {
        self.read_table(self.global_table(DEPARTMENTS_TABLE)).await
    }

    pub async fn department(&self, id: DepartmentId) -> Result<Department, ClientError> {
        self.departments()
            .await?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or(ClientError::DepartmentNotFound(id))
    }

    /// Every expenditure of a department, removed ones included.
    pub async fn expenditures(&self, department_id: DepartmentId) -> Result<Vec<Expenditure>, ClientError> {
        let table = TableId::new(&self.contract, department_id.to_string(), EXPENDITURES_TABLE);
        let mut rows: Vec<Expenditure> = self.read_table(table).await?;
        for row in &mut rows {
            row.department_id = department_id;
        }
        Ok(rows)
    }

    pub async fn expenses(&self) -> Result<Vec<Expense>, ClientError> {
        self.read_table(self.global_table(EXPENSES_TABLE)).await
    }

    pub async fn applications(&self) -> Result<Vec<AllowanceApplication>, ClientError> {
        self.read_table(self.global_table(APPLICATIONS_TABLE)).await
    }
}

fn decode_row<T: DeserializeOwned>(table: &TableId, row: Value) -> Result<T, ClientError> {
    serde_json::from_value(row)
        .map_err(|e| ClientError::LedgerQueryError(format!("{}: malformed row: {}", table, e)))
}

/// Older nodes only say `more`; resume from the primary key after the last row.
fn next_id_after(row: Option<&Value>) -> Option<String> {
    let id = row?.get("id").or_else(|| row?.get("application_id"))?;
    let id = match id {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    id.checked_add(1).map(|next| next.to_string())
}
