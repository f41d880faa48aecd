use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::{DepartmentView, ExpenseEntry, LedgerClient};
use crate::domain::{DepartmentId, ExpenditureId};

/// Point-in-time dump of a department's dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub department: DepartmentView,
}

/// Exporter for writing ledger views to files or stdout
pub struct Exporter<'a> {
    client: &'a LedgerClient,
}

impl<'a> Exporter<'a> {
    pub fn new(client: &'a LedgerClient) -> Self {
        Self { client }
    }

    /// Export a department's expense history (or one expenditure's) to CSV
    pub async fn export_history_csv<W: Write>(
        &self,
        department_id: DepartmentId,
        expenditure_id: Option<ExpenditureId>,
        writer: W,
    ) -> Result<usize> {
        let (entries, token) = match expenditure_id {
            Some(expenditure_id) => {
                let view = self
                    .client
                    .load_expenditure(department_id, expenditure_id)
                    .await?;
                (view.expenses, view.token)
            }
            None => {
                let view = self.client.load_department(department_id).await?;
                (view.expenses, view.token)
            }
        };

        write_expenses_csv(&entries, &token, writer)
    }

    /// Export a department's full dashboard as a JSON snapshot
    pub async fn export_department_json<W: Write>(
        &self,
        department_id: DepartmentId,
        mut writer: W,
    ) -> Result<DepartmentSnapshot> {
        let department = self.client.load_department(department_id).await?;

        let snapshot = DepartmentSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            department,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}

/// Write expense entries as CSV rows, in the order given.
pub fn write_expenses_csv<W: Write>(entries: &[ExpenseEntry], token: &str, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["time", "expenditure", "amount", "token", "memo"])?;

    let mut count = 0;
    for entry in entries {
        csv_writer.write_record([
            entry.time.to_rfc3339().as_str(),
            entry.expenditure.as_deref().unwrap_or(""),
            entry.amount.as_str(),
            token,
            entry.memo.as_str(),
        ])?;
        count += 1;
    }

    csv_writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_expenses_csv() {
        let entries = vec![ExpenseEntry {
            time: DateTime::from_timestamp(1534780800, 0).unwrap(),
            expenditure: Some("Travel".into()),
            amount: "12.5000".into(),
            memo: "tickets, return".into(),
        }];

        let mut out = Vec::new();
        let count = write_expenses_csv(&entries, "EOS", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            text,
            "time,expenditure,amount,token,memo\n\
             2018-08-20T16:00:00+00:00,Travel,12.5000,EOS,\"tickets, return\"\n"
        );
    }
}
