use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AllowanceApplication, ApplicationStatus, Department, DepartmentId, Expenditure, ExpenditureId,
    Expense, RawAmount, Token, to_display,
};

/// Everything shown on a department's dashboard, already formatted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentView {
    pub id: DepartmentId,
    pub name: String,
    pub token: String,
    pub enabled: bool,
    pub monthly_allowance: String,
    pub allowance_used: String,
    pub allowance_allocated: String,
    pub expenditures: Vec<ExpenditureSummary>,
    /// Most recent first.
    pub expenses: Vec<ExpenseEntry>,
    pub pending_application: Option<ApplicationSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenditureSummary {
    pub id: ExpenditureId,
    pub name: String,
    pub recipient: String,
    pub used: String,
    pub total: String,
    pub remaining: String,
    pub percent_used: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseEntry {
    pub time: DateTime<Utc>,
    pub expenditure: Option<String>,
    pub amount: String,
    pub memo: String,
}

/// A single expenditure's page, including its own expense history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenditureView {
    pub department_id: DepartmentId,
    pub id: ExpenditureId,
    pub name: String,
    pub recipient: String,
    pub token: String,
    pub monthly_allowance: String,
    pub allowance_used: String,
    pub remaining: String,
    pub percent_used: i64,
    pub removed: bool,
    /// Most recent first.
    pub expenses: Vec<ExpenseEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSummary {
    pub id: u64,
    pub department_id: DepartmentId,
    pub from_allowance: String,
    pub to_allowance: String,
    pub status: ApplicationStatus,
}

/// Share of the allowance used, in whole percent rounded half away from zero.
/// A zero allowance reports 0 rather than dividing by it.
pub fn percent_used(used: RawAmount, allowance: RawAmount) -> i64 {
    if allowance == 0 {
        return 0;
    }

    let numerator = used as i128 * 100;
    let denominator = allowance as i128;
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;

    let rounded = if remainder.abs() * 2 >= denominator.abs() {
        quotient + numerator.signum() * denominator.signum()
    } else {
        quotient
    };

    i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX })
}

/// Expenses of a department (optionally one expenditure), most recently recorded first.
/// Ties on the timestamp fall back to the ledger's row order.
pub fn expense_history<'a>(
    expenses: &'a [Expense],
    department_id: DepartmentId,
    expenditure_id: Option<ExpenditureId>,
) -> Vec<&'a Expense> {
    let mut history: Vec<&Expense> = expenses
        .iter()
        .filter(|e| e.department_id == department_id)
        .filter(|e| expenditure_id.is_none_or(|id| e.expenditure_id == id))
        .collect();
    history.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| b.id.cmp(&a.id)));
    history
}

fn summarize_expenditure(expenditure: &Expenditure, precision: u8) -> ExpenditureSummary {
    ExpenditureSummary {
        id: expenditure.id,
        name: expenditure.name.clone(),
        recipient: expenditure.recipient.clone(),
        used: to_display(expenditure.allowance_used, precision),
        total: to_display(expenditure.monthly_allowance, precision),
        remaining: to_display(expenditure.remaining(), precision),
        percent_used: percent_used(expenditure.allowance_used, expenditure.monthly_allowance),
    }
}

fn expense_entry(expense: &Expense, names: &HashMap<ExpenditureId, &str>, precision: u8) -> ExpenseEntry {
    ExpenseEntry {
        time: expense.recorded_at(),
        expenditure: names.get(&expense.expenditure_id).map(|n| n.to_string()),
        amount: to_display(expense.amount, precision),
        memo: expense.memo.clone(),
    }
}

fn summarize_application(application: &AllowanceApplication, precision: u8) -> ApplicationSummary {
    ApplicationSummary {
        id: application.id,
        department_id: application.department_id,
        from_allowance: to_display(application.from_allowance, precision),
        to_allowance: to_display(application.to_allowance, precision),
        status: application.status,
    }
}

/// Join one department's rows into its dashboard view.
///
/// `expenditures` are that department's rows, removed ones included: they are dropped
/// from the list but still name the expenses recorded against them.
pub fn aggregate_department(
    department: &Department,
    expenditures: &[Expenditure],
    expenses: &[Expense],
    applications: &[AllowanceApplication],
    token: &Token,
) -> DepartmentView {
    let precision = token.precision;
    let names: HashMap<ExpenditureId, &str> = expenditures
        .iter()
        .map(|e| (e.id, e.name.as_str()))
        .collect();

    let pending_application = applications
        .iter()
        .filter(|a| a.department_id == department.id && a.status == ApplicationStatus::Pending)
        .max_by_key(|a| a.id)
        .map(|a| summarize_application(a, precision));

    DepartmentView {
        id: department.id,
        name: department.name.clone(),
        token: token.name.clone(),
        enabled: department.enabled,
        monthly_allowance: to_display(department.monthly_allowance, precision),
        allowance_used: to_display(department.allowance_used, precision),
        allowance_allocated: to_display(department.allowance_allocated, precision),
        expenditures: expenditures
            .iter()
            .filter(|e| !e.removed)
            .map(|e| summarize_expenditure(e, precision))
            .collect(),
        expenses: expense_history(expenses, department.id, None)
            .into_iter()
            .map(|e| expense_entry(e, &names, precision))
            .collect(),
        pending_application,
    }
}

/// Build the detail view of one expenditure. Works for removed expenditures too.
pub fn aggregate_expenditure(expenditure: &Expenditure, expenses: &[Expense], token: &Token) -> ExpenditureView {
    let precision = token.precision;
    let names = HashMap::from([(expenditure.id, expenditure.name.as_str())]);
    let summary = summarize_expenditure(expenditure, precision);

    ExpenditureView {
        department_id: expenditure.department_id,
        id: expenditure.id,
        name: summary.name,
        recipient: summary.recipient,
        token: token.name.clone(),
        monthly_allowance: summary.total,
        allowance_used: summary.used,
        remaining: summary.remaining,
        percent_used: summary.percent_used,
        removed: expenditure.removed,
        expenses: expense_history(expenses, expenditure.department_id, Some(expenditure.id))
            .into_iter()
            .map(|e| expense_entry(e, &names, precision))
            .collect(),
    }
}

/// Format every application, newest first.
pub fn summarize_applications(applications: &[AllowanceApplication], token: &Token) -> Vec<ApplicationSummary> {
    let mut summaries: Vec<ApplicationSummary> = applications
        .iter()
        .map(|a| summarize_application(a, token.precision))
        .collect();
    summaries.sort_by(|a, b| b.id.cmp(&a.id));
    summaries
}
