use std::fmt;

use serde_json::json;

use crate::domain::{Authorization, DepartmentId, ExpenditureId, RawAmount};

use super::ActionPayload;

/// The budget contract's mutating actions this client issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractAction {
    /// Pay `amount` out of an expenditure to its recipient.
    Spend {
        department_id: DepartmentId,
        expenditure_id: ExpenditureId,
        amount: RawAmount,
        memo: String,
    },
    /// Apply for a new monthly allowance; the executor approves or rejects later.
    SetDepartmentLimit {
        department_id: DepartmentId,
        new_allowance: RawAmount,
    },
    AddExpenditure {
        department_id: DepartmentId,
        name: String,
        recipient: String,
        monthly_allowance: RawAmount,
    },
    RemoveExpenditure {
        department_id: DepartmentId,
        expenditure_id: ExpenditureId,
    },
}

/// What a submission serializes on. Spends and removals on the same expenditure
/// queue behind each other; department-wide actions queue per department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionKey {
    Department(DepartmentId),
    Expenditure(DepartmentId, ExpenditureId),
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionKey::Department(d) => write!(f, "department {}", d),
            SubmissionKey::Expenditure(d, e) => write!(f, "expenditure {}/{}", d, e),
        }
    }
}

impl ContractAction {
    /// Action name as the contract's ABI spells it.
    pub fn name(&self) -> &'static str {
        match self {
            ContractAction::Spend { .. } => "spend",
            ContractAction::SetDepartmentLimit { .. } => "setdeptlmt",
            ContractAction::AddExpenditure { .. } => "addexpense",
            ContractAction::RemoveExpenditure { .. } => "rmexpense",
        }
    }

    pub fn department_id(&self) -> DepartmentId {
        match self {
            ContractAction::Spend { department_id, .. }
            | ContractAction::SetDepartmentLimit { department_id, .. }
            | ContractAction::AddExpenditure { department_id, .. }
            | ContractAction::RemoveExpenditure { department_id, .. } => *department_id,
        }
    }

    pub fn submission_key(&self) -> SubmissionKey {
        match self {
            ContractAction::Spend {
                department_id,
                expenditure_id,
                ..
            }
            | ContractAction::RemoveExpenditure {
                department_id,
                expenditure_id,
            } => SubmissionKey::Expenditure(*department_id, *expenditure_id),
            ContractAction::SetDepartmentLimit { department_id, .. }
            | ContractAction::AddExpenditure { department_id, .. } => {
                SubmissionKey::Department(*department_id)
            }
        }
    }

    /// Build the wire payload for `contract`, authorized by `authorization`.
    ///
    /// Amounts go out as unsigned base units, matching the contract's `uint64` fields.
    pub fn to_payload(&self, contract: &str, authorization: &Authorization) -> ActionPayload {
        let data = match self {
            ContractAction::Spend {
                department_id,
                expenditure_id,
                amount,
                memo,
            } => json!({
                "department_id": department_id,
                "expenditure_id": expenditure_id,
                "amount": amount.unsigned_abs(),
                "memo": memo,
            }),
            ContractAction::SetDepartmentLimit {
                department_id,
                new_allowance,
            } => json!({
                "id": department_id,
                "new_allowance": new_allowance.unsigned_abs(),
            }),
            ContractAction::AddExpenditure {
                department_id,
                name,
                recipient,
                monthly_allowance,
            } => json!({
                "department_id": department_id,
                "name": name,
                "recipient": recipient,
                "monthly_allowance": monthly_allowance.unsigned_abs(),
            }),
            ContractAction::RemoveExpenditure {
                department_id,
                expenditure_id,
            } => json!({
                "department_id": department_id,
                "expenditure_id": expenditure_id,
            }),
        };

        ActionPayload {
            account: contract.to_string(),
            name: self.name().to_string(),
            authorization: vec![authorization.clone()],
            data,
        }
    }
}
