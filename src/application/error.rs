use thiserror::Error;

use crate::domain::{AmountError, DepartmentId, ExpenditureId, SymbolError, ValidationError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Malformed token symbol: {0}")]
    MalformedSymbol(#[from] SymbolError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount is required")]
    EmptyAmount,

    #[error("Invalid memo: {0}")]
    InvalidMemo(String),

    #[error("Invalid authorization: {0}")]
    InvalidAuthorization(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Unexpected ledger response: {0}")]
    LedgerQueryError(String),

    #[error("Transaction declined by the ledger: {reason}")]
    TransactionRejected { reason: String },

    #[error("Could not confirm submission, outcome unknown: {0}")]
    TransportFailure(String),

    #[error("Department not found: {0}")]
    DepartmentNotFound(DepartmentId),

    #[error("Expenditure {expenditure_id} not found in department {department_id}")]
    ExpenditureNotFound {
        department_id: DepartmentId,
        expenditure_id: ExpenditureId,
    },

    #[error("The budget contract has not been initialized")]
    NotInitialized,

    #[error("No signing credential configured")]
    MissingCredential,
}

impl ClientError {
    /// Whether the ledger state may have changed without us knowing.
    /// Callers should reconcile with a fresh read before retrying.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, ClientError::TransportFailure(_))
    }

    /// Short wording for people, as opposed to the full `Display` form.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::TransactionRejected { reason } => format!("declined: {}", reason),
            ClientError::TransportFailure(_) => "outcome unknown, please refresh".to_string(),
            ClientError::LedgerUnavailable(_) => "ledger unreachable, try again".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AmountError> for ClientError {
    fn from(err: AmountError) -> Self {
        ClientError::InvalidAmount(err.to_string())
    }
}

impl From<ValidationError> for ClientError {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();
        match err {
            ValidationError::EmptyAmount => ClientError::EmptyAmount,
            ValidationError::InvalidAmount(reason) => ClientError::InvalidAmount(reason),
            ValidationError::MemoTooLong(_) => ClientError::InvalidMemo(message),
            ValidationError::InvalidAuthorization(s) => ClientError::InvalidAuthorization(s),
            ValidationError::SnapshotMismatch {
                department_id,
                expenditure_id,
            } => ClientError::ExpenditureNotFound {
                department_id,
                expenditure_id,
            },
        }
    }
}
