use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{AmountError, DepartmentId, Expenditure, ExpenditureId, RawAmount, to_raw};

/// The token contract refuses memos longer than this many bytes.
pub const MAX_MEMO_BYTES: usize = 256;

/// Ledger account and permission names are at most this long.
pub const MAX_NAME_LEN: usize = 12;

/// The ledger principal authorizing an action, written `account@permission`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authorization {
    pub actor: String,
    pub permission: String,
}

impl Authorization {
    pub fn new(actor: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            permission: permission.into(),
        }
    }
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.actor, self.permission)
    }
}

impl FromStr for Authorization {
    type Err = ValidationError;

    /// A bare account name means its `active` permission.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (actor, permission) = s.split_once('@').unwrap_or((s, "active"));
        if !is_ledger_name(actor) || !is_ledger_name(permission) {
            return Err(ValidationError::InvalidAuthorization(s.to_string()));
        }
        Ok(Self::new(actor, permission))
    }
}

/// `a-z`, `1-5` and `.`, one to twelve characters.
fn is_ledger_name(name: &str) -> bool {
    (1..=MAX_NAME_LEN).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'1'..=b'5').contains(&b) || b == b'.')
}

/// What the user asked to spend, exactly as typed. Never persisted.
#[derive(Debug, Clone)]
pub struct SpendRequest {
    pub department_id: DepartmentId,
    pub expenditure_id: ExpenditureId,
    pub amount: String,
    pub memo: String,
    pub authorization: Authorization,
}

/// A spend that passed local checks, ready to become a ledger action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSpend {
    pub department_id: DepartmentId,
    pub expenditure_id: ExpenditureId,
    pub raw_amount: RawAmount,
    pub memo: String,
    /// Set when the cached snapshot says this would overdraw. Informational only:
    /// the snapshot may be stale and the ledger makes the real decision.
    pub exceeds_cached_remaining: bool,
}

/// Check a spend for well-formedness against a possibly stale expenditure snapshot.
///
/// The cached remaining allowance is not enforced here.
pub fn validate_spend(
    request: &SpendRequest,
    snapshot: &Expenditure,
    precision: u8,
) -> Result<ValidatedSpend, ValidationError> {
    if request.expenditure_id != snapshot.id || request.department_id != snapshot.department_id
    {
        return Err(ValidationError::SnapshotMismatch {
            department_id: request.department_id,
            expenditure_id: request.expenditure_id,
        });
    }

    let raw_amount = validate_positive_amount(&request.amount, precision)?;
    validate_memo(&request.memo)?;

    Ok(ValidatedSpend {
        department_id: request.department_id,
        expenditure_id: request.expenditure_id,
        raw_amount,
        memo: request.memo.clone(),
        exceeds_cached_remaining: raw_amount > snapshot.remaining(),
    })
}

/// Parse a user-entered amount that must be strictly positive.
pub fn validate_positive_amount(input: &str, precision: u8) -> Result<RawAmount, ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError::EmptyAmount);
    }

    let raw = to_raw(input, precision)?;
    if raw <= 0 {
        return Err(ValidationError::InvalidAmount(format!(
            "'{}' must be greater than zero",
            input.trim()
        )));
    }
    Ok(raw)
}

pub fn validate_memo(memo: &str) -> Result<(), ValidationError> {
    if memo.len() > MAX_MEMO_BYTES {
        return Err(ValidationError::MemoTooLong(memo.len()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyAmount,
    InvalidAmount(String),
    MemoTooLong(usize),
    InvalidAuthorization(String),
    SnapshotMismatch {
        department_id: DepartmentId,
        expenditure_id: ExpenditureId,
    },
}

impl From<AmountError> for ValidationError {
    fn from(err: AmountError) -> Self {
        match err {
            AmountError::Empty => ValidationError::EmptyAmount,
            other => ValidationError::InvalidAmount(other.to_string()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyAmount => write!(f, "amount is required"),
            ValidationError::InvalidAmount(reason) => write!(f, "invalid amount: {}", reason),
            ValidationError::MemoTooLong(len) => write!(
                f,
                "memo is {} bytes, the ledger accepts at most {}",
                len, MAX_MEMO_BYTES
            ),
            ValidationError::InvalidAuthorization(s) => {
                write!(f, "'{}' is not of the form account@permission", s)
            }
            ValidationError::SnapshotMismatch {
                department_id,
                expenditure_id,
            } => write!(
                f,
                "snapshot does not belong to expenditure {} of department {}",
                expenditure_id, department_id
            ),
        }
    }
}

impl std::error::Error for ValidationError {}
