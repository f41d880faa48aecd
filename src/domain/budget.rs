use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RawAmount, SymbolError, Token, decode_symbol};

pub type DepartmentId = u64;
pub type ExpenditureId = u64;

/// Row of the contract's singleton `configs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub executor: String,
    pub token: TokenSymbol,
}

impl LedgerConfig {
    /// Decode the token every amount on this contract is denominated in.
    pub fn token(&self) -> Result<Token, SymbolError> {
        match &self.token {
            TokenSymbol::Packed { value, .. } => decode_symbol(*value),
            TokenSymbol::Text { sym, .. } => sym.parse(),
        }
    }
}

/// An extended symbol as the ledger reports it: either the packed value or the
/// `"4,EOS"` string form, plus the token contract account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenSymbol {
    Packed {
        #[serde(with = "int_or_string")]
        value: u64,
        contract: String,
    },
    Text {
        sym: String,
        contract: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    #[serde(with = "int_or_string")]
    pub id: DepartmentId,
    pub name: String,
    #[serde(default)]
    pub permission: String,
    #[serde(with = "int_or_string")]
    pub monthly_allowance: RawAmount,
    #[serde(with = "int_or_string")]
    pub allowance_used: RawAmount,
    #[serde(with = "int_or_string")]
    pub allowance_allocated: RawAmount,
    #[serde(default = "enabled_by_default", with = "bool_or_int")]
    pub enabled: bool,
    #[serde(default, with = "int_or_string")]
    pub last_spend_time: u32,
}

fn enabled_by_default() -> bool {
    true
}

/// A named sub-allocation of a department's allowance, paid out to one recipient.
/// The ledger scopes this table by department id, which is filled in after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expenditure {
    #[serde(with = "int_or_string")]
    pub id: ExpenditureId,
    #[serde(default, skip_serializing)]
    pub department_id: DepartmentId,
    pub name: String,
    pub recipient: String,
    #[serde(with = "int_or_string")]
    pub monthly_allowance: RawAmount,
    #[serde(with = "int_or_string")]
    pub allowance_used: RawAmount,
    #[serde(default, with = "bool_or_int")]
    pub removed: bool,
    #[serde(default, with = "int_or_string")]
    pub last_spend_time: u32,
}

impl Expenditure {
    /// Allowance left according to this snapshot. May be stale.
    pub fn remaining(&self) -> RawAmount {
        self.monthly_allowance.saturating_sub(self.allowance_used)
    }
}

/// A recorded spend. Append-only on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(with = "int_or_string")]
    pub id: u64,
    #[serde(with = "int_or_string")]
    pub department_id: DepartmentId,
    #[serde(with = "int_or_string")]
    pub expenditure_id: ExpenditureId,
    /// Unix seconds
    #[serde(with = "int_or_string")]
    pub time: u32,
    #[serde(with = "int_or_string")]
    pub amount: RawAmount,
    #[serde(default)]
    pub memo: String,
}

impl Expense {
    pub fn recorded_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.time as i64, 0).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Map the contract's status byte.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ApplicationStatus::Pending),
            1 => Some(ApplicationStatus::Approved),
            2 => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ApplicationStatus::Pending => 0,
            ApplicationStatus::Approved => 1,
            ApplicationStatus::Rejected => 2,
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A department's request to move its monthly allowance, awaiting the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceApplication {
    #[serde(rename = "application_id", with = "int_or_string")]
    pub id: u64,
    #[serde(with = "int_or_string")]
    pub department_id: DepartmentId,
    #[serde(with = "int_or_string")]
    pub from_allowance: RawAmount,
    #[serde(with = "int_or_string")]
    pub to_allowance: RawAmount,
    #[serde(with = "status_code")]
    pub status: ApplicationStatus,
}

/// The ledger's JSON writer quotes integers wider than 32 bits, so integer columns
/// accept both `123` and `"123"`.
mod int_or_string {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Unsigned(u64),
        Signed(i64),
        Text(String),
    }

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<i128>,
    {
        let wide: i128 = match Wire::deserialize(deserializer)? {
            Wire::Unsigned(v) => v as i128,
            Wire::Signed(v) => v as i128,
            Wire::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("'{}' is not an integer", s)))?,
        };
        T::try_from(wide).map_err(|_| D::Error::custom(format!("integer {} out of range", wide)))
    }
}

/// Booleans come back as `true`/`false` or `1`/`0` depending on the node version.
mod bool_or_int {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Bool(bool),
        Int(u64),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Wire::deserialize(deserializer)? {
            Wire::Bool(b) => Ok(b),
            Wire::Int(0) => Ok(false),
            Wire::Int(1) => Ok(true),
            Wire::Int(n) => Err(D::Error::custom(format!("{} is not a boolean", n))),
        }
    }
}

mod status_code {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ApplicationStatus;

    pub fn serialize<S: Serializer>(
        status: &ApplicationStatus,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(status.code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<ApplicationStatus, D::Error> {
        let code = u8::deserialize(deserializer)?;
        ApplicationStatus::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("unknown application status {}", code)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_department_accepts_quoted_integers() {
        let row = json!({
            "id": 1,
            "name": "HR",
            "permission": "hr",
            "monthly_allowance": "10000000",
            "allowance_used": 8000000,
            "allowance_allocated": "9000000",
            "enabled": 1,
            "last_spend_time": 1534780800u32
        });
        let dept: Department = serde_json::from_value(row).unwrap();
        assert_eq!(dept.monthly_allowance, 10000000);
        assert_eq!(dept.allowance_used, 8000000);
        assert_eq!(dept.allowance_allocated, 9000000);
        assert!(dept.enabled);
    }

    #[test]
    fn test_amount_beyond_i64_is_rejected() {
        let row = json!({
            "id": 1,
            "name": "Ops",
            "recipient": "vendor",
            "monthly_allowance": "18446744073709551615",
            "allowance_used": 0,
            "removed": false
        });
        assert!(serde_json::from_value::<Expenditure>(row).is_err());
    }

    #[test]
    fn test_config_token_forms() {
        let packed: LedgerConfig = serde_json::from_value(json!({
            "executor": "cfo",
            "token": { "value": 1397703940u64, "contract": "eosio.token" }
        }))
        .unwrap();
        assert_eq!(packed.token().unwrap(), Token::new("EOS", 4).unwrap());

        let text: LedgerConfig = serde_json::from_value(json!({
            "executor": "cfo",
            "token": { "sym": "4,EOS", "contract": "eosio.token" }
        }))
        .unwrap();
        assert_eq!(text.token().unwrap(), Token::new("EOS", 4).unwrap());
    }

    #[test]
    fn test_application_status_code() {
        let row = json!({
            "application_id": 3,
            "department_id": 1,
            "from_allowance": 100,
            "to_allowance": 200,
            "status": 0
        });
        let app: AllowanceApplication = serde_json::from_value(row).unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);

        let bad = json!({
            "application_id": 3,
            "department_id": 1,
            "from_allowance": 100,
            "to_allowance": 200,
            "status": 9
        });
        assert!(serde_json::from_value::<AllowanceApplication>(bad).is_err());
    }

    #[test]
    fn test_expense_recorded_at() {
        let expense = Expense {
            id: 1,
            department_id: 1,
            expenditure_id: 1,
            time: 1534780800,
            amount: 10,
            memo: String::new(),
        };
        assert_eq!(
            expense.recorded_at().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2018-08-20 16:00:00"
        );
    }
}
