// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use allowance::application::{ClientError, LedgerClient};
use allowance::config::LedgerClientConfig;
use allowance::domain::{
    AllowanceApplication, ApplicationStatus, Authorization, Department, Expenditure, Expense,
    RawAmount, SpendRequest,
};
use allowance::ledger::{ActionPayload, LedgerBackend, PushReceipt, TablePage, TableQuery};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

/// Packed `4,EOS`.
pub const EOS_SYMBOL: u64 = 1397703940;

/// 2018-08-20 16:00:00 UTC
pub const BASE_TIME: u32 = 1534780800;

/// One EOS in base units.
pub const EOS: RawAmount = 10_000;

/// Failure to hand back on the next push instead of applying it.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    Reject(String),
    Transport,
}

/// The contract's tables, held in memory.
#[derive(Debug, Default)]
pub struct LedgerState {
    pub config: Option<Value>,
    pub departments: BTreeMap<u64, Department>,
    pub expenditures: BTreeMap<(u64, u64), Expenditure>,
    pub expenses: Vec<Expense>,
    pub applications: Vec<AllowanceApplication>,
    pub clock: u32,
}

/// In-memory stand-in for a node plus signing relay, enforcing the budget contract's
/// checks on push.
pub struct FakeLedger {
    pub state: Mutex<LedgerState>,
    /// Server-side cap on rows per page, below whatever the client asks for.
    page_cap: usize,
    /// Answer `more` without `next_key`, like older nodes.
    legacy_paging: bool,
    read_delay: Mutex<Duration>,
    push_delay: Duration,
    failures: Mutex<VecDeque<ScriptedFailure>>,
    reads_unavailable: Mutex<bool>,
    in_flight: Mutex<HashMap<String, usize>>,
    pub max_in_flight_per_key: AtomicUsize,
    concurrent: AtomicUsize,
    pub max_concurrent: AtomicUsize,
    pub reads: AtomicUsize,
    pub pushes: AtomicUsize,
    pub pushed: Mutex<Vec<ActionPayload>>,
}

impl FakeLedger {
    pub fn new(state: LedgerState) -> Self {
        Self {
            state: Mutex::new(state),
            page_cap: usize::MAX,
            legacy_paging: false,
            read_delay: Mutex::new(Duration::ZERO),
            push_delay: Duration::ZERO,
            failures: Mutex::new(VecDeque::new()),
            reads_unavailable: Mutex::new(false),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight_per_key: AtomicUsize::new(0),
            concurrent: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            pushes: AtomicUsize::new(0),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Engineering (id 1) with Travel and Hardware, Marketing (id 2) with Events.
    pub fn standard() -> Self {
        Self::new(standard_state())
    }

    pub fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = cap.max(1);
        self
    }

    pub fn with_legacy_paging(mut self) -> Self {
        self.legacy_paging = true;
        self
    }

    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.set_read_delay(delay);
        self
    }

    /// Applies to reads issued from now on.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    pub fn with_push_delay(mut self, delay: Duration) -> Self {
        self.push_delay = delay;
        self
    }

    pub fn fail_next_push(&self, failure: ScriptedFailure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    pub fn set_reads_unavailable(&self, unavailable: bool) {
        *self.reads_unavailable.lock().unwrap() = unavailable;
    }

    pub fn expenditure(&self, department_id: u64, expenditure_id: u64) -> Expenditure {
        self.state.lock().unwrap().expenditures[&(department_id, expenditure_id)].clone()
    }

    pub fn department(&self, id: u64) -> Department {
        self.state.lock().unwrap().departments[&id].clone()
    }

    pub fn expense_count(&self) -> usize {
        self.state.lock().unwrap().expenses.len()
    }

    fn rows(&self, query: &TableQuery) -> Result<Vec<(Option<u64>, Value)>, ClientError> {
        let state = self.state.lock().unwrap();
        let rows = match query.table.table.as_str() {
            "configs" => state.config.iter().map(|c| (None, c.clone())).collect(),
            "departments" => state
                .departments
                .values()
                .map(|d| (Some(d.id), to_value(d)))
                .collect(),
            "expenditures" => {
                let scope: u64 = query.table.scope.parse().map_err(|_| {
                    ClientError::LedgerQueryError(format!("bad scope {}", query.table.scope))
                })?;
                state
                    .expenditures
                    .values()
                    .filter(|e| e.department_id == scope)
                    .map(|e| (Some(e.id), to_value(e)))
                    .collect()
            }
            "expenses" => state.expenses.iter().map(|e| (Some(e.id), to_value(e))).collect(),
            "applications" => state
                .applications
                .iter()
                .map(|a| (Some(a.id), to_value(a)))
                .collect(),
            other => {
                return Err(ClientError::LedgerQueryError(format!("unknown table {}", other)));
            }
        };
        Ok(rows)
    }

    fn apply(&self, payload: &ActionPayload) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        let data = &payload.data;
        let field = |name: &str| data[name].as_u64().ok_or(format!("missing field {}", name));

        match payload.name.as_str() {
            "spend" => {
                let (dept_id, exp_id) = (field("department_id")?, field("expenditure_id")?);
                let amount = field("amount")? as RawAmount;
                let dept = state
                    .departments
                    .get(&dept_id)
                    .ok_or("department does not exist")?;
                if !dept.enabled {
                    return Err("department is disabled".into());
                }
                if dept.allowance_used + amount > dept.monthly_allowance {
                    return Err("exceeds department allowance".into());
                }
                let exp = state
                    .expenditures
                    .get(&(dept_id, exp_id))
                    .ok_or("expenditure does not exist")?;
                if exp.removed {
                    return Err("expenditure has been removed".into());
                }
                if exp.allowance_used + amount > exp.monthly_allowance {
                    return Err("exceeds expenditure allowance".into());
                }

                state.clock += 60;
                let time = BASE_TIME + state.clock;
                if let Some(dept) = state.departments.get_mut(&dept_id) {
                    dept.allowance_used += amount;
                    dept.last_spend_time = time;
                }
                if let Some(exp) = state.expenditures.get_mut(&(dept_id, exp_id)) {
                    exp.allowance_used += amount;
                    exp.last_spend_time = time;
                }
                let id = state.expenses.len() as u64;
                state.expenses.push(Expense {
                    id,
                    department_id: dept_id,
                    expenditure_id: exp_id,
                    time,
                    amount,
                    memo: data["memo"].as_str().unwrap_or_default().to_string(),
                });
            }
            "setdeptlmt" => {
                let dept_id = field("id")?;
                let new_allowance = field("new_allowance")? as RawAmount;
                let dept = state
                    .departments
                    .get(&dept_id)
                    .ok_or("department does not exist")?;
                if new_allowance < dept.allowance_allocated {
                    return Err("new allowance is below the allocated amount".into());
                }
                let from_allowance = dept.monthly_allowance;
                let id = state.applications.len() as u64;
                state.applications.push(AllowanceApplication {
                    id,
                    department_id: dept_id,
                    from_allowance,
                    to_allowance: new_allowance,
                    status: ApplicationStatus::Pending,
                });
            }
            "addexpense" => {
                let dept_id = field("department_id")?;
                let amount = field("monthly_allowance")? as RawAmount;
                let dept = state
                    .departments
                    .get_mut(&dept_id)
                    .ok_or("department does not exist")?;
                if dept.allowance_allocated + amount > dept.monthly_allowance {
                    return Err("exceeds the department's unallocated allowance".into());
                }
                dept.allowance_allocated += amount;
                let id = state
                    .expenditures
                    .keys()
                    .filter(|(d, _)| *d == dept_id)
                    .map(|(_, e)| e + 1)
                    .max()
                    .unwrap_or(0);
                state.expenditures.insert(
                    (dept_id, id),
                    Expenditure {
                        id,
                        department_id: dept_id,
                        name: data["name"].as_str().unwrap_or_default().to_string(),
                        recipient: data["recipient"].as_str().unwrap_or_default().to_string(),
                        monthly_allowance: amount,
                        allowance_used: 0,
                        removed: false,
                        last_spend_time: 0,
                    },
                );
            }
            "rmexpense" => {
                let (dept_id, exp_id) = (field("department_id")?, field("expenditure_id")?);
                let exp = state
                    .expenditures
                    .get_mut(&(dept_id, exp_id))
                    .ok_or("expenditure does not exist")?;
                if exp.removed {
                    return Err("expenditure has been removed".into());
                }
                exp.removed = true;
                let released = exp.monthly_allowance;
                if let Some(dept) = state.departments.get_mut(&dept_id) {
                    dept.allowance_allocated -= released;
                }
            }
            other => return Err(format!("unknown action {}", other)),
        }
        Ok(())
    }

    fn enter(&self, key: &str) {
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(key.to_string()).or_default();
        *count += 1;
        self.max_in_flight_per_key.fetch_max(*count, Ordering::SeqCst);
    }

    fn leave(&self, key: &str) {
        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.in_flight.lock().unwrap().get_mut(key) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl LedgerBackend for FakeLedger {
    async fn get_table_rows(&self, query: &TableQuery) -> Result<TablePage, ClientError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if *self.reads_unavailable.lock().unwrap() {
            return Err(ClientError::LedgerUnavailable("connection refused".into()));
        }
        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let lower: Option<u64> = query.lower_bound.as_deref().and_then(|b| b.parse().ok());
        let limit = (query.limit as usize).min(self.page_cap);
        let mut rows: Vec<(Option<u64>, Value)> = self
            .rows(query)?
            .into_iter()
            .filter(|(key, _)| match (key, lower) {
                (Some(key), Some(lower)) => *key >= lower,
                _ => true,
            })
            .collect();

        let rest = rows.split_off(limit.min(rows.len()));
        let more = !rest.is_empty();
        let next_key = match rest.first() {
            Some((Some(key), _)) if !self.legacy_paging => Some(key.to_string()),
            _ => None,
        };

        Ok(TablePage {
            rows: rows.into_iter().map(|(_, row)| row).collect(),
            more,
            next_key,
        })
    }

    async fn push_action(&self, action: &ActionPayload) -> Result<PushReceipt, ClientError> {
        let n = self.pushes.fetch_add(1, Ordering::SeqCst);
        let key = match action.data.get("expenditure_id") {
            Some(exp) => format!("{}/{}", action.data["department_id"], exp),
            None => action
                .data
                .get("department_id")
                .or_else(|| action.data.get("id"))
                .map(|d| d.to_string())
                .unwrap_or_default(),
        };

        self.enter(&key);
        if !self.push_delay.is_zero() {
            tokio::time::sleep(self.push_delay).await;
        }
        let scripted = self.failures.lock().unwrap().pop_front();
        let result = match scripted {
            Some(ScriptedFailure::Reject(reason)) => Err(ClientError::TransactionRejected { reason }),
            Some(ScriptedFailure::Transport) => {
                Err(ClientError::TransportFailure("connection reset by peer".into()))
            }
            None => self
                .apply(action)
                .map(|_| PushReceipt {
                    transaction_id: Some(format!("{:064x}", n + 1)),
                })
                .map_err(|reason| ClientError::TransactionRejected { reason }),
        };
        if result.is_ok() {
            self.pushed.lock().unwrap().push(action.clone());
        }
        self.leave(&key);
        result
    }
}

fn to_value<T: Serialize>(row: &T) -> Value {
    serde_json::to_value(row).unwrap()
}

pub fn department(id: u64, name: &str, allowance: RawAmount, used: RawAmount, allocated: RawAmount) -> Department {
    Department {
        id,
        name: name.into(),
        permission: name.to_lowercase(),
        monthly_allowance: allowance,
        allowance_used: used,
        allowance_allocated: allocated,
        enabled: true,
        last_spend_time: 0,
    }
}

pub fn expenditure(
    department_id: u64,
    id: u64,
    name: &str,
    recipient: &str,
    allowance: RawAmount,
    used: RawAmount,
) -> Expenditure {
    Expenditure {
        id,
        department_id,
        name: name.into(),
        recipient: recipient.into(),
        monthly_allowance: allowance,
        allowance_used: used,
        removed: false,
        last_spend_time: 0,
    }
}

pub fn expense(id: u64, department_id: u64, expenditure_id: u64, minutes: u32, amount: RawAmount, memo: &str) -> Expense {
    Expense {
        id,
        department_id,
        expenditure_id,
        time: BASE_TIME + minutes * 60,
        amount,
        memo: memo.into(),
    }
}

pub fn eos_config() -> Value {
    json!({
        "executor": "cfo",
        "token": { "value": EOS_SYMBOL.to_string(), "contract": "eosio.token" },
    })
}

/// Engineering: 1000 EOS allowance, 800 allocated, 120 used.
/// Travel (1/0) 500 EOS with 120 used, Hardware (1/1) 300 EOS unused.
/// Marketing: 200 EOS, Events (2/0) 200 EOS with 50 used.
pub fn standard_state() -> LedgerState {
    let mut state = LedgerState {
        config: Some(eos_config()),
        clock: 24 * 60 * 60,
        ..LedgerState::default()
    };

    for dept in [
        department(1, "Engineering", 1000 * EOS, 120 * EOS, 800 * EOS),
        department(2, "Marketing", 200 * EOS, 50 * EOS, 200 * EOS),
    ] {
        state.departments.insert(dept.id, dept);
    }

    for exp in [
        expenditure(1, 0, "Travel", "travelagent", 500 * EOS, 120 * EOS),
        expenditure(1, 1, "Hardware", "hwvendor", 300 * EOS, 0),
        expenditure(2, 0, "Events", "venue", 200 * EOS, 50 * EOS),
    ] {
        state.expenditures.insert((exp.department_id, exp.id), exp);
    }

    state.expenses = vec![
        expense(0, 1, 0, 10, 100 * EOS, "flights"),
        expense(1, 2, 0, 20, 50 * EOS, "booth"),
        expense(2, 1, 0, 30, 20 * EOS, "taxi"),
    ];
    state
}

/// Client over `ledger`, paging two rows at a time.
pub fn test_client(ledger: &Arc<FakeLedger>) -> LedgerClient {
    let backend: Arc<dyn LedgerBackend> = ledger.clone();
    LedgerClient::new(backend, &LedgerClientConfig::default().with_page_size(2))
}

pub fn auth() -> Authorization {
    Authorization::new("engineering", "active")
}

pub fn spend_request(department_id: u64, expenditure_id: u64, amount: &str, memo: &str) -> SpendRequest {
    SpendRequest {
        department_id,
        expenditure_id,
        amount: amount.into(),
        memo: memo.into(),
        authorization: auth(),
    }
}
