use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::LedgerClientConfig;
use crate::domain::{
    Authorization, DepartmentId, Expenditure, ExpenditureId, SpendRequest, Token, ValidatedSpend,
    validate_positive_amount, validate_spend,
};
use crate::ledger::{ContractAction, HttpLedger, LedgerBackend, LedgerReader, PushReceipt};

use super::{
    ApplicationSummary, ClientError, DepartmentView, ExpenditureView, TransactionSubmitter,
    aggregate_department, aggregate_expenditure, summarize_applications,
};

/// Entry point for every client of the budget contract (CLI, UI, scripts).
/// Construct one per ledger deployment and pass it by reference.
pub struct LedgerClient {
    reader: LedgerReader,
    submitter: TransactionSubmitter,
    token: OnceCell<Token>,
}

/// An action the ledger accepted, and the reload that followed it.
#[derive(Debug)]
pub struct Submitted<V> {
    pub action: ContractAction,
    pub receipt: PushReceipt,
    /// The fresh view read back after the push. A failure here does not mean the
    /// action failed; a later refresh will show its effect.
    pub reconciled: Result<V, ClientError>,
}

impl LedgerClient {
    pub fn new(backend: Arc<dyn LedgerBackend>, config: &LedgerClientConfig) -> Self {
        Self {
            reader: LedgerReader::new(Arc::clone(&backend), &config.contract, config.page_size),
            submitter: TransactionSubmitter::new(backend, &config.contract),
            token: OnceCell::new(),
        }
    }

    /// Build a client talking HTTP to the configured node.
    pub fn connect(config: &LedgerClientConfig) -> Result<Self, ClientError> {
        let backend = HttpLedger::new(config)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn reader(&self) -> &LedgerReader {
        &self.reader
    }

    // ========================
    // Reads
    // ========================

    /// The token all amounts are denominated in. Read from the config row once.
    pub async fn token(&self) -> Result<Token, ClientError> {
        let token = self
            .token
            .get_or_try_init(|| async {
                let config = self.reader.config().await?.ok_or(ClientError::NotInitialized)?;
                let token = config.token()?;
                debug!(token = %token, "resolved ledger token");
                Ok::<_, ClientError>(token)
            })
            .await?;
        Ok(token.clone())
    }

    /// Load a department's dashboard.
    pub async fn load_department(&self, id: DepartmentId) -> Result<DepartmentView, ClientError> {
        let (token, department, expenditures, expenses, applications) = tokio::try_join!(
            self.token(),
            self.reader.department(id),
            self.reader.expenditures(id),
            self.reader.expenses(),
            self.reader.applications(),
        )?;

        Ok(aggregate_department(
            &department,
            &expenditures,
            &expenses,
            &applications,
            &token,
        ))
    }

    /// Load one expenditure's page. Removed expenditures can still be looked up.
    pub async fn load_expenditure(
        &self,
        department_id: DepartmentId,
        expenditure_id: ExpenditureId,
    ) -> Result<ExpenditureView, ClientError> {
        let (token, expenditure, expenses) = tokio::try_join!(
            self.token(),
            self.expenditure_snapshot(department_id, expenditure_id),
            self.reader.expenses(),
        )?;

        Ok(aggregate_expenditure(&expenditure, &expenses, &token))
    }

    /// Current raw row of an expenditure.
    pub async fn expenditure_snapshot(
        &self,
        department_id: DepartmentId,
        expenditure_id: ExpenditureId,
    ) -> Result<Expenditure, ClientError> {
        self.reader
            .expenditures(department_id)
            .await?
            .into_iter()
            .find(|e| e.id == expenditure_id)
            .ok_or(ClientError::ExpenditureNotFound {
                department_id,
                expenditure_id,
            })
    }

    pub async fn list_applications(&self) -> Result<Vec<ApplicationSummary>, ClientError> {
        let (token, applications) = tokio::try_join!(self.token(), self.reader.applications())?;
        Ok(summarize_applications(&applications, &token))
    }

    // ========================
    // Spending
    // ========================

    /// Validate a spend against the expenditure as the ledger reports it right now.
    /// Nothing is submitted.
    pub async fn prepare_spend(&self, request: &SpendRequest) -> Result<ValidatedSpend, ClientError> {
        let (token, snapshot) = tokio::try_join!(
            self.token(),
            self.expenditure_snapshot(request.department_id, request.expenditure_id),
        )?;

        let spend = validate_spend(request, &snapshot, token.precision)?;
        if spend.exceeds_cached_remaining {
            debug!(
                department_id = spend.department_id,
                expenditure_id = spend.expenditure_id,
                raw_amount = spend.raw_amount,
                remaining = snapshot.remaining(),
                "spend exceeds cached remaining allowance, leaving the decision to the ledger"
            );
        }
        Ok(spend)
    }

    /// Submit a validated spend, then reload the expenditure from the ledger.
    pub async fn submit_spend(
        &self,
        spend: ValidatedSpend,
        authorization: &Authorization,
    ) -> Result<Submitted<ExpenditureView>, ClientError> {
        let action = ContractAction::Spend {
            department_id: spend.department_id,
            expenditure_id: spend.expenditure_id,
            amount: spend.raw_amount,
            memo: spend.memo,
        };
        let receipt = self.submitter.submit(&action, authorization).await?;

        let reconciled = self
            .reconcile(self.load_expenditure(spend.department_id, spend.expenditure_id))
            .await;
        Ok(Submitted {
            action,
            receipt,
            reconciled,
        })
    }

    /// Validate and submit in one go.
    pub async fn spend(&self, request: &SpendRequest) -> Result<Submitted<ExpenditureView>, ClientError> {
        let spend = self.prepare_spend(request).await?;
        self.submit_spend(spend, &request.authorization).await
    }

    // ========================
    // Department administration
    // ========================

    /// Apply for a new monthly allowance. Takes effect once the executor approves.
    pub async fn apply_allowance_change(
        &self,
        department_id: DepartmentId,
        new_allowance: &str,
        authorization: &Authorization,
    ) -> Result<Submitted<DepartmentView>, ClientError> {
        let token = self.token().await?;
        let new_allowance = validate_positive_amount(new_allowance, token.precision)?;

        let action = ContractAction::SetDepartmentLimit {
            department_id,
            new_allowance,
        };
        self.submit_and_reload_department(action, authorization).await
    }

    pub async fn add_expenditure(
        &self,
        department_id: DepartmentId,
        name: &str,
        recipient: &str,
        monthly_allowance: &str,
        authorization: &Authorization,
    ) -> Result<Submitted<DepartmentView>, ClientError> {
        let token = self.token().await?;
        let monthly_allowance = validate_positive_amount(monthly_allowance, token.precision)?;

        let action = ContractAction::AddExpenditure {
            department_id,
            name: name.trim().to_string(),
            recipient: recipient.trim().to_string(),
            monthly_allowance,
        };
        self.submit_and_reload_department(action, authorization).await
    }

    /// Soft-delete an expenditure. Its history stays readable.
    pub async fn remove_expenditure(
        &self,
        department_id: DepartmentId,
        expenditure_id: ExpenditureId,
        authorization: &Authorization,
    ) -> Result<Submitted<DepartmentView>, ClientError> {
        let action = ContractAction::RemoveExpenditure {
            department_id,
            expenditure_id,
        };
        self.submit_and_reload_department(action, authorization).await
    }

    async fn submit_and_reload_department(
        &self,
        action: ContractAction,
        authorization: &Authorization,
    ) -> Result<Submitted<DepartmentView>, ClientError> {
        let receipt = self.submitter.submit(&action, authorization).await?;
        let reconciled = self
            .reconcile(self.load_department(action.department_id()))
            .await;
        Ok(Submitted {
            action,
            receipt,
            reconciled,
        })
    }

    async fn reconcile<V>(
        &self,
        reload: impl Future<Output = Result<V, ClientError>>,
    ) -> Result<V, ClientError> {
        let result = reload.await;
        match &result {
            Ok(_) => info!("reconciled with ledger"),
            Err(err) => warn!(error = %err, "reconciliation read failed, refresh later"),
        }
        result
    }
}
