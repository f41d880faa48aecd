use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::domain::Authorization;
use crate::ledger::{ContractAction, LedgerBackend, PushReceipt, SubmissionKey};

use super::ClientError;

/// Pushes contract actions, one at a time per expenditure (or per department for
/// department-wide actions).
///
/// Each push runs on its own task. Dropping the future returned by [`submit`] stops
/// the wait, not the push.
///
/// [`submit`]: TransactionSubmitter::submit
pub struct TransactionSubmitter {
    backend: Arc<dyn LedgerBackend>,
    contract: String,
    locks: Mutex<HashMap<SubmissionKey, Arc<AsyncMutex<()>>>>,
}

impl TransactionSubmitter {
    pub fn new(backend: Arc<dyn LedgerBackend>, contract: impl Into<String>) -> Self {
        Self {
            backend,
            contract: contract.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: SubmissionKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop locks nobody holds or waits on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Submit `action` authorized by `authorization` and wait for the ledger's answer.
    ///
    /// The per-key lock covers only the push; reconciliation is the caller's next step.
    pub async fn submit(
        &self,
        action: &ContractAction,
        authorization: &Authorization,
    ) -> Result<PushReceipt, ClientError> {
        let key = action.submission_key();
        let lock = self.lock_for(key);
        let payload = action.to_payload(&self.contract, authorization);
        let backend = Arc::clone(&self.backend);

        info!(action = action.name(), key = %key, auth = %authorization, "submitting");

        let push = tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            backend.push_action(&payload).await
        });

        let result = push.await.map_err(|e| {
            ClientError::TransportFailure(format!("submission task ended abnormally: {}", e))
        })?;

        match &result {
            Ok(receipt) => info!(
                action = action.name(),
                key = %key,
                transaction_id = receipt.transaction_id.as_deref().unwrap_or("-"),
                "submission accepted"
            ),
            Err(ClientError::TransactionRejected { reason }) => {
                warn!(action = action.name(), key = %key, reason = %reason, "submission declined")
            }
            Err(err) => warn!(action = action.name(), key = %key, error = %err, "submission failed"),
        }

        result
    }
}
