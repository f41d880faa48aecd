use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::{DepartmentId, SpendRequest};

use super::{ClientError, DepartmentView, ExpenditureView, LedgerClient, Submitted};

/// Latest dashboard view of one department, published to subscribers.
pub type ViewReceiver = watch::Receiver<Option<Arc<DepartmentView>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Published,
    /// A newer refresh published first; this one's result was dropped.
    Superseded,
}

/// Keeps subscribers on the newest department view.
///
/// Views are replaced whole, never patched, and only by reads from the ledger.
pub struct DashboardFeed {
    client: Arc<LedgerClient>,
    department_id: DepartmentId,
    generation: AtomicU64,
    /// Ticket of the refresh whose view is currently published.
    published: AtomicU64,
    sender: watch::Sender<Option<Arc<DepartmentView>>>,
}

impl DashboardFeed {
    pub fn new(client: Arc<LedgerClient>, department_id: DepartmentId) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            client,
            department_id,
            generation: AtomicU64::new(0),
            published: AtomicU64::new(0),
            sender,
        }
    }

    pub fn subscribe(&self) -> ViewReceiver {
        self.sender.subscribe()
    }

    pub fn current(&self) -> Option<Arc<DepartmentView>> {
        self.sender.borrow().clone()
    }

    /// Reload from the ledger and publish, unless a refresh that started later has
    /// already published. A later refresh that fails does not hold this one back.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ClientError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let view = self.client.load_department(self.department_id).await?;

        // Runs under the channel's write lock, so publications are ordered.
        let published = self.sender.send_if_modified(|current| {
            if self.published.load(Ordering::SeqCst) > ticket {
                return false;
            }
            self.published.store(ticket, Ordering::SeqCst);
            *current = Some(Arc::new(view));
            true
        });

        if published {
            Ok(RefreshOutcome::Published)
        } else {
            debug!(department_id = self.department_id, ticket, "refresh superseded");
            Ok(RefreshOutcome::Superseded)
        }
    }

    /// Spend, then refresh the dashboard. A failed spend leaves the published view alone.
    pub async fn spend(&self, request: &SpendRequest) -> Result<Submitted<ExpenditureView>, ClientError> {
        let submitted = self.client.spend(request).await?;
        if let Err(err) = self.refresh().await {
            warn!(department_id = self.department_id, error = %err, "dashboard refresh after spend failed");
        }
        Ok(submitted)
    }
}
