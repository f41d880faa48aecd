use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8888";
pub const DEFAULT_CONTRACT: &str = "wallet";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opaque secret handed to the signing relay. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningCredential(String);

impl SigningCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningCredential(***)")
    }
}

/// Everything needed to reach one deployment of the budget contract.
#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub endpoint: String,
    pub chain_id: Option<String>,
    /// Account the budget contract is deployed to; also the scope of its global tables.
    pub contract: String,
    pub credential: Option<SigningCredential>,
    pub request_timeout: Duration,
    pub page_size: u32,
}

impl LedgerClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = contract.into();
        self
    }

    pub fn with_credential(mut self, credential: SigningCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl Default for LedgerClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            chain_id: None,
            contract: DEFAULT_CONTRACT.to_string(),
            credential: None,
            request_timeout: DEFAULT_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
