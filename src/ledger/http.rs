use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::application::ClientError;
use crate::config::{LedgerClientConfig, SigningCredential};

use super::{ActionPayload, LedgerBackend, PushReceipt, TablePage, TableQuery};

const GET_TABLE_ROWS_PATH: &str = "/v1/chain/get_table_rows";
const PUSH_ACTION_PATH: &str = "/v1/chain/push_action";

/// Node assertion messages carry this prefix in front of the contract's own text.
const ASSERTION_PREFIX: &str = "assertion failure with message: ";

/// HTTP backend talking to a node's chain API. Pushes go through a signing relay that
/// holds the keys; the client only forwards its opaque credential.
pub struct HttpLedger {
    base_url: String,
    chain_id: Option<String>,
    credential: Option<SigningCredential>,
    client: reqwest::Client,
}

impl HttpLedger {
    pub fn new(config: &LedgerClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::LedgerUnavailable(e.to_string()))?;

        Ok(Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            chain_id: config.chain_id.clone(),
            credential: config.credential.clone(),
            client,
        })
    }
}

#[async_trait]
impl LedgerBackend for HttpLedger {
    async fn get_table_rows(&self, query: &TableQuery) -> Result<TablePage, ClientError> {
        let mut body = json!({
            "code": query.table.code,
            "scope": query.table.scope,
            "table": query.table.table,
            "json": true,
            "limit": query.limit,
        });
        if let Some(bound) = &query.lower_bound {
            body["lower_bound"] = json!(bound);
        }

        debug!(table = %query.table, lower_bound = ?query.lower_bound, "get_table_rows");

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, GET_TABLE_ROWS_PATH))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::LedgerUnavailable(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ClientError::LedgerUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_read_failure(status, &text));
        }

        parse_table_page(&text)
    }

    async fn push_action(&self, action: &ActionPayload) -> Result<PushReceipt, ClientError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(ClientError::MissingCredential)?;

        let body = json!({
            "chain_id": self.chain_id,
            "actions": [action],
        });

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, PUSH_ACTION_PATH))
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::TransportFailure(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ClientError::TransportFailure(e.to_string()))?;

        if status.is_success() {
            // Accepted; a body we cannot read does not undo that.
            return Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(error = %e, "push accepted but receipt unreadable");
                PushReceipt::default()
            }));
        }

        Err(classify_push_failure(status, &text))
    }
}

pub(crate) fn parse_table_page(text: &str) -> Result<TablePage, ClientError> {
    let mut page: TablePage = serde_json::from_str(text)
        .map_err(|e| ClientError::LedgerQueryError(format!("table rows: {}", e)))?;
    if page.next_key.as_deref() == Some("") {
        page.next_key = None;
    }
    Ok(page)
}

fn is_gateway_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

pub(crate) fn classify_read_failure(status: StatusCode, body: &str) -> ClientError {
    if is_gateway_status(status) {
        return ClientError::LedgerUnavailable(format!("HTTP {}", status));
    }
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| ledger_error_message(&v))
        .unwrap_or_else(|| format!("HTTP {}", status));
    ClientError::LedgerQueryError(message)
}

/// Tell a ledger decline apart from a failure where the push may or may not have landed.
/// Only a structured error body from the node counts as a decline.
pub(crate) fn classify_push_failure(status: StatusCode, body: &str) -> ClientError {
    if is_gateway_status(status) {
        return ClientError::TransportFailure(format!("HTTP {}", status));
    }
    match serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| ledger_error_message(&v))
    {
        Some(reason) => ClientError::TransactionRejected { reason },
        None => ClientError::TransportFailure(format!("HTTP {} with unreadable body", status)),
    }
}

/// Dig the most specific human message out of a node error body.
pub(crate) fn ledger_error_message(body: &Value) -> Option<String> {
    let error = body.get("error");

    let detail = error
        .and_then(|e| e.get("details"))
        .and_then(|d| d.as_array())
        .and_then(|details| details.iter().find_map(|d| d.get("message")?.as_str()));
    let what = error.and_then(|e| e.get("what")).and_then(|w| w.as_str());
    let message = body.get("message").and_then(|m| m.as_str());

    detail
        .or(what)
        .or(message)
        .map(|m| m.strip_prefix(ASSERTION_PREFIX).unwrap_or(m).to_string())
}
