use std::time::Duration;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{Address, AssetAmount},
    ledger::endpoint_url,
};

/// The question put to the ledger oracle about a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferQuery {
    pub tx_ref: String,
    pub asset: String,
    /// Expected amount, in the asset's smallest unit
    pub amount: AssetAmount,
    pub destination: Address,
    pub sender: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferVerdict {
    pub confirmed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TransferVerdict {
    pub fn confirmed() -> Self {
        Self { confirmed: true, reason: None }
    }

    pub fn not_confirmed<S: Into<String>>(reason: S) -> Self {
        Self { confirmed: false, reason: Some(reason.into()) }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Could not initialise the ledger oracle client: {0}")]
    Initialization(String),
    #[error("The ledger oracle could not be reached: {0}")]
    Unavailable(String),
    #[error("The ledger oracle returned an error. Status {status}: {message}")]
    QueryError { status: u16, message: String },
    #[error("Unexpected response from the ledger oracle: {0}")]
    JsonError(String),
}

/// Reports whether a transfer matching the query has been confirmed on the ledger.
///
/// A transfer that exists but doesn't match (wrong amount, destination or sender), or that is not confirmed yet, is a
/// *verdict* (`confirmed: false` plus a reason), not an error. Errors are reserved for the oracle being unusable.
#[allow(async_fn_in_trait)]
pub trait LedgerOracle {
    async fn verify_transfer(&self, query: &TransferQuery) -> Result<TransferVerdict, OracleError>;
}

/// Talks to a ledger oracle over HTTP: `POST {base_url}/verify-transfer`.
#[derive(Clone)]
pub struct HttpLedgerOracle {
    base_url: String,
    client: Client,
}

impl HttpLedgerOracle {
    pub fn new<S: Into<String>>(base_url: S, timeout: Duration) -> Result<Self, OracleError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .user_agent("Escrow Trade Gateway")
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Initialization(e.to_string()))?;
        Ok(Self { base_url: base_url.into(), client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl LedgerOracle for HttpLedgerOracle {
    async fn verify_transfer(&self, query: &TransferQuery) -> Result<TransferVerdict, OracleError> {
        let url = endpoint_url(&self.base_url, "verify-transfer");
        trace!("🔮️ Asking {url} about {}", query.tx_ref);
        let response =
            self.client.post(url).json(query).send().await.map_err(|e| OracleError::Unavailable(e.to_string()))?;
        if response.status().is_success() {
            response.json::<TransferVerdict>().await.map_err(|e| OracleError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(OracleError::QueryError { status, message })
        }
    }
}
