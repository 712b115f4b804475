use std::time::Duration;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{Address, AssetAmount, TradeId},
    ledger::endpoint_url,
};

/// Everything the release endpoint needs to pay out an escrowed trade. The artifact is opaque to this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub trade_id: TradeId,
    pub artifact: String,
    pub escrow_address: Address,
    pub seller_address: Address,
    pub asset: String,
    pub amount: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReceipt {
    pub released: bool,
    #[serde(default)]
    pub tx_ref: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ReleaseReceipt {
    pub fn released<S: Into<String>>(tx_ref: S) -> Self {
        Self { released: true, tx_ref: Some(tx_ref.into()), reason: None }
    }

    pub fn refused<S: Into<String>>(reason: S) -> Self {
        Self { released: false, tx_ref: None, reason: Some(reason.into()) }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReleaseError {
    #[error("Could not initialise the release client: {0}")]
    Initialization(String),
    #[error("The release endpoint could not be reached: {0}")]
    Unavailable(String),
    #[error("The release endpoint returned an error. Status {status}: {message}")]
    QueryError { status: u16, message: String },
    #[error("Unexpected response from the release endpoint: {0}")]
    JsonError(String),
}

/// Forwards a settlement artifact and reports whether the funds were released.
#[allow(async_fn_in_trait)]
pub trait ReleaseEndpoint {
    async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseReceipt, ReleaseError>;
}

/// `POST {base_url}/release`
#[derive(Clone)]
pub struct HttpReleaseEndpoint {
    base_url: String,
    client: Client,
}

impl HttpReleaseEndpoint {
    pub fn new<S: Into<String>>(base_url: S, timeout: Duration) -> Result<Self, ReleaseError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .user_agent("Escrow Trade Gateway")
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ReleaseError::Initialization(e.to_string()))?;
        Ok(Self { base_url: base_url.into(), client })
    }
}

impl ReleaseEndpoint for HttpReleaseEndpoint {
    async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseReceipt, ReleaseError> {
        let url = endpoint_url(&self.base_url, "release");
        debug!("🔮️ Forwarding settlement artifact for trade {} to {url}", request.trade_id);
        let response =
            self.client.post(url).json(request).send().await.map_err(|e| ReleaseError::Unavailable(e.to_string()))?;
        if response.status().is_success() {
            response.json::<ReleaseReceipt>().await.map_err(|e| ReleaseError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(ReleaseError::QueryError { status, message })
        }
    }
}
