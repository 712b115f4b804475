use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    db_types::{Address, AssetAmount},
    ledger::{
        LedgerOracle,
        OracleError,
        ReleaseEndpoint,
        ReleaseError,
        ReleaseReceipt,
        ReleaseRequest,
        TransferQuery,
        TransferVerdict,
    },
};

#[derive(Debug, Clone)]
struct Transfer {
    amount: AssetAmount,
    destination: Address,
    sender: Address,
    confirmed: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    transfers: HashMap<String, Transfer>,
    offline: bool,
    delay: Option<Duration>,
    queries: Vec<TransferQuery>,
}

/// An in-memory ledger that answers oracle queries by comparing them against the transfers recorded on it.
#[derive(Debug, Clone, Default)]
pub struct FakeLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a confirmed transfer.
    pub async fn add_transfer(&self, tx_ref: &str, amount: AssetAmount, destination: &Address, sender: &Address) {
        let transfer =
            Transfer { amount, destination: destination.clone(), sender: sender.clone(), confirmed: true };
        self.state.lock().await.transfers.insert(tx_ref.to_string(), transfer);
    }

    /// Records a transfer that is still waiting for confirmations.
    pub async fn add_unconfirmed_transfer(
        &self,
        tx_ref: &str,
        amount: AssetAmount,
        destination: &Address,
        sender: &Address,
    ) {
        let transfer =
            Transfer { amount, destination: destination.clone(), sender: sender.clone(), confirmed: false };
        self.state.lock().await.transfers.insert(tx_ref.to_string(), transfer);
    }

    pub async fn confirm(&self, tx_ref: &str) {
        if let Some(t) = self.state.lock().await.transfers.get_mut(tx_ref) {
            t.confirmed = true;
        }
    }

    /// While offline every query fails with [`OracleError::Unavailable`].
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Makes every query take this long before answering.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.delay = delay;
    }

    pub async fn queries(&self) -> Vec<TransferQuery> {
        self.state.lock().await.queries.clone()
    }
}

impl LedgerOracle for FakeLedger {
    async fn verify_transfer(&self, query: &TransferQuery) -> Result<TransferVerdict, OracleError> {
        let (delay, result) = {
            let mut state = self.state.lock().await;
            state.queries.push(query.clone());
            let result = if state.offline {
                Err(OracleError::Unavailable("ledger is offline".into()))
            } else {
                Ok(match state.transfers.get(&query.tx_ref) {
                    None => TransferVerdict::not_confirmed(format!("Transfer {} not found", query.tx_ref)),
                    Some(t) if t.destination != query.destination => {
                        TransferVerdict::not_confirmed(format!("Transfer was sent to {}", t.destination))
                    },
                    Some(t) if t.sender != query.sender => {
                        TransferVerdict::not_confirmed(format!("Transfer was sent by {}", t.sender))
                    },
                    Some(t) if t.amount != query.amount => TransferVerdict::not_confirmed(format!(
                        "Amount mismatch. Expected {}, got {}",
                        query.amount.value(),
                        t.amount.value()
                    )),
                    Some(t) if !t.confirmed => TransferVerdict::not_confirmed("Transfer is not confirmed yet"),
                    Some(_) => TransferVerdict::confirmed(),
                })
            };
            (state.delay, result)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[derive(Debug, Default)]
struct ReleaseState {
    refusals: Vec<String>,
    offline: bool,
    delay: Option<Duration>,
    requests: Vec<ReleaseRequest>,
    released: usize,
}

/// A release endpoint that accepts every artifact unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct FakeReleaseEndpoint {
    state: Arc<Mutex<ReleaseState>>,
}

impl FakeReleaseEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next release request is refused with `reason`. Calls stack up.
    pub async fn refuse_next(&self, reason: &str) {
        self.state.lock().await.refusals.push(reason.to_string());
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.delay = delay;
    }

    pub async fn requests(&self) -> Vec<ReleaseRequest> {
        self.state.lock().await.requests.clone()
    }

    /// How many releases have actually been paid out.
    pub async fn release_count(&self) -> usize {
        self.state.lock().await.released
    }
}

impl ReleaseEndpoint for FakeReleaseEndpoint {
    async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseReceipt, ReleaseError> {
        let (delay, result) = {
            let mut state = self.state.lock().await;
            state.requests.push(request.clone());
            let result = if state.offline {
                Err(ReleaseError::Unavailable("release endpoint is offline".into()))
            } else if !state.refusals.is_empty() {
                let reason = state.refusals.remove(0);
                Ok(ReleaseReceipt::refused(reason))
            } else {
                state.released += 1;
                Ok(ReleaseReceipt::released(format!("release-{}-{}", request.trade_id, state.released)))
            };
            (state.delay, result)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}
