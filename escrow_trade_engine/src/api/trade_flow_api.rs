use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use log::*;

use crate::{
    api::{
        trade_objects::{DepositInstructions, TradeProposal, TradeResult, TradeView},
        AccessGuard,
        AdvisoryError,
        ConversationApi,
        TradeFlowError,
    },
    db::traits::EscrowDatabase,
    db_types::{
        Address,
        AssetSpec,
        NewTrade,
        NewTradeEvent,
        Role,
        Seller,
        Trade,
        TradeEvent,
        TradeId,
        TradeStatusType,
        TradeUpdate,
    },
    events::{EventProducers, TradeStatusChangedEvent},
    helpers::KeyedLocks,
    ledger::{LedgerOracle, ReleaseEndpoint, ReleaseRequest, TransferQuery},
};

pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TradeFlowConfig {
    /// The escrow asset. All trades are priced in it.
    pub asset: AssetSpec,
    /// The escrow-controlled destination that buyers fund. Captured on each trade when it is created.
    pub escrow_address: Address,
    /// Upper bound on every oracle and release call
    pub upstream_timeout: Duration,
}

impl Default for TradeFlowConfig {
    fn default() -> Self {
        Self {
            asset: AssetSpec::default(),
            escrow_address: Address::new("escrow"),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

/// `TradeFlowApi` owns the trade state machine.
///
/// Every mutating operation takes the trade's lock for its whole duration and writes with a compare-and-set on the
/// expected status, so two racing requests on the same trade produce one winner and one
/// [`TradeFlowError::InvalidState`]. Requests on different trades never wait on each other.
///
/// Calls to the ledger oracle and the release endpoint are bounded by [`TradeFlowConfig::upstream_timeout`]. Their
/// failures are reported as an [`AdvisoryError`] next to the unchanged trade and never move the trade.
pub struct TradeFlowApi<B, L, R> {
    db: B,
    oracle: L,
    release: R,
    config: TradeFlowConfig,
    conversations: ConversationApi<B>,
    locks: Arc<KeyedLocks<TradeId>>,
    producers: EventProducers,
}

impl<B: Clone, L: Clone, R: Clone> Clone for TradeFlowApi<B, L, R> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            oracle: self.oracle.clone(),
            release: self.release.clone(),
            config: self.config.clone(),
            conversations: self.conversations.clone(),
            locks: Arc::clone(&self.locks),
            producers: self.producers.clone(),
        }
    }
}

impl<B, L, R> Debug for TradeFlowApi<B, L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TradeFlowApi ({} via {})", self.config.asset.code, self.config.escrow_address)
    }
}

impl<B: Clone, L, R> TradeFlowApi<B, L, R> {
    pub fn new(db: B, oracle: L, release: R, config: TradeFlowConfig, producers: EventProducers) -> Self {
        let conversations = ConversationApi::new(db.clone());
        Self { db, oracle, release, config, conversations, locks: Arc::new(KeyedLocks::new()), producers }
    }

    pub fn config(&self) -> &TradeFlowConfig {
        &self.config
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn conversations(&self) -> &ConversationApi<B> {
        &self.conversations
    }
}

impl<B, L, R> TradeFlowApi<B, L, R>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    /// Registers the address as a seller. Idempotent.
    pub async fn register_seller(&self, address: &Address) -> Result<Seller, TradeFlowError> {
        address.validate()?;
        let seller = self.db.register_seller(address).await?;
        debug!("🤝️ {address} is a registered seller since {}", seller.registered_at);
        Ok(seller)
    }

    /// Creates a trade in `Pending` status together with its bound conversation.
    ///
    /// The caller takes the role given in the proposal and the counterparty takes the other one. Whoever ends up as the
    /// seller must be registered.
    pub async fn propose(&self, proposal: TradeProposal, caller: &Address) -> Result<Trade, TradeFlowError> {
        let item_name = proposal.item_name.trim();
        if item_name.is_empty() {
            return Err(TradeFlowError::ValidationError("Item name cannot be empty".into()));
        }
        caller.validate()?;
        proposal.counterparty.validate()?;
        if caller == &proposal.counterparty {
            return Err(TradeFlowError::ValidationError("You cannot trade with yourself".into()));
        }
        let price = self
            .config
            .asset
            .parse_decimal(&proposal.price)
            .map_err(|e| TradeFlowError::ValidationError(format!("Invalid price: {e}")))?;
        if !price.is_positive() {
            return Err(TradeFlowError::ValidationError("Price must be greater than zero".into()));
        }
        let (buyer, seller) = match proposal.role {
            Role::Buyer => (caller.clone(), proposal.counterparty.clone()),
            Role::Seller => (proposal.counterparty.clone(), caller.clone()),
        };
        if !self.db.is_registered_seller(&seller).await? {
            return Err(TradeFlowError::ValidationError(format!("{seller} is not a registered seller")));
        }
        let new_trade =
            NewTrade::new(item_name.to_string(), price, buyer, seller, proposal.role, self.config.escrow_address.clone())
                .with_description(proposal.description.trim())
                .with_asset(self.config.asset.code.clone());
        let trade = self.db.insert_trade(new_trade, caller).await?;
        info!(
            "🤝️ Trade {} proposed by {caller}: {} for {} {}",
            trade.trade_id,
            trade.item_name,
            self.config.asset.format_decimal(trade.price),
            trade.asset
        );
        self.notify(&trade, None, caller).await;
        Ok(trade)
    }

    /// The counterparty of the proposer accepts the terms. Returns the instructions the buyer needs to fund the escrow.
    pub async fn accept(&self, trade_id: &TradeId, caller: &Address) -> Result<DepositInstructions, TradeFlowError> {
        let _guard = self.locks.lock(trade_id).await;
        let trade = self.fetch(trade_id).await?;
        if !AccessGuard::can_drive_trade(&trade, caller, trade.proposed_by.counterpart()) {
            return Err(TradeFlowError::Forbidden("Only the counterparty of the proposer can accept a trade".into()));
        }
        self.expect_status(&trade, &[TradeStatusType::Pending])?;
        let update = TradeUpdate::transition(TradeStatusType::Pending, TradeStatusType::Accepted);
        let trade = self.apply(&trade, update, caller, None).await?;
        Ok(self.deposit_instructions(&trade))
    }

    /// The buyer reports the ledger reference of their deposit. Verification runs straight away.
    ///
    /// While the trade is `DepositPending` the buyer may submit again. The latest reference replaces the previous one,
    /// and the replacement is kept in the trade history. Re-submitting the current reference simply re-runs
    /// verification.
    pub async fn submit_deposit(
        &self,
        trade_id: &TradeId,
        caller: &Address,
        tx_ref: &str,
    ) -> Result<TradeResult, TradeFlowError> {
        let tx_ref = tx_ref.trim();
        if tx_ref.is_empty() {
            return Err(TradeFlowError::ValidationError("Deposit reference cannot be empty".into()));
        }
        {
            let _guard = self.locks.lock(trade_id).await;
            let trade = self.fetch(trade_id).await?;
            if !AccessGuard::can_drive_trade(&trade, caller, Role::Buyer) {
                return Err(TradeFlowError::Forbidden("Only the buyer can submit a deposit".into()));
            }
            self.expect_status(&trade, &[TradeStatusType::Accepted, TradeStatusType::DepositPending])?;
            if trade.deposit_tx_ref.as_deref() != Some(tx_ref) {
                if let Some(other) = self.db.fetch_trade_by_deposit_ref(tx_ref).await? {
                    if other.trade_id != trade.trade_id {
                        return Err(TradeFlowError::ValidationError(format!(
                            "Deposit reference {tx_ref} is already used by another trade"
                        )));
                    }
                }
                let note = trade.deposit_tx_ref.as_ref().map(|old| {
                    warn!("🤝️ Deposit reference {old} on trade {trade_id} is superseded by {tx_ref}");
                    format!("Superseded deposit reference {old}")
                });
                let update = TradeUpdate::transition(trade.status, TradeStatusType::DepositPending)
                    .with_deposit_tx_ref(tx_ref)
                    .with_verification_error(None);
                self.apply(&trade, update, caller, note).await?;
            }
        }
        self.verify_deposit(trade_id).await
    }

    /// Asks the ledger oracle whether the trade's current deposit reference is a confirmed transfer of the full price
    /// from the buyer into escrow.
    ///
    /// Called after every submission and periodically by the deposit poller. A trade that isn't `DepositPending` is
    /// returned as is.
    pub async fn verify_deposit(&self, trade_id: &TradeId) -> Result<TradeResult, TradeFlowError> {
        let _guard = self.locks.lock(trade_id).await;
        let trade = self.fetch(trade_id).await?;
        if trade.status != TradeStatusType::DepositPending {
            return Ok(TradeResult::ok(trade));
        }
        let Some(tx_ref) = trade.deposit_tx_ref.clone() else {
            return Err(TradeFlowError::InvalidState(format!("Trade {trade_id} has no deposit reference")));
        };
        let query = TransferQuery {
            tx_ref: tx_ref.clone(),
            asset: trade.asset.clone(),
            amount: trade.price,
            destination: trade.escrow_address.clone(),
            sender: trade.buyer_address.clone(),
        };
        let verdict = match self.bounded(self.oracle.verify_transfer(&query)).await {
            Err(advisory) => {
                warn!("🔮️ Could not verify deposit {tx_ref} for trade {trade_id}. {advisory}");
                return Ok(TradeResult::with_advisory(trade, advisory));
            },
            Ok(Err(e)) => {
                warn!("🔮️ Ledger oracle failed on deposit {tx_ref} for trade {trade_id}. {e}");
                return Ok(TradeResult::with_advisory(trade, e.into()));
            },
            Ok(Ok(verdict)) => verdict,
        };
        let system = Address::system();
        if verdict.confirmed {
            let update = TradeUpdate::transition(TradeStatusType::DepositPending, TradeStatusType::DepositConfirmed)
                .with_verification_error(None);
            let note = format!("Deposit {tx_ref} confirmed");
            let trade = self.apply(&trade, update, &system, Some(note)).await?;
            return Ok(TradeResult::ok(trade));
        }
        let reason = verdict.reason.unwrap_or_else(|| "The transfer is not confirmed".to_string());
        info!("🔮️ Deposit {tx_ref} for trade {trade_id} was not verified: {reason}");
        let trade = if trade.verification_error.as_deref() == Some(reason.as_str()) {
            trade
        } else {
            let update = TradeUpdate::transition(TradeStatusType::DepositPending, TradeStatusType::DepositPending)
                .with_verification_error(Some(reason.clone()));
            let note = format!("Verification of {tx_ref} failed: {reason}");
            self.apply(&trade, update, &system, Some(note)).await?
        };
        Ok(TradeResult::with_advisory(trade, AdvisoryError::VerificationFailed(reason)))
    }

    /// Re-verifies every trade waiting on a deposit. Failures on one trade don't stop the sweep.
    pub async fn verify_pending_deposits(&self) -> Result<Vec<TradeResult>, TradeFlowError> {
        let pending = self.db.fetch_trades_with_status(TradeStatusType::DepositPending).await?;
        let mut results = Vec::with_capacity(pending.len());
        for trade in pending {
            match self.verify_deposit(&trade.trade_id).await {
                Ok(result) => results.push(result),
                Err(e) => warn!("🤝️ Could not verify the deposit for trade {}. {e}", trade.trade_id),
            }
        }
        Ok(results)
    }

    /// The buyer releases the escrow to the seller by handing over a settlement artifact.
    ///
    /// The trade moves to `SettlePending` first and stays there until the release endpoint confirms the release. A
    /// refused or failed release can be retried with a fresh artifact.
    pub async fn settle(
        &self,
        trade_id: &TradeId,
        caller: &Address,
        artifact: &str,
    ) -> Result<TradeResult, TradeFlowError> {
        let artifact = artifact.trim();
        if artifact.is_empty() {
            return Err(TradeFlowError::ValidationError("Settlement artifact cannot be empty".into()));
        }
        let _guard = self.locks.lock(trade_id).await;
        let trade = self.fetch(trade_id).await?;
        if !AccessGuard::can_drive_trade(&trade, caller, Role::Buyer) {
            return Err(TradeFlowError::Forbidden("Only the buyer can settle a trade".into()));
        }
        self.expect_status(&trade, &[TradeStatusType::DepositConfirmed, TradeStatusType::SettlePending])?;
        let trade = if trade.status == TradeStatusType::DepositConfirmed {
            let update = TradeUpdate::transition(TradeStatusType::DepositConfirmed, TradeStatusType::SettlePending);
            self.apply(&trade, update, caller, None).await?
        } else {
            trade
        };
        let request = ReleaseRequest {
            trade_id: trade.trade_id.clone(),
            artifact: artifact.to_string(),
            escrow_address: trade.escrow_address.clone(),
            seller_address: trade.seller_address.clone(),
            asset: trade.asset.clone(),
            amount: trade.price,
        };
        let receipt = match self.bounded(self.release.release(&request)).await {
            Err(advisory) => {
                warn!("🔮️ Release of trade {trade_id} did not complete. {advisory}");
                return Ok(TradeResult::with_advisory(trade, advisory));
            },
            Ok(Err(e)) => {
                warn!("🔮️ Release endpoint failed for trade {trade_id}. {e}");
                return Ok(TradeResult::with_advisory(trade, e.into()));
            },
            Ok(Ok(receipt)) => receipt,
        };
        match receipt.tx_ref.filter(|r| receipt.released && !r.trim().is_empty()) {
            Some(tx_ref) => {
                let update = TradeUpdate::transition(TradeStatusType::SettlePending, TradeStatusType::Success)
                    .with_settle_tx_ref(tx_ref.clone());
                let note = format!("Released in {tx_ref}");
                let trade = self.apply(&trade, update, caller, Some(note)).await?;
                Ok(TradeResult::ok(trade))
            },
            None => {
                let reason = receipt.reason.unwrap_or_else(|| "The release was not confirmed".to_string());
                info!("🔮️ Release of trade {trade_id} was refused: {reason}");
                let event =
                    NewTradeEvent::new(trade_id.clone(), Some(trade.status), trade.status, caller.clone())
                        .with_note(format!("Settlement refused: {reason}"));
                self.db.record_trade_event(event).await?;
                Ok(TradeResult::with_advisory(trade, AdvisoryError::SettlementFailed(reason)))
            },
        }
    }

    /// Either party refuses the trade before it is funded.
    pub async fn reject(&self, trade_id: &TradeId, caller: &Address) -> Result<Trade, TradeFlowError> {
        self.close_unfunded(trade_id, caller, TradeStatusType::Rejected).await
    }

    /// Either party withdraws from the trade before it is funded.
    pub async fn cancel(&self, trade_id: &TradeId, caller: &Address) -> Result<Trade, TradeFlowError> {
        self.close_unfunded(trade_id, caller, TradeStatusType::Cancelled).await
    }

    pub async fn trade(&self, trade_id: &TradeId, caller: &Address) -> Result<TradeView, TradeFlowError> {
        let trade = self.fetch(trade_id).await?;
        let role = AccessGuard::role_of(&trade, caller)
            .ok_or_else(|| TradeFlowError::Forbidden(format!("You are not a party to trade {trade_id}")))?;
        Ok(TradeView { trade, role })
    }

    pub async fn trades_for(&self, caller: &Address) -> Result<Vec<Trade>, TradeFlowError> {
        let trades = self.db.fetch_trades_for_address(caller).await?;
        Ok(trades)
    }

    /// The audit trail of the trade.
    pub async fn history(&self, trade_id: &TradeId, caller: &Address) -> Result<Vec<TradeEvent>, TradeFlowError> {
        let trade = self.fetch(trade_id).await?;
        if AccessGuard::role_of(&trade, caller).is_none() {
            return Err(TradeFlowError::Forbidden(format!("You are not a party to trade {trade_id}")));
        }
        let events = self.db.fetch_trade_events(trade_id).await?;
        Ok(events)
    }

    //----------------------------------------------   Private   -------------------------------------------------------
    async fn close_unfunded(
        &self,
        trade_id: &TradeId,
        caller: &Address,
        to: TradeStatusType,
    ) -> Result<Trade, TradeFlowError> {
        let _guard = self.locks.lock(trade_id).await;
        let trade = self.fetch(trade_id).await?;
        if AccessGuard::role_of(&trade, caller).is_none() {
            warn!("🛂️ {caller} tried to move trade {trade_id} to {to}");
            return Err(TradeFlowError::Forbidden(format!("You are not a party to trade {trade_id}")));
        }
        self.expect_status(&trade, &[TradeStatusType::Pending, TradeStatusType::Accepted])?;
        let update = TradeUpdate::transition(trade.status, to);
        self.apply(&trade, update, caller, None).await
    }

    async fn fetch(&self, trade_id: &TradeId) -> Result<Trade, TradeFlowError> {
        self.db.fetch_trade(trade_id).await?.ok_or_else(|| TradeFlowError::NotFound(format!("Trade {trade_id}")))
    }

    fn expect_status(&self, trade: &Trade, allowed: &[TradeStatusType]) -> Result<(), TradeFlowError> {
        if allowed.contains(&trade.status) {
            Ok(())
        } else {
            Err(TradeFlowError::InvalidState(format!("Trade {} is {}", trade.trade_id, trade.status)))
        }
    }

    /// Writes the update and its audit entry, then notifies subscribers if the status changed.
    async fn apply(
        &self,
        trade: &Trade,
        update: TradeUpdate,
        actor: &Address,
        note: Option<String>,
    ) -> Result<Trade, TradeFlowError> {
        let (from, to) = (update.expected_status, update.new_status);
        if from != to && !from.can_transition_to(to) {
            return Err(TradeFlowError::InvalidState(format!("Trade {} cannot move from {from} to {to}", trade.trade_id)));
        }
        let mut event = NewTradeEvent::new(trade.trade_id.clone(), Some(from), to, actor.clone());
        if let Some(note) = note {
            event = event.with_note(note);
        }
        let updated = self.db.update_trade(&trade.trade_id, update, event).await?;
        if from != to {
            info!("🤝️ Trade {} moved from {from} to {to} by {actor}", updated.trade_id);
            self.notify(&updated, Some(from), actor).await;
        }
        Ok(updated)
    }

    async fn notify(&self, trade: &Trade, old_status: Option<TradeStatusType>, actor: &Address) {
        let event = TradeStatusChangedEvent::new(trade.clone(), old_status, actor.clone());
        self.producers.publish_trade_status(event).await;
    }

    fn deposit_instructions(&self, trade: &Trade) -> DepositInstructions {
        DepositInstructions {
            trade_id: trade.trade_id.clone(),
            escrow_address: trade.escrow_address.clone(),
            asset: trade.asset.clone(),
            amount: trade.price,
            display_amount: self.config.asset.format_decimal(trade.price),
            memo: format!("escrow-trade:{}", trade.trade_id),
        }
    }

    /// Runs an upstream call under the configured timeout.
    async fn bounded<T, F: Future<Output = T>>(&self, call: F) -> Result<T, AdvisoryError> {
        let timeout = self.config.upstream_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| AdvisoryError::UpstreamUnavailable(format!("No response within {}s", timeout.as_secs())))
    }
}
