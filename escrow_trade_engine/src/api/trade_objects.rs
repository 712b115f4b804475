use serde::{Deserialize, Serialize};

use crate::{
    api::AdvisoryError,
    db_types::{Address, AssetAmount, Role, Trade, TradeId},
};

/// The terms of a new trade, as submitted by the proposer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeProposal {
    pub item_name: String,
    #[serde(default)]
    pub description: String,
    /// Decimal price in the escrow asset, e.g. `"2.5"`
    pub price: String,
    pub counterparty: Address,
    /// The role the *proposer* takes in the trade
    pub role: Role,
}

/// What the buyer needs to fund the escrow. The buyer signs and broadcasts the transfer with their own wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositInstructions {
    pub trade_id: TradeId,
    pub escrow_address: Address,
    pub asset: String,
    /// Amount in the asset's smallest unit
    pub amount: AssetAmount,
    /// The same amount as a decimal string, for display
    pub display_amount: String,
    pub memo: String,
}

/// The outcome of a deposit or settlement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeResult {
    pub trade: Trade,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub advisory: Option<AdvisoryError>,
}

impl TradeResult {
    pub fn ok(trade: Trade) -> Self {
        Self { trade, advisory: None }
    }

    pub fn with_advisory(trade: Trade, advisory: AdvisoryError) -> Self {
        Self { trade, advisory: Some(advisory) }
    }
}

/// A participant's view of a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeView {
    #[serde(flatten)]
    pub trade: Trade,
    pub role: Role,
}
