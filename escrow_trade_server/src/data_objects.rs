use escrow_trade_engine::{
    db_types::{Address, HistoryOrder, Role, Trade},
    trade_objects::{DepositInstructions, TradeProposal, TradeView},
};
use serde::{Deserialize, Serialize};

/// Prices may be sent as a JSON string (`"2.5"`) or a JSON number (`2.5`). Either way the decimal text is parsed
/// exactly, never through a float.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceValue {
    Text(String),
    Number(serde_json::Number),
}

impl PriceValue {
    pub fn as_decimal_string(&self) -> String {
        match self {
            PriceValue::Text(s) => s.clone(),
            PriceValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeTradeParams {
    pub item_name: String,
    #[serde(default)]
    pub description: String,
    pub price: PriceValue,
    pub counterparty: Address,
    /// The role the caller takes. Buyers propose to sellers by default.
    #[serde(default = "default_proposer_role")]
    pub role: Role,
}

fn default_proposer_role() -> Role {
    Role::Buyer
}

impl From<ProposeTradeParams> for TradeProposal {
    fn from(params: ProposeTradeParams) -> Self {
        TradeProposal {
            item_name: params.item_name,
            description: params.description,
            price: params.price.as_decimal_string(),
            counterparty: params.counterparty,
            role: params.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositParams {
    #[serde(alias = "deposit_tx_ref")]
    pub tx_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleParams {
    pub artifact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenConversationParams {
    pub counterparty: Address,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub order: HistoryOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptResponse {
    pub deposit_instructions: DepositInstructions,
}

/// A trade as one of its participants sees it. The last deposit verification failure is repeated at the top level so
/// that clients polling a pending trade can show it without digging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDetails {
    pub trade: Trade,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub verification_error: Option<String>,
}

impl From<TradeView> for TradeDetails {
    fn from(view: TradeView) -> Self {
        let verification_error = view.trade.verification_error.clone();
        Self { trade: view.trade, role: view.role, verification_error }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub message_id: i64,
    pub updated: bool,
}
