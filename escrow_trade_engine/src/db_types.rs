use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use etg_common::{AssetAmount, AssetSpec};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------       Address         ---------------------------------------------------------
/// A ledger account identifier.
///
/// Addresses are canonicalised (trimmed and lower-cased) on construction, so equality between two `Address` values
/// is always case-insensitive with respect to the raw input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize)]
#[sqlx(transparent)]
pub struct Address(String);

impl Address {
    pub fn new<S: AsRef<str>>(value: S) -> Self {
        Self(value.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The address used for audit entries written by the system itself, e.g. by the deposit poller. No caller can
    /// use it, since [`Address::validate`] rejects it.
    pub fn system() -> Self {
        Self(SYSTEM_ACTOR.to_string())
    }

    /// Checks that the address can belong to a participant.
    ///
    /// Participant addresses are non-empty, contain no whitespace and no [`CONVERSATION_ID_SEPARATOR`] (so that an
    /// address-pair conversation id names exactly one pair), and are not the reserved system actor.
    pub fn validate(&self) -> Result<(), AddressError> {
        if self.0.is_empty() {
            return Err(AddressError::Empty);
        }
        if let Some(c) = self.0.chars().find(|c| *c == CONVERSATION_ID_SEPARATOR || c.is_whitespace()) {
            return Err(AddressError::InvalidCharacter(self.0.clone(), c));
        }
        if self.0 == SYSTEM_ACTOR {
            return Err(AddressError::Reserved(self.0.clone()));
        }
        Ok(())
    }
}

const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("An address cannot be empty")]
    Empty,
    #[error("The address {0} contains the invalid character {1:?}")]
    InvalidCharacter(String, char),
    #[error("The address {0} is reserved")]
    Reserved(String),
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: serde::Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Ok(Address::new(s))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

//--------------------------------------         Role          ---------------------------------------------------------
/// The part a participant plays in a trade. Resolved once per request from the caller's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn counterpart(&self) -> Self {
        match self {
            Role::Buyer => Role::Seller,
            Role::Seller => Role::Buyer,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        TradeId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TradeId(pub String);

impl TradeId {
    /// Generates a fresh, random trade id.
    pub fn random() -> Self {
        Self(format!("{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TradeId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConversionError("Trade id cannot be empty".into()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TradeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------    TradeStatusType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatusType {
    /// The trade has been proposed and is waiting for the counterparty.
    Pending,
    /// The counterparty accepted the terms. The buyer may now fund the escrow.
    Accepted,
    /// The buyer submitted a deposit reference that has not been confirmed by the ledger yet.
    DepositPending,
    /// The ledger oracle confirmed the deposit into escrow.
    DepositConfirmed,
    /// The buyer requested release and the settlement is in flight.
    SettlePending,
    /// Funds were released. Terminal.
    Success,
    /// The counterparty refused the proposal. Terminal.
    Rejected,
    /// A participant withdrew before funding. Terminal.
    Cancelled,
}

impl TradeStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Rejected | Self::Cancelled)
    }

    /// Whether a deposit reference must be present on a trade in this status.
    pub fn has_deposit(&self) -> bool {
        matches!(self, Self::DepositPending | Self::DepositConfirmed | Self::SettlePending | Self::Success)
    }

    /// The edges of the lifecycle state machine. Self-loops (retries) are not transitions and are not listed.
    pub fn can_transition_to(&self, to: TradeStatusType) -> bool {
        use TradeStatusType::*;
        matches!(
            (self, to),
            (Pending, Accepted) |
                (Pending | Accepted, Rejected) |
                (Pending | Accepted, Cancelled) |
                (Accepted, DepositPending) |
                (DepositPending, DepositConfirmed) |
                (DepositConfirmed, SettlePending) |
                (SettlePending, Success)
        )
    }
}

impl Display for TradeStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeStatusType::Pending => "PENDING",
            TradeStatusType::Accepted => "ACCEPTED",
            TradeStatusType::DepositPending => "DEPOSIT_PENDING",
            TradeStatusType::DepositConfirmed => "DEPOSIT_CONFIRMED",
            TradeStatusType::SettlePending => "SETTLE_PENDING",
            TradeStatusType::Success => "SUCCESS",
            TradeStatusType::Rejected => "REJECTED",
            TradeStatusType::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl FromStr for TradeStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "DEPOSIT_PENDING" => Ok(Self::DepositPending),
            "DEPOSIT_CONFIRMED" => Ok(Self::DepositConfirmed),
            "SETTLE_PENDING" => Ok(Self::SettlePending),
            "SUCCESS" => Ok(Self::Success),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid trade status: {s}"))),
        }
    }
}

//--------------------------------------         Trade         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub item_name: String,
    pub description: String,
    /// The agreed price, in the smallest unit of `asset`
    pub price: AssetAmount,
    pub asset: String,
    pub buyer_address: Address,
    pub seller_address: Address,
    /// Which side proposed the trade. The other side is the one that may accept it.
    pub proposed_by: Role,
    /// The escrow-controlled destination the buyer must fund. Captured at creation.
    pub escrow_address: Address,
    pub status: TradeStatusType,
    pub deposit_tx_ref: Option<String>,
    pub settle_tx_ref: Option<String>,
    /// The last non-fatal deposit verification failure, if any. Cleared when the deposit is confirmed.
    pub verification_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub deposit_submitted_at: Option<DateTime<Utc>>,
    pub deposit_confirmed_at: Option<DateTime<Utc>>,
    pub settle_requested_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn address_for(&self, role: Role) -> &Address {
        match role {
            Role::Buyer => &self.buyer_address,
            Role::Seller => &self.seller_address,
        }
    }

    /// The party that has to accept the proposal.
    pub fn acceptor(&self) -> &Address {
        self.address_for(self.proposed_by.counterpart())
    }

    pub fn is_participant(&self, address: &Address) -> bool {
        &self.buyer_address == address || &self.seller_address == address
    }

    /// The id of the conversation bound to this trade.
    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::for_trade(&self.trade_id)
    }
}

//--------------------------------------        NewTrade       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub trade_id: TradeId,
    pub item_name: String,
    pub description: String,
    pub price: AssetAmount,
    pub asset: String,
    pub buyer_address: Address,
    pub seller_address: Address,
    pub proposed_by: Role,
    pub escrow_address: Address,
    pub created_at: DateTime<Utc>,
}

impl NewTrade {
    pub fn new(
        item_name: String,
        price: AssetAmount,
        buyer_address: Address,
        seller_address: Address,
        proposed_by: Role,
        escrow_address: Address,
    ) -> Self {
        Self {
            trade_id: TradeId::random(),
            item_name,
            description: String::default(),
            price,
            asset: AssetSpec::default().code,
            buyer_address,
            seller_address,
            proposed_by,
            escrow_address,
            created_at: Utc::now(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_asset<S: Into<String>>(mut self, asset: S) -> Self {
        self.asset = asset.into();
        self
    }
}

//--------------------------------------      TradeUpdate      ---------------------------------------------------------
/// A compare-and-set update for a trade. The update is applied only if the trade still has `expected_status`.
///
/// Only the mutable fields of a trade appear here. Timestamps for the transition are derived from `new_status`.
#[derive(Debug, Clone)]
pub struct TradeUpdate {
    pub expected_status: TradeStatusType,
    pub new_status: TradeStatusType,
    pub deposit_tx_ref: Option<String>,
    pub settle_tx_ref: Option<String>,
    /// `Some(None)` clears the verification error, `Some(Some(e))` sets it, `None` leaves it untouched.
    pub verification_error: Option<Option<String>>,
}

impl TradeUpdate {
    pub fn transition(from: TradeStatusType, to: TradeStatusType) -> Self {
        Self {
            expected_status: from,
            new_status: to,
            deposit_tx_ref: None,
            settle_tx_ref: None,
            verification_error: None,
        }
    }

    pub fn with_deposit_tx_ref<S: Into<String>>(mut self, tx_ref: S) -> Self {
        self.deposit_tx_ref = Some(tx_ref.into());
        self
    }

    pub fn with_settle_tx_ref<S: Into<String>>(mut self, tx_ref: S) -> Self {
        self.settle_tx_ref = Some(tx_ref.into());
        self
    }

    pub fn with_verification_error(mut self, error: Option<String>) -> Self {
        self.verification_error = Some(error);
        self
    }
}

//--------------------------------------      TradeEvent       ---------------------------------------------------------
/// An entry in the trade audit trail.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TradeEvent {
    pub id: i64,
    pub trade_id: TradeId,
    pub from_status: Option<TradeStatusType>,
    pub to_status: TradeStatusType,
    pub actor: Address,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTradeEvent {
    pub trade_id: TradeId,
    pub from_status: Option<TradeStatusType>,
    pub to_status: TradeStatusType,
    pub actor: Address,
    pub note: Option<String>,
}

impl NewTradeEvent {
    pub fn new(trade_id: TradeId, from: Option<TradeStatusType>, to: TradeStatusType, actor: Address) -> Self {
        Self { trade_id, from_status: from, to_status: to, actor, note: None }
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

//--------------------------------------         Seller        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Seller {
    pub address: Address,
    pub registered_at: DateTime<Utc>,
}

//--------------------------------------    ConversationId     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ConversationId(pub String);

/// Separator between the two addresses of an address-pair conversation id.
pub const CONVERSATION_ID_SEPARATOR: char = ':';
const TRADE_CONVERSATION_PREFIX: &str = "trade_";

impl ConversationId {
    pub fn for_trade(trade_id: &TradeId) -> Self {
        Self(format!("{TRADE_CONVERSATION_PREFIX}{}", trade_id.as_str()))
    }

    /// The deterministic id of the direct conversation between two addresses.
    ///
    /// Both addresses are lower-cased and sorted, so the result does not depend on argument order or letter case.
    pub fn for_pair(a: &str, b: &str) -> Self {
        let mut pair = [a.trim().to_lowercase(), b.trim().to_lowercase()];
        pair.sort();
        Self(format!("{}{CONVERSATION_ID_SEPARATOR}{}", pair[0], pair[1]))
    }

    /// The trade id, if this is a trade-scoped conversation id.
    pub fn trade_id(&self) -> Option<TradeId> {
        self.0
            .strip_prefix(TRADE_CONVERSATION_PREFIX)
            .filter(|s| !s.is_empty() && !s.contains(CONVERSATION_ID_SEPARATOR))
            .map(|s| TradeId(s.to_string()))
    }

    /// The two addresses of an address-pair conversation id, in sorted order.
    pub fn pair_members(&self) -> Option<(Address, Address)> {
        if self.trade_id().is_some() {
            return None;
        }
        let (a, b) = self.0.split_once(CONVERSATION_ID_SEPARATOR)?;
        if a.is_empty() || b.is_empty() || b.contains(CONVERSATION_ID_SEPARATOR) {
            return None;
        }
        Some((Address::new(a), Address::new(b)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------      Conversation     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: ConversationId,
    pub buyer_address: Address,
    pub seller_address: Address,
    pub trade_id: Option<TradeId>,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
}

impl Conversation {
    pub fn is_participant(&self, address: &Address) -> bool {
        &self.buyer_address == address || &self.seller_address == address
    }

    /// The other participant, if `address` is one of the two participants.
    pub fn counterparty_of(&self, address: &Address) -> Option<&Address> {
        if &self.buyer_address == address {
            Some(&self.seller_address)
        } else if &self.seller_address == address {
            Some(&self.buyer_address)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub conversation_id: ConversationId,
    pub buyer_address: Address,
    pub seller_address: Address,
    pub trade_id: Option<TradeId>,
}

impl NewConversation {
    pub fn new(conversation_id: ConversationId, buyer_address: Address, seller_address: Address) -> Self {
        let trade_id = conversation_id.trade_id();
        Self { conversation_id, buyer_address, seller_address, trade_id }
    }
}

//--------------------------------------        Message        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub sender_address: Address,
    pub recipient_address: Address,
    /// Empty when the message is encrypted
    pub plain_text: String,
    pub is_encrypted: bool,
    pub encrypted_payload: Option<String>,
    pub encryption_metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// The content of a message. Encrypted payloads are opaque to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Plain { text: String },
    Encrypted { payload: String, metadata: String },
}

impl MessageBody {
    pub fn plain<S: Into<String>>(text: S) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageBody::Plain { text } => text.trim().is_empty(),
            MessageBody::Encrypted { payload, .. } => payload.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MessageBody::Plain { text } => text.len(),
            MessageBody::Encrypted { payload, metadata } => payload.len() + metadata.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_address: Address,
    pub recipient_address: Address,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(conversation_id: ConversationId, sender: Address, recipient: Address, body: MessageBody) -> Self {
        Self { conversation_id, sender_address: sender, recipient_address: recipient, body, created_at: Utc::now() }
    }
}

/// The order in which message history is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}
