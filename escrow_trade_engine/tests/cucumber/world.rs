use std::fmt::Debug;

use cucumber::World;
use escrow_trade_engine::{
    db_types::{Address, ConversationId, TradeId},
    TradeFlowError,
};

use crate::support::{buyer, mallory, seller, TestApi, TestSystem};

#[derive(Default, World)]
pub struct EscrowWorld {
    pub system: Option<TestSystem>,
    pub trade_id: Option<TradeId>,
    pub last_error: Option<TradeFlowError>,
}

impl Debug for EscrowWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowWorld")
            .field("db", &self.system.as_ref().map(|s| s.url.as_str()))
            .field("trade_id", &self.trade_id)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl EscrowWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("Escrow system not initialised")
    }

    pub fn api(&self) -> &TestApi {
        &self.system().api
    }

    pub fn trade_id(&self) -> TradeId {
        self.trade_id.clone().expect("No trade has been proposed yet")
    }

    pub fn direct_conversation(&self) -> ConversationId {
        ConversationId::for_pair(buyer().as_str(), seller().as_str())
    }

    /// Records the outcome of a step that is allowed to fail.
    pub fn record<T>(&mut self, result: Result<T, TradeFlowError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}

pub fn party(name: &str) -> Address {
    match name {
        "buyer" => buyer(),
        "seller" => seller(),
        "mallory" => mallory(),
        other => Address::new(other),
    }
}

pub fn error_kind(e: &TradeFlowError) -> &'static str {
    match e {
        TradeFlowError::ValidationError(_) => "ValidationError",
        TradeFlowError::Forbidden(_) => "Forbidden",
        TradeFlowError::InvalidState(_) => "InvalidState",
        TradeFlowError::NotFound(_) => "NotFound",
        TradeFlowError::DatabaseError(_) => "DatabaseError",
    }
}
