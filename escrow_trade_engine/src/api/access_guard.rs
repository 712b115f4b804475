use log::*;

use crate::db_types::{Address, Conversation, Role, Trade};

/// Authorisation checks for trades and conversations.
///
/// Addresses are canonical, so every comparison here is case-insensitive with respect to what the caller typed.
pub struct AccessGuard;

impl AccessGuard {
    pub fn can_access_conversation(conversation: &Conversation, caller: &Address) -> bool {
        let allowed = conversation.is_participant(caller);
        if !allowed {
            warn!("🛂️ {caller} was denied access to conversation {}", conversation.conversation_id);
        }
        allowed
    }

    pub fn can_drive_trade(trade: &Trade, caller: &Address, required: Role) -> bool {
        let allowed = trade.address_for(required) == caller;
        if !allowed {
            warn!("🛂️ {caller} tried to act as the {required} of trade {}", trade.trade_id);
        }
        allowed
    }

    /// The caller's role in the trade, or `None` for a third party.
    pub fn role_of(trade: &Trade, caller: &Address) -> Option<Role> {
        if &trade.buyer_address == caller {
            Some(Role::Buyer)
        } else if &trade.seller_address == caller {
            Some(Role::Seller)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::{AssetAmount, ConversationId, TradeId, TradeStatusType};

    fn trade() -> Trade {
        let now = Utc::now();
        Trade {
            trade_id: TradeId("t1".into()),
            item_name: "Widget".into(),
            description: String::new(),
            price: AssetAmount::from(10),
            asset: "USDC".into(),
            buyer_address: Address::new("0xbuyer"),
            seller_address: Address::new("0xseller"),
            proposed_by: Role::Buyer,
            escrow_address: Address::new("0xescrow"),
            status: TradeStatusType::Pending,
            deposit_tx_ref: None,
            settle_tx_ref: None,
            verification_error: None,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            deposit_submitted_at: None,
            deposit_confirmed_at: None,
            settle_requested_at: None,
            settled_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn roles_are_resolved_case_insensitively() {
        let trade = trade();
        assert_eq!(AccessGuard::role_of(&trade, &Address::new("0xBUYER")), Some(Role::Buyer));
        assert_eq!(AccessGuard::role_of(&trade, &Address::new("0xSeller")), Some(Role::Seller));
        assert_eq!(AccessGuard::role_of(&trade, &Address::new("0xmallory")), None);
        assert!(AccessGuard::can_drive_trade(&trade, &Address::new("0xBuyer"), Role::Buyer));
        assert!(!AccessGuard::can_drive_trade(&trade, &Address::new("0xseller"), Role::Buyer));
        assert_eq!(trade.acceptor(), &Address::new("0xseller"));
    }

    #[test]
    fn third_parties_cannot_read_conversations() {
        let trade = trade();
        let conversation = Conversation {
            conversation_id: ConversationId::for_trade(&trade.trade_id),
            buyer_address: trade.buyer_address.clone(),
            seller_address: trade.seller_address.clone(),
            trade_id: Some(trade.trade_id.clone()),
            created_at: Utc::now(),
            last_message_at: None,
            last_message_preview: None,
        };
        assert!(AccessGuard::can_access_conversation(&conversation, &Address::new("0xBUYER")));
        assert!(AccessGuard::can_access_conversation(&conversation, &Address::new("0xseller")));
        assert!(!AccessGuard::can_access_conversation(&conversation, &Address::new("0xmallory")));
    }
}
