use chrono::Utc;
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{Address, NewTrade, NewTradeEvent, Trade, TradeEvent, TradeId, TradeStatusType, TradeUpdate},
};

const TRADE_COLUMNS: &str = "trade_id, item_name, description, price, asset, buyer_address, seller_address, \
                             proposed_by, escrow_address, status, deposit_tx_ref, settle_tx_ref, verification_error, \
                             created_at, updated_at, accepted_at, deposit_submitted_at, deposit_confirmed_at, \
                             settle_requested_at, settled_at, closed_at";

/// Inserts a new trade in `Pending` status. This is not atomic. Embed the call in a transaction if the creation event
/// must be written alongside it.
pub async fn insert_trade(trade: NewTrade, conn: &mut SqliteConnection) -> Result<Trade, SqliteDatabaseError> {
    let sql = format!(
        "INSERT INTO trades (trade_id, item_name, description, price, asset, buyer_address, seller_address, \
         proposed_by, escrow_address, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
         $10, $11, $11) RETURNING {TRADE_COLUMNS}"
    );
    let trade_id = trade.trade_id.clone();
    let result = sqlx::query_as::<_, Trade>(&sql)
        .bind(trade.trade_id)
        .bind(trade.item_name)
        .bind(trade.description)
        .bind(trade.price)
        .bind(trade.asset)
        .bind(trade.buyer_address)
        .bind(trade.seller_address)
        .bind(trade.proposed_by)
        .bind(trade.escrow_address)
        .bind(TradeStatusType::Pending)
        .bind(trade.created_at)
        .fetch_one(conn)
        .await;
    match result {
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(SqliteDatabaseError::Duplicate(format!("Trade {trade_id} already exists")))
        },
        Err(e) => Err(e.into()),
        Ok(trade) => Ok(trade),
    }
}

pub async fn fetch_trade(trade_id: &TradeId, conn: &mut SqliteConnection) -> Result<Option<Trade>, SqliteDatabaseError> {
    let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = $1");
    let trade = sqlx::query_as::<_, Trade>(&sql).bind(trade_id).fetch_optional(conn).await?;
    Ok(trade)
}

pub async fn fetch_trades_for_address(
    address: &Address,
    conn: &mut SqliteConnection,
) -> Result<Vec<Trade>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {TRADE_COLUMNS} FROM trades WHERE buyer_address = $1 OR seller_address = $1 ORDER BY created_at DESC"
    );
    let trades = sqlx::query_as::<_, Trade>(&sql).bind(address).fetch_all(conn).await?;
    trace!("🗃️ Found {} trades for {address}", trades.len());
    Ok(trades)
}

pub async fn fetch_trades_with_status(
    status: TradeStatusType,
    conn: &mut SqliteConnection,
) -> Result<Vec<Trade>, SqliteDatabaseError> {
    let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE status = $1 ORDER BY updated_at ASC");
    let trades = sqlx::query_as::<_, Trade>(&sql).bind(status).fetch_all(conn).await?;
    Ok(trades)
}

pub async fn fetch_trade_by_deposit_ref(
    tx_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Trade>, SqliteDatabaseError> {
    let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE deposit_tx_ref = $1 LIMIT 1");
    let trade = sqlx::query_as::<_, Trade>(&sql).bind(tx_ref).fetch_optional(conn).await?;
    Ok(trade)
}

/// The column recording when a trade entered `status`. Entry into `DepositPending` is tracked through the deposit
/// reference instead, since resubmissions refresh it without a status change.
fn timestamp_column(status: TradeStatusType) -> Option<&'static str> {
    match status {
        TradeStatusType::Accepted => Some("accepted_at"),
        TradeStatusType::DepositConfirmed => Some("deposit_confirmed_at"),
        TradeStatusType::SettlePending => Some("settle_requested_at"),
        TradeStatusType::Success => Some("settled_at"),
        _ => None,
    }
}

/// Applies a compare-and-set update. Returns `None` if no trade with the given id has the expected status.
pub async fn update_trade(
    trade_id: &TradeId,
    update: TradeUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Trade>, SqliteDatabaseError> {
    let now = Utc::now();
    let mut builder = QueryBuilder::new("UPDATE trades SET updated_at = ");
    builder.push_bind(now);
    builder.push(", status = ");
    builder.push_bind(update.new_status);
    if update.new_status != update.expected_status {
        if let Some(column) = timestamp_column(update.new_status) {
            builder.push(format!(", {column} = "));
            builder.push_bind(now);
        }
        if update.new_status.is_terminal() {
            builder.push(", closed_at = ");
            builder.push_bind(now);
        }
    }
    if let Some(tx_ref) = update.deposit_tx_ref {
        builder.push(", deposit_tx_ref = ");
        builder.push_bind(tx_ref);
        builder.push(", deposit_submitted_at = ");
        builder.push_bind(now);
    }
    if let Some(tx_ref) = update.settle_tx_ref {
        builder.push(", settle_tx_ref = ");
        builder.push_bind(tx_ref);
    }
    if let Some(error) = update.verification_error {
        builder.push(", verification_error = ");
        builder.push_bind(error);
    }
    builder.push(" WHERE trade_id = ");
    builder.push_bind(trade_id.as_str());
    builder.push(" AND status = ");
    builder.push_bind(update.expected_status);
    builder.push(format!(" RETURNING {TRADE_COLUMNS}"));
    trace!("🗃️ Executing query: {}", builder.sql());
    let trade = builder.build_query_as::<Trade>().fetch_optional(conn).await?;
    Ok(trade)
}

pub async fn insert_event(event: NewTradeEvent, conn: &mut SqliteConnection) -> Result<TradeEvent, SqliteDatabaseError> {
    let event = sqlx::query_as::<_, TradeEvent>(
        r#"
            INSERT INTO trade_events (trade_id, from_status, to_status, actor, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, trade_id, from_status, to_status, actor, note, created_at
        "#,
    )
    .bind(event.trade_id)
    .bind(event.from_status)
    .bind(event.to_status)
    .bind(event.actor)
    .bind(event.note)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(event)
}

pub async fn fetch_events(trade_id: &TradeId, conn: &mut SqliteConnection) -> Result<Vec<TradeEvent>, SqliteDatabaseError> {
    let events = sqlx::query_as::<_, TradeEvent>(
        r#"
            SELECT id, trade_id, from_status, to_status, actor, note, created_at
            FROM trade_events
            WHERE trade_id = $1
            ORDER BY id ASC
        "#,
    )
    .bind(trade_id)
    .fetch_all(conn)
    .await?;
    Ok(events)
}
