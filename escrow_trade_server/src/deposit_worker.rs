use std::time::Duration;

use escrow_trade_engine::{
    db_types::TradeStatusType,
    ledger::{HttpLedgerOracle, HttpReleaseEndpoint},
    trade_objects::TradeResult,
    SqliteDatabase,
    TradeFlowApi,
};
use log::*;
use tokio::task::JoinHandle;

pub type ServerTradeApi = TradeFlowApi<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>;

/// Starts the deposit worker, which re-verifies every trade waiting on a deposit at a fixed interval. Do not await the
/// returned JoinHandle, as it will run indefinitely.
///
/// A trade leaves the sweep as soon as it leaves `DEPOSIT_PENDING`, whether the worker or a client request moved it.
pub fn start_deposit_worker(api: ServerTradeApi, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("🕰️ Deposit worker started. Checking pending deposits every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running pending deposit job");
            match api.verify_pending_deposits().await {
                Ok(results) if results.is_empty() => trace!("🕰️ No deposits are pending"),
                Ok(results) => {
                    let confirmed = confirmed_count(&results);
                    info!("🕰️ Checked {} pending deposits. {confirmed} confirmed", results.len());
                    debug!("🕰️ Still pending: {}", pending_list(&results));
                },
                Err(e) => {
                    error!("🕰️ Error running pending deposit job: {e}");
                },
            }
        }
    })
}

fn confirmed_count(results: &[TradeResult]) -> usize {
    results.iter().filter(|r| r.trade.status == TradeStatusType::DepositConfirmed).count()
}

fn pending_list(results: &[TradeResult]) -> String {
    results
        .iter()
        .filter(|r| r.trade.status == TradeStatusType::DepositPending)
        .map(|r| {
            let reason = r.advisory.as_ref().map(|a| a.to_string()).unwrap_or_default();
            format!("[{}] ref: {} {reason}", r.trade.trade_id, r.trade.deposit_tx_ref.as_deref().unwrap_or("-"))
        })
        .collect::<Vec<String>>()
        .join(", ")
}
