use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use trade_ledger::db::init_db;
use trade_ledger::{
    Aggregation, Decimal, Ledger, ProcessOutcome, Repository, Symbol, TimeMs,
};

async fn setup_ledger() -> (Ledger, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    (Ledger::new(repo), temp_dir)
}

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 2, 6, 25, 55).unwrap()
}

fn trade(order_id: &str, symbol: &str, side: &str, qty: &str, price: &str, hours: i64) -> Vec<u8> {
    trade_with_fees(order_id, symbol, side, qty, price, "0", hours)
}

fn trade_with_fees(
    order_id: &str,
    symbol: &str,
    side: &str,
    qty: &str,
    price: &str,
    fees: &str,
    hours: i64,
) -> Vec<u8> {
    let executed_at = base_time() + Duration::hours(hours);
    serde_json::to_vec(&json!({
        "event_type": "TRADE_DETECTED",
        "source": "robinhood",
        "timestamp": executed_at.to_rfc3339(),
        "data": {
            "order_id": order_id,
            "symbol": symbol,
            "side": side,
            "quantity": qty,
            "average_price": price,
            "fees": fees,
            "state": "filled",
            "executed_at": executed_at.to_rfc3339(),
            "created_at": executed_at.to_rfc3339(),
        }
    }))
    .unwrap()
}

async fn process_all(ledger: &Ledger, payloads: &[Vec<u8>]) -> Vec<ProcessOutcome> {
    let mut outcomes = Vec::new();
    for payload in payloads {
        outcomes.push(ledger.process(payload).await.expect("process failed"));
    }
    outcomes
}

fn aggregation(outcome: &ProcessOutcome) -> &Aggregation {
    match outcome {
        ProcessOutcome::Recorded { aggregation, .. } => aggregation,
        other => panic!("expected Recorded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_redelivered_execution_is_skipped() {
    let (ledger, _temp) = setup_ledger().await;
    let payload = trade("order-1", "AAPL", "buy", "10", "100", 0);

    let first = ledger.process(&payload).await.unwrap();
    assert!(matches!(aggregation(&first), Aggregation::Opened { .. }));

    let second = ledger.process(&payload).await.unwrap();
    assert!(matches!(second, ProcessOutcome::Duplicate { .. }));

    let repo = ledger.repo();
    assert_eq!(repo.count_executions().await.unwrap(), 1);
    let position = repo.get_position(&Symbol::new("AAPL")).await.unwrap().unwrap();
    assert_eq!(position.quantity, d("10"));
    assert_eq!(position.version, 0);
}

#[tokio::test]
async fn test_buys_average_entry_price() {
    let (ledger, _temp) = setup_ledger().await;
    let outcomes = process_all(
        &ledger,
        &[
            trade("order-1", "AAPL", "BUY", "10", "100", 0),
            trade("order-2", "AAPL", "Buy", "10", "120", 1),
        ],
    )
    .await;
    assert!(matches!(aggregation(&outcomes[1]), Aggregation::Increased { .. }));

    let position = ledger
        .repo()
        .get_position(&Symbol::new("AAPL"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.quantity, d("20"));
    assert_eq!(position.entry_price, d("110"));
    assert_eq!(position.entry_date, TimeMs::from(base_time()));

    let linked = ledger
        .repo()
        .executions_for_position(position.id)
        .await
        .unwrap();
    assert_eq!(linked.len(), 2);
}

#[tokio::test]
async fn test_partial_sell_keeps_entry_price() {
    let (ledger, _temp) = setup_ledger().await;
    let outcomes = process_all(
        &ledger,
        &[
            trade("order-1", "AAPL", "buy", "10", "100", 0),
            trade("order-2", "AAPL", "sell", "4", "110", 1),
        ],
    )
    .await;
    assert!(matches!(aggregation(&outcomes[1]), Aggregation::Reduced { .. }));

    let repo = ledger.repo();
    let position = repo.get_position(&Symbol::new("AAPL")).await.unwrap().unwrap();
    assert_eq!(position.quantity, d("6"));
    assert_eq!(position.entry_price, d("100"));
    assert!(repo.all_trade_history(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exact_sell_closes_cycle() {
    let (ledger, _temp) = setup_ledger().await;
    let outcomes = process_all(
        &ledger,
        &[
            trade("order-1", "AAPL", "buy", "10", "100", 0),
            trade("order-2", "AAPL", "sell", "10", "110", 50),
        ],
    )
    .await;
    assert!(matches!(aggregation(&outcomes[1]), Aggregation::Closed { .. }));

    let repo = ledger.repo();
    assert!(repo.get_position(&Symbol::new("AAPL")).await.unwrap().is_none());

    let history = repo.all_trade_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    let cycle = &history[0].cycle;
    assert_eq!(cycle.quantity, d("10"));
    assert_eq!(cycle.entry_price, d("100"));
    assert_eq!(cycle.exit_price, d("110"));
    assert_eq!(cycle.total_cost, d("1000"));
    assert_eq!(cycle.realized_pnl, d("100"));
    assert_eq!(cycle.realized_pnl_pct, d("10"));
    assert_eq!(cycle.holding_period_hours, 50);

    let linked = repo
        .executions_for_trade_history(history[0].id)
        .await
        .unwrap();
    assert_eq!(linked.len(), 2);
}

#[tokio::test]
async fn test_fractional_buys_accumulate_then_close() {
    let (ledger, _temp) = setup_ledger().await;
    process_all(
        &ledger,
        &[
            trade("order-1", "SLV", "buy", "3", "73.10", 0),
            trade("order-2", "SLV", "buy", "0.41099", "69.88", 12),
            trade("order-3", "SLV", "buy", "1.48842", "67.19", 36),
        ],
    )
    .await;

    let repo = ledger.repo();
    let position = repo.get_position(&Symbol::new("SLV")).await.unwrap().unwrap();
    assert_eq!(position.quantity, d("4.89941"));

    let outcome = ledger
        .process(&trade("order-4", "SLV", "sell", "4.89941", "71.64", 60))
        .await
        .unwrap();
    assert!(matches!(aggregation(&outcome), Aggregation::Closed { .. }));

    assert!(repo.get_position(&Symbol::new("SLV")).await.unwrap().is_none());
    let history = repo
        .trade_history_by_symbol(&Symbol::new("SLV"), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].cycle.quantity, d("4.89941"));
    assert_eq!(history[0].cycle.total_cost, d("348.026921"));
    assert_eq!(history[0].cycle.realized_pnl, d("2.9668114"));
}

#[tokio::test]
async fn test_sell_without_position_is_noop() {
    let (ledger, _temp) = setup_ledger().await;
    let outcome = ledger
        .process(&trade("order-1", "AAPL", "sell", "5", "100", 0))
        .await
        .unwrap();
    assert_eq!(aggregation(&outcome), &Aggregation::SellWithoutPosition);

    let repo = ledger.repo();
    assert_eq!(repo.count_executions().await.unwrap(), 1);
    assert!(repo.list_positions().await.unwrap().is_empty());
    assert!(repo.all_trade_history(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sell_before_buy_leaves_position_open() {
    let (ledger, _temp) = setup_ledger().await;
    // Sell is consumed first even though it executed after the buy.
    process_all(
        &ledger,
        &[
            trade("order-2", "AAPL", "sell", "10", "110", 5),
            trade("order-1", "AAPL", "buy", "10", "100", 0),
        ],
    )
    .await;

    let repo = ledger.repo();
    let position = repo.get_position(&Symbol::new("AAPL")).await.unwrap().unwrap();
    assert_eq!(position.quantity, d("10"));
    assert!(repo.all_trade_history(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_cycles_each_archived() {
    let (ledger, _temp) = setup_ledger().await;
    let repo = ledger.repo().clone();
    let symbol = Symbol::new("AAPL");

    for cycle in 0..3 {
        let base = cycle * 10;
        ledger
            .process(&trade(&format!("buy-{}", cycle), "AAPL", "buy", "2", "50", base))
            .await
            .unwrap();
        assert!(repo.get_position(&symbol).await.unwrap().is_some());

        ledger
            .process(&trade(&format!("sell-{}", cycle), "AAPL", "sell", "2", "55", base + 1))
            .await
            .unwrap();
        assert!(repo.get_position(&symbol).await.unwrap().is_none());
    }

    let history = repo.trade_history_by_symbol(&symbol, 10).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|h| h.cycle.realized_pnl == d("10")));
    assert!(history.iter().all(|h| h.cycle.quantity == d("2")));
}

#[tokio::test]
async fn test_oversell_closes_position() {
    let (ledger, _temp) = setup_ledger().await;
    process_all(
        &ledger,
        &[
            trade("order-1", "AAPL", "buy", "10", "100", 0),
            trade("order-2", "AAPL", "sell", "15", "110", 1),
        ],
    )
    .await;

    let repo = ledger.repo();
    assert!(repo.get_position(&Symbol::new("AAPL")).await.unwrap().is_none());
    let history = repo.all_trade_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].cycle.quantity, d("10"));
    assert_eq!(history[0].cycle.realized_pnl, d("650"));
}

#[tokio::test]
async fn test_fees_reduce_realized_pnl() {
    let (ledger, _temp) = setup_ledger().await;
    process_all(
        &ledger,
        &[
            trade_with_fees("order-1", "AAPL", "buy", "10", "100", "1", 0),
            trade_with_fees("order-2", "AAPL", "sell", "10", "110", "1.5", 1),
        ],
    )
    .await;

    let history = ledger.repo().all_trade_history(10).await.unwrap();
    assert_eq!(history[0].cycle.fees, d("2.5"));
    assert_eq!(history[0].cycle.realized_pnl, d("97.5"));
    assert_eq!(history[0].cycle.realized_pnl_pct, d("9.75"));
}

#[tokio::test]
async fn test_redelivered_closing_sell_after_close() {
    let (ledger, _temp) = setup_ledger().await;
    let sell = trade("order-2", "AAPL", "sell", "10", "110", 1);
    process_all(
        &ledger,
        &[trade("order-1", "AAPL", "buy", "10", "100", 0), sell.clone()],
    )
    .await;

    let outcome = ledger.process(&sell).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Duplicate { .. }));
    assert_eq!(ledger.repo().all_trade_history(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slv_trade_sequence() {
    let (ledger, _temp) = setup_ledger().await;
    process_all(
        &ledger,
        &[
            trade("order-1", "SLV", "BUY", "3.00000000", "67.10", 0),
            trade("order-2", "SLV", "SELL", "3.00000000", "68.93", 72),
            trade("order-3", "SLV", "BUY", "0.16017600", "72.67", 96),
            trade("order-4", "SLV", "SELL", "0.16017600", "72.63", 97),
            trade("order-5", "SLV", "BUY", "3.00000000", "73.10", 120),
            trade("order-6", "SLV", "BUY", "0.41099000", "69.88", 132),
            trade("order-7", "SLV", "BUY", "1.48842000", "67.19", 156),
            trade("order-8", "SLV", "SELL", "4.89941000", "71.64", 180),
        ],
    )
    .await;

    let repo = ledger.repo();
    assert!(repo.list_positions().await.unwrap().is_empty());

    let mut history = repo
        .trade_history_by_symbol(&Symbol::new("SLV"), 10)
        .await
        .unwrap();
    history.reverse();
    assert_eq!(history.len(), 3);

    assert_eq!(history[0].cycle.quantity, d("3"));
    assert_eq!(history[0].cycle.realized_pnl, d("5.49"));
    assert_eq!(history[0].cycle.holding_period_hours, 72);

    assert_eq!(history[1].cycle.quantity, d("0.160176"));
    assert_eq!(history[1].cycle.realized_pnl, d("-0.00640704"));
    assert_eq!(history[1].cycle.holding_period_hours, 1);

    assert_eq!(history[2].cycle.quantity, d("4.89941"));
    assert_eq!(history[2].cycle.realized_pnl, d("2.9668114"));
    assert_eq!(history[2].cycle.holding_period_hours, 60);

    let stats = repo.trade_stats().await.unwrap();
    assert_eq!(stats.total_trades, 3);
    assert_eq!(stats.winning_trades, 2);
    assert_eq!(stats.losing_trades, 1);
    assert_eq!(stats.total_pnl, d("8.45040436"));

    for h in &history {
        let linked = repo.executions_for_trade_history(h.id).await.unwrap();
        assert!(!linked.is_empty());
        assert!(linked
            .iter()
            .all(|r| r.position_id.map_or(true, |id| id == h.cycle.position_id)));
    }
    assert_eq!(repo.count_executions().await.unwrap(), 8);
}

#[tokio::test]
async fn test_symbols_are_independent() {
    let (ledger, _temp) = setup_ledger().await;
    process_all(
        &ledger,
        &[
            trade("order-1", "AAPL", "buy", "1", "150", 0),
            trade("order-2", "SLV", "buy", "5", "70", 1),
            trade("order-3", "AAPL", "sell", "1", "160", 2),
        ],
    )
    .await;

    let repo = ledger.repo();
    let positions = repo.list_positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].symbol, Symbol::new("SLV"));
    assert_eq!(
        repo.trade_history_by_symbol(&Symbol::new("AAPL"), 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_missing_execution_time_falls_back_to_now() {
    let (ledger, _temp) = setup_ledger().await;
    let payload = serde_json::to_vec(&json!({
        "event_type": "TRADE_DETECTED",
        "source": "robinhood",
        "data": {
            "order_id": "order-1",
            "symbol": "AAPL",
            "side": "buy",
            "quantity": "1",
            "average_price": "100",
            "executed_at": null,
        }
    }))
    .unwrap();

    let before = TimeMs::now();
    let outcome = ledger.process(&payload).await.unwrap();
    let after = TimeMs::now();

    let execution_id = match outcome {
        ProcessOutcome::Recorded { execution_id, .. } => execution_id,
        other => panic!("expected Recorded, got {:?}", other),
    };
    let record = ledger
        .repo()
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert!(record.execution.executed_at >= before);
    assert!(record.execution.executed_at <= after);
}

#[tokio::test]
async fn test_rejected_payloads_leave_no_trace() {
    let (ledger, _temp) = setup_ledger().await;
    for payload in [
        b"{not json".to_vec(),
        trade("order-1", "AAPL", "hold", "1", "100", 0),
        trade("order-2", "AAPL", "buy", "abc", "100", 0),
        trade("order-3", "AAPL", "buy", "-1", "100", 0),
    ] {
        let err = ledger.process(&payload).await.unwrap_err();
        assert!(err.is_rejection(), "unexpected error: {}", err);
    }
    assert_eq!(ledger.repo().count_executions().await.unwrap(), 0);
}
