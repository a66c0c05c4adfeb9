use chrono::{Duration, Utc};
use crossbot::config::StrategyConfig;
use crossbot::execution::{Broker, PaperBroker};
use crossbot::models::{Bar, Event, FeedStatus};
use crossbot::strategy::{PositionState, StrategyController};
use tokio::sync::mpsc;

fn bar(index: i64, close: f64) -> Bar {
    Bar {
        symbol: "BTC-USDT".to_string(),
        timestamp: Utc::now() + Duration::minutes(index),
        open: close,
        high: close * 1.001,
        low: close * 0.999,
        close,
        volume: 25.0,
    }
}

/// Feed one bar through the controller and route any resulting intent to the
/// broker, then drain the broker's events back into the controller — the
/// same single-threaded dispatch the binary's run loop performs.
async fn step(
    controller: &mut StrategyController,
    broker: &mut PaperBroker,
    rx: &mut mpsc::UnboundedReceiver<Event>,
    bar: Bar,
) -> Vec<Event> {
    let mut seen = Vec::new();

    if let Some(intent) = controller.handle_event(&Event::Bar(bar)) {
        broker.submit(&intent).await.unwrap();
    }
    while let Ok(event) = rx.try_recv() {
        controller.handle_event(&event);
        seen.push(event);
    }

    seen
}

#[tokio::test]
async fn test_full_round_trip_on_paper() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut broker = PaperBroker::new(tx, "BTC-USDT", "USDT", "BTC", 10_000.0);
    let mut controller = StrategyController::new("BTC-USDT", StrategyConfig::default());

    // Backfill bars arrive before the feed is live: no trading
    controller.handle_event(&Event::Data(FeedStatus::Backfilling));
    for i in 0..25 {
        let events = step(&mut controller, &mut broker, &mut rx, bar(i, 100.0 + i as f64)).await;
        assert!(events.is_empty(), "no orders against backfill data");
    }
    assert_eq!(controller.position(), PositionState::Flat);

    controller.handle_event(&Event::Data(FeedStatus::Live));

    // First live bar buys and the paper broker fills instantly
    let events = step(&mut controller, &mut broker, &mut rx, bar(25, 126.0)).await;
    assert!(!events.is_empty());
    assert!(matches!(controller.position(), PositionState::Long { .. }));

    // Hold for one bar, sell on the second
    let events = step(&mut controller, &mut broker, &mut rx, bar(26, 127.0)).await;
    assert!(events.is_empty(), "one bar held is not enough to sell");

    let events = step(&mut controller, &mut broker, &mut rx, bar(27, 128.0)).await;
    let trade = events
        .iter()
        .find_map(|e| match e {
            Event::Trade(trade) => Some(trade.clone()),
            _ => None,
        })
        .expect("sell fill closes the round trip");

    assert_eq!(controller.position(), PositionState::Flat);
    assert!(trade.gross_pnl > 0.0, "bought at 126, sold at 128");
    assert!(trade.net_pnl < trade.gross_pnl, "fees come out of the net");

    // Flat again: the cycle restarts on the next bar
    step(&mut controller, &mut broker, &mut rx, bar(28, 129.0)).await;
    assert!(matches!(controller.position(), PositionState::Long { .. }));
}

#[tokio::test]
async fn test_disconnect_pauses_trading_until_live_again() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut broker = PaperBroker::new(tx, "BTC-USDT", "USDT", "BTC", 10_000.0);
    let mut controller = StrategyController::new("BTC-USDT", StrategyConfig::default());

    controller.handle_event(&Event::Data(FeedStatus::Live));
    step(&mut controller, &mut broker, &mut rx, bar(0, 100.0)).await;
    assert!(matches!(controller.position(), PositionState::Long { .. }));

    // Feed drops mid-hold; bars keep arriving but nothing trades
    controller.handle_event(&Event::Data(FeedStatus::Disconnected));
    for i in 1..5 {
        let events = step(&mut controller, &mut broker, &mut rx, bar(i, 101.0)).await;
        assert!(events.is_empty());
    }
    assert!(matches!(controller.position(), PositionState::Long { .. }));

    // Recovery: hold period long since served, the long is sold
    controller.handle_event(&Event::Data(FeedStatus::Live));
    step(&mut controller, &mut broker, &mut rx, bar(5, 102.0)).await;
    assert_eq!(controller.position(), PositionState::Flat);
}

#[tokio::test]
async fn test_rejected_buy_leaves_the_bot_flat_and_retrying() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    // Not enough cash for even one trade: every buy is rejected
    let mut broker = PaperBroker::new(tx, "BTC-USDT", "USDT", "BTC", 0.000001);
    let mut controller = StrategyController::new("BTC-USDT", StrategyConfig::default());

    controller.handle_event(&Event::Data(FeedStatus::Live));

    for i in 0..3 {
        let events = step(&mut controller, &mut broker, &mut rx, bar(i, 100.0)).await;
        // Submitted + Rejected each time; the controller stays flat and
        // tries again on the next bar
        assert_eq!(events.len(), 2);
        assert_eq!(controller.position(), PositionState::Flat);
        assert!(!controller.has_pending_order());
    }
}

#[tokio::test]
async fn test_wallets_visible_through_the_broker_seam() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let broker = PaperBroker::new(tx, "BTC-USDT", "USDT", "BTC", 5_000.0);

    assert_eq!(broker.wallet_balance("USDT").await.unwrap(), (5_000.0, 5_000.0));
    assert_eq!(broker.wallet_balance("BTC").await.unwrap(), (0.0, 0.0));
    assert!(broker.wallet_balance("DOGE").await.is_err());
}
