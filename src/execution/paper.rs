use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;

use crate::execution::{Broker, TradeLedger};
use crate::models::{Event, OrderIntent, OrderStatus, OrderUpdate, Side};
use crate::Result;

/// Simulated broker: fills market orders instantly at the intent's price hint
///
/// Tracks quote/base balances and rejects buys the cash can't cover, so the
/// strategy sees the same rejection path the live venue produces. Emits the
/// full Submitted → Filled/Rejected lifecycle plus a `ClosedTrade` per round
/// trip.
pub struct PaperBroker {
    events: UnboundedSender<Event>,
    taker_fee_rate: f64,
    quote_asset: String,
    base_asset: String,
    quote_balance: f64,
    base_balance: f64,
    ledger: TradeLedger,
    order_seq: u64,
}

impl PaperBroker {
    pub fn new(
        events: UnboundedSender<Event>,
        symbol: impl Into<String>,
        quote_asset: impl Into<String>,
        base_asset: impl Into<String>,
        starting_cash: f64,
    ) -> Self {
        Self {
            events,
            taker_fee_rate: 0.001,
            quote_asset: quote_asset.into(),
            base_asset: base_asset.into(),
            quote_balance: starting_cash,
            base_balance: 0.0,
            ledger: TradeLedger::new(symbol),
            order_seq: 0,
        }
    }

    pub fn with_taker_fee_rate(mut self, rate: f64) -> Self {
        self.taker_fee_rate = rate;
        self
    }

    fn send(&self, event: Event) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| "event channel closed".into())
    }

    fn update(
        &self,
        intent: &OrderIntent,
        exchange_id: &str,
        status: OrderStatus,
        price: f64,
        filled_qty: f64,
        fee: f64,
    ) -> OrderUpdate {
        OrderUpdate {
            client_id: intent.client_id,
            exchange_id: Some(exchange_id.to_string()),
            side: intent.side,
            status,
            price,
            filled_qty,
            cost: price * filled_qty,
            fee,
        }
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn submit(&mut self, intent: &OrderIntent) -> Result<()> {
        let price = intent
            .price_hint
            .ok_or("paper broker needs a price hint to fill at")?;

        self.order_seq += 1;
        let exchange_id = format!("paper-{}", self.order_seq);

        self.send(Event::Order(self.update(
            intent,
            &exchange_id,
            OrderStatus::Submitted,
            0.0,
            0.0,
            0.0,
        )))?;

        let cost = price * intent.quantity;
        let fee = cost * self.taker_fee_rate;

        match intent.side {
            Side::Buy => {
                if cost + fee > self.quote_balance {
                    tracing::warn!(
                        "paper buy for {:.2} exceeds cash {:.2}, rejecting",
                        cost + fee,
                        self.quote_balance
                    );
                    return self.send(Event::Order(self.update(
                        intent,
                        &exchange_id,
                        OrderStatus::Rejected,
                        0.0,
                        0.0,
                        0.0,
                    )));
                }
                self.quote_balance -= cost + fee;
                self.base_balance += intent.quantity;
            }
            Side::Sell => {
                if intent.quantity > self.base_balance {
                    tracing::warn!(
                        "paper sell of {:.8} exceeds holdings {:.8}, rejecting",
                        intent.quantity,
                        self.base_balance
                    );
                    return self.send(Event::Order(self.update(
                        intent,
                        &exchange_id,
                        OrderStatus::Rejected,
                        0.0,
                        0.0,
                        0.0,
                    )));
                }
                self.quote_balance += cost - fee;
                self.base_balance -= intent.quantity;
            }
        }

        self.send(Event::Order(self.update(
            intent,
            &exchange_id,
            OrderStatus::Filled,
            price,
            intent.quantity,
            fee,
        )))?;

        if let Some(trade) =
            self.ledger
                .record_fill(intent.side, intent.quantity, price, fee, Utc::now())
        {
            self.send(Event::Trade(trade))?;
        }

        Ok(())
    }

    async fn wallet_balance(&self, asset: &str) -> Result<(f64, f64)> {
        if asset == self.quote_asset {
            Ok((self.quote_balance, self.quote_balance))
        } else if asset == self.base_asset {
            Ok((self.base_balance, self.base_balance))
        } else {
            Err(format!("no funding history for wallet {}", asset).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn intent(side: Side, quantity: f64, price: f64) -> OrderIntent {
        OrderIntent {
            client_id: Uuid::new_v4(),
            symbol: "BTC-USDT".to_string(),
            side,
            quantity,
            order_type: OrderType::Market,
            price_hint: Some(price),
        }
    }

    fn broker(events: UnboundedSender<Event>, cash: f64) -> PaperBroker {
        PaperBroker::new(events, "BTC-USDT", "USDT", "BTC", cash).with_taker_fee_rate(0.001)
    }

    #[tokio::test]
    async fn test_buy_emits_submitted_then_filled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut broker = broker(tx, 10_000.0);

        let buy = intent(Side::Buy, 1.0, 100.0);
        broker.submit(&buy).await.unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();

        match (first, second) {
            (Event::Order(a), Event::Order(b)) => {
                assert_eq!(a.status, OrderStatus::Submitted);
                assert_eq!(b.status, OrderStatus::Filled);
                assert_eq!(b.client_id, buy.client_id);
                assert_eq!(b.price, 100.0);
                assert_eq!(b.filled_qty, 1.0);
                assert!((b.fee - 0.1).abs() < 1e-9); // 100 * 0.001
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_balances_move_on_fills() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut broker = broker(tx, 1_000.0);

        broker.submit(&intent(Side::Buy, 2.0, 100.0)).await.unwrap();
        // 1000 - 200 - 0.2 fee
        assert!((broker.wallet_balance("USDT").await.unwrap().0 - 799.8).abs() < 1e-9);
        assert_eq!(broker.wallet_balance("BTC").await.unwrap().0, 2.0);

        broker.submit(&intent(Side::Sell, 2.0, 110.0)).await.unwrap();
        // 799.8 + 220 - 0.22 fee
        assert!((broker.wallet_balance("USDT").await.unwrap().0 - 1019.58).abs() < 1e-9);
        assert_eq!(broker.wallet_balance("BTC").await.unwrap().0, 0.0);
    }

    #[tokio::test]
    async fn test_round_trip_emits_closed_trade() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut broker = broker(tx, 10_000.0);

        broker.submit(&intent(Side::Buy, 1.0, 100.0)).await.unwrap();
        broker.submit(&intent(Side::Sell, 1.0, 110.0)).await.unwrap();

        let mut closed = None;
        while let Ok(event) = rx.try_recv() {
            if let Event::Trade(trade) = event {
                closed = Some(trade);
            }
        }

        let trade = closed.expect("round trip should close a trade");
        assert_eq!(trade.gross_pnl, 10.0);
        // minus 0.1 entry fee and 0.11 exit fee
        assert!((trade.net_pnl - 9.79).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_buy_beyond_cash_is_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut broker = broker(tx, 50.0);

        broker.submit(&intent(Side::Buy, 1.0, 100.0)).await.unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::Order(update) = event {
                statuses.push(update.status);
            }
        }

        assert_eq!(statuses, vec![OrderStatus::Submitted, OrderStatus::Rejected]);
        assert_eq!(broker.wallet_balance("USDT").await.unwrap().0, 50.0);
    }

    #[tokio::test]
    async fn test_sell_beyond_holdings_is_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut broker = broker(tx, 1_000.0);

        broker.submit(&intent(Side::Sell, 1.0, 100.0)).await.unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::Order(update) = event {
                statuses.push(update.status);
            }
        }

        assert_eq!(statuses, vec![OrderStatus::Submitted, OrderStatus::Rejected]);
    }

    #[tokio::test]
    async fn test_unfunded_wallet_is_an_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let broker = broker(tx, 1_000.0);

        let result = broker.wallet_balance("LTC").await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("no funding history"));
    }
}
