use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, Duration};

use crate::api::OkxClient;
use crate::execution::{Broker, TradeLedger};
use crate::models::{Event, OrderIntent, OrderStatus, OrderUpdate};
use crate::Result;

/// Exchange-backed broker
///
/// Submission places the order over REST and reports `Submitted`; a spawned
/// task then polls the order state up to a fixed budget and relays each
/// status change as an `OrderUpdate` event. The controller never retries or
/// cancels, so an order still unresolved when the budget runs out is
/// reported as locally `Canceled` to unblock the strategy.
pub struct LiveBroker {
    client: Arc<OkxClient>,
    events: UnboundedSender<Event>,
    ledger: Arc<Mutex<TradeLedger>>,
    poll_budget: u32,
    poll_interval: Duration,
}

impl LiveBroker {
    pub fn new(
        client: Arc<OkxClient>,
        events: UnboundedSender<Event>,
        symbol: impl Into<String>,
        poll_budget: u32,
    ) -> Self {
        Self {
            client,
            events,
            ledger: Arc::new(Mutex::new(TradeLedger::new(symbol))),
            poll_budget: poll_budget.max(1),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

fn update_for(
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

async fn poll_order(
    client: Arc<OkxClient>,
    events: UnboundedSender<Event>,
    ledger: Arc<Mutex<TradeLedger>>,
    intent: OrderIntent,
    exchange_id: String,
    poll_budget: u32,
    poll_interval: Duration,
) {
    let mut last_reported = OrderStatus::Submitted;

    for _ in 0..poll_budget {
        sleep(poll_interval).await;

        let snap = match client.order_state(&intent.symbol, &exchange_id).await {
            Ok(snap) => snap,
            Err(e) => {
                tracing::warn!("order {} state poll failed: {}", exchange_id, e);
                continue;
            }
        };

        if snap.status == last_reported {
            continue;
        }
        last_reported = snap.status;

        let sent = events.send(Event::Order(update_for(
            &intent,
            &exchange_id,
            snap.status,
            snap.avg_price,
            snap.filled_qty,
            snap.fee,
        )));
        if sent.is_err() {
            return; // runner gone
        }

        if snap.status == OrderStatus::Filled {
            let trade = ledger.lock().unwrap().record_fill(
                intent.side,
                snap.filled_qty,
                snap.avg_price,
                snap.fee,
                Utc::now(),
            );
            if let Some(trade) = trade {
                let _ = events.send(Event::Trade(trade));
            }
            return;
        }
        if snap.status.is_terminal() {
            return;
        }
    }

    tracing::warn!(
        "order {} unresolved after {} polls, reporting it canceled",
        exchange_id,
        poll_budget
    );
    let _ = events.send(Event::Order(update_for(
        &intent,
        &exchange_id,
        OrderStatus::Canceled,
        0.0,
        0.0,
        0.0,
    )));
}

#[async_trait]
impl Broker for LiveBroker {
    async fn submit(&mut self, intent: &OrderIntent) -> Result<()> {
        let exchange_id = self.client.place_order(intent).await?;

        tracing::info!(
            "order {} accepted by venue as {}",
            intent.client_id,
            exchange_id
        );

        self.events
            .send(Event::Order(update_for(
                intent,
                &exchange_id,
                OrderStatus::Submitted,
                0.0,
                0.0,
                0.0,
            )))
            .map_err(|_| "event channel closed")?;

        tokio::spawn(poll_order(
            self.client.clone(),
            self.events.clone(),
            self.ledger.clone(),
            intent.clone(),
            exchange_id,
            self.poll_budget,
            self.poll_interval,
        ));

        Ok(())
    }

    async fn wallet_balance(&self, asset: &str) -> Result<(f64, f64)> {
        self.client.wallet_balance(asset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeConfig;
    use crate::models::{OrderType, Side};
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use uuid::Uuid;

    fn client_for(url: &str) -> Arc<OkxClient> {
        Arc::new(
            OkxClient::new(&ExchangeConfig {
                base_url: url.to_string(),
                retries: 1,
                requests_per_second: 100,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn market_buy() -> OrderIntent {
        OrderIntent {
            client_id: Uuid::new_v4(),
            symbol: "BTC-USDT".to_string(),
            side: Side::Buy,
            quantity: 0.0003,
            order_type: OrderType::Market,
            price_hint: Some(100.0),
        }
    }

    async fn next_order_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> OrderUpdate {
        loop {
            let event = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("channel closed");
            if let Event::Order(update) = event {
                return update;
            }
        }
    }

    #[tokio::test]
    async fn test_submit_reports_lifecycle_to_fill() {
        let mut server = mockito::Server::new_async().await;
        let _place = server
            .mock("POST", "/api/v5/trade/order")
            .with_body(r#"{"code":"0","msg":"","data":[{"ordId":"42","sCode":"0","sMsg":""}]}"#)
            .create_async()
            .await;
        let _state = server
            .mock("GET", "/api/v5/trade/order")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"code":"0","msg":"","data":[{
                    "state":"filled","avgPx":"100.5","accFillSz":"0.0003","fee":"-0.00003"
                }]}"#,
            )
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut broker = LiveBroker::new(client_for(&server.url()), tx, "BTC-USDT", 3)
            .with_poll_interval(Duration::from_millis(10));

        let intent = market_buy();
        broker.submit(&intent).await.unwrap();

        let submitted = next_order_event(&mut rx).await;
        assert_eq!(submitted.status, OrderStatus::Submitted);
        assert_eq!(submitted.exchange_id.as_deref(), Some("42"));

        let filled = next_order_event(&mut rx).await;
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.client_id, intent.client_id);
        assert_eq!(filled.price, 100.5);
        assert_eq!(filled.filled_qty, 0.0003);
    }

    #[tokio::test]
    async fn test_unresolved_order_reported_canceled_after_budget() {
        let mut server = mockito::Server::new_async().await;
        let _place = server
            .mock("POST", "/api/v5/trade/order")
            .with_body(r#"{"code":"0","msg":"","data":[{"ordId":"7","sCode":"0","sMsg":""}]}"#)
            .create_async()
            .await;
        // Venue keeps answering "live"; the poll budget runs out
        let _state = server
            .mock("GET", "/api/v5/trade/order")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"code":"0","msg":"","data":[{"state":"live","avgPx":"","accFillSz":"0","fee":"0"}]}"#,
            )
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut broker = LiveBroker::new(client_for(&server.url()), tx, "BTC-USDT", 2)
            .with_poll_interval(Duration::from_millis(10));

        broker.submit(&market_buy()).await.unwrap();

        let submitted = next_order_event(&mut rx).await;
        assert_eq!(submitted.status, OrderStatus::Submitted);

        let accepted = next_order_event(&mut rx).await;
        assert_eq!(accepted.status, OrderStatus::Accepted);

        let canceled = next_order_event(&mut rx).await;
        assert_eq!(canceled.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_venue_rejection_fails_submission() {
        let mut server = mockito::Server::new_async().await;
        let _place = server
            .mock("POST", "/api/v5/trade/order")
            .with_body(
                r#"{"code":"1","msg":"","data":[{"ordId":"","sCode":"51008","sMsg":"insufficient balance"}]}"#,
            )
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut broker = LiveBroker::new(client_for(&server.url()), tx, "BTC-USDT", 2);

        let result = broker.submit(&market_buy()).await;
        assert!(result.is_err());
    }
}
