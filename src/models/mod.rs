use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One closed OHLCV interval for a symbol
///
/// Bars are produced by the data feed in strictly increasing timestamp order
/// and are never re-emitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

/// Order lifecycle states as reported by the broker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Submitted,
    Accepted,
    Filled,
    Canceled,
    MarginCall,
    Rejected,
}

impl OrderStatus {
    /// Terminal states end the order's pending cycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::MarginCall
                | OrderStatus::Rejected
        )
    }
}

/// A buy/sell request emitted by the strategy controller
///
/// Submit-and-forget: the broker answers with `OrderUpdate` events keyed by
/// `client_id`, never with a synchronous fill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderIntent {
    pub client_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
    /// Advisory price attached to market orders (some venues require one)
    pub price_hint: Option<f64>,
}

/// Broker-delivered status change for a previously submitted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderUpdate {
    pub client_id: Uuid,
    pub exchange_id: Option<String>,
    pub side: Side,
    pub status: OrderStatus,
    /// Average fill price, meaningful once filled
    pub price: f64,
    pub filled_qty: f64,
    pub cost: f64,
    pub fee: f64,
}

/// A completed round trip (one buy plus the sell that closed it)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosedTrade {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Connectivity state of the data feed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedStatus {
    Backfilling,
    Live,
    Disconnected,
}

/// Everything the runner can deliver to the strategy controller
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Bar(Bar),
    Order(OrderUpdate),
    Trade(ClosedTrade),
    Data(FeedStatus),
}
