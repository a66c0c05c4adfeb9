use uuid::Uuid;

use crate::config::StrategyConfig;
use crate::indicators::EmaPair;
use crate::models::{
    Bar, ClosedTrade, Event, FeedStatus, OrderIntent, OrderStatus, OrderType, OrderUpdate, Side,
};

/// Position held by the strategy
///
/// Transitions only on filled orders, never on submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat,
    Long { quantity: f64 },
}

#[derive(Debug, Clone, Copy)]
struct PendingOrder {
    client_id: Uuid,
    side: Side,
}

/// Event-driven dual-EMA strategy controller
///
/// Consumes bars and broker/feed events, emits market order intents. Holds no
/// I/O: submission and fills are the runner's and broker's business. The
/// controller guarantees at most one outstanding order and never trades
/// against backfill data.
pub struct StrategyController {
    symbol: String,
    cfg: StrategyConfig,
    emas: EmaPair,
    position: PositionState,
    pending: Option<PendingOrder>,
    live: bool,
    bar_count: u64,
    buy_fill_bar: Option<u64>,
}

impl StrategyController {
    pub fn new(symbol: impl Into<String>, cfg: StrategyConfig) -> Self {
        let emas = EmaPair::new(cfg.fast_period, cfg.slow_period);
        Self {
            symbol: symbol.into(),
            cfg,
            emas,
            position: PositionState::Flat,
            pending: None,
            live: false,
            bar_count: 0,
            buy_fill_bar: None,
        }
    }

    /// Dispatch one event; only bars can produce an order intent
    pub fn handle_event(&mut self, event: &Event) -> Option<OrderIntent> {
        match event {
            Event::Bar(bar) => self.on_bar(bar),
            Event::Order(update) => {
                self.on_order_update(update);
                None
            }
            Event::Trade(trade) => {
                self.on_trade_closed(trade);
                None
            }
            Event::Data(status) => {
                self.on_data_status(*status);
                None
            }
        }
    }

    /// Process one bar, possibly emitting a market order intent
    ///
    /// Guards, in order: an outstanding order suppresses everything; so does
    /// a non-live feed. A long held for at least `min_hold_bars` bars is sold
    /// in full; otherwise a flat book buys the configured size.
    pub fn on_bar(&mut self, bar: &Bar) -> Option<OrderIntent> {
        self.bar_count += 1;
        let snapshot = self.emas.update(bar.close);

        match snapshot {
            Some(s) => tracing::info!(
                "{} | O: {} H: {} L: {} C: {} V: {} | EMA{}: {:.4} EMA{}: {:.4} diff: {:.4}",
                bar.symbol,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume,
                self.cfg.fast_period,
                s.fast,
                self.cfg.slow_period,
                s.slow,
                s.diff
            ),
            None => tracing::info!(
                "{} | O: {} H: {} L: {} C: {} V: {} | EMAs warming up",
                bar.symbol,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            ),
        }

        if let Some(pending) = &self.pending {
            tracing::debug!(
                "order {} still pending, holding off",
                pending.client_id
            );
            return None;
        }

        if !self.live {
            return None;
        }

        match self.position {
            PositionState::Long { quantity } => {
                let fill_bar = self.buy_fill_bar?;
                if self.bar_count - fill_bar >= self.cfg.min_hold_bars {
                    Some(self.emit(Side::Sell, quantity, bar.close))
                } else {
                    None
                }
            }
            PositionState::Flat => Some(self.emit(Side::Buy, self.cfg.trade_size, bar.close)),
        }
    }

    fn emit(&mut self, side: Side, quantity: f64, last_close: f64) -> OrderIntent {
        let intent = OrderIntent {
            client_id: Uuid::new_v4(),
            symbol: self.symbol.clone(),
            side,
            quantity,
            order_type: OrderType::Market,
            price_hint: self.cfg.price_hint.or(Some(last_close)),
        };

        self.pending = Some(PendingOrder {
            client_id: intent.client_id,
            side,
        });

        tracing::info!(
            "submitting {} {} {:.8} at market",
            side.as_str(),
            self.symbol,
            quantity
        );

        intent
    }

    /// Apply a broker order-status event
    ///
    /// Submitted/Accepted keep the order pending. A filled buy opens the
    /// long and starts the hold counter; a filled sell flattens the book.
    /// Canceled/MarginCall/Rejected clear the pending order without touching
    /// the position; there is no retry.
    pub fn on_order_update(&mut self, update: &OrderUpdate) {
        match update.status {
            OrderStatus::Submitted | OrderStatus::Accepted => {
                tracing::debug!("order {} {:?}", update.client_id, update.status);
                return;
            }
            OrderStatus::Filled => match update.side {
                Side::Buy => {
                    tracing::info!(
                        "buy filled, price: {:.2}, cost: {:.2}, fee: {:.8}",
                        update.price,
                        update.cost,
                        update.fee
                    );
                    self.position = PositionState::Long {
                        quantity: update.filled_qty,
                    };
                    self.buy_fill_bar = Some(self.bar_count);
                }
                Side::Sell => {
                    tracing::info!(
                        "sell filled, price: {:.2}, cost: {:.2}, fee: {:.8}",
                        update.price,
                        update.cost,
                        update.fee
                    );
                    self.position = PositionState::Flat;
                    self.buy_fill_bar = None;
                }
            },
            OrderStatus::Canceled | OrderStatus::MarginCall | OrderStatus::Rejected => {
                tracing::warn!(
                    "order {} {:?}, clearing pending state",
                    update.client_id,
                    update.status
                );
            }
        }

        self.pending = None;
    }

    /// Log a completed round trip; observability only
    pub fn on_trade_closed(&self, trade: &ClosedTrade) {
        tracing::info!(
            "trade closed, gross pnl: {:.2}, net pnl: {:.2}",
            trade.gross_pnl,
            trade.net_pnl
        );
    }

    /// Track whether the feed is delivering live bars
    ///
    /// Anything other than `Live` (backfilling, disconnected) suppresses
    /// trading until the feed recovers.
    pub fn on_data_status(&mut self, status: FeedStatus) {
        tracing::info!("data status: {:?}", status);
        self.live = status == FeedStatus::Live;
    }

    pub fn position(&self) -> PositionState {
        self.position
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn has_pending_order(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_side(&self) -> Option<Side> {
        self.pending.map(|p| p.side)
    }
}
