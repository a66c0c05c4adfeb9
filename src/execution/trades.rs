use chrono::{DateTime, Utc};

use crate::models::{ClosedTrade, Side};

#[derive(Debug, Clone)]
struct OpenLot {
    quantity: f64,
    entry_price: f64,
    entry_fee: f64,
    opened_at: DateTime<Utc>,
}

/// Round-trip P&L bookkeeping: one buy plus the sell that closes it
///
/// The strategy holds at most one lot at a time, so the ledger tracks a
/// single open lot and produces a `ClosedTrade` when a sell fill closes it.
#[derive(Debug, Clone)]
pub struct TradeLedger {
    symbol: String,
    open: Option<OpenLot>,
}

impl TradeLedger {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            open: None,
        }
    }

    /// Record a fill; a sell closing an open lot yields the finished trade
    pub fn record_fill(
        &mut self,
        side: Side,
        quantity: f64,
        price: f64,
        fee: f64,
        at: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        match side {
            Side::Buy => {
                if self.open.is_some() {
                    tracing::warn!("buy fill with a lot already open, replacing it");
                }
                self.open = Some(OpenLot {
                    quantity,
                    entry_price: price,
                    entry_fee: fee,
                    opened_at: at,
                });
                None
            }
            Side::Sell => match self.open.take() {
                Some(lot) => {
                    let gross_pnl = (price - lot.entry_price) * quantity;
                    let net_pnl = gross_pnl - lot.entry_fee - fee;

                    Some(ClosedTrade {
                        symbol: self.symbol.clone(),
                        quantity,
                        entry_price: lot.entry_price,
                        exit_price: price,
                        gross_pnl,
                        net_pnl,
                        opened_at: lot.opened_at,
                        closed_at: at,
                    })
                }
                None => {
                    tracing::warn!("sell fill with no open lot, ignoring");
                    None
                }
            },
        }
    }

    pub fn has_open_lot(&self) -> bool {
        self.open.is_some()
    }
}
