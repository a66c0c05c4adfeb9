use async_trait::async_trait;

use crate::models::OrderIntent;
use crate::Result;

/// Submit-and-forget order entry plus wallet queries
///
/// Implementations acknowledge submission synchronously but deliver the
/// order lifecycle (Submitted, Accepted, Filled, Canceled, Rejected) and any
/// closed round trip as events on the shared event channel.
#[async_trait]
pub trait Broker: Send {
    /// Hand an order to the venue; updates follow on the event channel
    async fn submit(&mut self, intent: &OrderIntent) -> Result<()>;

    /// (available, total) for an asset
    ///
    /// Queried for logging while the feed is live. An asset with no funding
    /// history is an error and is allowed to halt the run.
    async fn wallet_balance(&self, asset: &str) -> Result<(f64, f64)>;
}
