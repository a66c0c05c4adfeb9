use thiserror::Error;

/// Venue-level failures from the exchange client
///
/// Transport and decoding problems stay as their reqwest/serde errors; these
/// cover the cases where the venue answered but said no.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange error {code}: {msg}")]
    Api { code: String, msg: String },
    #[error("order rejected ({code}): {msg}")]
    OrderRejected { code: String, msg: String },
    #[error("no funding history for wallet {0}")]
    UnfundedWallet(String),
    #[error("unexpected order state: {0}")]
    UnknownOrderState(String),
}
