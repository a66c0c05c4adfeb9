// Indicator math used by the strategy
pub mod ema;

pub use ema::{sma, Ema, EmaPair, EmaSnapshot};
