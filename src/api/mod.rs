pub mod error;
pub mod okx;

pub use error::ExchangeError;
pub use okx::{OkxClient, OrderSnapshot};
