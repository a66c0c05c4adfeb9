// Trading strategy module
pub mod controller;

pub use controller::{PositionState, StrategyController};
