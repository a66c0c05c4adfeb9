// Core modules
pub mod api;
pub mod config;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use config::BotConfig;
pub use models::*;
pub use strategy::StrategyController;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
