// Order execution module
pub mod broker;
pub mod live;
pub mod paper;
pub mod trades;

pub use broker::Broker;
pub use live::LiveBroker;
pub use paper::PaperBroker;
pub use trades::TradeLedger;
