//! Collaborator implementations: simulated market data and event sinks

pub mod market_data;
pub mod notifier;

pub use market_data::SimulatedMarketData;
pub use notifier::{build_notifier, ChannelNotifier, LogNotifier, WebhookNotifier};
