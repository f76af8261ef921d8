//! warmachine CLI
//!
//! Commands:
//! - `warmachine run` - execute orders from a JSON file, or JSON lines on stdin
//! - `warmachine order` - execute a single order
//! - `warmachine show-config` - print the effective configuration

pub mod orders;
pub mod output;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::domain::{ExecutionStrategy, OrderRequest, OrderSide, OrderType, TimeInForce};
use crate::platform::OrderPriority;
use orders::OrderEntry;

/// Order execution engine
#[derive(Parser, Debug)]
#[command(name = "warmachine")]
#[command(author, version, about = "Priority-queued order execution with risk gating")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, global = true, default_value = "config")]
    pub config_dir: PathBuf,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a batch of orders and report the outcome
    Run {
        /// JSON array of orders; reads JSON lines from stdin when omitted
        #[arg(short, long)]
        orders: Option<PathBuf>,
    },
    /// Execute a single order
    Order(OrderArgs),
    /// Print the effective configuration
    ShowConfig,
}

#[derive(Args, Debug, Clone)]
pub struct OrderArgs {
    pub symbol: String,
    /// buy | sell
    pub side: OrderSide,
    pub quantity: Decimal,
    /// market | limit | stop | stop_limit | trailing_stop
    #[arg(short = 't', long, default_value = "market")]
    pub order_type: OrderType,
    /// Limit price
    #[arg(short, long)]
    pub price: Option<Decimal>,
    #[arg(long)]
    pub stop_price: Option<Decimal>,
    /// immediate | twap | vwap | iceberg | participate
    #[arg(short, long, default_value = "immediate")]
    pub strategy: ExecutionStrategy,
    /// critical | high | medium | low | scheduled
    #[arg(long, default_value = "medium")]
    pub priority: OrderPriority,
    /// day | gtc | ioc | fok
    #[arg(long, default_value = "day")]
    pub time_in_force: TimeInForce,
}

impl OrderArgs {
    pub fn into_entry(self) -> OrderEntry {
        let mut request = OrderRequest::market(self.symbol, self.side, self.quantity)
            .with_order_type(self.order_type)
            .with_strategy(self.strategy)
            .with_time_in_force(self.time_in_force);
        request.price = self.price;
        request.stop_price = self.stop_price;

        OrderEntry {
            request,
            priority: self.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_order_command() {
        let cli = Cli::try_parse_from([
            "warmachine",
            "order",
            "AAPL",
            "buy",
            "100",
            "--order-type",
            "limit",
            "--price",
            "150.25",
            "--strategy",
            "twap",
            "--priority",
            "high",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);

        let Commands::Order(args) = cli.command else {
            panic!("expected order command");
        };
        let entry = args.into_entry();
        assert_eq!(entry.priority, OrderPriority::High);
        assert_eq!(entry.request.order_type, OrderType::Limit);
        assert_eq!(entry.request.price, Some(dec!(150.25)));
        assert_eq!(entry.request.strategy, ExecutionStrategy::Twap);
        assert!(entry.request.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let parsed = Cli::try_parse_from(["warmachine", "order", "AAPL", "buy", "1", "-s", "sniper"]);
        assert!(parsed.is_err());
    }
}
