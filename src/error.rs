use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the execution core
#[derive(Error, Debug)]
pub enum WarMachineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Submission errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Order lookup errors
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: Uuid },

    // Execution errors
    #[error("Execution error: {0}")]
    Execution(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Notification errors
    #[error("Notification delivery failed: {0}")]
    Notification(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WarMachineError {
    /// The order id no longer lives in the active order map.
    ///
    /// Terminal orders are evicted, so callers should read this as
    /// "already finalised" rather than as a fault.
    pub fn is_order_not_found(&self) -> bool {
        matches!(self, WarMachineError::OrderNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, WarMachineError::Validation(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, WarMachineError::Execution(_))
    }
}

/// Result type alias for WarMachineError
pub type Result<T> = std::result::Result<T, WarMachineError>;

/// Specific error types for order bookkeeping
#[derive(Error, Debug, Clone)]
pub enum OrderError {
    #[error("Order not found: {order_id}")]
    NotFound { order_id: Uuid },

    #[error("Overfill on order {order_id}: quantity {quantity}, filled {filled}, trade {trade}")]
    Overfill {
        order_id: Uuid,
        quantity: Decimal,
        filled: Decimal,
        trade: Decimal,
    },

    #[error("insufficient position in {symbol}: need {requested}, held {held}")]
    InsufficientPosition {
        symbol: String,
        requested: Decimal,
        held: Decimal,
    },
}

/// Specific error types for risk limit maintenance
#[derive(Error, Debug, Clone)]
pub enum RiskError {
    #[error("{field} must be within (0, 1], got {value}")]
    FractionOutOfRange { field: &'static str, value: Decimal },

    #[error("max_open_positions must be positive")]
    ZeroOpenPositions,
}

impl From<OrderError> for WarMachineError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound { order_id } => WarMachineError::OrderNotFound { order_id },
            other => WarMachineError::Execution(other.to_string()),
        }
    }
}

impl From<RiskError> for WarMachineError {
    fn from(err: RiskError) -> Self {
        WarMachineError::Validation(err.to_string())
    }
}
