use thiserror::Error;

/// Failures reported by the executor collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Executor not configured: {0}")]
    NotConfigured(String),

    #[error("Action rejected by venue: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Insufficient funds: have {have:.4}, need {need:.4}")]
    InsufficientFunds { have: f64, need: f64 },
}

/// Failures reported by the market data collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("Quote unavailable for {mint}: {reason}")]
    Unavailable { mint: String, reason: String },

    #[error("Quote for {0} has no price")]
    MissingPrice(String),
}

/// Failures reported by the wallet collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("Wallet not configured")]
    NotConfigured,

    #[error("Balance query failed: {0}")]
    Query(String),
}

/// Failures reported by the deployment store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}
