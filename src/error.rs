use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("No resolution strategy registered for conflict kind: {0}")]
    NoStrategy(String),

    #[error("Insufficient capacity in pool {pool}: requested {requested}, available {available}")]
    InsufficientCapacity {
        pool: String,
        requested: f64,
        available: f64,
    },

    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("Conflict not found: {0}")]
    ConflictNotFound(String),

    #[error("Allocation not found: {0}")]
    AllocationNotFound(String),

    #[error("Invalid conflict state transition: {from} -> {to}")]
    InvalidConflictTransition { from: String, to: String },

    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("Scaling refused: {0}")]
    ScalingRefused(String),

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CoordError>;
