//! Unified error types for the progress and ledger engine.
//!
//! Every fallible operation returns [`Result`]. Recoverable ledger conditions
//! (`PaymentExceedsBalance`, `DepositExceedsTarget`) carry the remaining amount so the
//! caller can offer the explicit "complete in full" alternative.

use thiserror::Error;

/// All errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Amount was not a finite number greater than zero
    #[error("Invalid amount: {input}")]
    InvalidAmount {
        /// The rejected input, as entered or as a formatted number
        input: String,
    },

    /// Malformed input other than an amount (empty name, bad totals, ...)
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// A payment larger than the remaining debt balance
    #[error("Payment of ${requested:.2} exceeds remaining balance of ${remaining:.2}")]
    PaymentExceedsBalance {
        /// Amount the caller tried to pay
        requested: f64,
        /// Amount still owed on the debt
        remaining: f64,
    },

    /// A deposit that would push a savings goal past its target
    #[error("Deposit of ${requested:.2} exceeds the ${remaining:.2} left to reach the target")]
    DepositExceedsTarget {
        /// Amount the caller tried to deposit
        requested: f64,
        /// Amount still missing to reach the target
        remaining: f64,
    },

    /// No debt with the given id
    #[error("Debt not found: {id}")]
    DebtNotFound {
        /// The requested debt id
        id: String,
    },

    /// No savings goal with the given id
    #[error("Savings goal not found: {id}")]
    SavingsGoalNotFound {
        /// The requested goal id
        id: String,
    },

    /// No challenge with the given id
    #[error("Challenge not found: {id}")]
    ChallengeNotFound {
        /// The requested challenge id
        id: String,
    },

    /// Lifecycle action not allowed from the challenge's current state
    #[error("Cannot {action} challenge {id} while it is {from}")]
    InvalidTransition {
        /// Challenge id
        id: String,
        /// Current lifecycle state
        from: String,
        /// Attempted action
        action: String,
    },

    /// No authenticated session was available for a remote write
    #[error("No authenticated session available")]
    SessionUnavailable,

    /// The remote profile backend rejected or failed a request
    #[error("Remote profile error: {message}")]
    Remote {
        /// Backend-provided description
        message: String,
    },

    /// Key/value persistence failed
    #[error("Persistence error: {message}")]
    Persistence {
        /// Description of the failure
        message: String,
    },

    /// JSON encoding or decoding of a stored value failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying `SeaORM` error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// Required environment variable missing or invalid
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
