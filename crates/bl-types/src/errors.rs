use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the Ballast system.
#[derive(Error, Debug)]
pub enum BallastError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Constraint infeasible: {reason}")]
    ConstraintInfeasible { reason: String },

    /// Deferred, not failed: execution is suspended and retried later.
    #[error("Execution gated: {reason}")]
    ExecutionGated { reason: String },

    #[error("Cost budget exceeded: projected {projected} against budget {budget}")]
    CostBudgetExceeded { projected: Decimal, budget: Decimal },

    #[error("Profile not found: {profile_id}")]
    ProfileNotFound { profile_id: Uuid },

    #[error("Rebalance already in progress for profile {profile_id}")]
    ConcurrentRebalanceInProgress { profile_id: Uuid },

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BallastError {
    /// Gating and cost trimming are recovered locally (deferred or
    /// scope-reduced); everything else surfaces to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BallastError::ExecutionGated { .. } | BallastError::CostBudgetExceeded { .. }
        )
    }
}

/// Result type alias for Ballast operations.
pub type BallastResult<T> = Result<T, BallastError>;

/// Macro for creating validation errors.
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BallastError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors.
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BallastError::Internal(format!($($arg)*))
    };
}
