/// Injectable time source and day arithmetic
pub mod clock;

/// Per-user daily task flags
pub mod daily_tasks;

/// The progress engine facade over all user state
pub mod engine;

/// Debts, savings goals and transactions
pub mod ledger;

/// Remote profile sync with local fallback
pub mod profile;

/// Challenge lifecycle and badge awarding
pub mod quest;

/// Progress reports and text formatting
pub mod report;

/// Engine lifecycle bound to the signed-in session
pub mod session;

/// Key/value persistence and per-user namespacing
pub mod store;

/// Daily activation streaks
pub mod streak;

/// Experience point accumulator
pub mod xp;
