//! Daily login streak tracking.
//!
//! The streak is re-evaluated once per app activation. Same-day activations are idempotent,
//! consecutive days extend the streak, and any gap longer than one day restarts it at 1.

use crate::core::{clock::day_diff, store::UserStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Storage key for streak state
pub const STREAK_KEY: &str = "streakData";

/// Persisted streak state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    /// Consecutive days with at least one activation
    pub current_streak: u32,
    /// Calendar date of the last counted activation
    pub last_login_date: Option<NaiveDate>,
    /// Best streak ever reached
    #[serde(default)]
    pub longest_streak: u32,
}

/// What an activation did to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// First ever activation
    Started,
    /// Already counted today, or the clock moved backwards
    Unchanged,
    /// Activation on the day after the last one
    Extended,
    /// Gap of more than one day; streak restarted at 1
    Reset,
}

impl StreakState {
    /// Computes the state after an activation on `today`.
    #[must_use]
    pub fn advance(self, today: NaiveDate) -> (Self, StreakTransition) {
        let Some(last) = self.last_login_date else {
            return (self.restart(today), StreakTransition::Started);
        };

        match day_diff(today, last) {
            1 => {
                let current_streak = self.current_streak.saturating_add(1);
                let next = Self {
                    current_streak,
                    last_login_date: Some(today),
                    longest_streak: self.longest_streak.max(current_streak),
                };
                (next, StreakTransition::Extended)
            }
            diff if diff > 1 => (self.restart(today), StreakTransition::Reset),
            _ => (self, StreakTransition::Unchanged),
        }
    }

    fn restart(self, today: NaiveDate) -> Self {
        Self {
            current_streak: 1,
            last_login_date: Some(today),
            longest_streak: self.longest_streak.max(1),
        }
    }
}

/// Owns and persists one user's [`StreakState`].
#[derive(Debug, Clone)]
pub struct StreakTracker {
    store: UserStore,
    state: StreakState,
}

impl StreakTracker {
    /// Loads persisted streak state, or an empty state for a new user.
    pub async fn load(store: UserStore) -> Self {
        let state = store.load(STREAK_KEY).await.unwrap_or_default();
        Self { store, state }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> StreakState {
        self.state
    }

    /// Current streak length.
    #[must_use]
    pub const fn current_streak(&self) -> u32 {
        self.state.current_streak
    }

    /// Applies an activation on `today` and persists the result.
    pub async fn register_activation(&mut self, today: NaiveDate) -> StreakTransition {
        let (next, transition) = self.state.advance(today);

        match transition {
            StreakTransition::Unchanged => {
                debug!(%today, streak = next.current_streak, "Streak already counted");
            }
            StreakTransition::Reset => {
                info!(%today, previous = self.state.current_streak, "Streak broken, restarting");
            }
            StreakTransition::Started | StreakTransition::Extended => {
                info!(%today, streak = next.current_streak, "Streak updated");
            }
        }

        self.state = next;
        self.store.save(STREAK_KEY, &self.state).await;
        transition
    }
}
