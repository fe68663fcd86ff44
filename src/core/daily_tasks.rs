//! Per-day gamified tasks.
//!
//! Each task can be completed once per calendar day. Flags belong to a specific date and are
//! cleared as soon as the tracker observes a different day.

use crate::core::store::UserStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Storage key for a user's daily task flags.
#[must_use]
pub fn daily_tasks_key(user_id: &str) -> String {
    format!("dailyTasks_{user_id}")
}

/// The fixed set of daily tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyTask {
    /// Any payment applied to a debt
    DebtPayment,
    /// Any deposit into a savings goal
    SavingsDeposit,
}

impl fmt::Display for DailyTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DebtPayment => write!(f, "debt payment"),
            Self::SavingsDeposit => write!(f, "savings deposit"),
        }
    }
}

/// Completion flags for one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTaskState {
    /// Whether a debt payment was made on `date`
    pub debt_payment: bool,
    /// Whether a savings deposit was made on `date`
    pub savings_deposit: bool,
    /// The day these flags apply to
    pub date: NaiveDate,
}

impl DailyTaskState {
    /// Fresh, all-incomplete state for `date`.
    #[must_use]
    pub const fn fresh(date: NaiveDate) -> Self {
        Self {
            debt_payment: false,
            savings_deposit: false,
            date,
        }
    }

    /// Whether `task` is done on this state's date.
    #[must_use]
    pub const fn is_completed(&self, task: DailyTask) -> bool {
        match task {
            DailyTask::DebtPayment => self.debt_payment,
            DailyTask::SavingsDeposit => self.savings_deposit,
        }
    }

    fn mark(&mut self, task: DailyTask) {
        match task {
            DailyTask::DebtPayment => self.debt_payment = true,
            DailyTask::SavingsDeposit => self.savings_deposit = true,
        }
    }
}

/// Result of trying to complete a daily task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCompletion {
    /// First completion today; XP should be granted
    Completed,
    /// The task was already done today; nothing changes
    AlreadyCompletedToday,
}

/// Owns and persists one user's [`DailyTaskState`].
#[derive(Debug, Clone)]
pub struct DailyTaskTracker {
    store: UserStore,
    key: String,
    state: DailyTaskState,
}

impl DailyTaskTracker {
    /// Loads persisted flags and clears them if they belong to a day other than `today`.
    pub async fn load(store: UserStore, user_id: &str, today: NaiveDate) -> Self {
        let key = daily_tasks_key(user_id);
        let state = store
            .load(&key)
            .await
            .unwrap_or_else(|| DailyTaskState::fresh(today));
        let mut tracker = Self { store, key, state };
        tracker.roll_over(today).await;
        tracker
    }

    /// Current flags.
    #[must_use]
    pub const fn state(&self) -> DailyTaskState {
        self.state
    }

    /// Whether `task` is done today.
    #[must_use]
    pub fn is_completed(&self, task: DailyTask, today: NaiveDate) -> bool {
        self.state.date == today && self.state.is_completed(task)
    }

    /// Clears both flags when `today` differs from the stored date. Returns whether a reset happened.
    pub async fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.state.date == today {
            return false;
        }

        debug!(from = %self.state.date, to = %today, "Resetting daily tasks for new day");
        self.state = DailyTaskState::fresh(today);
        self.store.save(&self.key, &self.state).await;
        true
    }

    /// Completes `task` for `today`, at most once per day.
    pub async fn complete(&mut self, task: DailyTask, today: NaiveDate) -> TaskCompletion {
        self.roll_over(today).await;

        if self.state.is_completed(task) {
            debug!(%task, %today, "Daily task already completed");
            return TaskCompletion::AlreadyCompletedToday;
        }

        self.state.mark(task);
        self.store.save(&self.key, &self.state).await;
        info!(%task, %today, "Daily task completed");
        TaskCompletion::Completed
    }
}
