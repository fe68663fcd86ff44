//! The progress engine: one owned handle over a user's ledger and gamification state.
//!
//! Every mutator takes `&mut self` and awaits its persistence before returning, so writes for a
//! user are applied one at a time. Mutators return the changed record together with the new
//! aggregates and any one-shot [`Celebration`]s for the view layer.
//!
//! With a [`ProfileSync`] attached, every mutation that moves the totals also pushes the
//! profile snapshot before returning.

use crate::{
    config::catalog::Catalog,
    core::{
        clock::Clock,
        daily_tasks::{DailyTask, DailyTaskState, DailyTaskTracker, TaskCompletion},
        ledger::{
            Debt, DebtUpdate, LedgerStore, NewDebt, NewSavingsGoal, NewTransaction, SavingsGoal,
            SavingsGoalUpdate, Transaction,
        },
        profile::{ProfileDetails, ProfileSnapshot, ProfileSync, SyncOutcome},
        quest::{Badge, Challenge, QuestEngine, WeeklyResetReport},
        store::{KeyValueStore, UserStore},
        streak::{StreakState, StreakTracker, StreakTransition},
        xp::{DAILY_TASK_XP, TRANSACTION_XP, XpAccount},
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

/// One-shot event for the view layer to present once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Celebration {
    /// A daily task was completed for the first time today
    TaskCompleted {
        /// The task
        task: DailyTask,
        /// XP granted
        xp: u32,
    },
    /// An active challenge reached 100% progress
    ChallengeCompleted {
        /// Challenge id
        challenge_id: String,
    },
    /// A challenge reward was paid out
    ChallengeClaimed {
        /// Challenge id
        challenge_id: String,
        /// XP granted
        xp: u32,
    },
    /// A badge went from unearned to earned
    BadgeEarned {
        /// Badge id
        badge_id: String,
        /// Badge display name
        name: String,
    },
}

/// Aggregates recomputed after every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineTotals {
    /// Remaining debt over all debts
    pub total_debt: f64,
    /// Saved amount over all goals
    pub total_savings: f64,
    /// Accumulated XP
    pub total_xp: u64,
    /// Current login streak
    pub current_streak: u32,
    /// Badges currently held
    pub badges_earned: usize,
}

/// Successful mutation result.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<T> {
    /// The record produced by the mutation
    pub record: T,
    /// Aggregates after the mutation
    pub totals: EngineTotals,
    /// Events to present once
    pub celebrations: Vec<Celebration>,
    /// Outcome of the profile push, when one was made
    pub sync: Option<SyncOutcome>,
}

/// What an app activation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// The calendar day the activation ran on
    pub today: NaiveDate,
    /// Whether stale daily task flags were cleared
    pub daily_tasks_reset: bool,
    /// How the streak moved
    pub streak: StreakTransition,
    /// Streak after the activation
    pub current_streak: u32,
    /// Weekly challenges and badges returned to their initial state
    pub weekly_resets: WeeklyResetReport,
}

/// A user's complete progress and ledger state.
pub struct ProgressEngine {
    user_id: String,
    clock: Arc<dyn Clock>,
    ledger: LedgerStore,
    streak: StreakTracker,
    daily: DailyTaskTracker,
    quests: QuestEngine,
    xp: XpAccount,
    profile_sync: Option<ProfileSync>,
    profile_details: ProfileDetails,
}

impl fmt::Debug for ProgressEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEngine")
            .field("user_id", &self.user_id)
            .field("ledger", &self.ledger)
            .field("streak", &self.streak)
            .field("daily", &self.daily)
            .field("quests", &self.quests)
            .field("xp", &self.xp)
            .field("profile_sync", &self.profile_sync)
            .finish_non_exhaustive()
    }
}

impl ProgressEngine {
    /// Loads every component for `user_id`.
    ///
    /// Stale daily task flags are cleared and weekly resets are swept before the engine is
    /// returned, so no completion can observe state from an earlier day or week.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] for an empty user id. Storage failures degrade to
    /// empty state and are only logged.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        catalog: &Catalog,
        user_id: &str,
    ) -> Result<Self> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::InvalidInput {
                message: "User id cannot be empty".to_string(),
            });
        }

        let user_store = UserStore::new(store, user_id);
        let today = clock.today();

        let daily = DailyTaskTracker::load(user_store.clone(), user_id, today).await;
        let streak = StreakTracker::load(user_store.clone()).await;
        let mut quests = QuestEngine::load(user_store.clone(), catalog).await;
        quests.sweep_weekly_resets(clock.as_ref()).await;
        let ledger = LedgerStore::load(user_store.clone(), user_id).await;
        let xp = XpAccount::load(user_store, user_id).await;

        info!(user_id, %today, "Loaded progress engine");
        Ok(Self {
            user_id: user_id.to_string(),
            clock,
            ledger,
            streak,
            daily,
            quests,
            xp,
            profile_sync: None,
            profile_details: ProfileDetails::default(),
        })
    }

    /// App activation hook: clears stale daily flags, then advances the streak, then sweeps
    /// weekly resets. Idempotent within a calendar day.
    pub async fn activate(&mut self) -> ActivationReport {
        let today = self.clock.today();
        let daily_tasks_reset = self.daily.roll_over(today).await;
        let streak = self.streak.register_activation(today).await;
        let weekly_resets = self.quests.sweep_weekly_resets(self.clock.as_ref()).await;

        let report = ActivationReport {
            today,
            daily_tasks_reset,
            streak,
            current_streak: self.streak.current_streak(),
            weekly_resets,
        };
        info!(
            user_id = %self.user_id,
            %today,
            streak = report.current_streak,
            "Activated"
        );
        report
    }

    /// The user this engine belongs to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Read access to debts, savings goals and transactions.
    #[must_use]
    pub const fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    /// Read access to challenges and badges.
    #[must_use]
    pub const fn quests(&self) -> &QuestEngine {
        &self.quests
    }

    /// Current streak state.
    #[must_use]
    pub const fn streak(&self) -> StreakState {
        self.streak.state()
    }

    /// Today's daily task flags.
    #[must_use]
    pub const fn daily_tasks(&self) -> DailyTaskState {
        self.daily.state()
    }

    /// Accumulated XP.
    #[must_use]
    pub const fn total_xp(&self) -> u64 {
        self.xp.total()
    }

    /// Current aggregates.
    #[must_use]
    pub fn totals(&self) -> EngineTotals {
        let ledger = self.ledger.totals();
        EngineTotals {
            total_debt: ledger.total_debt,
            total_savings: ledger.total_savings,
            total_xp: self.xp.total(),
            current_streak: self.streak.current_streak(),
            badges_earned: self.quests.earned_badge_count(),
        }
    }

    /// The `n` most recently dated transactions, newest first.
    #[must_use]
    pub fn recent_transactions(&self, n: usize) -> Vec<&Transaction> {
        self.ledger.recent_transactions(n)
    }

    fn update<T>(&self, record: T, celebrations: Vec<Celebration>) -> Update<T> {
        Update {
            record,
            totals: self.totals(),
            celebrations,
            sync: None,
        }
    }

    /// Like [`Self::update`], but pushes the profile first since the totals moved.
    async fn synced<T>(&self, record: T, celebrations: Vec<Celebration>) -> Update<T> {
        let sync = self.sync_profile().await.unwrap_or_else(|e| {
            warn!(user_id = %self.user_id, "Profile push failed: {e}");
            None
        });
        Update {
            sync,
            ..self.update(record, celebrations)
        }
    }

    // --- Debts ---

    /// Adds a debt.
    pub async fn add_debt(&mut self, new_debt: NewDebt) -> Result<Update<Debt>> {
        let debt = self.ledger.add_debt(new_debt, self.clock.now()).await?;
        Ok(self.synced(debt, Vec::new()).await)
    }

    /// Edits a debt.
    pub async fn update_debt(&mut self, debt_id: &str, update: DebtUpdate) -> Result<Update<Debt>> {
        let debt = self
            .ledger
            .update_debt(debt_id, update, self.clock.now())
            .await?;
        Ok(self.synced(debt, Vec::new()).await)
    }

    /// Deletes a debt.
    pub async fn delete_debt(&mut self, debt_id: &str) -> Result<Update<Debt>> {
        let debt = self.ledger.delete_debt(debt_id).await?;
        Ok(self.synced(debt, Vec::new()).await)
    }

    /// Pays `amount` off a debt and counts it towards today's debt payment task.
    ///
    /// # Errors
    /// [`Error::PaymentExceedsBalance`] when `amount` is above the remaining balance; the
    /// caller may then offer [`Self::pay_debt_in_full`].
    pub async fn make_payment(&mut self, debt_id: &str, amount: f64) -> Result<Update<Debt>> {
        let debt = self
            .ledger
            .make_payment(debt_id, amount, self.clock.now())
            .await?;
        let (_, celebrations) = self.record_task(DailyTask::DebtPayment).await;
        Ok(self.synced(debt, celebrations).await)
    }

    /// Pays exactly the remaining balance of a debt.
    pub async fn pay_debt_in_full(&mut self, debt_id: &str) -> Result<Update<Debt>> {
        let debt = self
            .ledger
            .pay_debt_in_full(debt_id, self.clock.now())
            .await?;
        let (_, celebrations) = self.record_task(DailyTask::DebtPayment).await;
        Ok(self.synced(debt, celebrations).await)
    }

    // --- Savings goals ---

    /// Adds a savings goal.
    pub async fn add_savings_goal(&mut self, new_goal: NewSavingsGoal) -> Result<Update<SavingsGoal>> {
        let goal = self
            .ledger
            .add_savings_goal(new_goal, self.clock.now())
            .await?;
        Ok(self.synced(goal, Vec::new()).await)
    }

    /// Edits a savings goal.
    pub async fn update_savings_goal(
        &mut self,
        goal_id: &str,
        update: SavingsGoalUpdate,
    ) -> Result<Update<SavingsGoal>> {
        let goal = self
            .ledger
            .update_savings_goal(goal_id, update, self.clock.now())
            .await?;
        Ok(self.synced(goal, Vec::new()).await)
    }

    /// Deletes a savings goal.
    pub async fn delete_savings_goal(&mut self, goal_id: &str) -> Result<Update<SavingsGoal>> {
        let goal = self.ledger.delete_savings_goal(goal_id).await?;
        Ok(self.synced(goal, Vec::new()).await)
    }

    /// Deposits into a savings goal and counts it towards today's deposit task.
    ///
    /// # Errors
    /// [`Error::DepositExceedsTarget`] when the deposit would overshoot; the caller may then
    /// offer [`Self::complete_savings_goal`].
    pub async fn make_deposit(&mut self, goal_id: &str, amount: f64) -> Result<Update<SavingsGoal>> {
        let goal = self
            .ledger
            .make_deposit(goal_id, amount, self.clock.now())
            .await?;
        let (_, celebrations) = self.record_task(DailyTask::SavingsDeposit).await;
        Ok(self.synced(goal, celebrations).await)
    }

    /// Deposits exactly what is missing to reach a goal's target.
    pub async fn complete_savings_goal(&mut self, goal_id: &str) -> Result<Update<SavingsGoal>> {
        let goal = self
            .ledger
            .complete_savings_goal(goal_id, self.clock.now())
            .await?;
        let (_, celebrations) = self.record_task(DailyTask::SavingsDeposit).await;
        Ok(self.synced(goal, celebrations).await)
    }

    // --- Transactions ---

    /// Records a transaction and grants the flat transaction XP.
    pub async fn add_transaction(
        &mut self,
        new_transaction: NewTransaction,
    ) -> Result<Update<Transaction>> {
        let transaction = self
            .ledger
            .add_transaction(new_transaction, self.clock.now())
            .await?;
        self.xp.add(TRANSACTION_XP).await;
        Ok(self.synced(transaction, Vec::new()).await)
    }

    // --- Daily tasks and quests ---

    /// Completes a daily task directly.
    ///
    /// A repeat completion on the same day returns [`TaskCompletion::AlreadyCompletedToday`]
    /// and grants nothing.
    pub async fn complete_daily_task(&mut self, task: DailyTask) -> Update<TaskCompletion> {
        let (completion, celebrations) = self.record_task(task).await;
        self.synced(completion, celebrations).await
    }

    async fn record_task(&mut self, task: DailyTask) -> (TaskCompletion, Vec<Celebration>) {
        let today = self.clock.today();
        let now = self.clock.now();
        // Sessions can span midnight; reset windows must be current before completing anything
        self.daily.roll_over(today).await;
        self.quests.sweep_weekly_resets(self.clock.as_ref()).await;

        let mut celebrations = Vec::new();
        let completion = self.daily.complete(task, today).await;
        match completion {
            TaskCompletion::Completed => {
                self.xp.add(DAILY_TASK_XP).await;
                celebrations.push(Celebration::TaskCompleted {
                    task,
                    xp: DAILY_TASK_XP,
                });
            }
            TaskCompletion::AlreadyCompletedToday => {
                debug!(%task, "Daily task already completed today");
            }
        }

        for challenge in self.quests.complete_triggered(task, now).await {
            celebrations.push(Celebration::ChallengeCompleted {
                challenge_id: challenge.id,
            });
        }
        (completion, celebrations)
    }

    /// Accepts an inactive challenge.
    pub async fn accept_challenge(&mut self, challenge_id: &str) -> Result<Update<Challenge>> {
        let challenge = self.quests.accept(challenge_id, self.clock.now()).await?;
        Ok(self.update(challenge, Vec::new()))
    }

    /// Sets the progress of an active challenge.
    pub async fn set_challenge_progress(
        &mut self,
        challenge_id: &str,
        progress: u8,
    ) -> Result<Update<Challenge>> {
        let was_completed = self
            .quests
            .challenge(challenge_id)
            .is_some_and(|c| c.progress >= 100);
        let challenge = self
            .quests
            .set_progress(challenge_id, progress, self.clock.now())
            .await?;

        let celebrations = if !was_completed && challenge.progress >= 100 {
            vec![Celebration::ChallengeCompleted {
                challenge_id: challenge.id.clone(),
            }]
        } else {
            Vec::new()
        };
        Ok(self.update(challenge, celebrations))
    }

    /// Marks an active challenge complete. Completing it again is a no-op.
    pub async fn complete_challenge(&mut self, challenge_id: &str) -> Result<Update<Challenge>> {
        let newly_completed = self.quests.complete(challenge_id, self.clock.now()).await?;
        let challenge = self
            .quests
            .challenge(challenge_id)
            .cloned()
            .ok_or_else(|| Error::ChallengeNotFound {
                id: challenge_id.to_string(),
            })?;

        let celebrations = if newly_completed {
            vec![Celebration::ChallengeCompleted {
                challenge_id: challenge.id.clone(),
            }]
        } else {
            Vec::new()
        };
        Ok(self.update(challenge, celebrations))
    }

    /// Claims a completed challenge, granting its XP and, if not already held, its badge.
    pub async fn claim_challenge(&mut self, challenge_id: &str) -> Result<Update<Challenge>> {
        self.quests.sweep_weekly_resets(self.clock.as_ref()).await;

        let outcome = self.quests.claim(challenge_id, self.clock.now()).await?;
        self.xp.add(outcome.xp).await;

        let mut celebrations = vec![Celebration::ChallengeClaimed {
            challenge_id: outcome.challenge.id.clone(),
            xp: outcome.xp,
        }];
        if let Some(Badge { id, name, .. }) = outcome.badge_earned {
            celebrations.push(Celebration::BadgeEarned { badge_id: id, name });
        }
        Ok(self.synced(outcome.challenge, celebrations).await)
    }

    /// Zeroes the XP total. Reset tooling only; normal operation never lowers XP.
    pub async fn reset_xp(&mut self) -> EngineTotals {
        info!(user_id = %self.user_id, previous = self.xp.total(), "Resetting XP");
        self.xp.reset().await;
        if let Err(e) = self.sync_profile().await {
            warn!(user_id = %self.user_id, "Profile push failed: {e}");
        }
        self.totals()
    }

    // --- Profile ---

    /// Profile fields combined with the current financial aggregates.
    #[must_use]
    pub fn profile_snapshot(&self, details: ProfileDetails) -> ProfileSnapshot {
        let totals = self.totals();
        ProfileSnapshot {
            details,
            total_debt: totals.total_debt,
            total_savings: totals.total_savings,
            total_xp: totals.total_xp,
        }
    }

    /// Attaches a syncer. From now on totals-changing mutations push the profile.
    pub fn attach_profile_sync(&mut self, sync: ProfileSync, details: ProfileDetails) {
        self.profile_sync = Some(sync);
        self.profile_details = details;
    }

    /// Profile fields sent with every push.
    #[must_use]
    pub const fn profile_details(&self) -> &ProfileDetails {
        &self.profile_details
    }

    /// Replaces the profile fields and pushes them.
    pub async fn update_profile_details(
        &mut self,
        details: ProfileDetails,
    ) -> Result<Option<SyncOutcome>> {
        self.profile_details = details;
        self.sync_profile().await
    }

    /// Pushes the current profile snapshot through the attached syncer.
    ///
    /// Returns `None` when no syncer is attached.
    ///
    /// # Errors
    /// Only a malformed snapshot fails; see [`ProfileSync::push_profile`].
    pub async fn sync_profile(&self) -> Result<Option<SyncOutcome>> {
        let Some(sync) = &self.profile_sync else {
            return Ok(None);
        };
        let snapshot = self.profile_snapshot(self.profile_details.clone());
        sync.push_profile(&self.user_id, &snapshot).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::{
        clock::ManualClock,
        profile::{FallbackReason, UpsertPath},
        quest::ChallengeStatus,
    };
    use crate::test_utils::*;
    use chrono::{TimeZone, Utc};

    async fn setup_engine() -> Result<(ProgressEngine, Arc<ManualClock>, Arc<dyn KeyValueStore>)> {
        let store = setup_shared_store().await?;
        let clock = test_clock();
        let engine = ProgressEngine::load(
            Arc::clone(&store),
            Arc::clone(&clock) as Arc<dyn Clock>,
            &test_catalog(),
            "user-1",
        )
        .await?;
        Ok((engine, clock, store))
    }

    async fn reload(
        store: &Arc<dyn KeyValueStore>,
        clock: &Arc<ManualClock>,
    ) -> Result<ProgressEngine> {
        ProgressEngine::load(
            Arc::clone(store),
            Arc::clone(clock) as Arc<dyn Clock>,
            &test_catalog(),
            "user-1",
        )
        .await
    }

    #[tokio::test]
    async fn test_empty_user_id_is_rejected() -> Result<()> {
        let store = setup_shared_store().await?;
        let result = ProgressEngine::load(store, test_clock(), &test_catalog(), " ").await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_payment_scenario() -> Result<()> {
        let (mut engine, _, _) = setup_engine().await?;
        let debt = engine.add_debt(new_test_debt("Card", 100.0)).await?.record;

        let first = engine.make_payment(&debt.id, 40.0).await?;
        assert_eq!(first.record.amount, 60.0);
        assert_eq!(first.record.paid_percentage(), 40);
        assert_eq!(first.totals.total_debt, 60.0);
        assert_eq!(first.totals.total_xp, u64::from(DAILY_TASK_XP));
        assert_eq!(
            first.celebrations,
            vec![Celebration::TaskCompleted {
                task: DailyTask::DebtPayment,
                xp: DAILY_TASK_XP,
            }]
        );

        let rejected = engine.make_payment(&debt.id, 70.0).await;
        assert!(matches!(
            rejected,
            Err(Error::PaymentExceedsBalance { .. })
        ));

        let paid = engine.pay_debt_in_full(&debt.id).await?;
        assert_eq!(paid.record.amount, 0.0);
        assert_eq!(paid.record.paid_percentage(), 100);
        // Task XP was already granted today
        assert!(paid.celebrations.is_empty());
        assert_eq!(engine.total_xp(), u64::from(DAILY_TASK_XP));
        assert!(engine.daily_tasks().debt_payment);
        Ok(())
    }

    #[tokio::test]
    async fn test_pay_in_full_grants_task_xp_when_first_today() -> Result<()> {
        let (mut engine, _, _) = setup_engine().await?;
        let debt = engine.add_debt(new_test_debt("Loan", 100.0)).await?.record;

        let rejected = engine.make_payment(&debt.id, 140.0).await;
        assert!(matches!(rejected, Err(Error::PaymentExceedsBalance { .. })));
        assert_eq!(engine.total_xp(), 0);

        let paid = engine.pay_debt_in_full(&debt.id).await?;
        assert_eq!(paid.record.amount, 0.0);
        assert_eq!(paid.totals.total_xp, u64::from(DAILY_TASK_XP));
        assert_eq!(paid.celebrations.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_deposit_scenario() -> Result<()> {
        let (mut engine, _, _) = setup_engine().await?;
        let goal = engine
            .add_savings_goal(new_test_goal("Trip", 50.0))
            .await?
            .record;

        let first = engine.make_deposit(&goal.id, 20.0).await?;
        assert_eq!(first.record.current, 20.0);
        assert_eq!(first.celebrations.len(), 1);

        let rejected = engine.make_deposit(&goal.id, 40.0).await;
        assert!(matches!(rejected, Err(Error::DepositExceedsTarget { .. })));

        let completed = engine.complete_savings_goal(&goal.id).await?;
        assert_eq!(completed.record.current, 50.0);
        assert_eq!(completed.totals.total_savings, 50.0);
        assert_eq!(engine.total_xp(), u64::from(DAILY_TASK_XP));
        Ok(())
    }

    #[tokio::test]
    async fn test_transactions_grant_xp_and_sort_by_date() -> Result<()> {
        let (mut engine, clock, _) = setup_engine().await?;

        let mut ids = Vec::new();
        for category in ["food", "rent", "fun"] {
            let update = engine
                .add_transaction(new_test_transaction(category, 12.5))
                .await?;
            ids.push(update.record.id);
            clock.advance_seconds(60);
        }

        assert_eq!(engine.total_xp(), 3 * u64::from(TRANSACTION_XP));
        let recent: Vec<&str> = engine
            .recent_transactions(2)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(recent, vec![ids[2].as_str(), ids[1].as_str()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_repeat_daily_task_is_informational() -> Result<()> {
        let (mut engine, clock, _) = setup_engine().await?;

        let first = engine.complete_daily_task(DailyTask::SavingsDeposit).await;
        assert_eq!(first.record, TaskCompletion::Completed);
        let second = engine.complete_daily_task(DailyTask::SavingsDeposit).await;
        assert_eq!(second.record, TaskCompletion::AlreadyCompletedToday);
        assert!(second.celebrations.is_empty());
        assert_eq!(engine.total_xp(), u64::from(DAILY_TASK_XP));

        // Next day the task is available again, even without a reload
        clock.advance_days(1);
        let next_day = engine.complete_daily_task(DailyTask::SavingsDeposit).await;
        assert_eq!(next_day.record, TaskCompletion::Completed);
        assert_eq!(engine.total_xp(), 2 * u64::from(DAILY_TASK_XP));
        Ok(())
    }

    #[tokio::test]
    async fn test_activation_order_and_streak() -> Result<()> {
        let (mut engine, clock, _) = setup_engine().await?;

        let first = engine.activate().await;
        assert_eq!(first.streak, StreakTransition::Started);
        assert_eq!(first.current_streak, 1);

        let again = engine.activate().await;
        assert_eq!(again.streak, StreakTransition::Unchanged);
        assert_eq!(again.current_streak, 1);

        engine.complete_daily_task(DailyTask::DebtPayment).await;
        clock.advance_days(1);
        let next = engine.activate().await;
        assert!(next.daily_tasks_reset);
        assert!(!engine.daily_tasks().debt_payment);
        assert_eq!(next.streak, StreakTransition::Extended);
        assert_eq!(next.current_streak, 2);

        clock.advance_days(2);
        let broken = engine.activate().await;
        assert_eq!(broken.streak, StreakTransition::Reset);
        assert_eq!(broken.current_streak, 1);
        assert_eq!(engine.streak().longest_streak, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_triggered_challenge_claim_and_badge() -> Result<()> {
        let (mut engine, _, _) = setup_engine().await?;
        let debt = engine.add_debt(new_test_debt("Card", 500.0)).await?.record;

        engine.accept_challenge("first-payment").await?;
        let paid = engine.make_payment(&debt.id, 50.0).await?;
        assert!(paid.celebrations.contains(&Celebration::ChallengeCompleted {
            challenge_id: "first-payment".to_string(),
        }));
        assert_eq!(
            engine.quests().challenge("first-payment").unwrap().status(),
            ChallengeStatus::Completed
        );

        let claimed = engine.claim_challenge("first-payment").await?;
        assert_eq!(claimed.record.status(), ChallengeStatus::Claimed);
        assert_eq!(
            claimed.celebrations,
            vec![
                Celebration::ChallengeClaimed {
                    challenge_id: "first-payment".to_string(),
                    xp: 50,
                },
                Celebration::BadgeEarned {
                    badge_id: "debt-slayer".to_string(),
                    name: "Debt Slayer".to_string(),
                },
            ]
        );
        assert_eq!(claimed.totals.total_xp, u64::from(DAILY_TASK_XP) + 50);
        assert_eq!(claimed.totals.badges_earned, 1);

        let again = engine.claim_challenge("first-payment").await;
        assert!(matches!(again, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_weekly_cycle_re_earns_badge() -> Result<()> {
        let (mut engine, clock, _) = setup_engine().await?;

        engine.accept_challenge("weekly-payment").await?;
        engine.complete_challenge("weekly-payment").await?;
        let first = engine.claim_challenge("weekly-payment").await?;
        assert_eq!(first.celebrations.len(), 2);

        // Week later the challenge cycles and the badge is re-earnable
        clock.advance_days(7);
        engine.activate().await;
        assert!(!engine.quests().badge("weekly-warrior").unwrap().earned);
        engine.accept_challenge("weekly-payment").await?;
        engine.complete_challenge("weekly-payment").await?;
        let second = engine.claim_challenge("weekly-payment").await?;
        assert!(second.celebrations.iter().any(|c| matches!(c, Celebration::BadgeEarned { .. })));
        assert_eq!(engine.total_xp(), 150);
        Ok(())
    }

    #[tokio::test]
    async fn test_manual_progress_completes_once() -> Result<()> {
        let (mut engine, _, _) = setup_engine().await?;
        engine.accept_challenge("budget-review").await?;

        let half = engine.set_challenge_progress("budget-review", 50).await?;
        assert!(half.celebrations.is_empty());
        let done = engine.set_challenge_progress("budget-review", 100).await?;
        assert_eq!(done.celebrations.len(), 1);

        let repeat = engine.complete_challenge("budget-review").await?;
        assert!(repeat.celebrations.is_empty());

        // Reward has no XP amount, so the default applies
        let claimed = engine.claim_challenge("budget-review").await?;
        assert_eq!(claimed.totals.total_xp, 50);
        assert_eq!(claimed.celebrations.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_xp_total_is_sum_of_grants() -> Result<()> {
        let (mut engine, _, store) = setup_engine().await?;
        let debt = engine.add_debt(new_test_debt("Card", 300.0)).await?.record;
        let goal = engine
            .add_savings_goal(new_test_goal("Fund", 300.0))
            .await?
            .record;

        engine.accept_challenge("first-deposit").await?;
        engine
            .add_transaction(new_test_transaction("food", 9.0))
            .await?;
        engine.make_payment(&debt.id, 10.0).await?;
        engine.make_payment(&debt.id, 10.0).await?;
        engine.make_deposit(&goal.id, 10.0).await?;
        engine.claim_challenge("first-deposit").await?;
        engine
            .add_transaction(new_test_transaction("rent", 900.0))
            .await?;

        let expected = 2 * TRANSACTION_XP + 2 * DAILY_TASK_XP + 40;
        assert_eq!(engine.total_xp(), u64::from(expected));

        let clock = test_clock();
        let mut reloaded = reload(&store, &clock).await?;
        assert_eq!(reloaded.total_xp(), u64::from(expected));
        assert_eq!(reloaded.ledger().debt(&debt.id).unwrap().amount, 280.0);

        assert_eq!(reloaded.reset_xp().await.total_xp, 0);
        assert_eq!(reload(&store, &clock).await?.total_xp(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_state_survives_reload() -> Result<()> {
        let (mut engine, clock, store) = setup_engine().await?;
        engine.activate().await;
        engine.complete_daily_task(DailyTask::DebtPayment).await;

        let reloaded = reload(&store, &clock).await?;
        assert!(reloaded.daily_tasks().debt_payment);
        assert_eq!(reloaded.streak().current_streak, 1);

        clock.advance_days(1);
        let next_day = reload(&store, &clock).await?;
        assert!(!next_day.daily_tasks().debt_payment);
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_store_keeps_state_in_memory() -> Result<()> {
        let store: Arc<dyn KeyValueStore> = Arc::new(FailingStore);
        let mut engine =
            ProgressEngine::load(store, test_clock(), &test_catalog(), "user-1").await?;

        assert_eq!(engine.quests().challenges().len(), 4);
        let debt = engine.add_debt(new_test_debt("Card", 100.0)).await?.record;
        let paid = engine.make_payment(&debt.id, 25.0).await?;
        assert_eq!(paid.record.amount, 75.0);
        assert_eq!(paid.totals.total_xp, u64::from(DAILY_TASK_XP));
        assert_eq!(engine.activate().await.current_streak, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_profile_uses_current_totals() -> Result<()> {
        let (mut engine, _, store) = setup_engine().await?;
        assert_eq!(engine.sync_profile().await?, None);

        engine.add_debt(new_test_debt("Card", 100.0)).await?;
        engine
            .add_transaction(new_test_transaction("food", 5.0))
            .await?;

        let sync = ProfileSync::new(
            Arc::new(ScriptedSessions::signed_out()),
            Arc::new(RecordingRemote::default()),
            store,
            &instant_settings(),
        );
        let details = ProfileDetails {
            username: "sam".to_string(),
            ..ProfileDetails::default()
        };
        engine.attach_profile_sync(sync.clone(), details);
        let outcome = engine.sync_profile().await?;
        assert_eq!(
            outcome,
            Some(SyncOutcome::UsingLocalData(FallbackReason::NoSession))
        );

        let local = sync.local_snapshot("user-1").await.unwrap();
        assert_eq!(local.total_debt, 100.0);
        assert_eq!(local.total_xp, u64::from(TRANSACTION_XP));
        assert_eq!(local.details.username, "sam");
        Ok(())
    }

    #[tokio::test]
    async fn test_payment_pushes_new_totals() -> Result<()> {
        let (mut engine, _, store) = setup_engine().await?;
        let remote = Arc::new(RecordingRemote::default());
        let sync = ProfileSync::new(
            Arc::new(ScriptedSessions::signed_in("user-1")),
            Arc::clone(&remote) as Arc<dyn crate::core::profile::RemoteProfileStore>,
            store,
            &instant_settings(),
        );
        engine.attach_profile_sync(sync, ProfileDetails::default());

        let added = engine.add_debt(new_test_debt("Card", 100.0)).await?;
        assert_eq!(added.sync, Some(SyncOutcome::Remote(UpsertPath::Privileged)));
        assert_eq!(remote.last_profile().unwrap().total_debt, 100.0);

        let paid = engine.make_payment(&added.record.id, 30.0).await?;
        assert_eq!(paid.sync, Some(SyncOutcome::Remote(UpsertPath::Privileged)));
        let pushed = remote.last_profile().unwrap();
        assert_eq!(pushed.total_debt, 70.0);
        assert_eq!(pushed.total_xp, u64::from(DAILY_TASK_XP));
        assert_eq!(remote.calls().len(), 2);

        // Accepting a challenge leaves the totals alone
        let accepted = engine.accept_challenge("budget-review").await?;
        assert_eq!(accepted.sync, None);
        assert_eq!(remote.calls().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_updated_details_are_pushed() -> Result<()> {
        let (mut engine, _, store) = setup_engine().await?;
        let remote = Arc::new(RecordingRemote::default());
        let sync = ProfileSync::new(
            Arc::new(ScriptedSessions::signed_in("user-1")),
            Arc::clone(&remote) as Arc<dyn crate::core::profile::RemoteProfileStore>,
            store,
            &instant_settings(),
        );
        engine.attach_profile_sync(sync, ProfileDetails::default());

        let details = ProfileDetails {
            username: "sam".to_string(),
            share_progress: true,
            ..ProfileDetails::default()
        };
        let outcome = engine.update_profile_details(details.clone()).await?;
        assert_eq!(outcome, Some(SyncOutcome::Remote(UpsertPath::Privileged)));
        assert_eq!(engine.profile_details(), &details);
        assert_eq!(remote.last_profile().unwrap().details, details);
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_tasks_roll_over_at_local_midnight() -> Result<()> {
        let store = setup_shared_store().await?;
        // 13:30 UTC is 23:30 in UTC+10
        let clock = offset_clock(Utc.with_ymd_and_hms(2024, 5, 1, 13, 30, 0).unwrap(), 10);
        let mut engine = ProgressEngine::load(
            store,
            Arc::clone(&clock) as Arc<dyn Clock>,
            &test_catalog(),
            "user-1",
        )
        .await?;

        let first = engine.activate().await;
        assert_eq!(first.today, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(first.streak, StreakTransition::Started);
        let done = engine.complete_daily_task(DailyTask::DebtPayment).await;
        assert_eq!(done.record, TaskCompletion::Completed);

        // Past local midnight, though UTC is still on the same day
        clock.advance_seconds(3600);
        let next = engine.activate().await;
        assert_eq!(next.today, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert!(next.daily_tasks_reset);
        assert_eq!(next.streak, StreakTransition::Extended);
        assert_eq!(next.current_streak, 2);
        let again = engine.complete_daily_task(DailyTask::DebtPayment).await;
        assert_eq!(again.record, TaskCompletion::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_weekly_badge_lasts_seven_local_days() -> Result<()> {
        let store = setup_shared_store().await?;
        // 2024-05-01 22:00 UTC is 2024-05-02 08:00 in UTC+10
        let clock = offset_clock(Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap(), 10);
        let mut engine = ProgressEngine::load(
            store,
            Arc::clone(&clock) as Arc<dyn Clock>,
            &test_catalog(),
            "user-1",
        )
        .await?;

        engine.accept_challenge("weekly-payment").await?;
        engine.complete_challenge("weekly-payment").await?;
        engine.claim_challenge("weekly-payment").await?;

        for day in 1..=6 {
            clock.advance_days(1);
            let report = engine.activate().await;
            assert!(report.weekly_resets.is_empty(), "reset on local day {day}");
            assert!(engine.quests().badge("weekly-warrior").unwrap().earned);
        }

        clock.advance_days(1);
        let report = engine.activate().await;
        assert_eq!(report.weekly_resets.badges, vec!["weekly-warrior".to_string()]);
        assert!(!engine.quests().badge("weekly-warrior").unwrap().earned);
        Ok(())
    }
}
