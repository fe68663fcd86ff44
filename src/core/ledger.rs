//! Ledger business logic - debts, savings goals and transactions.
//!
//! The ledger owns the three record collections for one user and persists the affected
//! collection after every mutation. Aggregates are recomputed on read. Gamification side
//! effects (daily tasks, XP) are applied by the engine on top of the outcomes returned here.

use crate::{
    core::store::UserStore,
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Tolerance used when comparing money amounts.
const AMOUNT_EPSILON: f64 = 1e-9;

/// Storage key for a user's debts.
#[must_use]
pub fn debts_key(user_id: &str) -> String {
    format!("debts_{user_id}")
}

/// Storage key for a user's savings goals.
#[must_use]
pub fn savings_key(user_id: &str) -> String {
    format!("savings_{user_id}")
}

/// Storage key for a user's transactions.
#[must_use]
pub fn transactions_key(user_id: &str) -> String {
    format!("transactions_{user_id}")
}

/// Parses user-entered text into a positive amount.
pub fn parse_amount(input: &str) -> Result<f64> {
    let parsed: f64 = input.trim().parse().map_err(|_| Error::InvalidAmount {
        input: input.to_string(),
    })?;
    validate_amount(parsed)
}

/// Accepts finite amounts strictly greater than zero.
pub fn validate_amount(amount: f64) -> Result<f64> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(Error::InvalidAmount {
            input: amount.to_string(),
        })
    }
}

fn require_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput {
            message: format!("{what} cannot be empty"),
        });
    }
    Ok(trimmed.to_string())
}

fn require_non_negative(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidInput {
            message: format!("{what} must be a non-negative number, got {value}"),
        })
    }
}

/// A balance snapshot recorded after each change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalancePoint {
    /// Balance after the change
    pub amount: f64,
    /// When the change happened
    pub at: DateTime<Utc>,
}

/// A debt being paid down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debt {
    /// Unique identifier
    pub id: String,
    /// Display name (e.g., "Student loan")
    pub name: String,
    /// Category tag (e.g., "credit_card")
    pub category: String,
    /// Original principal
    pub total_amount: f64,
    /// Amount still owed; always within `0..=total_amount`
    pub amount: f64,
    /// Annual interest rate in percent
    pub interest_rate: f64,
    /// Minimum monthly payment
    pub minimum_payment: f64,
    /// Remaining-amount snapshots, oldest first
    pub history: Vec<BalancePoint>,
}

impl Debt {
    /// Percentage of the principal already paid, rounded to the nearest integer.
    #[must_use]
    pub fn paid_percentage(&self) -> u32 {
        if self.total_amount <= 0.0 {
            return 0;
        }
        let percent = ((self.total_amount - self.amount) / self.total_amount * 100.0)
            .round()
            .clamp(0.0, 100.0);
        // Cast safety: clamped to [0, 100]
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = percent as u32;
        percent
    }

    /// Whether nothing is owed anymore.
    #[must_use]
    pub fn is_paid_off(&self) -> bool {
        self.amount <= AMOUNT_EPSILON
    }
}

/// Input for [`LedgerStore::add_debt`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDebt {
    /// Display name
    pub name: String,
    /// Category tag
    pub category: String,
    /// Original principal; must be greater than zero
    pub total_amount: f64,
    /// Amount still owed; defaults to the full principal
    pub amount: Option<f64>,
    /// Annual interest rate in percent
    pub interest_rate: f64,
    /// Minimum monthly payment
    pub minimum_payment: f64,
}

/// Partial update for an existing debt. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebtUpdate {
    /// New display name
    pub name: Option<String>,
    /// New category tag
    pub category: Option<String>,
    /// New principal
    pub total_amount: Option<f64>,
    /// New remaining amount
    pub amount: Option<f64>,
    /// New interest rate
    pub interest_rate: Option<f64>,
    /// New minimum payment
    pub minimum_payment: Option<f64>,
}

/// A savings goal being filled up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsGoal {
    /// Unique identifier
    pub id: String,
    /// Display name (e.g., "Emergency fund")
    pub name: String,
    /// Category tag
    pub category: String,
    /// Amount to reach
    pub target: f64,
    /// Amount saved so far; always within `0..=target`
    pub current: f64,
    /// Optional date the goal should be reached by
    pub deadline: Option<NaiveDate>,
    /// Saved-amount snapshots, oldest first
    pub history: Vec<BalancePoint>,
}

impl SavingsGoal {
    /// Amount still missing to reach the target.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        (self.target - self.current).max(0.0)
    }

    /// Whether the target has been reached.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining() <= AMOUNT_EPSILON
    }
}

/// Input for [`LedgerStore::add_savings_goal`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSavingsGoal {
    /// Display name
    pub name: String,
    /// Category tag
    pub category: String,
    /// Amount to reach; must be greater than zero
    pub target: f64,
    /// Starting amount; defaults to zero
    pub current: Option<f64>,
    /// Optional deadline
    pub deadline: Option<NaiveDate>,
}

/// Partial update for an existing savings goal. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsGoalUpdate {
    /// New display name
    pub name: Option<String>,
    /// New category tag
    pub category: Option<String>,
    /// New target
    pub target: Option<f64>,
    /// New saved amount
    pub current: Option<f64>,
    /// New deadline; `Some(None)` clears it
    pub deadline: Option<Option<NaiveDate>>,
}

/// Direction of a recorded transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money going out
    Expense,
    /// Money coming in
    Income,
}

/// An append-only transaction log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: String,
    /// Expense or income
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Always greater than zero
    pub amount: f64,
    /// Category tag
    pub category: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// When the transaction happened
    pub date: DateTime<Utc>,
}

/// Input for [`LedgerStore::add_transaction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Expense or income
    pub kind: TransactionKind,
    /// Must be greater than zero
    pub amount: f64,
    /// Category tag
    pub category: String,
    /// Optional description
    pub description: Option<String>,
    /// When it happened; defaults to now
    pub date: Option<DateTime<Utc>>,
}

/// Derived ledger aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTotals {
    /// Sum of remaining amounts over all debts
    pub total_debt: f64,
    /// Sum of saved amounts over all goals
    pub total_savings: f64,
}

/// Owns one user's debts, savings goals and transactions.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    store: UserStore,
    debts_key: String,
    savings_key: String,
    transactions_key: String,
    debts: Vec<Debt>,
    savings_goals: Vec<SavingsGoal>,
    transactions: Vec<Transaction>,
}

impl LedgerStore {
    /// Loads all three collections, starting empty where nothing is stored.
    pub async fn load(store: UserStore, user_id: &str) -> Self {
        let debts_key = debts_key(user_id);
        let savings_key = savings_key(user_id);
        let transactions_key = transactions_key(user_id);

        let debts: Vec<Debt> = store.load(&debts_key).await.unwrap_or_default();
        let savings_goals: Vec<SavingsGoal> = store.load(&savings_key).await.unwrap_or_default();
        let transactions: Vec<Transaction> =
            store.load(&transactions_key).await.unwrap_or_default();

        debug!(
            user_id,
            debts = debts.len(),
            savings_goals = savings_goals.len(),
            transactions = transactions.len(),
            "Loaded ledger"
        );

        Self {
            store,
            debts_key,
            savings_key,
            transactions_key,
            debts,
            savings_goals,
            transactions,
        }
    }

    /// All debts in insertion order.
    #[must_use]
    pub fn debts(&self) -> &[Debt] {
        &self.debts
    }

    /// All savings goals in insertion order.
    #[must_use]
    pub fn savings_goals(&self) -> &[SavingsGoal] {
        &self.savings_goals
    }

    /// All transactions in insertion order.
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Looks up a debt by id.
    #[must_use]
    pub fn debt(&self, debt_id: &str) -> Option<&Debt> {
        self.debts.iter().find(|d| d.id == debt_id)
    }

    /// Looks up a savings goal by id.
    #[must_use]
    pub fn savings_goal(&self, goal_id: &str) -> Option<&SavingsGoal> {
        self.savings_goals.iter().find(|g| g.id == goal_id)
    }

    /// Sum of remaining debt.
    #[must_use]
    pub fn total_debt(&self) -> f64 {
        self.debts.iter().map(|d| d.amount).sum()
    }

    /// Sum of saved amounts.
    #[must_use]
    pub fn total_savings(&self) -> f64 {
        self.savings_goals.iter().map(|g| g.current).sum()
    }

    /// Both aggregates at once.
    #[must_use]
    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals {
            total_debt: self.total_debt(),
            total_savings: self.total_savings(),
        }
    }

    /// The `n` most recently dated transactions, newest first.
    ///
    /// Transactions with the same date keep their insertion order, earliest-inserted first.
    #[must_use]
    pub fn recent_transactions(&self, n: usize) -> Vec<&Transaction> {
        let mut sorted: Vec<&Transaction> = self.transactions.iter().collect();
        sorted.sort_by(|a, b| b.date.cmp(&a.date));
        sorted.truncate(n);
        sorted
    }

    // --- Debts ---

    /// Validates and stores a new debt.
    pub async fn add_debt(&mut self, new_debt: NewDebt, now: DateTime<Utc>) -> Result<Debt> {
        let name = require_name(&new_debt.name, "Debt name")?;
        let total_amount = validate_amount(new_debt.total_amount)?;
        let amount = require_non_negative(new_debt.amount.unwrap_or(total_amount), "Amount owed")?;
        if amount > total_amount + AMOUNT_EPSILON {
            return Err(Error::InvalidInput {
                message: format!("Amount owed ({amount}) cannot exceed total ({total_amount})"),
            });
        }

        let debt = Debt {
            id: Uuid::new_v4().to_string(),
            name,
            category: new_debt.category.trim().to_string(),
            total_amount,
            amount,
            interest_rate: require_non_negative(new_debt.interest_rate, "Interest rate")?,
            minimum_payment: require_non_negative(new_debt.minimum_payment, "Minimum payment")?,
            history: vec![BalancePoint { amount, at: now }],
        };

        self.debts.push(debt.clone());
        self.persist_debts().await;
        info!(debt_id = %debt.id, name = %debt.name, "Added debt");
        Ok(debt)
    }

    /// Applies a partial update, keeping `0 <= amount <= total_amount`.
    pub async fn update_debt(
        &mut self,
        debt_id: &str,
        update: DebtUpdate,
        now: DateTime<Utc>,
    ) -> Result<Debt> {
        let current = self.debt(debt_id).ok_or_else(|| Error::DebtNotFound {
            id: debt_id.to_string(),
        })?;

        let mut next = current.clone();
        if let Some(name) = &update.name {
            next.name = require_name(name, "Debt name")?;
        }
        if let Some(category) = &update.category {
            next.category = category.trim().to_string();
        }
        if let Some(total_amount) = update.total_amount {
            next.total_amount = validate_amount(total_amount)?;
        }
        if let Some(amount) = update.amount {
            next.amount = require_non_negative(amount, "Amount owed")?;
        }
        if let Some(rate) = update.interest_rate {
            next.interest_rate = require_non_negative(rate, "Interest rate")?;
        }
        if let Some(minimum) = update.minimum_payment {
            next.minimum_payment = require_non_negative(minimum, "Minimum payment")?;
        }
        if next.amount > next.total_amount + AMOUNT_EPSILON {
            return Err(Error::InvalidInput {
                message: format!(
                    "Amount owed ({}) cannot exceed total ({})",
                    next.amount, next.total_amount
                ),
            });
        }
        if (next.amount - current.amount).abs() > AMOUNT_EPSILON {
            next.history.push(BalancePoint {
                amount: next.amount,
                at: now,
            });
        }

        self.replace_debt(next.clone()).await;
        Ok(next)
    }

    /// Removes a debt and returns it.
    pub async fn delete_debt(&mut self, debt_id: &str) -> Result<Debt> {
        let index = self
            .debts
            .iter()
            .position(|d| d.id == debt_id)
            .ok_or_else(|| Error::DebtNotFound {
                id: debt_id.to_string(),
            })?;
        let removed = self.debts.remove(index);
        self.persist_debts().await;
        info!(debt_id, "Deleted debt");
        Ok(removed)
    }

    /// Pays `amount` off a debt.
    ///
    /// Amounts above the remaining balance are rejected with
    /// [`Error::PaymentExceedsBalance`]; use [`Self::pay_debt_in_full`] instead.
    pub async fn make_payment(
        &mut self,
        debt_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<Debt> {
        let amount = validate_amount(amount)?;
        let debt = self.debt(debt_id).ok_or_else(|| Error::DebtNotFound {
            id: debt_id.to_string(),
        })?;

        if amount > debt.amount + AMOUNT_EPSILON {
            return Err(Error::PaymentExceedsBalance {
                requested: amount,
                remaining: debt.amount,
            });
        }

        self.apply_payment(debt_id, amount, now).await
    }

    /// Pays exactly the remaining balance of a debt.
    pub async fn pay_debt_in_full(&mut self, debt_id: &str, now: DateTime<Utc>) -> Result<Debt> {
        let debt = self.debt(debt_id).ok_or_else(|| Error::DebtNotFound {
            id: debt_id.to_string(),
        })?;

        if debt.is_paid_off() {
            return Err(Error::InvalidInput {
                message: format!("Debt '{}' is already paid off", debt.name),
            });
        }

        let remaining = debt.amount;
        self.apply_payment(debt_id, remaining, now).await
    }

    async fn apply_payment(
        &mut self,
        debt_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<Debt> {
        let debt = self
            .debts
            .iter_mut()
            .find(|d| d.id == debt_id)
            .ok_or_else(|| Error::DebtNotFound {
                id: debt_id.to_string(),
            })?;

        debt.amount = (debt.amount - amount).clamp(0.0, debt.total_amount);
        if debt.amount <= AMOUNT_EPSILON {
            debt.amount = 0.0;
        }
        debt.history.push(BalancePoint {
            amount: debt.amount,
            at: now,
        });
        let updated = debt.clone();

        self.persist_debts().await;
        info!(
            debt_id,
            paid = amount,
            remaining = updated.amount,
            paid_percentage = updated.paid_percentage(),
            "Applied debt payment"
        );
        Ok(updated)
    }

    async fn replace_debt(&mut self, debt: Debt) {
        if let Some(slot) = self.debts.iter_mut().find(|d| d.id == debt.id) {
            *slot = debt;
        }
        self.persist_debts().await;
    }

    async fn persist_debts(&self) {
        self.store.save(&self.debts_key, &self.debts).await;
    }

    // --- Savings goals ---

    /// Validates and stores a new savings goal.
    pub async fn add_savings_goal(
        &mut self,
        new_goal: NewSavingsGoal,
        now: DateTime<Utc>,
    ) -> Result<SavingsGoal> {
        let name = require_name(&new_goal.name, "Goal name")?;
        let target = validate_amount(new_goal.target)?;
        let current = require_non_negative(new_goal.current.unwrap_or(0.0), "Saved amount")?;
        if current > target + AMOUNT_EPSILON {
            return Err(Error::InvalidInput {
                message: format!("Saved amount ({current}) cannot exceed target ({target})"),
            });
        }

        let goal = SavingsGoal {
            id: Uuid::new_v4().to_string(),
            name,
            category: new_goal.category.trim().to_string(),
            target,
            current,
            deadline: new_goal.deadline,
            history: vec![BalancePoint {
                amount: current,
                at: now,
            }],
        };

        self.savings_goals.push(goal.clone());
        self.persist_savings().await;
        info!(goal_id = %goal.id, name = %goal.name, "Added savings goal");
        Ok(goal)
    }

    /// Applies a partial update, keeping `0 <= current <= target`.
    pub async fn update_savings_goal(
        &mut self,
        goal_id: &str,
        update: SavingsGoalUpdate,
        now: DateTime<Utc>,
    ) -> Result<SavingsGoal> {
        let existing = self
            .savings_goal(goal_id)
            .ok_or_else(|| Error::SavingsGoalNotFound {
                id: goal_id.to_string(),
            })?;

        let mut next = existing.clone();
        if let Some(name) = &update.name {
            next.name = require_name(name, "Goal name")?;
        }
        if let Some(category) = &update.category {
            next.category = category.trim().to_string();
        }
        if let Some(target) = update.target {
            next.target = validate_amount(target)?;
        }
        if let Some(current) = update.current {
            next.current = require_non_negative(current, "Saved amount")?;
        }
        if let Some(deadline) = update.deadline {
            next.deadline = deadline;
        }
        if next.current > next.target + AMOUNT_EPSILON {
            return Err(Error::InvalidInput {
                message: format!(
                    "Saved amount ({}) cannot exceed target ({})",
                    next.current, next.target
                ),
            });
        }
        if (next.current - existing.current).abs() > AMOUNT_EPSILON {
            next.history.push(BalancePoint {
                amount: next.current,
                at: now,
            });
        }

        if let Some(slot) = self.savings_goals.iter_mut().find(|g| g.id == goal_id) {
            *slot = next.clone();
        }
        self.persist_savings().await;
        Ok(next)
    }

    /// Removes a savings goal and returns it.
    pub async fn delete_savings_goal(&mut self, goal_id: &str) -> Result<SavingsGoal> {
        let index = self
            .savings_goals
            .iter()
            .position(|g| g.id == goal_id)
            .ok_or_else(|| Error::SavingsGoalNotFound {
                id: goal_id.to_string(),
            })?;
        let removed = self.savings_goals.remove(index);
        self.persist_savings().await;
        info!(goal_id, "Deleted savings goal");
        Ok(removed)
    }

    /// Deposits `amount` into a savings goal.
    ///
    /// Deposits that would overshoot the target are rejected with
    /// [`Error::DepositExceedsTarget`]; use [`Self::complete_savings_goal`] to fill
    /// the goal exactly.
    pub async fn make_deposit(
        &mut self,
        goal_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<SavingsGoal> {
        let amount = validate_amount(amount)?;
        let goal = self
            .savings_goal(goal_id)
            .ok_or_else(|| Error::SavingsGoalNotFound {
                id: goal_id.to_string(),
            })?;

        if amount > goal.remaining() + AMOUNT_EPSILON {
            return Err(Error::DepositExceedsTarget {
                requested: amount,
                remaining: goal.remaining(),
            });
        }

        self.apply_deposit(goal_id, amount, now).await
    }

    /// Deposits exactly what is missing to reach the target.
    pub async fn complete_savings_goal(
        &mut self,
        goal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SavingsGoal> {
        let goal = self
            .savings_goal(goal_id)
            .ok_or_else(|| Error::SavingsGoalNotFound {
                id: goal_id.to_string(),
            })?;

        if goal.is_complete() {
            return Err(Error::InvalidInput {
                message: format!("Savings goal '{}' has already reached its target", goal.name),
            });
        }

        let remaining = goal.remaining();
        self.apply_deposit(goal_id, remaining, now).await
    }

    async fn apply_deposit(
        &mut self,
        goal_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<SavingsGoal> {
        let goal = self
            .savings_goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or_else(|| Error::SavingsGoalNotFound {
                id: goal_id.to_string(),
            })?;

        goal.current = (goal.current + amount).clamp(0.0, goal.target);
        if goal.target - goal.current <= AMOUNT_EPSILON {
            goal.current = goal.target;
        }
        goal.history.push(BalancePoint {
            amount: goal.current,
            at: now,
        });
        let updated = goal.clone();

        self.persist_savings().await;
        info!(
            goal_id,
            deposited = amount,
            current = updated.current,
            target = updated.target,
            "Applied savings deposit"
        );
        Ok(updated)
    }

    async fn persist_savings(&self) {
        self.store.save(&self.savings_key, &self.savings_goals).await;
    }

    // --- Transactions ---

    /// Appends a transaction to the log. Debt and savings balances are not touched.
    pub async fn add_transaction(
        &mut self,
        new_transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let amount = validate_amount(new_transaction.amount)?;
        let category = require_name(&new_transaction.category, "Transaction category")?;

        let transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            kind: new_transaction.kind,
            amount,
            category,
            description: new_transaction
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            date: new_transaction.date.unwrap_or(now),
        };

        self.transactions.push(transaction.clone());
        self.store
            .save(&self.transactions_key, &self.transactions)
            .await;
        debug!(transaction_id = %transaction.id, amount, "Recorded transaction");
        Ok(transaction)
    }
}
