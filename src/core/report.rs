//! Progress report generation.
//!
//! Builds a structured snapshot of the engine state and renders it as plain text with
//! progress bars. Rendering is kept separate so any front end can format the data itself.

use crate::core::{
    engine::{EngineTotals, ProgressEngine},
    ledger::{Transaction, TransactionKind},
    quest::ChallengeStatus,
    streak::StreakState,
};
use std::fmt::Write as _;

/// One debt in a report.
#[derive(Debug, Clone, PartialEq)]
pub struct DebtLine {
    /// Debt name
    pub name: String,
    /// Amount still owed
    pub remaining: f64,
    /// Principal
    pub total: f64,
    /// Share of the principal paid off (0-100)
    pub paid_percent: u32,
}

/// One savings goal in a report.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalLine {
    /// Goal name
    pub name: String,
    /// Saved so far
    pub current: f64,
    /// Target amount
    pub target: f64,
    /// Progress towards the target (0-100)
    pub progress_percent: f64,
}

/// One challenge in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeLine {
    /// Challenge title
    pub title: String,
    /// Lifecycle state
    pub status: ChallengeStatus,
    /// Progress percentage
    pub progress: u8,
}

/// Structured view of a user's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// User the report is for
    pub user_id: String,
    /// Aggregates
    pub totals: EngineTotals,
    /// Streak details
    pub streak: StreakState,
    /// Debts in insertion order
    pub debts: Vec<DebtLine>,
    /// Savings goals in insertion order
    pub goals: Vec<GoalLine>,
    /// Challenges the user has accepted, in catalog order
    pub challenges: Vec<ChallengeLine>,
    /// Number of badges in the catalog
    pub badges_total: usize,
    /// Most recently dated transactions, newest first
    pub recent_transactions: Vec<Transaction>,
}

/// Builds a report from the current engine state.
///
/// # Arguments
/// * `engine` - Engine to report on
/// * `transaction_limit` - Maximum number of recent transactions to include (default 5)
#[must_use]
pub fn generate_progress_report(
    engine: &ProgressEngine,
    transaction_limit: Option<usize>,
) -> ProgressReport {
    let ledger = engine.ledger();

    let debts = ledger
        .debts()
        .iter()
        .map(|d| DebtLine {
            name: d.name.clone(),
            remaining: d.amount,
            total: d.total_amount,
            paid_percent: d.paid_percentage(),
        })
        .collect();

    let goals = ledger
        .savings_goals()
        .iter()
        .map(|g| GoalLine {
            name: g.name.clone(),
            current: g.current,
            target: g.target,
            progress_percent: calculate_progress(g.current, g.target),
        })
        .collect();

    let challenges = engine
        .quests()
        .challenges()
        .iter()
        .filter(|c| c.status() != ChallengeStatus::Inactive)
        .map(|c| ChallengeLine {
            title: c.title.clone(),
            status: c.status(),
            progress: c.progress,
        })
        .collect();

    ProgressReport {
        user_id: engine.user_id().to_string(),
        totals: engine.totals(),
        streak: engine.streak(),
        debts,
        goals,
        challenges,
        badges_total: engine.quests().badges().len(),
        recent_transactions: engine
            .recent_transactions(transaction_limit.unwrap_or(5))
            .into_iter()
            .cloned()
            .collect(),
    }
}

/// Percentage of `target` reached by `current`. Zero when there is no target.
#[must_use]
pub fn calculate_progress(current: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }

    (current / target) * 100.0
}

/// Generates a progress bar string for visual representation.
///
/// Creates a text-based progress bar like: `[████████░░] 80.0%`
///
/// # Arguments
/// * `progress_percent` - Progress percentage (0-100)
/// * `bar_length` - Length of the progress bar in characters (default 10)
#[must_use]
pub fn format_progress_bar(progress_percent: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped = progress_percent.clamp(0.0, 100.0);

    // clamped is in [0, 100] and length is small, so the product fits in usize
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((clamped / 100.0) * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    format!(
        "[{}{}] {progress_percent:.1}%",
        "█".repeat(filled),
        "░".repeat(empty)
    )
}

/// Formats a transaction amount with its sign: `"+$50.00"` for income, `"-$25.50"` for expenses.
#[must_use]
pub fn format_transaction_amount(kind: TransactionKind, amount: f64) -> String {
    match kind {
        TransactionKind::Income => format!("+${amount:.2}"),
        TransactionKind::Expense => format!("-${amount:.2}"),
    }
}

/// One-line summary of a transaction.
#[must_use]
pub fn format_transaction_summary(transaction: &Transaction) -> String {
    let description = transaction
        .description
        .as_deref()
        .map_or_else(String::new, |d| format!(" - {d}"));
    format!(
        "{} {} [{}]{description}",
        transaction.date.format("%Y-%m-%d"),
        format_transaction_amount(transaction.kind, transaction.amount),
        transaction.category,
    )
}

/// Renders a report as plain text.
#[must_use]
pub fn format_progress_report(report: &ProgressReport) -> String {
    let mut out = String::new();
    let totals = &report.totals;

    // Writing into a String cannot fail
    let _ = writeln!(out, "Progress for {}", report.user_id);
    let _ = writeln!(
        out,
        "Streak: {} day(s) (best {}) | XP: {} | Badges: {}/{}",
        report.streak.current_streak,
        report.streak.longest_streak,
        totals.total_xp,
        totals.badges_earned,
        report.badges_total
    );
    let _ = writeln!(
        out,
        "Total debt: ${:.2} | Total savings: ${:.2}",
        totals.total_debt, totals.total_savings
    );

    if !report.debts.is_empty() {
        let _ = writeln!(out, "\nDebts:");
        for debt in &report.debts {
            let _ = writeln!(
                out,
                "  {}: ${:.2} of ${:.2} left {}",
                debt.name,
                debt.remaining,
                debt.total,
                format_progress_bar(f64::from(debt.paid_percent), None)
            );
        }
    }

    if !report.goals.is_empty() {
        let _ = writeln!(out, "\nSavings goals:");
        for goal in &report.goals {
            let _ = writeln!(
                out,
                "  {}: ${:.2} of ${:.2} {}",
                goal.name,
                goal.current,
                goal.target,
                format_progress_bar(goal.progress_percent, None)
            );
        }
    }

    if !report.challenges.is_empty() {
        let _ = writeln!(out, "\nChallenges:");
        for challenge in &report.challenges {
            let _ = writeln!(
                out,
                "  {} ({}, {}%)",
                challenge.title, challenge.status, challenge.progress
            );
        }
    }

    if !report.recent_transactions.is_empty() {
        let _ = writeln!(out, "\nRecent transactions:");
        for transaction in &report.recent_transactions {
            let _ = writeln!(out, "  {}", format_transaction_summary(transaction));
        }
    }

    out
}
