//! Challenge (quest) lifecycle and badge awarding.
//!
//! Challenges move `Inactive -> Active -> Completed -> Claimed`. Claiming pays out the XP
//! encoded in the reward text and earns the badge it names, once. Weekly challenges and
//! badges fall back to their initial state seven days after they were last completed/earned.

use crate::{
    config::catalog::{BadgeConfig, Catalog, ChallengeConfig},
    core::{
        clock::{Clock, days_since},
        daily_tasks::DailyTask,
        store::UserStore,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Storage key for challenges
pub const CHALLENGES_KEY: &str = "challenges";
/// Storage key for badges
pub const BADGES_KEY: &str = "badges";
/// XP paid out when a reward does not state an amount
pub const DEFAULT_REWARD_XP: u32 = 50;
/// Days after completion before a weekly challenge or badge resets
pub const WEEKLY_RESET_DAYS: i64 = 7;

/// Extracts the XP amount from reward text such as `"150 XP + Saver Badge"`.
///
/// Takes the integer immediately before `XP`; falls back to [`DEFAULT_REWARD_XP`].
#[must_use]
pub fn parse_reward_xp(reward: &str) -> u32 {
    reward
        .find("XP")
        .and_then(|idx| reward[..idx].split_whitespace().last())
        .and_then(|amount| amount.parse().ok())
        .unwrap_or(DEFAULT_REWARD_XP)
}

/// Extracts the badge name from reward text such as `"150 XP + Saver Badge"`.
#[must_use]
pub fn parse_reward_badge(reward: &str) -> Option<String> {
    let after_xp = reward.find("XP").map_or(reward, |idx| &reward[idx + 2..]);
    let named = after_xp.trim().trim_start_matches(['+', '&', ',']).trim();
    let name = named
        .strip_suffix("Badge")
        .or_else(|| named.strip_suffix("badge"))?
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Lifecycle state of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeStatus {
    /// Not yet accepted
    Inactive,
    /// Accepted and in progress
    Active,
    /// Progress reached 100, reward not yet claimed
    Completed,
    /// Reward paid out
    Claimed,
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Claimed => "claimed",
        };
        f.write_str(label)
    }
}

/// A user-acceptable goal with progress and a reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Catalog identifier
    pub id: String,
    /// Display title
    pub title: String,
    /// What the user has to do
    pub description: String,
    /// Reward text encoding XP and an optional badge
    pub reward: String,
    /// Category tag
    pub category: String,
    /// Progress percentage, 0 to 100
    pub progress: u8,
    /// Whether the user accepted the challenge
    pub active: bool,
    /// Whether the reward was paid out
    #[serde(default)]
    pub claimed: bool,
    /// Whether the challenge resets a week after completion
    pub weekly_reset: bool,
    /// When the challenge was accepted
    pub start_date: Option<DateTime<Utc>>,
    /// When progress last reached 100
    pub last_completed: Option<DateTime<Utc>>,
    /// Daily task that completes the challenge while active
    #[serde(default)]
    pub trigger: Option<DailyTask>,
}

impl Challenge {
    fn from_config(config: &ChallengeConfig) -> Self {
        Self {
            id: config.id.clone(),
            title: config.title.clone(),
            description: config.description.clone(),
            reward: config.reward.clone(),
            category: config.category.clone(),
            progress: 0,
            active: false,
            claimed: false,
            weekly_reset: config.weekly_reset,
            start_date: None,
            last_completed: None,
            trigger: config.trigger,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> ChallengeStatus {
        if self.claimed {
            ChallengeStatus::Claimed
        } else if self.progress >= 100 {
            ChallengeStatus::Completed
        } else if self.active {
            ChallengeStatus::Active
        } else {
            ChallengeStatus::Inactive
        }
    }

    /// XP paid out on claim.
    #[must_use]
    pub fn reward_xp(&self) -> u32 {
        parse_reward_xp(&self.reward)
    }

    /// Badge named by the reward, if any.
    #[must_use]
    pub fn reward_badge(&self) -> Option<String> {
        parse_reward_badge(&self.reward)
    }

    fn invalid(&self, action: &str) -> Error {
        Error::InvalidTransition {
            id: self.id.clone(),
            from: self.status().to_string(),
            action: action.to_string(),
        }
    }

    fn reset(&mut self) {
        self.progress = 0;
        self.active = false;
        self.claimed = false;
        self.start_date = None;
        self.last_completed = None;
    }
}

/// A persistent achievement flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    /// Catalog identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// What the badge is for
    pub description: String,
    /// Whether the badge is currently held
    pub earned: bool,
    /// When the badge was last earned
    pub last_earned: Option<DateTime<Utc>>,
    /// Whether the badge can be re-earned weekly
    pub weekly_reset: bool,
}

impl Badge {
    fn from_config(config: &BadgeConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            description: config.description.clone(),
            earned: false,
            last_earned: None,
            weekly_reset: config.weekly_reset,
        }
    }
}

/// Result of claiming a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// The challenge after the claim
    pub challenge: Challenge,
    /// XP to grant
    pub xp: u32,
    /// The badge newly earned by this claim, if any
    pub badge_earned: Option<Badge>,
}

/// Ids reset by a weekly sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyResetReport {
    /// Challenges returned to inactive
    pub challenges: Vec<String>,
    /// Badges returned to unearned
    pub badges: Vec<String>,
}

impl WeeklyResetReport {
    /// Whether the sweep changed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty() && self.badges.is_empty()
    }
}

/// Owns and persists one user's challenges and badges.
#[derive(Debug, Clone)]
pub struct QuestEngine {
    store: UserStore,
    challenges: Vec<Challenge>,
    badges: Vec<Badge>,
}

impl QuestEngine {
    /// Loads persisted challenges and badges.
    ///
    /// On first run the full catalog is seeded with every challenge inactive and every badge
    /// unearned. Catalog entries added later are appended without touching existing state.
    pub async fn load(store: UserStore, catalog: &Catalog) -> Self {
        let stored_challenges: Option<Vec<Challenge>> = store.load(CHALLENGES_KEY).await;
        let stored_badges: Option<Vec<Badge>> = store.load(BADGES_KEY).await;
        let seeded = stored_challenges.is_none() || stored_badges.is_none();

        let mut engine = Self {
            store,
            challenges: stored_challenges.unwrap_or_default(),
            badges: stored_badges.unwrap_or_default(),
        };

        let added = engine.merge_catalog(catalog);
        if seeded || added > 0 {
            info!(
                namespace = engine.store.namespace(),
                added, "Seeded challenge catalog"
            );
            engine.persist().await;
        }
        engine
    }

    fn merge_catalog(&mut self, catalog: &Catalog) -> usize {
        let mut added = 0;

        for config in &catalog.badges {
            if !self.badges.iter().any(|b| b.id == config.id) {
                self.badges.push(Badge::from_config(config));
                added += 1;
            }
        }

        for config in &catalog.challenges {
            if !self.challenges.iter().any(|c| c.id == config.id) {
                let challenge = Challenge::from_config(config);
                // A weekly challenge makes the badge it awards weekly too
                if challenge.weekly_reset {
                    if let Some(name) = challenge.reward_badge() {
                        if let Some(badge) = self.badge_by_name_mut(&name) {
                            badge.weekly_reset = true;
                        }
                    }
                }
                self.challenges.push(challenge);
                added += 1;
            }
        }

        added
    }

    /// All challenges in catalog order.
    #[must_use]
    pub fn challenges(&self) -> &[Challenge] {
        &self.challenges
    }

    /// All badges in catalog order.
    #[must_use]
    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    /// Looks up a challenge by id.
    #[must_use]
    pub fn challenge(&self, challenge_id: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.id == challenge_id)
    }

    /// Looks up a badge by id.
    #[must_use]
    pub fn badge(&self, badge_id: &str) -> Option<&Badge> {
        self.badges.iter().find(|b| b.id == badge_id)
    }

    /// Number of badges currently held.
    #[must_use]
    pub fn earned_badge_count(&self) -> usize {
        self.badges.iter().filter(|b| b.earned).count()
    }

    fn badge_by_name_mut(&mut self, name: &str) -> Option<&mut Badge> {
        self.badges
            .iter_mut()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }

    fn challenge_mut(&mut self, challenge_id: &str) -> Result<&mut Challenge> {
        self.challenges
            .iter_mut()
            .find(|c| c.id == challenge_id)
            .ok_or_else(|| Error::ChallengeNotFound {
                id: challenge_id.to_string(),
            })
    }

    /// Resets weekly challenges and badges completed or earned at least a week ago, counting
    /// calendar days in the timezone of `clock`.
    pub async fn sweep_weekly_resets(&mut self, clock: &dyn Clock) -> WeeklyResetReport {
        let mut report = WeeklyResetReport::default();

        for challenge in self.challenges.iter_mut().filter(|c| c.weekly_reset) {
            if let Some(completed) = challenge.last_completed {
                if days_since(clock, completed) >= WEEKLY_RESET_DAYS {
                    challenge.reset();
                    report.challenges.push(challenge.id.clone());
                }
            }
        }

        for badge in self.badges.iter_mut().filter(|b| b.weekly_reset) {
            if let Some(earned) = badge.last_earned {
                if days_since(clock, earned) >= WEEKLY_RESET_DAYS {
                    badge.earned = false;
                    badge.last_earned = None;
                    report.badges.push(badge.id.clone());
                }
            }
        }

        if !report.is_empty() {
            info!(
                challenges = ?report.challenges,
                badges = ?report.badges,
                "Applied weekly resets"
            );
            self.persist().await;
        }
        report
    }

    /// Accepts an inactive challenge.
    pub async fn accept(&mut self, challenge_id: &str, now: DateTime<Utc>) -> Result<Challenge> {
        let challenge = self.challenge_mut(challenge_id)?;
        if challenge.status() != ChallengeStatus::Inactive {
            return Err(challenge.invalid("accept"));
        }

        challenge.active = true;
        challenge.start_date = Some(now);
        let accepted = challenge.clone();

        self.persist().await;
        info!(challenge_id, "Accepted challenge");
        Ok(accepted)
    }

    /// Sets the progress of an active challenge; reaching 100 completes it.
    ///
    /// Completed challenges are left unchanged.
    pub async fn set_progress(
        &mut self,
        challenge_id: &str,
        progress: u8,
        now: DateTime<Utc>,
    ) -> Result<Challenge> {
        let challenge = self.challenge_mut(challenge_id)?;
        match challenge.status() {
            ChallengeStatus::Active => {}
            ChallengeStatus::Completed => return Ok(challenge.clone()),
            ChallengeStatus::Inactive | ChallengeStatus::Claimed => {
                return Err(challenge.invalid("update progress of"));
            }
        }

        challenge.progress = progress.min(100);
        if challenge.progress == 100 {
            challenge.last_completed = Some(now);
            info!(challenge_id, "Challenge completed");
        }
        let updated = challenge.clone();

        self.persist().await;
        Ok(updated)
    }

    /// Marks an active challenge complete. Returns `false` when it already was.
    pub async fn complete(&mut self, challenge_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let challenge = self.challenge_mut(challenge_id)?;
        match challenge.status() {
            ChallengeStatus::Active => {}
            ChallengeStatus::Completed | ChallengeStatus::Claimed => {
                debug!(challenge_id, "Challenge already completed");
                return Ok(false);
            }
            ChallengeStatus::Inactive => return Err(challenge.invalid("complete")),
        }

        challenge.progress = 100;
        challenge.last_completed = Some(now);
        self.persist().await;
        info!(challenge_id, "Challenge completed");
        Ok(true)
    }

    /// Completes every active challenge bound to `task`. Returns the completed challenges.
    pub async fn complete_triggered(
        &mut self,
        task: DailyTask,
        now: DateTime<Utc>,
    ) -> Vec<Challenge> {
        let mut completed = Vec::new();
        for challenge in &mut self.challenges {
            if challenge.trigger == Some(task) && challenge.status() == ChallengeStatus::Active {
                challenge.progress = 100;
                challenge.last_completed = Some(now);
                completed.push(challenge.clone());
            }
        }

        if !completed.is_empty() {
            info!(%task, count = completed.len(), "Completed triggered challenges");
            self.persist().await;
        }
        completed
    }

    /// Claims a completed challenge, earning its badge if not already held.
    pub async fn claim(&mut self, challenge_id: &str, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let challenge = self.challenge_mut(challenge_id)?;
        if challenge.status() != ChallengeStatus::Completed {
            return Err(challenge.invalid("claim"));
        }

        challenge.claimed = true;
        let claimed = challenge.clone();
        let xp = claimed.reward_xp();

        let badge_earned = match claimed.reward_badge() {
            Some(name) => match self.badge_by_name_mut(&name) {
                Some(badge) if !badge.earned => {
                    badge.earned = true;
                    badge.last_earned = Some(now);
                    Some(badge.clone())
                }
                Some(_) => {
                    debug!(badge = %name, "Badge already earned");
                    None
                }
                None => {
                    debug!(badge = %name, "Reward names an unknown badge");
                    None
                }
            },
            None => None,
        };

        self.persist().await;
        info!(
            challenge_id,
            xp,
            badge = ?badge_earned.as_ref().map(|b| &b.id),
            "Claimed challenge"
        );
        Ok(ClaimOutcome {
            challenge: claimed,
            xp,
            badge_earned,
        })
    }

    async fn persist(&self) {
        self.store.save(CHALLENGES_KEY, &self.challenges).await;
        self.store.save(BADGES_KEY, &self.badges).await;
    }
}
