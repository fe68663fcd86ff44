//! Shared test utilities.
//!
//! This module provides common helpers for setting up test databases, per-user stores,
//! a frozen clock and sample ledger inputs with sensible defaults.

#![allow(clippy::expect_used)]

use crate::{
    config::{catalog::Catalog, sync::SyncSettings},
    core::{
        clock::ManualClock,
        ledger::{NewDebt, NewSavingsGoal, NewTransaction, TransactionKind},
        profile::{ProfileSnapshot, RemoteProfileStore, Session, SessionProvider},
        store::{DbStore, KeyValueStore, UserStore},
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::watch;

const TEST_CATALOG: &str = r#"
[[challenges]]
id = "first-payment"
title = "First Strike"
description = "Make a payment on any debt."
reward = "50 XP + Debt Slayer Badge"
category = "debt"
trigger = "debt_payment"

[[challenges]]
id = "first-deposit"
title = "Piggy Bank"
description = "Put money into any savings goal."
reward = "40 XP + Saver Badge"
category = "savings"
trigger = "savings_deposit"

[[challenges]]
id = "weekly-payment"
title = "Weekly Warrior"
description = "Make a debt payment this week."
reward = "75 XP + Weekly Warrior Badge"
category = "debt"
weekly_reset = true
trigger = "debt_payment"

[[challenges]]
id = "budget-review"
title = "Budget Review"
description = "Review every category."
reward = "A pat on the back"
category = "budget"

[[badges]]
id = "debt-slayer"
name = "Debt Slayer"
description = "First debt payment."

[[badges]]
id = "saver"
name = "Saver"
description = "First savings deposit."

[[badges]]
id = "weekly-warrior"
name = "Weekly Warrior"
description = "Paid down debt this week."
"#;

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a [`UserStore`] for `user_id` over a fresh in-memory database.
pub async fn setup_test_store(user_id: &str) -> Result<UserStore> {
    let db = setup_test_db().await?;
    Ok(UserStore::new(Arc::new(DbStore::new(db)), user_id))
}

/// Creates a shared [`DbStore`] over a fresh in-memory database.
pub async fn setup_shared_store() -> Result<Arc<dyn KeyValueStore>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(DbStore::new(db)))
}

/// Fixed reference instant: 2024-05-01 09:00 UTC.
#[must_use]
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid test timestamp")
}

/// A manual clock frozen at [`test_now`].
#[must_use]
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(test_now()))
}

/// A manual clock at `at` whose calendar runs `hours` ahead of UTC.
#[must_use]
pub fn offset_clock(at: DateTime<Utc>, hours: i32) -> Arc<ManualClock> {
    let offset = FixedOffset::east_opt(hours * 3600).expect("valid test offset");
    Arc::new(ManualClock::with_offset(at, offset))
}

/// A small catalog: two one-off triggered challenges, one weekly triggered challenge and
/// one manual challenge without XP amount or badge.
#[must_use]
pub fn test_catalog() -> Catalog {
    Catalog::from_toml(TEST_CATALOG).expect("test catalog parses")
}

/// A debt with the full principal still owed and no interest.
#[must_use]
pub fn new_test_debt(name: &str, total_amount: f64) -> NewDebt {
    NewDebt {
        name: name.to_string(),
        category: "credit_card".to_string(),
        total_amount,
        amount: None,
        interest_rate: 0.0,
        minimum_payment: 0.0,
    }
}

/// A savings goal starting from zero with no deadline.
#[must_use]
pub fn new_test_goal(name: &str, target: f64) -> NewSavingsGoal {
    NewSavingsGoal {
        name: name.to_string(),
        category: "travel".to_string(),
        target,
        current: None,
        deadline: None,
    }
}

/// An expense dated at the time it is recorded.
#[must_use]
pub fn new_test_transaction(category: &str, amount: f64) -> NewTransaction {
    NewTransaction {
        kind: TransactionKind::Expense,
        amount,
        category: category.to_string(),
        description: Some("Test transaction".to_string()),
        date: None,
    }
}

/// Sync settings that retry without waiting.
#[must_use]
pub fn instant_settings() -> SyncSettings {
    SyncSettings {
        session_retry_delay: Duration::ZERO,
    }
}

/// Session provider answering lookups from a script, then from its broadcast state.
#[derive(Debug)]
pub struct ScriptedSessions {
    script: Mutex<VecDeque<Option<Session>>>,
    lookups: AtomicUsize,
    sender: watch::Sender<Option<Session>>,
}

impl ScriptedSessions {
    /// Lookups return `script` in order, then the current broadcast session.
    #[must_use]
    pub fn scripted(script: Vec<Option<Session>>) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            script: Mutex::new(script.into()),
            lookups: AtomicUsize::new(0),
            sender,
        }
    }

    /// Always signed out.
    #[must_use]
    pub fn signed_out() -> Self {
        Self::scripted(Vec::new())
    }

    /// Always signed in as `user_id`.
    #[must_use]
    pub fn signed_in(user_id: &str) -> Self {
        let sessions = Self::signed_out();
        sessions.sign_in(user_id);
        sessions
    }

    /// Broadcasts a sign-in.
    pub fn sign_in(&self, user_id: &str) {
        self.sender.send_replace(Some(Session {
            user_id: user_id.to_string(),
        }));
    }

    /// Broadcasts a sign-out.
    pub fn sign_out(&self) {
        self.sender.send_replace(None);
    }

    /// Number of `get_session` calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for ScriptedSessions {
    async fn get_session(&self) -> Option<Session> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().expect("script lock").pop_front();
        scripted.unwrap_or_else(|| self.sender.borrow().clone())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sender.subscribe()
    }
}

/// Remote profile store that records every call and fails on request.
#[derive(Debug, Default)]
pub struct RecordingRemote {
    fail_privileged: bool,
    fail_direct: bool,
    calls: Mutex<Vec<String>>,
    profiles: Mutex<Vec<ProfileSnapshot>>,
}

impl RecordingRemote {
    /// Privileged upserts fail, direct upserts succeed.
    #[must_use]
    pub fn failing_privileged() -> Self {
        Self {
            fail_privileged: true,
            ..Self::default()
        }
    }

    /// Every upsert fails.
    #[must_use]
    pub fn failing_all() -> Self {
        Self {
            fail_privileged: true,
            fail_direct: true,
            ..Self::default()
        }
    }

    /// Calls so far as `"<path>:<id>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// The snapshot carried by the most recent call.
    pub fn last_profile(&self) -> Option<ProfileSnapshot> {
        self.profiles.lock().expect("profiles lock").last().cloned()
    }

    fn record(&self, path: &str, id: &str, profile: &ProfileSnapshot, fail: bool) -> Result<()> {
        self.profiles
            .lock()
            .expect("profiles lock")
            .push(profile.clone());
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{path}:{id}"));
        if fail {
            Err(Error::Remote {
                message: format!("{path} upsert rejected"),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteProfileStore for RecordingRemote {
    async fn upsert_profile_privileged(&self, id: &str, profile: &ProfileSnapshot) -> Result<()> {
        self.record("privileged", id, profile, self.fail_privileged)
    }

    async fn upsert_profile_direct(&self, id: &str, profile: &ProfileSnapshot) -> Result<()> {
        self.record("direct", id, profile, self.fail_direct)
    }
}

/// A store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _namespace: &str, _key: &str) -> Result<Option<String>> {
        Err(Error::Persistence {
            message: "disk unavailable".to_string(),
        })
    }

    async fn set(&self, _namespace: &str, _key: &str, _value: String) -> Result<()> {
        Err(Error::Persistence {
            message: "disk unavailable".to_string(),
        })
    }

    async fn remove(&self, _namespace: &str, _key: &str) -> Result<()> {
        Err(Error::Persistence {
            message: "disk unavailable".to_string(),
        })
    }
}
