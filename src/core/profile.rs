//! Profile synchronization with the remote backend.
//!
//! [`ProfileSync::push_profile`] never fails because the backend is unreachable: it tries the
//! privileged upsert, then the direct upsert, and finally keeps the snapshot in local storage.
//! Without a session it waits once for one to appear before falling back.

use crate::{
    config::sync::SyncSettings,
    core::store::{KeyValueStore, UserStore},
    errors::{Error, Result},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Storage key for the locally kept profile snapshot
pub const USER_DATA_KEY: &str = "userData";

/// An authenticated backend session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable user identifier
    pub user_id: String,
}

/// Session capability provided by the authentication backend.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current session, if the user is signed in.
    async fn get_session(&self) -> Option<Session>;

    /// Receiver that observes every sign-in and sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

/// Remote profile capability. Both variants are idempotent on `id`.
#[async_trait]
pub trait RemoteProfileStore: Send + Sync {
    /// Upsert through the privileged path.
    async fn upsert_profile_privileged(&self, id: &str, profile: &ProfileSnapshot) -> Result<()>;

    /// Upsert directly as the signed-in user.
    async fn upsert_profile_direct(&self, id: &str, profile: &ProfileSnapshot) -> Result<()>;
}

/// Backend for running without a remote: never signed in and never reachable.
///
/// Every push through it ends up in local storage.
#[derive(Debug)]
pub struct LocalOnlyBackend {
    sessions: watch::Sender<Option<Session>>,
}

impl Default for LocalOnlyBackend {
    fn default() -> Self {
        let (sessions, _) = watch::channel(None);
        Self { sessions }
    }
}

#[async_trait]
impl SessionProvider for LocalOnlyBackend {
    async fn get_session(&self) -> Option<Session> {
        None
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sessions.subscribe()
    }
}

#[async_trait]
impl RemoteProfileStore for LocalOnlyBackend {
    async fn upsert_profile_privileged(&self, _id: &str, _profile: &ProfileSnapshot) -> Result<()> {
        Err(Error::Remote {
            message: "no profile backend configured".to_string(),
        })
    }

    async fn upsert_profile_direct(&self, _id: &str, _profile: &ProfileSnapshot) -> Result<()> {
        Err(Error::Remote {
            message: "no profile backend configured".to_string(),
        })
    }
}

/// User-entered profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetails {
    /// Display name
    pub username: String,
    /// Bio or personal goal text
    pub bio: String,
    /// Gender tag
    pub gender: Option<String>,
    /// Whether push notifications are enabled
    pub notifications_enabled: bool,
    /// Whether progress may be shared publicly
    pub share_progress: bool,
}

/// Profile fields plus financial aggregates mirrored for remote display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    /// User-entered fields
    #[serde(flatten)]
    pub details: ProfileDetails,
    /// Remaining debt over all debts
    pub total_debt: f64,
    /// Saved amount over all goals
    pub total_savings: f64,
    /// Accumulated XP
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
}

impl ProfileSnapshot {
    /// Rejects snapshots whose totals are negative or not finite.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("total debt", self.total_debt),
            ("total savings", self.total_savings),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidInput {
                    message: format!("Profile {label} must be a non-negative number, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// Which remote path accepted the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPath {
    /// The privileged upsert succeeded
    Privileged,
    /// The privileged upsert failed and the direct upsert succeeded
    Direct,
}

/// Why a snapshot was only kept locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No session, even after one retry
    NoSession,
    /// The signed-in session belongs to a different user
    SessionMismatch,
    /// Both remote upserts failed
    RemoteFailed,
}

/// Result of a profile push. Every variant is a success for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Stored remotely
    Remote(UpsertPath),
    /// Stored in local storage only
    UsingLocalData(FallbackReason),
}

/// Pushes profile snapshots to the backend with local fallback.
#[derive(Clone)]
pub struct ProfileSync {
    session: Arc<dyn SessionProvider>,
    remote: Arc<dyn RemoteProfileStore>,
    store: Arc<dyn KeyValueStore>,
    retry_delay: Duration,
}

impl std::fmt::Debug for ProfileSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileSync")
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl ProfileSync {
    /// Creates a syncer using the retry delay from `settings`.
    #[must_use]
    pub fn new(
        session: Arc<dyn SessionProvider>,
        remote: Arc<dyn RemoteProfileStore>,
        store: Arc<dyn KeyValueStore>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            session,
            remote,
            store,
            retry_delay: settings.session_retry_delay,
        }
    }

    /// The snapshot last kept locally for `user_id`.
    pub async fn local_snapshot(&self, user_id: &str) -> Option<ProfileSnapshot> {
        UserStore::new(Arc::clone(&self.store), user_id)
            .load(USER_DATA_KEY)
            .await
    }

    /// Pushes `snapshot` for `user_id`.
    ///
    /// # Errors
    /// Only malformed input fails; backend unavailability resolves to
    /// [`SyncOutcome::UsingLocalData`].
    pub async fn push_profile(
        &self,
        user_id: &str,
        snapshot: &ProfileSnapshot,
    ) -> Result<SyncOutcome> {
        if user_id.trim().is_empty() {
            return Err(Error::InvalidInput {
                message: "Profile user id cannot be empty".to_string(),
            });
        }
        snapshot.validate()?;

        let Some(session) = self.session_with_retry().await else {
            warn!(user_id, "{}, using local data", Error::SessionUnavailable);
            self.keep_locally(user_id, snapshot).await;
            return Ok(SyncOutcome::UsingLocalData(FallbackReason::NoSession));
        };
        if session.user_id != user_id.trim() {
            warn!(
                user_id,
                session_user_id = %session.user_id,
                "Session belongs to another user, using local data"
            );
            self.keep_locally(user_id, snapshot).await;
            return Ok(SyncOutcome::UsingLocalData(FallbackReason::SessionMismatch));
        }

        match self
            .remote
            .upsert_profile_privileged(&session.user_id, snapshot)
            .await
        {
            Ok(()) => {
                info!(user_id = %session.user_id, "Profile synced");
                return Ok(SyncOutcome::Remote(UpsertPath::Privileged));
            }
            Err(e) => warn!(user_id = %session.user_id, "Privileged profile upsert failed: {e}"),
        }

        match self
            .remote
            .upsert_profile_direct(&session.user_id, snapshot)
            .await
        {
            Ok(()) => {
                info!(user_id = %session.user_id, "Profile synced through direct upsert");
                Ok(SyncOutcome::Remote(UpsertPath::Direct))
            }
            Err(e) => {
                warn!(user_id = %session.user_id, "Direct profile upsert failed, using local data: {e}");
                self.keep_locally(user_id, snapshot).await;
                Ok(SyncOutcome::UsingLocalData(FallbackReason::RemoteFailed))
            }
        }
    }

    async fn session_with_retry(&self) -> Option<Session> {
        if let Some(session) = self.session.get_session().await {
            return Some(session);
        }

        debug!(delay = ?self.retry_delay, "No session yet, retrying once");
        tokio::time::sleep(self.retry_delay).await;
        self.session.get_session().await
    }

    async fn keep_locally(&self, user_id: &str, snapshot: &ProfileSnapshot) {
        UserStore::new(Arc::clone(&self.store), user_id)
            .save(USER_DATA_KEY, snapshot)
            .await;
    }
}
