//! Binds a [`ProgressEngine`] to the signed-in user.
//!
//! Sign-in loads and activates the engine for the session's user. Sign-out drops the
//! in-memory engine; persisted state stays in the store for the next sign-in. A configured
//! [`ProfileSync`] is attached to every engine loaded here.

use crate::{
    config::catalog::Catalog,
    core::{
        clock::Clock,
        engine::{ActivationReport, ProgressEngine},
        profile::{ProfileDetails, ProfileSync, Session, SessionProvider},
        store::KeyValueStore,
    },
    errors::{Error, Result},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Owns the engine of whoever is currently signed in.
pub struct EngineSession {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    catalog: Catalog,
    profile_sync: Option<ProfileSync>,
    engine: Option<ProgressEngine>,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("catalog", &self.catalog)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl EngineSession {
    /// Creates a signed-out session.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, catalog: Catalog) -> Self {
        Self {
            store,
            clock,
            catalog,
            profile_sync: None,
            engine: None,
        }
    }

    /// Pushes the profile of each signed-in user through `sync`.
    #[must_use]
    pub fn with_profile_sync(mut self, sync: ProfileSync) -> Self {
        self.profile_sync = Some(sync);
        self
    }

    /// The engine of the signed-in user.
    #[must_use]
    pub const fn engine(&self) -> Option<&ProgressEngine> {
        self.engine.as_ref()
    }

    /// Mutable access to the engine of the signed-in user.
    pub fn engine_mut(&mut self) -> Option<&mut ProgressEngine> {
        self.engine.as_mut()
    }

    /// Mutable access to the engine, failing when nobody is signed in.
    pub fn require_engine(&mut self) -> Result<&mut ProgressEngine> {
        self.engine.as_mut().ok_or(Error::SessionUnavailable)
    }

    /// Applies a session change.
    ///
    /// Returns the activation report when a (different) user was loaded.
    pub async fn apply(&mut self, session: Option<&Session>) -> Result<Option<ActivationReport>> {
        let Some(session) = session else {
            if let Some(engine) = self.engine.take() {
                info!(user_id = engine.user_id(), "Signed out, dropping in-memory state");
            }
            return Ok(None);
        };

        if self
            .engine
            .as_ref()
            .is_some_and(|e| e.user_id() == session.user_id.trim())
        {
            return Ok(None);
        }

        let mut engine = ProgressEngine::load(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            &self.catalog,
            &session.user_id,
        )
        .await?;
        if let Some(sync) = &self.profile_sync {
            engine.attach_profile_sync(sync.clone(), ProfileDetails::default());
        }
        let report = engine.activate().await;
        info!(user_id = engine.user_id(), "Signed in");
        self.engine = Some(engine);
        Ok(Some(report))
    }

    /// Loads the engine for whatever session `provider` currently reports.
    pub async fn resume(
        &mut self,
        provider: &dyn SessionProvider,
    ) -> Result<Option<ActivationReport>> {
        let session = provider.get_session().await;
        self.apply(session.as_ref()).await
    }

    /// Waits for the next session change on `sessions` and applies it.
    ///
    /// # Errors
    /// [`Error::SessionUnavailable`] once the provider has gone away.
    pub async fn follow(
        &mut self,
        sessions: &mut watch::Receiver<Option<Session>>,
    ) -> Result<Option<ActivationReport>> {
        sessions
            .changed()
            .await
            .map_err(|_| Error::SessionUnavailable)?;
        let session = sessions.borrow_and_update().clone();
        self.apply(session.as_ref()).await
    }
}
