//! Experience point accumulator.
//!
//! Every XP grant in the engine funnels through [`XpAccount::add`], so the persisted total is
//! always the sum of all grants issued.

use crate::core::store::UserStore;
use tracing::debug;

/// Flat XP granted for each recorded transaction
pub const TRANSACTION_XP: u32 = 10;
/// XP granted the first time a daily task is completed on a given day
pub const DAILY_TASK_XP: u32 = 25;

/// Storage key for a user's XP total.
#[must_use]
pub fn xp_key(user_id: &str) -> String {
    format!("xp_{user_id}")
}

/// Monotonic XP total for one user.
#[derive(Debug, Clone)]
pub struct XpAccount {
    store: UserStore,
    key: String,
    total: u64,
}

impl XpAccount {
    /// Loads the persisted total, starting at zero when none exists.
    pub async fn load(store: UserStore, user_id: &str) -> Self {
        let key = xp_key(user_id);
        let total = store.load::<u64>(&key).await.unwrap_or(0);
        debug!(user_id, total, "Loaded XP total");
        Self { store, key, total }
    }

    /// Current total.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Adds `amount` and persists the new total, which is returned.
    pub async fn add(&mut self, amount: u32) -> u64 {
        self.total = self.total.saturating_add(u64::from(amount));
        self.store.save(&self.key, &self.total).await;
        debug!(amount, total = self.total, "Granted XP");
        self.total
    }

    /// Zeroes the total. Test and reset tooling only.
    pub async fn reset(&mut self) {
        self.total = 0;
        self.store.save(&self.key, &self.total).await;
    }
}
