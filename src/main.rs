#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use ledger_quest::{
    config::{catalog, database, sync},
    core::{
        clock::{Clock, SystemClock},
        engine::ProgressEngine,
        profile::{LocalOnlyBackend, ProfileDetails, ProfileSync, SessionProvider},
        report,
        store::{DbStore, KeyValueStore},
    },
    errors::{Error, Result},
};
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the challenge and badge catalog, then the profile sync settings
    let catalog = catalog::load_default_catalog()
        .inspect_err(|e| error!("Failed to load catalog: {}", e))?;
    let sync_settings = sync::load_sync_settings()
        .inspect_err(|e| error!("Failed to load sync settings: {}", e))?;

    // 4. Open the database and make sure the key/value table exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Load and activate the engine for the configured user
    let user_id = env::var("LEDGER_QUEST_USER_ID")
        .inspect_err(|e| error!("LEDGER_QUEST_USER_ID not found: {}", e))
        .map_err(Error::EnvVar)?;

    let store: Arc<dyn KeyValueStore> = Arc::new(DbStore::new(db));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut engine = ProgressEngine::load(Arc::clone(&store), clock, &catalog, &user_id).await?;

    // No remote backend in the CLI; profile pushes land in local storage
    let backend = Arc::new(LocalOnlyBackend::default());
    let profile_sync = ProfileSync::new(Arc::clone(&backend) as Arc<dyn SessionProvider>, backend, store, &sync_settings);
    engine.attach_profile_sync(
        profile_sync,
        ProfileDetails {
            username: user_id.clone(),
            ..ProfileDetails::default()
        },
    );

    let activation = engine.activate().await;
    info!(
        streak = activation.current_streak,
        weekly_resets = activation.weekly_resets.challenges.len() + activation.weekly_resets.badges.len(),
        "Activation complete"
    );

    // 6. Mirror the profile with the current totals
    match engine.sync_profile().await {
        Ok(outcome) => info!(?outcome, "Profile pushed"),
        Err(e) => error!("Failed to push profile: {}", e),
    }

    // 7. Print the progress report
    let progress = report::generate_progress_report(&engine, None);
    println!("{}", report::format_progress_report(&progress));

    Ok(())
}
