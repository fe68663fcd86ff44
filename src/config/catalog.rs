//! Challenge and badge catalog loading from config.toml
//!
//! The catalog is the static list of challenges and badges seeded for every user on first
//! run. A copy of the shipped `config.toml` is compiled in and used whenever no catalog file
//! is found on disk.

use crate::core::daily_tasks::DailyTask;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const BUILTIN_CATALOG: &str = include_str!("../../config.toml");
const DEFAULT_CATALOG_PATH: &str = "config.toml";

/// Configuration structure representing the entire catalog file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    /// Challenges offered to every user
    #[serde(default)]
    pub challenges: Vec<ChallengeConfig>,
    /// Badges that challenges can award
    #[serde(default)]
    pub badges: Vec<BadgeConfig>,
}

/// Configuration for a single challenge
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeConfig {
    /// Stable identifier
    pub id: String,
    /// Display title
    pub title: String,
    /// What the user has to do
    pub description: String,
    /// Reward text, e.g. `"50 XP + Saver Badge"`
    pub reward: String,
    /// Category tag
    #[serde(default)]
    pub category: String,
    /// Whether the challenge cycles back to inactive a week after completion
    #[serde(default)]
    pub weekly_reset: bool,
    /// Daily task that completes this challenge while it is active
    #[serde(default)]
    pub trigger: Option<DailyTask>,
}

/// Configuration for a single badge
#[derive(Debug, Clone, Deserialize)]
pub struct BadgeConfig {
    /// Stable identifier
    pub id: String,
    /// Display name, referenced from challenge rewards
    pub name: String,
    /// What the badge is for
    pub description: String,
    /// Whether the badge can be re-earned every week
    #[serde(default)]
    pub weekly_reset: bool,
}

impl Catalog {
    /// Parses a catalog from TOML text and checks that ids are unique.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let catalog: Self = toml::from_str(contents).map_err(|e| Error::Config {
            message: format!("Failed to parse catalog: {e}"),
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        let mut challenge_ids = HashSet::new();
        for challenge in &self.challenges {
            if !challenge_ids.insert(challenge.id.as_str()) {
                return Err(Error::Config {
                    message: format!("Duplicate challenge id in catalog: {}", challenge.id),
                });
            }
        }

        let mut badge_ids = HashSet::new();
        for badge in &self.badges {
            if !badge_ids.insert(badge.id.as_str()) {
                return Err(Error::Config {
                    message: format!("Duplicate badge id in catalog: {}", badge.id),
                });
            }
        }

        Ok(())
    }
}

/// Loads the catalog from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML is invalid, or ids repeat.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let path_ref = path.as_ref();
    debug!("Loading catalog from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read catalog file {path_ref:?}: {e}"),
    })?;
    Catalog::from_toml(&contents)
}

/// The catalog compiled into the binary.
pub fn builtin_catalog() -> Result<Catalog> {
    Catalog::from_toml(BUILTIN_CATALOG)
}

/// Loads the catalog from `CATALOG_PATH` (default `./config.toml`), falling back to the
/// built-in catalog when that file does not exist.
pub fn load_default_catalog() -> Result<Catalog> {
    let path = std::env::var("CATALOG_PATH").unwrap_or_else(|_| DEFAULT_CATALOG_PATH.to_string());
    if Path::new(&path).exists() {
        let catalog = load_catalog(&path)?;
        info!(
            path = %path,
            challenges = catalog.challenges.len(),
            badges = catalog.badges.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    } else {
        info!(path = %path, "Catalog file not found, using built-in catalog");
        builtin_catalog()
    }
}
