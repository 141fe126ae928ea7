//! Process configuration
//!
//! Collects the environment variables controlling the four memory tiers
//! into one struct, read once at startup.

use std::path::PathBuf;

/// Runtime configuration, resolved from environment variables with
/// documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// `CORTEX_BRAIN_DIR` - root directory for the four embedded databases
    /// and the Tier 0 instinct file. Defaults to the platform data dir.
    pub brain_dir: PathBuf,
    /// `CORTEX_CAPACITY_TIER1` - max conversations kept in Tier 1.
    pub capacity_tier1: usize,
    /// `CORTEX_DECAY_DAYS` - comma-separated decay thresholds in days.
    pub decay_days: DecayDays,
    /// `CORTEX_REQUEST_DEADLINE_MS` - per-request deadline.
    pub request_deadline_ms: u64,
    /// `CORTEX_LEARNING_THRESHOLD` - pending-event count that triggers a run.
    pub learning_threshold: usize,
    /// `CORTEX_TOKEN_BUDGET` - context-bundle token budget (whitespace atoms).
    pub token_budget: usize,
    /// Minimum token-overlap fraction for fuzzy trigger matching. Not
    /// environment-configurable; fixed so routing stays reproducible.
    pub min_token_overlap: f64,
}

/// The four decay thresholds, in days unused, applied to knowledge-graph
/// patterns.
#[derive(Debug, Clone, Copy)]
pub struct DecayDays {
    pub soft: i64,
    pub hard: i64,
    pub delete_candidate: i64,
    pub delete: i64,
}

impl Default for DecayDays {
    fn default() -> Self {
        Self { soft: 60, hard: 90, delete_candidate: 120, delete: 180 }
    }
}

impl DecayDays {
    fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<i64> = raw
            .split(',')
            .map(|p| p.trim().parse::<i64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if parts.len() != 4 {
            return None;
        }
        Some(Self { soft: parts[0], hard: parts[1], delete_candidate: parts[2], delete: parts[3] })
    }
}

impl Config {
    /// Load configuration from the environment, falling back to documented defaults.
    pub fn from_env() -> Self {
        let brain_dir = std::env::var("CORTEX_BRAIN_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_brain_dir);

        Self {
            brain_dir,
            capacity_tier1: env_usize("CORTEX_CAPACITY_TIER1", 70),
            decay_days: std::env::var("CORTEX_DECAY_DAYS")
                .ok()
                .and_then(|v| DecayDays::parse(&v))
                .unwrap_or_default(),
            request_deadline_ms: env_u64("CORTEX_REQUEST_DEADLINE_MS", 60_000),
            learning_threshold: env_usize("CORTEX_LEARNING_THRESHOLD", 50),
            token_budget: env_usize("CORTEX_TOKEN_BUDGET", 600),
            min_token_overlap: 0.34,
        }
    }

    fn default_brain_dir() -> PathBuf {
        directories::ProjectDirs::from("com", "cortex", "brain")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".cortex"))
    }

    pub fn tier1_path(&self) -> PathBuf {
        self.brain_dir.join("tier1.db")
    }
    pub fn tier2_path(&self) -> PathBuf {
        self.brain_dir.join("tier2.db")
    }
    pub fn tier3_path(&self) -> PathBuf {
        self.brain_dir.join("tier3.db")
    }
    pub fn events_path(&self) -> PathBuf {
        self.brain_dir.join("events.db")
    }
    pub fn instinct_path(&self) -> PathBuf {
        self.brain_dir.join("instinct.json")
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
