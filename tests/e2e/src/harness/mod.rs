//! Test fixture: an isolated `cortex_core::State` backed by a temporary
//! brain directory, plus seeding helpers for the scenarios that need
//! pre-populated tiers rather than a cold start.

use cortex_core::config::Config;
use cortex_core::dispatcher::ResponseEnvelope;
use cortex_core::error::Result;
use cortex_core::state::State;
use cortex_core::tier2::patterns::PatternType;
use tempfile::TempDir;

/// Wraps a `State` over a brain directory that's deleted when the fixture
/// drops, mirroring the teacher's `TestDatabaseManager` (temp dir kept
/// alive alongside the thing under test, not leaked into the real
/// platform data directory).
pub struct Fixture {
    pub state: State,
    _brain_dir: TempDir,
}

impl Fixture {
    /// A fresh brain directory with every tier at its documented default.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// A fresh brain directory with `configure` given a chance to override
    /// fields (capacity, token budget, deadline, ...) before `State::init`.
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let brain_dir = TempDir::new().expect("failed to create temp brain dir");
        let mut config = Config::from_env();
        config.brain_dir = brain_dir.path().to_path_buf();
        configure(&mut config);
        let state = State::init(config).expect("failed to initialize cortex state");
        Self { state, _brain_dir: brain_dir }
    }

    pub fn process(&self, raw_text: &str, session_hint: Option<&str>) -> Result<ResponseEnvelope> {
        self.state.process_request(raw_text, session_hint)
    }

    /// Directly seed a routing pattern into Tier 2, bypassing the 3-example
    /// candidate rule, for scenarios that start from an already-learned
    /// pattern rather than building one up through repeated requests.
    pub fn seed_pattern(
        &self,
        title: &str,
        routes_to: &str,
        triggers: &[&str],
    ) -> cortex_core::tier2::patterns::Pattern {
        let owned: Vec<String> = triggers.iter().map(|s| s.to_string()).collect();
        self.state
            .tier2
            .learn_pattern(PatternType::Routing, title, "", routes_to, "", &owned, false)
            .expect("failed to seed pattern")
    }

    /// Append `count` conversations directly to Tier 1, each with one user
    /// turn, for eviction/capacity boundary tests that need to get a fixture
    /// near or past capacity without a full request per conversation.
    pub fn seed_conversations(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let conversation_id = format!("seed-{i}");
                self.state
                    .tier1
                    .append_turn(&conversation_id, cortex_core::tier1::Role::User, "seed turn")
                    .expect("failed to seed conversation");
                conversation_id
            })
            .collect()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
