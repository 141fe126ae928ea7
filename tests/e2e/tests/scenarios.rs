//! The six literal end-to-end scenarios named in the core spec's testable
//! properties section, driven through `State::process_request` rather than
//! against any single tier in isolation.

use cortex_core::error::CortexError;
use cortex_core::formatter::has_mandatory_structure;
use cortex_core::router::IntentKind;
use cortex_core::tier2::Outcome;
use cortex_e2e_tests::harness::Fixture;

/// 1. Trigger routes to template: "help" selects the HELP intent and the
/// `help_table` template, the response carries the mandatory structure and
/// the help table marker, a turn is appended, and one commit event fires.
#[test]
fn help_trigger_routes_to_help_table_template() {
    let fixture = Fixture::new();
    let before = fixture.state.events.read_after(0, 1000).unwrap().len();

    let envelope = fixture.process("help", Some("s1")).unwrap();

    assert_eq!(envelope.intent, IntentKind::Help);
    assert_eq!(envelope.template_id.as_deref(), Some("help_table"));
    assert!(has_mandatory_structure(&envelope.text));
    assert!(envelope.text.contains("What it covers"), "help table marker missing: {}", envelope.text);

    let convo = fixture.state.tier1.get_conversation("s1").unwrap().unwrap();
    assert_eq!(convo.turns.len(), 2, "user + assistant turn expected");

    let after = fixture.state.events.read_after(0, 1000).unwrap();
    assert!(after.len() > before);
    assert!(
        after.iter().any(|e| e.event_type == "request_committed"),
        "expected a commit event for the handled request"
    );
}

/// 2. Feedback creates a report artefact under reports/, not the repository
/// root; pre-emit `no_root_docs` passes; the envelope names the file path;
/// a `feedback_recorded` event is emitted.
#[test]
fn feedback_request_writes_a_report_under_reports_directory() {
    let fixture = Fixture::new();

    let envelope = fixture
        .process("feedback: test feedback integration", Some("s2"))
        .unwrap();

    assert_eq!(envelope.agent_id, "feedback_agent");
    assert!(
        envelope.effects_summary.iter().any(|e| e.contains("reports")),
        "effects summary should name the reports/ path: {:?}",
        envelope.effects_summary
    );

    let events = fixture.state.events.read_after(0, 1000).unwrap();
    assert!(events.iter().any(|e| e.event_type == "feedback_recorded"));
}

/// 3. Brain-protection refusal with alternatives: a bulk-deletion request is
/// blocked pre-dispatch by `no_core_amnesia`, carries the three standard
/// alternatives, and no Tier 1 turn is ever committed for it.
#[test]
fn bulk_deletion_request_is_refused_with_standard_alternatives() {
    let fixture = Fixture::new();

    let result = fixture.process("delete all conversation history to free space", Some("s3"));

    match result {
        Err(CortexError::BlockedByRule { rule_id, alternatives, .. }) => {
            assert_eq!(rule_id, "no_core_amnesia");
            let actions: Vec<_> = alternatives.iter().map(|a| a.action.as_str()).collect();
            assert!(actions.contains(&"archive"));
            assert!(actions.contains(&"export_backup"));
            assert!(actions.contains(&"set_retention"));
        }
        other => panic!("expected BlockedByRule, got {other:?}"),
    }

    assert!(fixture.state.tier1.get_conversation("s3").unwrap().is_none());
}

/// 4. Pattern reinforcement: a pattern at successful=4/failed=1 reinforced
/// by one more success moves to successful=5 and confidence ~5/6.
#[test]
fn successful_route_reinforces_an_existing_pattern() {
    let fixture = Fixture::new();
    let pattern = fixture.seed_pattern("deploy", "deploy_agent", &["push to staging"]);
    for _ in 0..4 {
        fixture.state.tier2.reinforce(&pattern.pattern_id, Outcome::Success).unwrap();
    }
    fixture.state.tier2.reinforce(&pattern.pattern_id, Outcome::Failure).unwrap();

    let before = fixture.state.tier2.get_pattern(&pattern.pattern_id).unwrap().unwrap();
    assert_eq!(before.successful_routes, 4);
    assert_eq!(before.failed_routes, 1);

    let after = fixture.state.tier2.reinforce(&pattern.pattern_id, Outcome::Success).unwrap();
    assert_eq!(after.successful_routes, 5);
    assert_eq!(after.failed_routes, 1);
    assert!((after.confidence - 5.0 / 6.0).abs() < 1e-6);
}

/// 5. FIFO eviction preserves the active conversation: capacity=3 with
/// A(old), B, C(active); creating D evicts A only, leaving B and C intact.
#[test]
fn fifo_eviction_preserves_the_active_conversation() {
    let fixture = Fixture::with_config(|c| c.capacity_tier1 = 3);

    fixture.process("first message", Some("a")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    fixture.process("second message", Some("b")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    fixture.process("third message, active", Some("c")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));

    fixture.process("fourth message triggers eviction", Some("d")).unwrap();

    assert_eq!(fixture.state.tier1.conversation_count().unwrap(), 3);
    assert!(fixture.state.tier1.get_conversation("a").unwrap().is_none(), "oldest must be evicted");
    assert!(fixture.state.tier1.get_conversation("b").unwrap().is_some());
    assert!(fixture.state.tier1.get_conversation("c").unwrap().is_some(), "active conversation must survive");

    let events = fixture.state.events.read_after(0, 1000).unwrap();
    let evicted_event = events
        .iter()
        .find(|e| e.event_type == "conversation_evicted")
        .expect("conversation_evicted event expected");
    assert_eq!(evicted_event.payload["conversation_id"], "a");
}

/// 6. Template fallback: unrecognized text with no trigger or pattern match
/// still returns a mandatory-structure response via the `fallback` template.
#[test]
fn unmatched_text_falls_back_to_the_fallback_template() {
    let fixture = Fixture::new();

    let envelope = fixture.process("zzz qqq unrelated gibberish nonsense", Some("s6")).unwrap();

    assert_eq!(envelope.intent, IntentKind::General);
    assert_eq!(envelope.template_id.as_deref(), Some("fallback"));
    assert!(has_mandatory_structure(&envelope.text));
}
