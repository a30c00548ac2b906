// Integration tests for streaming transcript reconciliation

use voice_onboarding::session::{Speaker, TranscriptLog};

fn texts(log: &TranscriptLog) -> Vec<(Speaker, &str, bool)> {
    log.entries()
        .iter()
        .map(|e| (e.speaker, e.text.as_str(), e.is_final))
        .collect()
}

#[test]
fn test_user_fragments_then_turn_complete() {
    let mut log = TranscriptLog::new();

    log.apply_fragment(Speaker::User, "I ", false);
    log.apply_fragment(Speaker::User, "want EMI", false);
    assert_eq!(texts(&log), vec![(Speaker::User, "I want EMI", false)]);

    assert_eq!(log.finalize_trailing(), 1);
    assert_eq!(texts(&log), vec![(Speaker::User, "I want EMI", true)]);
}

#[test]
fn test_fragment_after_finalize_starts_new_entry() {
    let mut log = TranscriptLog::new();

    log.apply_fragment(Speaker::Agent, "Hello!", false);
    log.finalize_trailing();
    log.apply_fragment(Speaker::Agent, "Shall we start?", false);

    assert_eq!(
        texts(&log),
        vec![
            (Speaker::Agent, "Hello!", true),
            (Speaker::Agent, "Shall we start?", false),
        ]
    );
}

#[test]
fn test_final_hint_closes_entry() {
    let mut log = TranscriptLog::new();

    log.apply_fragment(Speaker::User, "Credit", false);
    log.apply_fragment(Speaker::User, " card", true);
    log.apply_fragment(Speaker::User, "please", false);

    assert_eq!(
        texts(&log),
        vec![
            (Speaker::User, "Credit card", true),
            (Speaker::User, "please", false),
        ]
    );
}

#[test]
fn test_interleaved_speakers() {
    let mut log = TranscriptLog::new();

    log.apply_fragment(Speaker::Agent, "Which option", false);
    log.apply_fragment(Speaker::User, "EMI", false);
    log.apply_fragment(Speaker::Agent, "Great", false);

    assert_eq!(
        texts(&log),
        vec![
            (Speaker::Agent, "Which option", true),
            (Speaker::User, "EMI", true),
            (Speaker::Agent, "Great", false),
        ]
    );
}

#[test]
fn test_finalize_only_touches_trailing_entry_per_speaker() {
    let mut log = TranscriptLog::new();

    log.apply_fragment(Speaker::User, "Hi", false);
    log.apply_fragment(Speaker::Agent, "Hello", false);

    // User entry was closed by the speaker change, only the agent's is open
    assert_eq!(log.finalize_trailing(), 1);
    assert!(log.entries().iter().all(|e| e.is_final));
    assert_eq!(log.finalize_trailing(), 0);
}

#[test]
fn test_finalized_entries_never_change() {
    let mut log = TranscriptLog::new();

    log.apply_fragment(Speaker::User, "Yes", true);
    log.apply_fragment(Speaker::User, "", true);
    log.apply_fragment(Speaker::User, "", false);

    assert_eq!(texts(&log), vec![(Speaker::User, "Yes", true)]);
}

#[test]
fn test_clear() {
    let mut log = TranscriptLog::new();
    log.apply_fragment(Speaker::Agent, "Hello", false);
    log.clear();
    assert!(log.is_empty());
    assert_eq!(log.finalize_trailing(), 0);
}
