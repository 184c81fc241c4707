//! Unit tests for the adapter-shared mention-stripping helper.

use bot_gateway::adapters::strip_mention;

#[test]
fn strip_mention_detects_and_removes_prefix() {
    let (is_mention, rest) = strip_mention("@zenbot status", "zenbot");
    assert!(is_mention);
    assert_eq!(rest, "status");
}

#[test]
fn strip_mention_leaves_unmentioned_text_untouched() {
    let (is_mention, rest) = strip_mention("status", "zenbot");
    assert!(!is_mention);
    assert_eq!(rest, "status");
}
