//! Unit tests for keyword-driven intent parsing and the natural-language
//! fallback path (§4.5).

use std::collections::HashMap;

use bot_gateway::intent::IntentParser;
use bot_gateway::model::intent::IntentKind;
use bot_gateway::model::{InboundMessage, Platform};
use chrono::Utc;

fn message(content: &str, is_mention: bool, is_dm: bool) -> InboundMessage {
    InboundMessage {
        message_id: "m1".into(),
        platform: Platform::Telegram,
        chat_id: "c1".into(),
        thread_id: None,
        user_id: "u1".into(),
        user_name: "u1".into(),
        content: content.into(),
        reply_to: None,
        timestamp: Utc::now(),
        is_mention,
        is_direct_message: is_dm,
        metadata: HashMap::new(),
    }
}

#[test]
fn empty_content_yields_no_intent() {
    let parser = IntentParser::default();
    assert!(parser.parse(&message("   ", false, true), false).is_none());
}

#[test]
fn mention_gating_drops_non_mention_non_dm_without_keyword() {
    let parser = IntentParser::default();
    let msg = message("list", false, false);
    assert!(parser.parse(&msg, true).is_none());
}

#[test]
fn direct_message_satisfies_mention_gating() {
    let parser = IntentParser::default();
    let msg = message("list", false, true);
    let intent = parser.parse(&msg, true).expect("dm satisfies gating");
    assert_eq!(intent.kind, IntentKind::QueryList);
}

#[test]
fn keyword_prefix_strips_and_satisfies_gating() {
    let parser = IntentParser::default();
    let msg = message("zen list", false, false);
    let intent = parser.parse(&msg, true).expect("keyword satisfies gating");
    assert_eq!(intent.kind, IntentKind::QueryList);
}

#[test]
fn pure_mention_with_no_remaining_text_is_help() {
    let parser = IntentParser::default();
    let msg = message("zen", false, false);
    let intent = parser.parse(&msg, true).expect("pure mention parses");
    assert_eq!(intent.kind, IntentKind::Help);
    assert_eq!(intent.raw, "zen");
}

#[test]
fn status_with_target_captures_target() {
    let parser = IntentParser::default();
    let msg = message("status api", false, true);
    let intent = parser.parse(&msg, false).expect("parses");
    assert_eq!(intent.kind, IntentKind::QueryStatus);
    assert_eq!(intent.target.as_deref(), Some("api"));
}

#[test]
fn logs_with_limit_sets_action_and_param() {
    let parser = IntentParser::default();
    let msg = message("logs 20", false, true);
    let intent = parser.parse(&msg, false).expect("parses");
    assert_eq!(intent.action.as_deref(), Some("logs"));
    assert_eq!(intent.params.get("limit").map(String::as_str), Some("20"));
}

#[test]
fn control_keyword_captures_action_and_target() {
    let parser = IntentParser::default();
    let msg = message("pause api", false, true);
    let intent = parser.parse(&msg, false).expect("parses");
    assert_eq!(intent.kind, IntentKind::Control);
    assert_eq!(intent.action.as_deref(), Some("pause"));
    assert_eq!(intent.target.as_deref(), Some("api"));
}

#[test]
fn approve_and_reject_keywords_set_tristate() {
    let parser = IntentParser::default();
    let approve = parser.parse(&message("yes", false, true), false).unwrap();
    assert_eq!(approve.approved, Some(true));
    let reject = parser.parse(&message("否", false, true), false).unwrap();
    assert_eq!(reject.approved, Some(false));
}

#[test]
fn unmatched_two_word_text_is_send_task_with_target() {
    let parser = IntentParser::default();
    let msg = message("api run tests", false, true);
    let intent = parser.parse(&msg, false).expect("parses");
    assert_eq!(intent.kind, IntentKind::SendTask);
    assert_eq!(intent.target.as_deref(), Some("api"));
    assert_eq!(intent.task.as_deref(), Some("run tests"));
}

#[test]
fn single_word_unmatched_falls_back_to_send_task_with_no_target() {
    let parser = IntentParser::default();
    let msg = message("deploy", false, true);
    let intent = parser.parse(&msg, false).expect("parses");
    assert_eq!(intent.kind, IntentKind::SendTask);
    assert_eq!(intent.target, None);
    assert_eq!(intent.task.as_deref(), Some("deploy"));
}

#[test]
fn natural_language_status_picks_known_process_by_substring() {
    let intent = IntentParser::parse_natural_language("api怎么样", &["api".to_owned(), "web".to_owned()]);
    assert_eq!(intent.kind, IntentKind::QueryStatus);
    assert_eq!(intent.target.as_deref(), Some("api"));
}

#[test]
fn natural_language_list_keyword_matches() {
    let intent = IntentParser::parse_natural_language("有哪些项目", &[]);
    assert_eq!(intent.kind, IntentKind::QueryList);
}
