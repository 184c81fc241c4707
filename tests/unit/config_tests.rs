//! Unit tests for config parsing defaults and access-control gating.

use bot_gateway::config::{AccessControl, GlobalConfig};
use bot_gateway::AppError;

#[test]
fn defaults_apply_when_sections_absent() {
    let config = GlobalConfig::from_toml_str("").expect("minimal config is valid");
    assert_eq!(
        config.mention_keywords,
        vec!["@zen".to_owned(), "/zen".to_owned(), "zen".to_owned()]
    );
    assert_eq!(config.stale_threshold_secs, 30);
    assert_eq!(config.cleanup_interval_secs, 300);
    assert!(!config.has_any_adapter());
}

#[test]
fn zero_stale_threshold_rejected() {
    let err = GlobalConfig::from_toml_str("stale_threshold_secs = 0").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn access_control_empty_lists_allow_all() {
    let ac = AccessControl::default();
    assert!(ac.allows_user("anyone"));
    assert!(ac.allows_chat("anywhere"));
}

#[test]
fn access_control_nonempty_list_restricts() {
    let ac = AccessControl {
        allowed_users: vec!["u1".into()],
        allowed_chats: vec![],
        default_chat_id: None,
    };
    assert!(ac.allows_user("u1"));
    assert!(!ac.allows_user("u2"));
}
