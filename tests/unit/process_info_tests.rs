//! Unit tests for `ProcessInfo` display-name derivation.

use std::path::{Path, PathBuf};

use bot_gateway::model::process::basename;
use bot_gateway::model::ProcessInfo;

#[test]
fn name_is_basename_of_workspace_path() {
    let proc = ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 123);
    assert_eq!(proc.name(), "api");
}

#[test]
fn display_name_includes_alias_when_set() {
    let mut proc = ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 123);
    proc.alias = Some("prod".into());
    assert_eq!(proc.display_name(), "prod (api)");
}

#[test]
fn basename_handles_trailing_component() {
    assert_eq!(basename(Path::new("/srv/api")), "api");
}
