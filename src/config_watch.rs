//! Hot-reload watcher for the alias map (§3 Alias map) in `config.toml`.
//!
//! [`AliasWatcher`] uses the `notify` crate to watch the configured file for
//! changes. On change it re-parses only the `[aliases]` table (ignoring
//! every other field, so a partially-invalid config elsewhere in the file
//! does not block a hot reload) and pushes each binding into the
//! [`Registry`] via `set_alias`. All other configuration requires a
//! restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::registry::Registry;
use crate::{AppError, Result};

#[derive(Debug, Default, Deserialize)]
struct AliasesOnlyConfig {
    #[serde(default)]
    aliases: HashMap<String, PathBuf>,
}

fn parse_aliases(path: &Path) -> Result<HashMap<String, PathBuf>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| AppError::Config(format!("failed to read config for alias reload: {err}")))?;
    let parsed: AliasesOnlyConfig = toml::from_str(&raw)
        .map_err(|err| AppError::Config(format!("failed to parse aliases from config: {err}")))?;
    Ok(parsed.aliases)
}

fn is_config_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Hot-reload watcher that keeps a [`Registry`]'s alias map in sync with the
/// `[aliases]` table of a config file on disk.
///
/// Holds the underlying `notify` watcher alive for its own lifetime; drop it
/// to stop watching.
pub struct AliasWatcher {
    _watcher: RecommendedWatcher,
}

impl AliasWatcher {
    /// Start watching `config_path`, applying its current `[aliases]` table
    /// to `registry` immediately and again on every subsequent change.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the `notify` watcher cannot be created
    /// or the watch target cannot be registered with the OS.
    pub async fn start(config_path: &Path, registry: Arc<Registry>) -> Result<Self> {
        if let Ok(initial) = parse_aliases(config_path) {
            apply_aliases(&registry, initial).await;
        } else {
            warn!(path = %config_path.display(), "no initial aliases loaded for hot-reload");
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<HashMap<String, PathBuf>>();
        tokio::spawn(async move {
            while let Some(aliases) = rx.recv().await {
                apply_aliases(&registry, aliases).await;
            }
        });

        let path_for_callback: PathBuf = config_path.to_path_buf();
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) if is_config_change(&event) => match parse_aliases(&path_for_callback) {
                    Ok(aliases) => {
                        let _ = tx.send(aliases);
                    }
                    Err(err) => {
                        warn!(%err, path = %path_for_callback.display(), "failed to reload aliases, keeping previous values");
                    }
                },
                Err(err) => warn!(%err, "config file watcher error"),
                _ => {}
            },
        )
        .map_err(|err| AppError::Config(format!("failed to create alias watcher: {err}")))?;

        let watch_target = config_path
            .parent()
            .filter(|p| p != &Path::new(""))
            .unwrap_or(config_path);
        watcher
            .watch(watch_target, RecursiveMode::NonRecursive)
            .map_err(|err| {
                AppError::Config(format!(
                    "failed to watch config path '{}': {err}",
                    watch_target.display()
                ))
            })?;

        info!(path = %config_path.display(), "alias hot-reload watcher started");
        Ok(Self { _watcher: watcher })
    }
}

async fn apply_aliases(registry: &Arc<Registry>, aliases: HashMap<String, PathBuf>) {
    for (alias, path) in aliases {
        registry.set_alias(&alias, &path).await;
    }
    info!("alias map reloaded");
}
