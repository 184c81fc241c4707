//! Intent Parser (C5): deterministic command matching plus a heuristic
//! natural-language fallback, with mention-gating policy (§4.5).

use std::sync::OnceLock;

use regex::Regex;

use crate::model::intent::{Intent, IntentKind};
use crate::model::InboundMessage;

/// Default mention keywords, used when configuration supplies none.
pub const DEFAULT_MENTION_KEYWORDS: &[&str] = &["@zen", "/zen", "zen"];

struct Pattern {
    regex: &'static OnceLock<Regex>,
    source: &'static str,
    build: fn(&regex::Captures<'_>, &str) -> Intent,
}

static LIST_RE: OnceLock<Regex> = OnceLock::new();
static STATUS_RE: OnceLock<Regex> = OnceLock::new();
static LOGS_RE: OnceLock<Regex> = OnceLock::new();
static ERRORS_RE: OnceLock<Regex> = OnceLock::new();
static CONTROL_RE: OnceLock<Regex> = OnceLock::new();
static BIND_RE: OnceLock<Regex> = OnceLock::new();
static HELP_RE: OnceLock<Regex> = OnceLock::new();
static APPROVE_RE: OnceLock<Regex> = OnceLock::new();
static REJECT_RE: OnceLock<Regex> = OnceLock::new();
static SEND_TASK_RE: OnceLock<Regex> = OnceLock::new();

fn compiled(lock: &'static OnceLock<Regex>, source: &'static str) -> &'static Regex {
    lock.get_or_init(|| {
        Regex::new(source).unwrap_or_else(|err| panic!("invalid builtin pattern {source}: {err}"))
    })
}

fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Pattern {
                regex: &LIST_RE,
                source: r"(?i)^list$",
                build: |_, raw| Intent::new(IntentKind::QueryList, raw),
            },
            Pattern {
                regex: &STATUS_RE,
                source: r"(?i)^status(?:\s+(\S+))?$",
                build: |caps, raw| {
                    let mut intent = Intent::new(IntentKind::QueryStatus, raw);
                    if let Some(target) = caps.get(1) {
                        intent = intent.with_target(target.as_str());
                    }
                    intent
                },
            },
            Pattern {
                regex: &LOGS_RE,
                source: r"(?i)^logs?(?:\s+(\d+))?$",
                build: |caps, raw| {
                    let mut intent = Intent::new(IntentKind::QueryStatus, raw).with_action("logs");
                    if let Some(limit) = caps.get(1) {
                        intent = intent.with_param("limit", limit.as_str());
                    }
                    intent
                },
            },
            Pattern {
                regex: &ERRORS_RE,
                source: r"(?i)^errors?$",
                build: |_, raw| Intent::new(IntentKind::QueryStatus, raw).with_action("errors"),
            },
            Pattern {
                regex: &CONTROL_RE,
                source: r"(?i)^(pause|resume|cancel|stop)(?:\s+(\S+))?$",
                build: |caps, raw| {
                    let mut intent = Intent::new(IntentKind::Control, raw);
                    if let Some(action) = caps.get(1) {
                        intent = intent.with_action(action.as_str().to_lowercase());
                    }
                    if let Some(target) = caps.get(2) {
                        intent = intent.with_target(target.as_str());
                    }
                    intent
                },
            },
            Pattern {
                regex: &BIND_RE,
                source: r"(?i)^bind(?:\s+(\S+))?$",
                build: |caps, raw| {
                    let mut intent = Intent::new(IntentKind::Bind, raw);
                    if let Some(target) = caps.get(1) {
                        intent = intent.with_target(target.as_str());
                    }
                    intent
                },
            },
            Pattern {
                regex: &HELP_RE,
                source: r"(?i)^help$",
                build: |_, raw| Intent::new(IntentKind::Help, raw),
            },
            Pattern {
                regex: &APPROVE_RE,
                source: r"(?i)^(approve|yes|ok|批准|同意)$",
                build: |_, raw| Intent::new(IntentKind::Approve, raw).with_approved(true),
            },
            Pattern {
                regex: &REJECT_RE,
                source: r"(?i)^(reject|no|deny|拒绝|否)$",
                build: |_, raw| Intent::new(IntentKind::Approve, raw).with_approved(false),
            },
            Pattern {
                regex: &SEND_TASK_RE,
                source: r"(?is)^(\S+)\s+(.+)$",
                build: |caps, raw| {
                    let mut intent = Intent::new(IntentKind::SendTask, raw);
                    if let Some(target) = caps.get(1) {
                        intent = intent.with_target(target.as_str());
                    }
                    if let Some(task) = caps.get(2) {
                        intent = intent.with_task(task.as_str());
                    }
                    intent
                },
            },
        ]
    })
}

/// Stateless deterministic parser, configured with the mention keywords that
/// trigger `has_mention` (default `@zen`, `/zen`, `zen`).
#[derive(Debug, Clone)]
pub struct IntentParser {
    mention_keywords: Vec<String>,
}

impl Default for IntentParser {
    fn default() -> Self {
        Self {
            mention_keywords: DEFAULT_MENTION_KEYWORDS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

impl IntentParser {
    /// Construct a parser with explicit mention keywords.
    #[must_use]
    pub fn new(mention_keywords: Vec<String>) -> Self {
        Self { mention_keywords }
    }

    /// Run the deterministic pipeline (§4.5 steps 1-6) over `message`.
    ///
    /// `require_mention` is the already-resolved gating decision for this
    /// message (see `Gateway::resolve_require_mention`, which folds in
    /// `direct_message_mode`/`channel_mode`).
    #[must_use]
    pub fn parse(&self, message: &InboundMessage, require_mention: bool) -> Option<Intent> {
        let original = message.content.trim();
        if original.is_empty() {
            return None;
        }

        let mut has_mention = message.is_mention || message.is_direct_message;
        let mut working = original.to_owned();
        let lower_content = original.to_lowercase();
        for keyword in &self.mention_keywords {
            let lower_keyword = keyword.to_lowercase();
            if lower_content.starts_with(&lower_keyword) {
                let stripped = original[keyword.len().min(original.len())..].trim().to_owned();
                has_mention = true;
                working = stripped;
                break;
            }
        }

        if require_mention && !has_mention {
            return None;
        }

        if working.trim().is_empty() {
            return Some(Intent::new(IntentKind::Help, original));
        }

        let working = working.trim();
        for pattern in patterns() {
            let regex = compiled(pattern.regex, pattern.source);
            if let Some(caps) = regex.captures(working) {
                return Some((pattern.build)(&caps, original));
            }
        }

        Some(Intent::new(IntentKind::SendTask, original).with_task(working))
    }

    /// Heuristic natural-language fallback (§4.5), used only when the caller
    /// explicitly opts into it rather than the deterministic pipeline.
    #[must_use]
    pub fn parse_natural_language(content: &str, known_processes: &[String]) -> Intent {
        const STATUS_KEYWORDS: &[&str] = &[
            "状态", "怎么样", "在干嘛", "在做什么", "status", "what's", "看看", "查看", "检查",
        ];
        const LIST_KEYWORDS: &[&str] = &["有哪些", "列出", "所有", "list", "哪些项目", "多少个"];
        const CONTROL_KEYWORDS: &[(&str, &str)] = &[
            ("暂停", "pause"),
            ("停止", "stop"),
            ("继续", "resume"),
            ("取消", "cancel"),
            ("pause", "pause"),
            ("stop", "stop"),
            ("resume", "resume"),
            ("cancel", "cancel"),
        ];

        let lower = content.to_lowercase();

        if STATUS_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            let target = known_processes
                .iter()
                .find(|name| lower.contains(&name.to_lowercase()))
                .cloned();
            let mut intent = Intent::new(IntentKind::QueryStatus, content);
            if let Some(target) = target {
                intent = intent.with_target(target);
            }
            return intent;
        }

        if LIST_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return Intent::new(IntentKind::QueryList, content);
        }

        if let Some((_, action)) = CONTROL_KEYWORDS.iter().find(|(kw, _)| lower.contains(kw)) {
            let target = known_processes
                .iter()
                .find(|name| lower.contains(&name.to_lowercase()))
                .cloned();
            let mut intent = Intent::new(IntentKind::Control, content).with_action(*action);
            if let Some(target) = target {
                intent = intent.with_target(target);
            }
            return intent;
        }

        Intent::new(IntentKind::SendTask, content).with_task(content)
    }
}
