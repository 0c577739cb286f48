//! Command policy evaluation
//!
//! A committed command line is split into subcommands at top-level shell
//! connectors, each subcommand reduced to its command name, and the names
//! checked against the role's enabled rules. Matching is first-word
//! equality against the rules' comma-separated pattern lists - never
//! substring or regex, so a `rm` rule cannot accidentally hit `rmdir`'s
//! arguments or `grep rm`.

use tracing::{info, warn};

use crate::registry::{CommandRule, RuleType, User};

/// Rule role resolved from the calling user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Platform administrators
    Admin,
    /// Everyone else, including unauthenticated sessions
    User,
}

impl Role {
    /// Resolve the role: no user or a non-admin user is `user`
    pub fn from_user(user: Option<&User>) -> Self {
        match user {
            Some(u) if u.admin => Role::Admin,
            _ => Role::User,
        }
    }

    /// The role name as stored on rules
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// Outcome of a policy evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the command
    Allow,
    /// Suppress the command and tell the user why
    Deny {
        /// Human-readable denial reason
        reason: String,
    },
}

/// Split a command line into subcommands at top-level `|`, `||`, `&&`, and
/// `&`, respecting single and double quotes
pub fn split_subcommands(command: &str) -> Vec<String> {
    let command = command.trim();
    if command.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    let mut flush = |current: &mut String, parts: &mut Vec<String>| {
        let part = current.trim().to_string();
        if !part.is_empty() {
            parts.push(part);
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                match quote {
                    None => quote = Some(c),
                    Some(q) if q == c => quote = None,
                    Some(_) => {}
                }
                current.push(c);
            }
            _ if quote.is_some() => current.push(c),
            '|' => {
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                flush(&mut current, &mut parts);
            }
            '&' => {
                if chars.peek() == Some(&'&') {
                    chars.next();
                }
                flush(&mut current, &mut parts);
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut parts);
    parts
}

/// Keep printable ASCII and whitespace; terminal input may carry stray
/// control bytes that must not defeat name matching
fn clean_string(s: &str) -> String {
    s.chars()
        .filter(|&c| (' '..='~').contains(&c) || c == '\t' || c == '\n' || c == '\r')
        .collect()
}

/// The command name of one subcommand: the first whitespace-separated
/// token, truncated at a redirection or separator character
pub fn command_name(subcommand: &str) -> String {
    let cleaned = clean_string(subcommand);
    let mut name = match cleaned.split_whitespace().next() {
        Some(first) => first.to_string(),
        None => return String::new(),
    };

    if let Some(idx) = name.find(['<', '>', ';']).filter(|&i| i > 0) {
        name.truncate(idx);
    }
    name
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    pattern
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .any(|p| p == name)
}

/// Evaluate a committed command against the enabled rules of a role
///
/// With no rules the command is allowed. A non-empty whitelist must cover
/// every subcommand name; any blacklist hit denies with the rule's
/// description. History expansions (leading `!`) cannot be resolved
/// in-band and are allowed with a log line.
pub fn evaluate(command: &str, rules: &[CommandRule]) -> Decision {
    let command = command.trim();
    if command.is_empty() {
        return Decision::Allow;
    }

    if command.starts_with('!') {
        info!(command = %command, "history command allowed without check");
        return Decision::Allow;
    }

    if rules.is_empty() {
        return Decision::Allow;
    }

    let (blacklist, whitelist): (Vec<_>, Vec<_>) = rules
        .iter()
        .partition(|r| r.rule_type == RuleType::Blacklist);

    let subcommands = split_subcommands(command);
    if subcommands.is_empty() {
        warn!(command = %command, "no subcommands parsed, allowing");
        return Decision::Allow;
    }

    for sub in &subcommands {
        let name = command_name(sub);
        if name.is_empty() {
            continue;
        }

        if !whitelist.is_empty()
            && !whitelist.iter().any(|r| matches_pattern(&name, &r.command))
        {
            return Decision::Deny {
                reason: format!("command '{name}' not in whitelist"),
            };
        }

        if let Some(rule) = blacklist.iter().find(|r| matches_pattern(&name, &r.command)) {
            return Decision::Deny {
                reason: format!("command '{name}' is blocked by rule: {}", rule.description),
            };
        }
    }

    Decision::Allow
}
