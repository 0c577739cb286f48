//! Stdin interception for one terminal session
//!
//! Keystrokes must reach the container as the user types them - that is how
//! Tab completion and echo work - so the gate lets everything through until
//! a newline commits a command. At that point it reconstructs the committed
//! line from the virtual terminal, decides whether the policy needs to run,
//! and tracks the blocked/last-command state that stops a denied command
//! from being replayed.
//!
//! The gate itself is synchronous; rule loading is async, so the decision
//! is split: [`CommandGate::on_stdin`] classifies the frame, the caller
//! evaluates the policy when asked to, and records the outcome back via
//! [`CommandGate::record_allowed`] / [`CommandGate::record_blocked`].

use super::vt::VirtualTerminal;

/// The command the frontend sends to detect terminal readiness; always
/// allowed through without a policy check
const INIT_COMMAND: &str = "echo wayne-init";

/// Artifacts that betray a mis-rendered cursor row; their presence sends
/// reconstruction to the previous row
const CORRUPTION_ARTIFACTS: &[&str] = &["tt", "aa", "ii", "ll"];

/// What the session loop must do with a stdin frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinOutcome {
    /// Forward the frame bytes unchanged
    Forward,
    /// A command was committed; evaluate it and record the outcome
    Evaluate(String),
    /// The same already-blocked command was committed again; drop the
    /// frame and remind the user
    AlreadyBlocked,
}

/// Per-session interception state
#[derive(Debug, Default)]
pub struct CommandGate {
    sent_buffer: String,
    last_command: String,
    blocked: bool,
    initialized: bool,
}

impl CommandGate {
    /// Fresh gate for a new session
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the frontend's init command has been seen
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// The last committed command
    pub fn last_command(&self) -> &str {
        &self.last_command
    }

    /// Whether the last committed command was blocked
    pub fn blocked(&self) -> bool {
        self.blocked
    }

    /// Classify one stdin frame
    ///
    /// The caller holds the session's VT lock for the duration: the
    /// committed row must be read before the newline advances the cursor,
    /// which is why the newline bytes are fed to the VT here and not by the
    /// echo path.
    pub fn on_stdin(&mut self, data: &str, vt: &mut VirtualTerminal) -> StdinOutcome {
        self.sent_buffer.push_str(data);

        if !data.contains('\n') && !data.contains('\r') {
            // Mid-line input flows through so the user sees every
            // character, including live Tab completions
            return StdinOutcome::Forward;
        }

        let typed = clean_string(&self.sent_buffer);
        let typed = typed.trim_matches(['\n', '\r', ' ', '\t']);

        let mut command = if typed.is_empty() {
            vt.process(data);
            String::new()
        } else {
            let mut line = clean_prompt(&vt.current_line());
            if line.is_empty() || looks_corrupted(&line) {
                if let Some(previous) = vt.previous_line() {
                    let previous = clean_prompt(&previous);
                    if !previous.is_empty() {
                        line = previous;
                    }
                }
            }
            vt.process(data);
            line
        };

        if command.is_empty() {
            // VT gave nothing usable; fall back to the raw keystrokes
            command = typed.to_string();
        }
        let command = clean_prompt(&command);

        if command.is_empty() {
            self.reset();
            return StdinOutcome::Forward;
        }

        if command.starts_with(INIT_COMMAND) {
            self.initialized = true;
            self.commit(command, false);
            return StdinOutcome::Forward;
        }

        if command.starts_with('!') {
            self.commit(command, false);
            return StdinOutcome::Forward;
        }

        if self.blocked && command == self.last_command {
            self.sent_buffer.clear();
            return StdinOutcome::AlreadyBlocked;
        }

        StdinOutcome::Evaluate(command)
    }

    /// Record that the committed command was allowed and forwarded
    pub fn record_allowed(&mut self, command: String) {
        self.commit(command, false);
    }

    /// Record that the committed command was denied
    pub fn record_blocked(&mut self, command: String) {
        self.commit(command, true);
    }

    fn commit(&mut self, command: String, blocked: bool) {
        self.last_command = command;
        self.blocked = blocked;
        self.sent_buffer.clear();
    }

    fn reset(&mut self) {
        self.sent_buffer.clear();
        self.last_command.clear();
        self.blocked = false;
    }
}

fn looks_corrupted(line: &str) -> bool {
    CORRUPTION_ARTIFACTS.iter().any(|a| line.contains(a))
}

/// Keep printable ASCII and whitespace
fn clean_string(s: &str) -> String {
    s.chars()
        .filter(|&c| (' '..='~').contains(&c) || c == '\t' || c == '\n' || c == '\r')
        .collect()
}

/// `^C`-style control-character echo is display artifact, not a command
fn is_control_echo(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('^')
        && matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.next().is_none()
}

/// Strip the shell prompt off a rendered line
///
/// Tried in order: the text after the last `#`, the text after the last
/// `$`, then everything after the first `#`/`$`. A line that is only a
/// prompt, or a control-character echo, reduces to the empty string.
fn clean_prompt(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    if raw.contains('#') {
        let candidate = raw.rsplit('#').next().unwrap_or("").trim();
        if !candidate.is_empty() && candidate != raw {
            return finish_prompt_strip(candidate);
        }
    }

    if raw.contains('$') {
        let candidate = raw.rsplit('$').next().unwrap_or("").trim();
        if !candidate.is_empty() && candidate != raw {
            return finish_prompt_strip(candidate);
        }
    }

    let stripped = match raw.find(['$', '#']) {
        Some(i) => raw[i + 1..].trim_start(),
        None => raw,
    }
    .trim();

    if stripped.is_empty() || stripped == raw {
        if raw.ends_with('$') || raw.ends_with('#') {
            return String::new();
        }
        if is_control_echo(raw) {
            return String::new();
        }
        return raw.to_string();
    }

    finish_prompt_strip(stripped)
}

fn finish_prompt_strip(candidate: &str) -> String {
    if is_control_echo(candidate) {
        String::new()
    } else {
        candidate.to_string()
    }
}
