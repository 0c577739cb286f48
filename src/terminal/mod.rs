//! Interactive exec terminal with command policy
//!
//! A terminal session is provisioned over HTTP (minting a session id and a
//! short-lived token), then bound over WebSocket, where frames are bridged
//! to the pod exec subresource. Before any newline reaches the container,
//! the committed command line is reconstructed from a virtual terminal and
//! checked against the caller's role rules.

mod gate;
mod policy;
mod session;
mod shell;
mod token;
mod vt;
mod ws;

pub use gate::{CommandGate, StdinOutcome};
pub use policy::{evaluate, split_subcommands, Decision, Role};
pub use session::{generate_session_id, SessionTable, TerminalResult};
pub use shell::ShellCache;
pub use token::{generate_token, verify_token};
pub use vt::VirtualTerminal;
pub use ws::{handle_terminal_socket, TerminalFrame};
