//! WebSocket bridge to the pod exec subresource
//!
//! The first frame must bind the socket to a provisioned session; after
//! that the session runs two tasks: the writer pumps exec stdout through
//! the VT into `stdout` frames, and the reader loop feeds client frames
//! through the command gate into exec stdin. The VT is the only state both
//! sides touch, guarded by a lock held never longer than one write or one
//! row read.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, TerminalSize};
use kube::Client;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::gate::{CommandGate, StdinOutcome};
use super::policy::{self, Decision, Role};
use super::session::TerminalResult;
use super::token;
use super::vt::VirtualTerminal;
use crate::registry::User;
use crate::server::AppState;

/// Normal closure after the exec process exits
const CLOSE_NORMAL: u16 = 1000;
/// Closure after a bind, token, or stream failure
const CLOSE_ERROR: u16 = 1011;

/// Resize events buffered between the client and the exec stream
const RESIZE_BUFFER: usize = 10;

/// Shells a client may request directly, skipping detection
const VALID_SHELLS: &[&str] = &["bash", "sh"];

/// Erase-to-start-of-line; makes the shell discard a denied command
const CTRL_U: u8 = 0x15;

/// One JSON frame on the terminal WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalFrame {
    /// Frame kind: bind, stdin, stdout, or resize
    pub op: String,
    /// Payload bytes for bind/stdin/stdout frames
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    /// Session id, echoed by some clients
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// New terminal height for resize frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u16>,
    /// New terminal width for resize frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u16>,
}

impl TerminalFrame {
    /// A server-to-client stdout frame
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            op: "stdout".into(),
            data: data.into(),
            session_id: None,
            rows: None,
            cols: None,
        }
    }

    fn to_message(&self) -> Message {
        Message::Text(serde_json::to_string(self).unwrap_or_default().into())
    }
}

fn denial_notice(reason: &str) -> String {
    format!("\r\n\x1b[31m[命令被阻止]\x1b[0m Command Permission Denied: {reason}\r\n")
}

async fn close_with(sender: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

/// Drive one terminal WebSocket from bind to close
pub async fn handle_terminal_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let bind = match read_bind_frame(&mut receiver).await {
        Ok(b) => b,
        Err(reason) => {
            warn!(reason = %reason, "terminal bind failed");
            close_with(&mut sender, CLOSE_ERROR, &reason).await;
            return;
        }
    };

    let now = chrono::Utc::now().timestamp();
    if token::verify_token(
        &bind.token,
        &bind.namespace,
        &bind.pod,
        &state.config.app_key,
        now,
    )
    .is_err()
    {
        warn!(session = %bind.session_id, "terminal token rejected");
        close_with(&mut sender, CLOSE_ERROR, "unauthorized").await;
        return;
    }

    let user = state.sessions.lookup(&bind.session_id);
    match &user {
        Some(u) => info!(
            session = %bind.session_id,
            user = %u.name,
            admin = u.admin,
            "terminal session bound"
        ),
        None => info!(
            session = %bind.session_id,
            "terminal session bound without user, running as anonymous"
        ),
    }

    let manager = match state.pool.manager(&bind.cluster).await {
        Ok(m) => m,
        Err(e) => {
            warn!(cluster = %bind.cluster, error = %e, "terminal cluster lookup failed");
            close_with(&mut sender, CLOSE_ERROR, &e.to_string()).await;
            return;
        }
    };

    run_session(sender, receiver, state, manager.client(), bind, user).await;
}

/// Read and validate the mandatory first frame
async fn read_bind_frame(
    receiver: &mut SplitStream<WebSocket>,
) -> std::result::Result<TerminalResult, String> {
    let message = receiver
        .next()
        .await
        .ok_or_else(|| "connection closed before bind".to_string())?
        .map_err(|e| e.to_string())?;

    let Message::Text(text) = message else {
        return Err("expected a text bind frame".into());
    };
    let frame: TerminalFrame =
        serde_json::from_str(&text).map_err(|e| format!("malformed bind frame: {e}"))?;
    if frame.op != "bind" {
        return Err(format!("expected bind frame, got '{}'", frame.op));
    }
    serde_json::from_str(&frame.data).map_err(|e| format!("malformed bind payload: {e}"))
}

async fn run_session(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    state: AppState,
    client: Client,
    bind: TerminalResult,
    user: Option<User>,
) {
    let shell = if VALID_SHELLS.contains(&bind.cmd.as_str()) {
        bind.cmd.clone()
    } else {
        state
            .shells
            .resolve(client.clone(), &bind.namespace, &bind.pod, &bind.container)
            .await
    };

    let pods: Api<Pod> = Api::namespaced(client, &bind.namespace);
    let params = AttachParams {
        container: Some(bind.container.clone()),
        stdin: true,
        stdout: true,
        // A TTY merges stderr into stdout
        stderr: false,
        tty: true,
        ..AttachParams::default()
    };

    let mut attached = match pods.exec(&bind.pod, [shell.as_str()], &params).await {
        Ok(a) => a,
        Err(e) => {
            warn!(pod = %bind.pod, error = %e, "exec failed to start");
            close_with(&mut sender, CLOSE_ERROR, &e.to_string()).await;
            return;
        }
    };

    let (Some(mut stdin), Some(mut stdout)) = (attached.stdin(), attached.stdout()) else {
        close_with(&mut sender, CLOSE_ERROR, "exec stream missing stdio").await;
        return;
    };

    // Everything the client sees goes through one channel so stdout frames
    // and policy notices cannot interleave mid-message
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Bounded size channel decouples client resize bursts from the stream
    let (size_tx, mut size_rx) = mpsc::channel::<TerminalSize>(RESIZE_BUFFER);
    if let Some(mut exec_size) = attached.terminal_size() {
        tokio::spawn(async move {
            while let Some(size) = size_rx.recv().await {
                if exec_size.send(size).await.is_err() {
                    break;
                }
            }
        });
    }

    let vt = Arc::new(RwLock::new(VirtualTerminal::new()));

    // Writer task: exec stdout -> VT -> client
    let writer_vt = vt.clone();
    let writer_out = out_tx.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    writer_vt.write().process(&text);
                    let frame = TerminalFrame::stdout(text);
                    if writer_out.send(frame.to_message()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Exec completion watcher; the error string becomes the close reason
    let (done_tx, mut done_rx) = tokio::sync::oneshot::channel::<Option<String>>();
    tokio::spawn(async move {
        let result = attached.join().await;
        let _ = done_tx.send(result.err().map(|e| e.to_string()));
    });

    let role = Role::from_user(user.as_ref());
    let user_name = user.as_ref().map(|u| u.name.clone()).unwrap_or_default();
    let mut gate = CommandGate::new();

    let (close_code, close_reason) = loop {
        tokio::select! {
            done = &mut done_rx => {
                break match done {
                    Ok(None) => (CLOSE_NORMAL, "Process exited".to_string()),
                    Ok(Some(err)) => (CLOSE_ERROR, err),
                    Err(_) => (CLOSE_ERROR, "exec stream lost".to_string()),
                };
            }
            message = receiver.next() => {
                let frame = match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<TerminalFrame>(&text) {
                            Ok(f) => f,
                            Err(e) => {
                                warn!(error = %e, "unparseable terminal frame");
                                continue;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break (CLOSE_NORMAL, "client closed".to_string());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break (CLOSE_ERROR, e.to_string()),
                };

                match frame.op.as_str() {
                    "stdin" => {
                        let outcome = {
                            let mut vt = vt.write();
                            gate.on_stdin(&frame.data, &mut vt)
                        };
                        match outcome {
                            StdinOutcome::Forward => {
                                if stdin.write_all(frame.data.as_bytes()).await.is_err() {
                                    break (CLOSE_ERROR, "write to exec stream failed".into());
                                }
                                let _ = stdin.flush().await;
                            }
                            StdinOutcome::AlreadyBlocked => {
                                warn!(
                                    user = %user_name,
                                    command = %gate.last_command(),
                                    "blocked command replayed"
                                );
                                let notice = TerminalFrame::stdout(denial_notice(
                                    "command was already blocked",
                                ));
                                let _ = out_tx.send(notice.to_message()).await;
                            }
                            StdinOutcome::Evaluate(command) => {
                                let decision = decide(&state, role, &command).await;
                                match decision {
                                    Decision::Allow => {
                                        info!(
                                            user = %user_name,
                                            command = %command,
                                            "terminal command allowed"
                                        );
                                        gate.record_allowed(command);
                                        if stdin.write_all(frame.data.as_bytes()).await.is_err() {
                                            break (CLOSE_ERROR, "write to exec stream failed".into());
                                        }
                                        let _ = stdin.flush().await;
                                    }
                                    Decision::Deny { reason } => {
                                        warn!(
                                            user = %user_name,
                                            command = %command,
                                            reason = %reason,
                                            "terminal command blocked"
                                        );
                                        gate.record_blocked(command);
                                        // The typed characters are already in
                                        // the shell's line buffer; a single
                                        // kill-line erases them and the
                                        // newline is never sent
                                        if stdin.write_all(&[CTRL_U]).await.is_err() {
                                            break (CLOSE_ERROR, "write to exec stream failed".into());
                                        }
                                        let _ = stdin.flush().await;
                                        let notice =
                                            TerminalFrame::stdout(denial_notice(&reason));
                                        let _ = out_tx.send(notice.to_message()).await;
                                    }
                                }
                            }
                        }
                    }
                    "resize" => {
                        if let (Some(rows), Some(cols)) = (frame.rows, frame.cols) {
                            let _ = size_tx.try_send(TerminalSize {
                                width: cols,
                                height: rows,
                            });
                            vt.write().resize(cols as usize, rows as usize);
                        }
                    }
                    "bind" => debug!("duplicate bind frame ignored"),
                    other => warn!(op = %other, "unknown terminal frame op"),
                }
            }
        }
    };

    let _ = out_tx
        .send(Message::Close(Some(CloseFrame {
            code: close_code,
            reason: close_reason.clone().into(),
        })))
        .await;
    drop(out_tx);
    drop(stdin);
    let _ = send_task.await;

    info!(
        session = %bind.session_id,
        code = close_code,
        reason = %close_reason,
        "terminal session closed"
    );
}

/// Load the role's rules and evaluate; rule-store outages fail open so a
/// registry incident cannot brick every terminal
async fn decide(state: &AppState, role: Role, command: &str) -> Decision {
    match state.rules.enabled_rules_for_role(role.as_str()).await {
        Ok(rules) => policy::evaluate(command, &rules),
        Err(e) => {
            warn!(error = %e, role = role.as_str(), "rule loading failed, allowing command");
            Decision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip_with_lowercase_ops() {
        let frame = TerminalFrame {
            op: "resize".into(),
            data: String::new(),
            session_id: Some("abc".into()),
            rows: Some(40),
            cols: Some(120),
        };
        let json = serde_json::to_string(&frame).expect("serialize");
        assert!(json.contains("\"op\":\"resize\""));
        assert!(json.contains("\"sessionID\":\"abc\""));
        assert!(!json.contains("\"data\""));

        let parsed: TerminalFrame = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.rows, Some(40));
        assert_eq!(parsed.cols, Some(120));
    }

    #[test]
    fn stdin_frames_parse_without_optional_fields() {
        let parsed: TerminalFrame =
            serde_json::from_str(r#"{"op":"stdin","data":"ls\n"}"#).expect("parse");
        assert_eq!(parsed.op, "stdin");
        assert_eq!(parsed.data, "ls\n");
        assert!(parsed.rows.is_none());
    }

    #[test]
    fn denial_notice_is_red_and_carries_the_reason() {
        let notice = denial_notice("command 'rm' is blocked by rule: no deletes");
        assert!(notice.contains("\x1b[31m[命令被阻止]\x1b[0m"));
        assert!(notice.contains("Command Permission Denied: command 'rm' is blocked"));
        assert!(notice.starts_with("\r\n"));
        assert!(notice.ends_with("\r\n"));
    }
}
