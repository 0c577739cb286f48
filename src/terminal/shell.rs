//! Shell pre-detection with a TTL cache
//!
//! Opening a terminal needs to know which shell exists in the container.
//! Probing costs an exec round-trip, so results are cached per
//! `(namespace, pod, container)` for five minutes and swept every ten.
//! The probe itself runs outside any lock.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shells probed in preference order
const CANDIDATE_SHELLS: &[&str] = &["bash", "sh"];

/// Shell used when no candidate probes successfully
const FALLBACK_SHELL: &str = "sh";

const CACHE_TTL: Duration = Duration::from_secs(300);
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

struct CachedShell {
    shell: String,
    cached_at: Instant,
}

/// Per-container shell cache
#[derive(Default)]
pub struct ShellCache {
    entries: DashMap<String, CachedShell>,
}

impl ShellCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str, pod: &str, container: &str) -> String {
        format!("{namespace}-{pod}-{container}")
    }

    /// Cached shell for the container, if fresh
    pub fn get(&self, namespace: &str, pod: &str, container: &str) -> Option<String> {
        let entry = self.entries.get(&Self::key(namespace, pod, container))?;
        (entry.cached_at.elapsed() < CACHE_TTL).then(|| entry.shell.clone())
    }

    /// Record a detected shell
    pub fn insert(&self, namespace: &str, pod: &str, container: &str, shell: &str) {
        self.entries.insert(
            Self::key(namespace, pod, container),
            CachedShell {
                shell: shell.to_string(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Resolve the shell for a container, probing on cache miss
    pub async fn resolve(
        &self,
        client: Client,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> String {
        if let Some(shell) = self.get(namespace, pod, container) {
            debug!(namespace, pod, container, shell = %shell, "shell cache hit");
            return shell;
        }

        let shell = probe_shell(client, namespace, pod, container).await;
        self.insert(namespace, pod, container, &shell);
        debug!(namespace, pod, container, shell = %shell, "shell detected");
        shell
    }

    /// Remove entries past their TTL
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, e| e.cached_at.elapsed() < CACHE_TTL);
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn the periodic sweeper
    pub fn spawn_sweeper(self: std::sync::Arc<Self>, shutdown: CancellationToken) {
        let cache = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => cache.cleanup_expired(),
                }
            }
        });
    }
}

/// Try `which <shell>` inside the container for each candidate; the first
/// one that prints a path wins, else fall back to `sh`
async fn probe_shell(client: Client, namespace: &str, pod: &str, container: &str) -> String {
    let pods: Api<Pod> = Api::namespaced(client, namespace);

    for &shell in CANDIDATE_SHELLS {
        let params = AttachParams {
            container: Some(container.to_string()),
            stdin: false,
            stdout: true,
            stderr: false,
            tty: false,
            ..AttachParams::default()
        };

        let mut attached = match pods.exec(pod, ["which", shell], &params).await {
            Ok(a) => a,
            Err(e) => {
                warn!(namespace, pod, container, shell, error = %e, "shell probe exec failed");
                continue;
            }
        };

        let mut output = String::new();
        if let Some(mut stdout) = attached.stdout() {
            let _ = stdout.read_to_string(&mut output).await;
        }
        let _ = attached.join().await;

        if !output.trim().is_empty() {
            return shell.to_string();
        }
    }

    FALLBACK_SHELL.to_string()
}
