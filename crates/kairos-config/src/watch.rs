use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kairos_errors::KairosResult;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::loader::ConfigResolver;
use crate::model::KairosConfig;

/// Exposes the current configuration under a read-write lock so hot reload
/// is atomic: readers never observe a half-applied update (spec §4.12
/// "reloadable wrapper").
#[derive(Clone)]
pub struct ReloadableConfig {
    inner: Arc<RwLock<KairosConfig>>,
}

impl ReloadableConfig {
    pub fn new(initial: KairosConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn log(&self) -> crate::model::LogConfig {
        self.inner.read().log.clone()
    }

    pub fn llm(&self) -> crate::model::LlmConfig {
        self.inner.read().llm.clone()
    }

    pub fn agent(&self) -> crate::model::AgentConfig {
        self.inner.read().agent.clone()
    }

    pub fn memory(&self) -> crate::model::MemoryConfig {
        self.inner.read().memory.clone()
    }

    pub fn mcp(&self) -> crate::model::McpConfig {
        self.inner.read().mcp.clone()
    }

    pub fn discovery(&self) -> crate::model::DiscoveryConfig {
        self.inner.read().discovery.clone()
    }

    pub fn telemetry(&self) -> crate::model::TelemetryConfig {
        self.inner.read().telemetry.clone()
    }

    pub fn runtime(&self) -> crate::model::RuntimeConfig {
        self.inner.read().runtime.clone()
    }

    pub fn governance(&self) -> crate::model::GovernanceConfig {
        self.inner.read().governance.clone()
    }

    /// Returns a clone of the full snapshot, for callers that need more than
    /// one section atomically.
    pub fn snapshot(&self) -> KairosConfig {
        self.inner.read().clone()
    }

    fn replace(&self, next: KairosConfig) {
        *self.inner.write() = next;
    }
}

/// Polls a base config file's mtime at `interval` and reloads on change,
/// re-running the whole resolver chain so file/env/CLI layering stays
/// consistent across reloads (spec §4.12 "file watcher").
pub struct ConfigWatcher {
    handle: tokio::task::JoinHandle<()>,
}

impl ConfigWatcher {
    pub fn spawn(resolver: ConfigResolver, path: PathBuf, interval: Duration, target: ReloadableConfig) -> Self {
        let handle = tokio::spawn(async move {
            let mut last_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                    Ok(mtime) => mtime,
                    Err(err) => {
                        warn!(%err, path = %path.display(), "config watch: could not stat file");
                        continue;
                    }
                };
                if Some(mtime) == last_mtime {
                    continue;
                }
                last_mtime = Some(mtime);

                match resolver.resolve() {
                    Ok(next) => {
                        target.replace(next);
                        info!(path = %path.display(), "configuration reloaded");
                    }
                    Err(err) => warn!(%err, path = %path.display(), "config reload failed, keeping previous configuration"),
                }
            }
        });
        Self { handle }
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

pub fn load(resolver: &ConfigResolver) -> KairosResult<ReloadableConfig> {
    Ok(ReloadableConfig::new(resolver.resolve()?))
}
