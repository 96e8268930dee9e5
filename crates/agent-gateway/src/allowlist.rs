//! Host allow-list policy shared by both proxy variants.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

/// Source of system-wide settings, currently just the proxy allow-list.
#[async_trait]
pub trait SystemInfo: Send + Sync {
    /// Host substrings that may be targeted by the proxy.
    async fn allowed_hosts(&self) -> Vec<String>;
}

/// System info backed by the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSystemInfo {
    allowed_hosts: Vec<String>,
}

impl StaticSystemInfo {
    pub fn new(allowed_hosts: Vec<String>) -> Self {
        Self { allowed_hosts }
    }
}

#[async_trait]
impl SystemInfo for StaticSystemInfo {
    async fn allowed_hosts(&self) -> Vec<String> {
        self.allowed_hosts.clone()
    }
}

/// Decides whether an upstream host may be proxied to.
///
/// Matching is substring containment, not suffix matching: an entry
/// `"internal.corp"` admits `"node-7.internal.corp:8443"` and also
/// `"internal.corp.example.com"`. The list is fetched on every call.
#[derive(Clone)]
pub struct AllowListPolicy {
    system_info: Arc<dyn SystemInfo>,
}

impl AllowListPolicy {
    pub fn new(system_info: Arc<dyn SystemInfo>) -> Self {
        Self { system_info }
    }

    pub async fn is_host_allowed(&self, target_host: &str) -> bool {
        if target_host.is_empty() {
            return false;
        }

        let allowed = self.system_info.allowed_hosts().await;
        let matched = host_matches(&allowed, target_host);
        debug!(host = target_host, allowed = matched, "Checked host against allow-list");
        matched
    }
}

fn host_matches(allowed: &[String], target_host: &str) -> bool {
    allowed
        .iter()
        .any(|entry| !entry.is_empty() && target_host.contains(entry.as_str()))
}
