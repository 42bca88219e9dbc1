//! Proxy registry (C2): health/latency state plus the exclusive-assignment
//! invariant. Grounded on `src/infrastructure/proxy/checker.py` for the
//! health-check shape (15s timeout, latency in ms, 5000ms slow threshold)
//! and on `tunnels.rs`'s unified-backend-trait pattern for
//! keeping the health-check mechanism swappable from the registry's state.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::model::Proxy;

/// Probes one proxy's health. Implemented for real use with `reqwest`
/// routed through the candidate proxy; swappable for tests.
#[async_trait]
pub trait ProxyChecker: Send + Sync {
    /// Connects through the proxy to a well-known HTTPS endpoint; returns
    /// latency in milliseconds on success.
    async fn check(&self, proxy: &Proxy) -> Result<u32, ProxyError>;
}

pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(15);
pub const SLOW_LATENCY_MS: u32 = 5000;

/// `reqwest`-backed checker: builds a client proxied through the candidate
/// and times a GET against the configured probe URL.
pub struct ReqwestProxyChecker {
    pub probe_url: String,
}

#[async_trait]
impl ProxyChecker for ReqwestProxyChecker {
    async fn check(&self, proxy: &Proxy) -> Result<u32, ProxyError> {
        let proxy_url = to_reqwest_proxy_url(proxy);
        let client = reqwest::Client::builder()
            .proxy(
                reqwest::Proxy::all(&proxy_url)
                    .map_err(|e| ProxyError::Connection(proxy.address(), e.to_string()))?,
            )
            .timeout(HEALTH_CHECK_TIMEOUT)
            .build()
            .map_err(|e| ProxyError::Connection(proxy.address(), e.to_string()))?;

        let start = std::time::Instant::now();
        client
            .get(&self.probe_url)
            .send()
            .await
            .map_err(|e| ProxyError::Connection(proxy.address(), e.to_string()))?;
        Ok(start.elapsed().as_millis() as u32)
    }
}

fn to_reqwest_proxy_url(proxy: &Proxy) -> String {
    let scheme = match proxy.proxy_type {
        crate::model::ProxyType::Socks5 => "socks5",
        crate::model::ProxyType::Socks4 => "socks4",
        crate::model::ProxyType::Http => "http",
        crate::model::ProxyType::Https => "https",
        crate::model::ProxyType::Mtproto => "socks5",
    };
    match (&proxy.username, &proxy.password) {
        (Some(u), Some(p)) => format!("{scheme}://{u}:{p}@{}:{}", proxy.host, proxy.port),
        _ => format!("{scheme}://{}:{}", proxy.host, proxy.port),
    }
}

/// In-memory view of the proxy set used by workers to pick a replacement
/// during fail-over, backed by the repository for persistence. Exclusive
/// assignment is enforced here: `get_for_account` and `assign` both go
/// through this single map so two workers can't race onto the same proxy.
pub struct ProxyRegistry {
    proxies: DashMap<Uuid, Proxy>,
    checker: Box<dyn ProxyChecker>,
}

impl ProxyRegistry {
    pub fn new(checker: Box<dyn ProxyChecker>) -> Self {
        Self {
            proxies: DashMap::new(),
            checker,
        }
    }

    pub fn load(&self, proxies: Vec<Proxy>) {
        for p in proxies {
            self.proxies.insert(p.meta.id, p);
        }
    }

    pub fn list_available(&self, limit: usize) -> Vec<Proxy> {
        self.proxies
            .iter()
            .filter(|entry| entry.is_available())
            .take(limit)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_for_account(&self, account_id: Uuid) -> Option<Proxy> {
        self.proxies
            .iter()
            .find(|entry| entry.assigned_account_id == Some(account_id))
            .map(|entry| entry.value().clone())
    }

    pub fn is_assigned(&self, proxy_id: Uuid) -> bool {
        self.proxies
            .get(&proxy_id)
            .map(|p| p.assigned_account_id.is_some())
            .unwrap_or(false)
    }

    pub fn assign(&self, proxy_id: Uuid, account_id: Uuid) -> Result<(), ProxyError> {
        let mut entry = self
            .proxies
            .get_mut(&proxy_id)
            .ok_or_else(|| ProxyError::NotFound(proxy_id.to_string()))?;
        entry.assign_to_account(account_id);
        Ok(())
    }

    pub fn unassign(&self, proxy_id: Uuid) {
        if let Some(mut entry) = self.proxies.get_mut(&proxy_id) {
            entry.unassign();
        }
    }

    /// Picks an available proxy excluding a given set (proxies that already
    /// failed during this connection attempt), assigns and returns it.
    pub fn acquire_excluding(
        &self,
        account_id: Uuid,
        exclude: &[Uuid],
    ) -> Result<Proxy, ProxyError> {
        let candidate = self
            .proxies
            .iter()
            .find(|entry| entry.is_available() && !exclude.contains(&entry.meta.id))
            .map(|entry| entry.meta.id)
            .ok_or_else(|| ProxyError::NotAvailable(Some("no candidates remaining".into())))?;
        self.assign(candidate, account_id)?;
        self.get_for_account(account_id)
            .ok_or_else(|| ProxyError::NotFound(candidate.to_string()))
    }

    pub async fn check_and_update(&self, proxy_id: Uuid) -> Result<(), ProxyError> {
        let proxy = self
            .proxies
            .get(&proxy_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| ProxyError::NotFound(proxy_id.to_string()))?;
        match self.checker.check(&proxy).await {
            Ok(latency_ms) => {
                if let Some(mut entry) = self.proxies.get_mut(&proxy_id) {
                    entry.mark_active(latency_ms);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(mut entry) = self.proxies.get_mut(&proxy_id) {
                    entry.mark_failed();
                }
                Err(e)
            }
        }
    }

    pub fn mark_failed(&self, proxy_id: Uuid) {
        if let Some(mut entry) = self.proxies.get_mut(&proxy_id) {
            entry.mark_failed();
        }
    }

    pub fn mark_banned(&self, proxy_id: Uuid) {
        if let Some(mut entry) = self.proxies.get_mut(&proxy_id) {
            entry.mark_banned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProxyType;

    struct AlwaysOk;
    #[async_trait]
    impl ProxyChecker for AlwaysOk {
        async fn check(&self, _proxy: &Proxy) -> Result<u32, ProxyError> {
            Ok(42)
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl ProxyChecker for AlwaysFail {
        async fn check(&self, proxy: &Proxy) -> Result<u32, ProxyError> {
            Err(ProxyError::Connection(proxy.address(), "boom".into()))
        }
    }

    #[tokio::test]
    async fn successful_check_marks_active() {
        let registry = ProxyRegistry::new(Box::new(AlwaysOk));
        let proxy = Proxy::new("1.2.3.4".into(), 1080, ProxyType::Socks5);
        let id = proxy.meta.id;
        registry.load(vec![proxy]);
        registry.check_and_update(id).await.unwrap();
        assert!(registry.get_for_account(Uuid::new_v4()).is_none());
        assert!(registry.list_available(10)[0].is_healthy());
    }

    #[tokio::test]
    async fn acquire_excluding_skips_failed_and_respects_exclusivity() {
        let registry = ProxyRegistry::new(Box::new(AlwaysFail));
        let p1 = Proxy::new("1.1.1.1".into(), 1080, ProxyType::Socks5);
        let p2 = Proxy::new("2.2.2.2".into(), 1080, ProxyType::Socks5);
        let p1_id = p1.meta.id;
        let p2_id = p2.meta.id;
        registry.load(vec![p1, p2]);

        let account = Uuid::new_v4();
        let acquired = registry.acquire_excluding(account, &[p1_id]).unwrap();
        assert_eq!(acquired.meta.id, p2_id);
        assert!(registry.is_assigned(p2_id));
    }
}
