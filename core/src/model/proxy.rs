use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::EntityMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Socks5,
    Socks4,
    Http,
    Https,
    Mtproto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    Unknown,
    Active,
    Slow,
    Unavailable,
    Banned,
}

#[derive(Debug, Clone)]
pub struct Proxy {
    pub meta: EntityMeta,
    pub host: String,
    pub port: u16,
    pub proxy_type: ProxyType,
    pub username: Option<String>,
    pub password: Option<String>,
    pub status: ProxyStatus,
    pub assigned_account_id: Option<Uuid>,
    pub country: String,
    pub provider: String,
    pub last_check: Option<DateTime<Utc>>,
    pub last_check_latency_ms: Option<u32>,
    pub failure_count: u32,
    pub total_requests: u64,
}

impl Proxy {
    pub fn new(host: String, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            meta: EntityMeta::new(),
            host,
            port,
            proxy_type,
            username: None,
            password: None,
            status: ProxyStatus::Unknown,
            assigned_account_id: None,
            country: String::new(),
            provider: String::new(),
            last_check: None,
            last_check_latency_ms: None,
            failure_count: 0,
            total_requests: 0,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Marks active after a successful health check; `slow` if latency > 5s,
    /// matching the §4.2 state machine exactly.
    pub fn mark_active(&mut self, latency_ms: u32) {
        self.status = if latency_ms > 5000 {
            ProxyStatus::Slow
        } else {
            ProxyStatus::Active
        };
        self.last_check = Some(Utc::now());
        self.last_check_latency_ms = Some(latency_ms);
        self.failure_count = 0;
        self.meta.touch();
    }

    pub fn mark_failed(&mut self) {
        self.failure_count += 1;
        self.last_check = Some(Utc::now());
        if self.failure_count >= 3 {
            self.status = ProxyStatus::Unavailable;
        }
        self.meta.touch();
    }

    pub fn mark_banned(&mut self) {
        self.status = ProxyStatus::Banned;
        self.meta.touch();
    }

    pub fn assign_to_account(&mut self, account_id: Uuid) {
        self.assigned_account_id = Some(account_id);
        self.meta.touch();
    }

    pub fn unassign(&mut self) {
        self.assigned_account_id = None;
        self.meta.touch();
    }

    pub fn is_available(&self) -> bool {
        matches!(
            self.status,
            ProxyStatus::Active | ProxyStatus::Slow | ProxyStatus::Unknown
        ) && self.assigned_account_id.is_none()
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, ProxyStatus::Active | ProxyStatus::Slow)
    }

    pub fn record_request(&mut self) {
        self.total_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_failures_marks_unavailable() {
        let mut p = Proxy::new("1.2.3.4".into(), 1080, ProxyType::Socks5);
        p.mark_failed();
        p.mark_failed();
        assert_eq!(p.status, ProxyStatus::Unknown);
        p.mark_failed();
        assert_eq!(p.status, ProxyStatus::Unavailable);
    }

    #[test]
    fn slow_latency_sets_slow_status() {
        let mut p = Proxy::new("1.2.3.4".into(), 1080, ProxyType::Socks5);
        p.mark_active(6000);
        assert_eq!(p.status, ProxyStatus::Slow);
    }

    #[test]
    fn assigned_proxy_not_available() {
        let mut p = Proxy::new("1.2.3.4".into(), 1080, ProxyType::Socks5);
        p.mark_active(100);
        assert!(p.is_available());
        p.assign_to_account(Uuid::new_v4());
        assert!(!p.is_available());
    }
}
