use chrono::{DateTime, Datelike, Timelike, Utc};
use md5::{Digest, Md5};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use super::EntityMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Inactive,
    Ready,
    Active,
    Paused,
    Error,
    Banned,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountSource {
    Phone,
    JsonSession,
    Tdata,
}

/// Active window + sleep simulation. The sleep offset and per-day jitter are
/// both derived deterministically from the account id so restarts don't
/// resynchronize accounts that happened to compute a fresh random offset.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccountSchedule {
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
    /// 0 = Monday .. 6 = Sunday, matching `chrono::Weekday::num_days_from_monday`.
    pub active_days: [bool; 7],
    pub timezone: String,
    pub sleep_enabled: bool,
    pub sleep_hours: u32,
    pub sleep_start_hour: u32,
}

impl Default for AccountSchedule {
    fn default() -> Self {
        Self {
            start_hour: 9,
            start_minute: 0,
            end_hour: 21,
            end_minute: 0,
            active_days: [true; 7],
            timezone: "UTC".into(),
            sleep_enabled: true,
            sleep_hours: 7,
            sleep_start_hour: 23,
        }
    }
}

impl AccountSchedule {
    fn seeded_rng(account_id: Uuid) -> StdRng {
        let mut hasher = Md5::new();
        hasher.update(account_id.as_bytes());
        let digest = hasher.finalize();
        let seed = u64::from_be_bytes(digest[0..8].try_into().unwrap());
        StdRng::seed_from_u64(seed)
    }

    /// Deterministic per-account offset in `[-2h, +2h]`.
    pub fn sleep_offset_hours(&self, account_id: Uuid) -> f64 {
        Self::seeded_rng(account_id).gen_range(-2.0..=2.0)
    }

    /// Sleep window start/duration for `day`, with a small daily jitter layered
    /// on top of the fixed per-account offset so the window isn't perfectly
    /// static day over day. Duration is `sleep_hours ± 1h`, clamped to
    /// `[5, 10]` hours.
    pub fn sleep_window(&self, account_id: Uuid, day: DateTime<Utc>) -> (f64, f64) {
        let offset = self.sleep_offset_hours(account_id);
        let mut day_rng = Self::seeded_rng(account_id);
        // advance the stream deterministically per calendar day
        for _ in 0..day.ordinal() {
            day_rng.gen::<f64>();
        }
        let daily_variation: f64 = day_rng.gen_range(-0.5..=0.5);
        let start = (self.sleep_start_hour as f64 + offset + daily_variation).rem_euclid(24.0);
        let duration_jitter: f64 = day_rng.gen_range(-1.0..=1.0);
        let duration = (self.sleep_hours as f64 + duration_jitter).clamp(5.0, 10.0);
        (start, duration)
    }

    pub fn is_sleeping(&self, account_id: Uuid, now: DateTime<Utc>) -> bool {
        if !self.sleep_enabled {
            return false;
        }
        let (start, duration) = self.sleep_window(account_id, now);
        let hour = now.hour() as f64 + now.minute() as f64 / 60.0;
        let end = (start + duration).rem_euclid(24.0);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    fn in_time_window(&self, now: DateTime<Utc>) -> bool {
        let cur = now.hour() * 60 + now.minute();
        let start = self.start_hour * 60 + self.start_minute;
        let end = self.end_hour * 60 + self.end_minute;
        if start <= end {
            cur >= start && cur < end
        } else {
            cur >= start || cur < end
        }
    }

    pub fn is_active_now(&self, account_id: Uuid, now: DateTime<Utc>) -> bool {
        let weekday = now.weekday().num_days_from_monday() as usize;
        if !self.active_days[weekday] {
            return false;
        }
        if self.is_sleeping(account_id, now) {
            return false;
        }
        self.in_time_window(now)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccountLimits {
    pub max_new_conversations_per_day: u32,
    pub max_messages_per_hour: u32,
    pub max_responses_per_hour: u32,
    pub min_delay_between_messages: u32,
    pub max_delay_between_messages: u32,
    pub max_active_dialogues: u32,
}

impl Default for AccountLimits {
    fn default() -> Self {
        Self {
            max_new_conversations_per_day: 20,
            max_messages_per_hour: 30,
            max_responses_per_hour: 300,
            min_delay_between_messages: 30,
            max_delay_between_messages: 120,
            max_active_dialogues: 50,
        }
    }
}

impl AccountLimits {
    pub fn random_delay(&self) -> std::time::Duration {
        let secs = rand::thread_rng()
            .gen_range(self.min_delay_between_messages..=self.max_delay_between_messages);
        std::time::Duration::from_secs(secs as u64)
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub meta: EntityMeta,
    pub phone: String,
    pub session_data: Option<Vec<u8>>,
    pub proxy_id: Option<Uuid>,
    pub telegram_app_id: Option<Uuid>,
    pub source: AccountSource,
    pub status: AccountStatus,
    pub schedule: AccountSchedule,
    pub limits: AccountLimits,
    pub campaign_id: Option<Uuid>,
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub is_premium: bool,
    pub daily_conversations_count: u32,
    pub hourly_messages_count: u32,
    pub hourly_responses_count: u32,
    pub total_messages_sent: u64,
    pub total_conversations_started: u64,
    pub last_daily_reset: Option<DateTime<Utc>>,
    pub last_hourly_reset: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Account {
    pub fn new(phone: String, source: AccountSource) -> Self {
        Self {
            meta: EntityMeta::new(),
            phone,
            session_data: None,
            proxy_id: None,
            telegram_app_id: None,
            source,
            status: AccountStatus::Inactive,
            schedule: AccountSchedule::default(),
            limits: AccountLimits::default(),
            campaign_id: None,
            telegram_id: None,
            username: None,
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            is_premium: false,
            daily_conversations_count: 0,
            hourly_messages_count: 0,
            hourly_responses_count: 0,
            total_messages_sent: 0,
            total_conversations_started: 0,
            last_daily_reset: None,
            last_hourly_reset: None,
            last_activity: None,
            error_message: None,
        }
    }

    /// Derived once from the id: `int(md5(id)[:2], 16) % 24`.
    pub fn daily_reset_hour(&self) -> u32 {
        daily_reset_hour(self.meta.id)
    }

    pub fn activate(&mut self) -> Result<(), String> {
        if self.status == AccountStatus::Banned {
            return Err(format!("account {} is banned", self.meta.id));
        }
        self.status = AccountStatus::Active;
        self.meta.touch();
        Ok(())
    }

    pub fn pause(&mut self) {
        self.status = AccountStatus::Paused;
        self.meta.touch();
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = AccountStatus::Error;
        self.error_message = Some(message.into());
        self.meta.touch();
    }

    pub fn set_banned(&mut self) {
        self.status = AccountStatus::Banned;
        self.meta.touch();
    }

    pub fn is_configured(&self) -> bool {
        self.session_data.is_some() && self.proxy_id.is_some()
    }

    pub fn can_send_message(&self, now: DateTime<Utc>) -> bool {
        self.status == AccountStatus::Active
            && self.hourly_messages_count < self.limits.max_messages_per_hour
            && !self.schedule.is_sleeping(self.meta.id, now)
    }

    pub fn can_respond_to_message(&self) -> bool {
        self.status == AccountStatus::Active
            && self.hourly_responses_count < self.limits.max_responses_per_hour
    }

    pub fn can_start_new_conversation(&self, now: DateTime<Utc>) -> bool {
        self.can_send_message(now)
            && self.daily_conversations_count < self.limits.max_new_conversations_per_day
    }

    pub fn record_message_sent(&mut self) {
        self.hourly_messages_count += 1;
        self.total_messages_sent += 1;
        self.last_activity = Some(Utc::now());
        self.meta.touch();
    }

    pub fn record_response_sent(&mut self) {
        self.hourly_responses_count += 1;
        self.total_messages_sent += 1;
        self.last_activity = Some(Utc::now());
        self.meta.touch();
    }

    pub fn record_new_conversation(&mut self) {
        self.daily_conversations_count += 1;
        self.total_conversations_started += 1;
        self.meta.touch();
    }

    pub fn reset_hourly_counter(&mut self) {
        self.hourly_messages_count = 0;
        self.hourly_responses_count = 0;
        self.last_hourly_reset = Some(Utc::now());
    }

    pub fn reset_daily_counter(&mut self) {
        self.daily_conversations_count = 0;
        self.last_daily_reset = Some(Utc::now());
    }

    /// §4.7's reset job predicate: due when the account's deterministic reset
    /// hour matches the current UTC hour AND either it has a nonzero count or
    /// it has never been reset (or was last reset on a previous calendar day).
    pub fn due_for_daily_reset(&self, now: DateTime<Utc>) -> bool {
        if self.daily_reset_hour() != now.hour() {
            return false;
        }
        match self.last_daily_reset {
            None => true,
            Some(last) => self.daily_conversations_count > 0 || last.date_naive() != now.date_naive(),
        }
    }
}

pub fn daily_reset_hour(account_id: Uuid) -> u32 {
    let mut hasher = Md5::new();
    hasher.update(account_id.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    let byte = u32::from_str_radix(&hex[0..2], 16).unwrap_or(0);
    byte % 24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banned_account_cannot_activate() {
        let mut a = Account::new("+1555".into(), AccountSource::Phone);
        a.set_banned();
        assert!(a.activate().is_err());
    }

    #[test]
    fn reset_hour_is_deterministic_and_bounded() {
        let id = Uuid::new_v4();
        let h1 = daily_reset_hour(id);
        let h2 = daily_reset_hour(id);
        assert_eq!(h1, h2);
        assert!(h1 < 24);
    }

    #[test]
    fn configured_requires_session_and_proxy() {
        let mut a = Account::new("+1555".into(), AccountSource::Phone);
        assert!(!a.is_configured());
        a.session_data = Some(vec![1, 2, 3]);
        assert!(!a.is_configured());
        a.proxy_id = Some(Uuid::new_v4());
        assert!(a.is_configured());
    }

    #[test]
    fn reset_hour_distribution_is_roughly_uniform() {
        let mut buckets = [0u32; 24];
        for _ in 0..5000 {
            let h = daily_reset_hour(Uuid::new_v4());
            buckets[h as usize] += 1;
        }
        let expected = 5000.0 / 24.0;
        for count in buckets {
            assert!((count as f64 - expected).abs() < expected, "bucket skew too large: {count}");
        }
    }
}
