//! Device fingerprint generation (§4.3), grounded on
//! `src/infrastructure/telegram/device_fingerprint.py`'s field set, with the
//! ~10% daily app-version bump from that file's update roll preserved here
//! as a deterministic (account_id, day) hash rather than a live random draw,
//! so repeated calls within the same day agree.

use chrono::Datelike;
use md5::{Digest, Md5};
use uuid::Uuid;

const DEVICE_MODELS: &[&str] = &["Samsung SM-G991B", "iPhone 13", "Xiaomi Redmi Note 11", "Pixel 6"];
const SYSTEM_VERSIONS: &[&str] = &["Android 12", "iOS 16.2", "Android 13", "Android 11"];
const APP_VERSIONS: &[&str] = &["9.6.1", "9.6.3", "9.7.0", "9.7.2"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub lang_code: String,
    pub system_lang_code: String,
}

fn hash_index(account_id: Uuid, salt: &str, modulus: usize) -> usize {
    let mut hasher = Md5::new();
    hasher.update(account_id.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    let n = u32::from_be_bytes(digest[0..4].try_into().unwrap());
    (n as usize) % modulus
}

impl DeviceFingerprint {
    /// Deterministic from `account_id`, so the same account always presents
    /// the same device shape unless the daily roll bumps `app_version`.
    pub fn generate(account_id: Uuid, today: chrono::NaiveDate) -> Self {
        let model = DEVICE_MODELS[hash_index(account_id, "model", DEVICE_MODELS.len())];
        let system = SYSTEM_VERSIONS[hash_index(account_id, "system", SYSTEM_VERSIONS.len())];

        // ~10% daily chance of rolling to a newer app_version, deterministic
        // per (account_id, day) so repeat calls the same day agree.
        let day_key = format!("appver:{}", today.num_days_from_ce());
        let roll = hash_index(account_id, &day_key, 100);
        let base_index = hash_index(account_id, "appbase", APP_VERSIONS.len());
        let app_version = if roll < 10 {
            APP_VERSIONS[(base_index + 1).min(APP_VERSIONS.len() - 1)]
        } else {
            APP_VERSIONS[base_index]
        };

        Self {
            device_model: model.to_string(),
            system_version: system.to_string(),
            app_version: app_version.to_string(),
            lang_code: "en".to_string(),
            system_lang_code: "en-US".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_account_and_day() {
        let id = Uuid::new_v4();
        let day = chrono::Utc::now().date_naive();
        assert_eq!(
            DeviceFingerprint::generate(id, day),
            DeviceFingerprint::generate(id, day)
        );
    }

    #[test]
    fn different_accounts_can_diverge() {
        let day = chrono::Utc::now().date_naive();
        let a = DeviceFingerprint::generate(Uuid::new_v4(), day);
        let b = DeviceFingerprint::generate(Uuid::new_v4(), day);
        // not a strict inequality requirement (pools are small), just smoke-test shape
        assert!(!a.device_model.is_empty());
        assert!(!b.device_model.is_empty());
    }
}
