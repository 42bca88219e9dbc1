//! Rate & counter model (C7): the admission predicates and the bulk reset
//! jobs the scheduler runs every hour/minute. Most of the per-account state
//! machinery (schedule windows, sleep windows, the deterministic reset hour)
//! already lives on [`Account`](crate::model::Account) itself — this module
//! is the thin, named surface §4.7 describes plus the fleet-wide reset
//! sweeps §4.9 schedules, grounded on `headless/daemon.rs`'s periodic-task
//! pattern (iterate owned state, bulk-mutate, touch once).

use chrono::{DateTime, Utc};

use crate::model::Account;

/// `can_send_outreach`: active, under the hourly outreach cap, and outside
/// the sleep window.
pub fn can_send_outreach(account: &Account, now: DateTime<Utc>) -> bool {
    account.can_send_message(now)
}

/// `can_respond`: active and under the hourly response cap. Unlike outreach
/// this is NOT gated by the sleep window — an already-asleep account still
/// answers a message that arrives mid-window in the source behavior, since
/// replying is reactive rather than initiated.
pub fn can_respond(account: &Account) -> bool {
    account.can_respond_to_message()
}

/// `can_start_conversation`: outreach-eligible AND under the daily new-
/// conversation cap.
pub fn can_start_conversation(account: &Account, now: DateTime<Utc>) -> bool {
    account.can_start_new_conversation(now)
}

/// Hourly reset job (§4.9, period 3600s): zero every account's hourly
/// counters if either was nonzero. Returns the number of accounts touched,
/// for the manager's stats surface.
pub fn reset_hourly_counters<'a>(accounts: impl IntoIterator<Item = &'a mut Account>) -> usize {
    let mut touched = 0;
    for account in accounts {
        if account.hourly_messages_count > 0 || account.hourly_responses_count > 0 {
            account.reset_hourly_counter();
            touched += 1;
        }
    }
    touched
}

/// Daily reset job (§4.9, period 60s but idempotent): resets
/// `daily_conversations_count` for every account whose deterministic reset
/// hour matches `now`'s UTC hour and that is actually due, per
/// [`Account::due_for_daily_reset`]. Runs every minute but only flips state
/// once per account per day because of that guard.
pub fn reset_daily_counters<'a>(
    accounts: impl IntoIterator<Item = &'a mut Account>,
    now: DateTime<Utc>,
) -> usize {
    let mut touched = 0;
    for account in accounts {
        if account.due_for_daily_reset(now) {
            account.reset_daily_counter();
            touched += 1;
        }
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountSource, AccountStatus};

    fn active_account() -> Account {
        let mut a = Account::new("+1555".into(), AccountSource::Phone);
        a.status = AccountStatus::Active;
        a
    }

    #[test]
    fn outreach_gated_by_hourly_cap() {
        let mut a = active_account();
        a.limits.max_messages_per_hour = 1;
        a.hourly_messages_count = 1;
        assert!(!can_send_outreach(&a, Utc::now()));
    }

    #[test]
    fn start_conversation_requires_daily_cap_room() {
        let mut a = active_account();
        a.limits.max_new_conversations_per_day = 1;
        a.daily_conversations_count = 1;
        assert!(!can_start_conversation(&a, Utc::now()));
    }

    #[test]
    fn hourly_reset_only_touches_nonzero_accounts() {
        let mut untouched = active_account();
        let mut touched = active_account();
        touched.hourly_messages_count = 5;
        let mut accounts = vec![&mut untouched, &mut touched];
        let n = reset_hourly_counters(accounts.iter_mut().map(|a| &mut **a));
        assert_eq!(n, 1);
        assert_eq!(touched.hourly_messages_count, 0);
    }
}
