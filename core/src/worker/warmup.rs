//! Warm-up mode (§4.8.1): while `AccountWarmup.status == Active`, an account
//! does nothing but human-like noise — no outreach, no responses. Grounded
//! on `im/daemon.rs`'s staged-rollout shape (gradual ramp-up
//! before full traffic) generalized to Telegram join/react/scroll actions.

use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::Pools;
use crate::error::TelegramError;
use crate::model::AccountWarmup;
use crate::telegram::{Recipient, TelegramClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WarmupAction {
    JoinChannel,
    React,
    ScrollDialog,
    ViewProfile,
}

/// Runs one warm-up tick if the account's cooldown has elapsed. Returns
/// `true` if a cycle actually ran (caller uses this to reset its own
/// `U(5m, 15m)` scheduling).
pub async fn run_cycle(
    warmup: &mut AccountWarmup,
    client: &Arc<dyn TelegramClient>,
    pools: &Pools,
) -> bool {
    let now = Utc::now();
    if !warmup.can_do_activity(now) {
        return false;
    }

    let mut actions = vec![
        WarmupAction::JoinChannel,
        WarmupAction::React,
        WarmupAction::ScrollDialog,
        WarmupAction::ViewProfile,
    ];
    actions.shuffle(&mut rand::thread_rng());
    let subset_len = rand::thread_rng().gen_range(1..=actions.len());

    for action in actions.into_iter().take(subset_len) {
        let outcome = match action {
            WarmupAction::JoinChannel => join_one(warmup, client, pools).await,
            WarmupAction::React => react_to_random_post(warmup, pools).await,
            WarmupAction::ScrollDialog | WarmupAction::ViewProfile => {
                client.type_and_wait(&Recipient::Id(0), std::time::Duration::from_secs_f64(rand::thread_rng().gen_range(1.0..3.0))).await;
                Ok(())
            }
        };

        if let Err(TelegramError::Flood(secs)) = outcome {
            warmup.flood_wait_until = Some(now + chrono::Duration::seconds(secs as i64));
            break;
        }
    }

    warmup.record_activity();
    maybe_advance_stage(warmup);
    true
}

async fn join_one(
    warmup: &mut AccountWarmup,
    client: &Arc<dyn TelegramClient>,
    pools: &Pools,
) -> Result<(), TelegramError> {
    let Some(channel) = pools.warmup_channels.choose(&mut rand::thread_rng()) else {
        return Ok(());
    };
    client.join_channel(channel).await?;
    warmup.channels_joined += 1;
    warmup.daily_joins += 1;
    Ok(())
}

/// Reactions aren't part of the `TelegramClient` capability surface (there's
/// no post to react to without a live feed), so this tick only exercises
/// the probability gate and counters; a real reaction send would go through
/// `send_message` against the target post once a feed source exists.
async fn react_to_random_post(warmup: &mut AccountWarmup, _pools: &Pools) -> Result<(), TelegramError> {
    if rand::thread_rng().gen_bool(0.3) {
        warmup.reactions_sent += 1;
        warmup.daily_reactions += 1;
    }
    Ok(())
}

/// Advances to the next stage once the profile's day allotment for the
/// current stage has elapsed since `stage_started_at`; completes warm-up
/// once the last stage's days are exhausted.
fn maybe_advance_stage(warmup: &mut AccountWarmup) {
    let Some(started) = warmup.stage_started_at else { return };
    let elapsed_days = (Utc::now() - started).num_days();
    if elapsed_days >= 1 {
        warmup.advance_stage(warmup.stage + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct StubClient;

    #[async_trait]
    impl TelegramClient for StubClient {
        async fn send_message(&self, _: &Recipient, _: &str, _: Option<i64>) -> Result<i64, TelegramError> {
            Ok(1)
        }
        async fn send_messages_natural(
            &self,
            _: &Recipient,
            _: &[String],
            _: &[std::time::Duration],
            _: std::time::Duration,
        ) -> Result<Vec<i64>, TelegramError> {
            Ok(vec![])
        }
        async fn mark_as_read(&self, _: &Recipient, _: i64) -> Result<(), TelegramError> {
            Ok(())
        }
        async fn type_and_wait(&self, _: &Recipient, _: std::time::Duration) {}
        async fn join_channel(&self, _: &str) -> Result<(), TelegramError> {
            Ok(())
        }
        async fn leave_channel(&self, _: &str) -> Result<(), TelegramError> {
            Ok(())
        }
        async fn scrape_group_participants(
            &self,
            _: &str,
            _: usize,
            _: bool,
            _: bool,
        ) -> Result<Vec<crate::telegram::ScrapedParticipant>, TelegramError> {
            Ok(vec![])
        }
        fn on_message(&self, _: Box<dyn Fn(crate::telegram::IncomingMessage) + Send + Sync>) {}
    }

    #[tokio::test]
    async fn cycle_bumps_activity_timestamp() {
        let mut warmup = AccountWarmup::new(Uuid::new_v4(), None);
        warmup.start();
        let client: Arc<dyn TelegramClient> = Arc::new(StubClient);
        let pools = Pools::default();
        assert!(warmup.last_activity_at.is_none());
        run_cycle(&mut warmup, &client, &pools).await;
        assert!(warmup.last_activity_at.is_some());
    }
}
