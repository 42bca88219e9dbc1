//! Background activity (§4.8.2): a low-key loop that keeps an account
//! looking human even while idle — toggling online/offline and touching a
//! few channels — running alongside outreach, never blocking it. Grounded
//! on `im/daemon.rs`'s per-channel background ticker,
//! generalized to a weighted activity table.

use std::sync::Arc;
use std::time::Duration;

use md5::{Digest, Md5};
use rand::Rng;
use uuid::Uuid;

use crate::config::Pools;
use crate::telegram::TelegramClient;

/// Deterministic per-account jitter multiplier in `[1-variance, 1+variance]`
/// so accounts never tick in lockstep (§4.8.2).
fn account_variance(account_id: Uuid, variance: f64) -> f64 {
    let mut hasher = Md5::new();
    hasher.update(account_id.as_bytes());
    let digest = hasher.finalize();
    let frac = digest[0] as f64 / 255.0;
    1.0 - variance + frac * (2.0 * variance)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    ReadChannel,
    ReadDialog,
    Scroll,
    Reaction,
    ViewProfile,
    TypingSimulation,
}

const WEIGHTS: &[(Activity, u32)] = &[
    (Activity::ReadChannel, 25),
    (Activity::ReadDialog, 20),
    (Activity::Scroll, 20),
    (Activity::Reaction, 15),
    (Activity::ViewProfile, 10),
    (Activity::TypingSimulation, 10),
];

fn pick_activity() -> Activity {
    let total: u32 = WEIGHTS.iter().map(|(_, w)| w).sum();
    let mut roll = rand::thread_rng().gen_range(0..total);
    for (activity, weight) in WEIGHTS {
        if roll < *weight {
            return *activity;
        }
        roll -= weight;
    }
    Activity::Scroll
}

/// Runs until `stop_rx` fires. Never returns an error — a failed individual
/// tick (e.g. a channel join failing) just gets logged and skipped, since
/// none of this is outreach-critical.
pub async fn run_background_loop(
    account_id: Uuid,
    client: Arc<dyn TelegramClient>,
    pools: &Pools,
    mut stop_rx: tokio::sync::watch::Receiver<bool>,
) {
    let variance = account_variance(account_id, 0.3);
    let initial_delay = rand::thread_rng().gen_range(0.0..120.0) * variance;
    if tokio::time::timeout(Duration::from_secs_f64(initial_delay), stop_rx.changed())
        .await
        .is_ok()
    {
        return;
    }

    loop {
        if *stop_rx.borrow() {
            return;
        }

        let activity = pick_activity();
        run_activity(&client, pools, activity).await;

        let online = rand::thread_rng().gen_range(45.0..240.0) * variance;
        if tokio::time::timeout(Duration::from_secs_f64(online), stop_rx.changed())
            .await
            .is_ok()
        {
            return;
        }

        let offline = rand::thread_rng().gen_range(180.0..1200.0) * variance;
        if tokio::time::timeout(Duration::from_secs_f64(offline), stop_rx.changed())
            .await
            .is_ok()
        {
            return;
        }
    }
}

async fn run_activity(client: &Arc<dyn TelegramClient>, pools: &Pools, activity: Activity) {
    let channel = pools
        .background_channels
        .get(rand::thread_rng().gen_range(0..pools.background_channels.len().max(1)))
        .cloned();

    match activity {
        Activity::ReadChannel | Activity::ViewProfile => {
            if let Some(channel) = channel {
                let _ = client.scrape_group_participants(&channel, 1, true, false).await;
            }
        }
        Activity::ReadDialog | Activity::Scroll | Activity::TypingSimulation => {
            let dwell = Duration::from_secs_f64(rand::thread_rng().gen_range(1.0..4.0));
            client.type_and_wait(&crate::telegram::Recipient::Id(0), dwell).await;
        }
        Activity::Reaction => {
            tracing::debug!("background reaction tick (no reachable post to react to)");
        }
    }
}
