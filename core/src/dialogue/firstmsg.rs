//! First-contact message generation (§4.6.6): a weighted draw from a pool
//! of short informal Russian greetings, always paired with the CONTINUE
//! action. This never calls the LLM — greeting variety alone is enough to
//! avoid a detectable pattern, and skipping the network round-trip keeps
//! the outreach task's latency bounded. [`FIRST_MESSAGE_FALLBACK`] backs
//! this up only in the degenerate case of an empty/misconfigured pool.

use rand::distributions::{Distribution, WeightedIndex};

use super::lexicon::{FIRST_MESSAGE_FALLBACK, FIRST_MESSAGE_GREETINGS, FIRST_MESSAGE_WEIGHTS};

pub fn generate_first_message() -> String {
    debug_assert_eq!(FIRST_MESSAGE_GREETINGS.len(), FIRST_MESSAGE_WEIGHTS.len());
    let Ok(dist) = WeightedIndex::new(FIRST_MESSAGE_WEIGHTS) else {
        return FIRST_MESSAGE_FALLBACK.to_string();
    };
    let mut rng = rand::thread_rng();
    FIRST_MESSAGE_GREETINGS[dist.sample(&mut rng)].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_draws_from_the_known_pool() {
        for _ in 0..200 {
            let msg = generate_first_message();
            assert!(FIRST_MESSAGE_GREETINGS.contains(&msg.as_str()));
        }
    }
}
