//! Seeded impairment channel between two in-memory engines.
//!
//! Every datagram crossing the link rolls against the configured loss,
//! duplication, and reorder probabilities using a `StdRng` seeded from the
//! scenario, so each run makes identical impairment decisions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use tracing::debug;

use riptide_transport::engine::{Engine, EngineConfig};

type Wire = Arc<Mutex<VecDeque<Vec<u8>>>>;

// ─── Conditions ─────────────────────────────────────────────────────────────

/// Per-datagram impairment probabilities for one link.
#[derive(Debug, Clone)]
pub struct LinkConditions {
    /// Probability a datagram disappears.
    pub loss: f64,
    /// Probability a datagram is delivered twice.
    pub duplicate: f64,
    /// Probability a datagram swaps places with its neighbor.
    pub reorder: f64,
    /// RNG seed; identical seeds replay identical impairment decisions.
    pub seed: u64,
}

impl Default for LinkConditions {
    fn default() -> Self {
        LinkConditions {
            loss: 0.0,
            duplicate: 0.0,
            reorder: 0.0,
            seed: 0xD1CE,
        }
    }
}

// ─── ImpairedLink ───────────────────────────────────────────────────────────

/// Two engines joined by an impaired bidirectional channel.
pub struct ImpairedLink {
    pub a: Engine,
    pub b: Engine,
    a_out: Wire,
    b_out: Wire,
    rng: StdRng,
    conditions: LinkConditions,
}

impl ImpairedLink {
    pub fn new(
        conv: u32,
        conditions: LinkConditions,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        let a_out: Wire = Arc::default();
        let b_out: Wire = Arc::default();

        let a = {
            let q = Arc::clone(&a_out);
            Engine::with_config(conv, config.clone(), move |d: &[u8]| {
                q.lock().expect("wire lock").push_back(d.to_vec());
            })
            .context("configuring engine a")?
        };
        let b = {
            let q = Arc::clone(&b_out);
            Engine::with_config(conv, config, move |d: &[u8]| {
                q.lock().expect("wire lock").push_back(d.to_vec());
            })
            .context("configuring engine b")?
        };

        Ok(ImpairedLink {
            a,
            b,
            a_out,
            b_out,
            rng: StdRng::seed_from_u64(conditions.seed),
            conditions,
        })
    }

    /// Apply impairments to every queued datagram in both directions and
    /// feed the survivors to the opposite engine.
    pub fn pump(&mut self) -> anyhow::Result<()> {
        let outbound: Vec<Vec<u8>> = self.a_out.lock().expect("wire lock").drain(..).collect();
        for datagram in impair(&mut self.rng, &self.conditions, outbound) {
            self.b
                .input(&datagram, true, false)
                .context("feeding engine b")?;
        }

        let outbound: Vec<Vec<u8>> = self.b_out.lock().expect("wire lock").drain(..).collect();
        for datagram in impair(&mut self.rng, &self.conditions, outbound) {
            self.a
                .input(&datagram, true, false)
                .context("feeding engine a")?;
        }
        Ok(())
    }

    /// Drive both engines and pump the link until `done` reports true or
    /// `deadline` elapses. Returns whether `done` succeeded in time.
    pub fn run_until(
        &mut self,
        deadline: Duration,
        tick: Duration,
        mut done: impl FnMut(&mut Self) -> bool,
    ) -> anyhow::Result<bool> {
        let started = Instant::now();
        loop {
            self.a.update();
            self.b.update();
            self.pump()?;
            if done(self) {
                return Ok(true);
            }
            if started.elapsed() > deadline {
                return Ok(false);
            }
            std::thread::sleep(tick);
        }
    }
}

// ─── Impairment ─────────────────────────────────────────────────────────────

fn impair(rng: &mut StdRng, conditions: &LinkConditions, datagrams: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut kept = Vec::with_capacity(datagrams.len() + 1);
    for datagram in datagrams {
        if rng.random::<f64>() < conditions.loss {
            debug!(bytes = datagram.len(), "datagram lost");
            continue;
        }
        if rng.random::<f64>() < conditions.duplicate {
            kept.push(datagram.clone());
        }
        kept.push(datagram);
    }
    for i in 1..kept.len() {
        if rng.random::<f64>() < conditions.reorder {
            kept.swap(i - 1, i);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i as u8; 4]).collect()
    }

    #[test]
    fn no_impairment_passes_everything_through() {
        let conditions = LinkConditions::default();
        let mut rng = StdRng::seed_from_u64(conditions.seed);
        let out = impair(&mut rng, &conditions, frames(10));
        assert_eq!(out, frames(10));
    }

    #[test]
    fn full_loss_drops_everything() {
        let conditions = LinkConditions {
            loss: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(conditions.seed);
        assert!(impair(&mut rng, &conditions, frames(10)).is_empty());
    }

    #[test]
    fn duplication_grows_the_batch() {
        let conditions = LinkConditions {
            duplicate: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(conditions.seed);
        assert_eq!(impair(&mut rng, &conditions, frames(5)).len(), 10);
    }

    #[test]
    fn same_seed_makes_identical_decisions() {
        let conditions = LinkConditions {
            loss: 0.4,
            duplicate: 0.2,
            reorder: 0.3,
            seed: 99,
        };
        let mut rng1 = StdRng::seed_from_u64(conditions.seed);
        let mut rng2 = StdRng::seed_from_u64(conditions.seed);
        assert_eq!(
            impair(&mut rng1, &conditions, frames(64)),
            impair(&mut rng2, &conditions, frames(64))
        );
    }
}
