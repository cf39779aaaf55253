//! Seeded random source with one sub-stream per demographic domain.
//!
//! Each stream is seeded as `master.wrapping_add(TAG)` with a fixed
//! per-domain tag, so disabling or re-tuning one subsystem never
//! reshuffles the draws of another. The whole suite serializes into
//! snapshots; a restored suite continues its streams bit-identically.

use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

// Domain tags, ASCII-packed so collisions are impossible to produce by
// accident when a new stream is added.
const TAG_GENESIS: u64 = 0x4745_4e45_5349_53; // "GENESIS"
const TAG_MORTALITY: u64 = 0x4d4f_5254_414c_5459; // "MORTALTY"
const TAG_PARTNERSHIP: u64 = 0x5041_5254_4e45_5253; // "PARTNERS"
const TAG_FERTILITY: u64 = 0x4645_5254_494c_5459; // "FERTILTY"
const TAG_MIGRATION: u64 = 0x4d49_4752_4154_494f; // "MIGRATIO"

/// All random streams used by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngSuite {
    seed: u64,
    genesis: Pcg64,
    mortality: Pcg64,
    partnership: Pcg64,
    fertility: Pcg64,
    migration: Pcg64,
}

fn stream(seed: u64, tag: u64) -> Pcg64 {
    Pcg64::seed_from_u64(seed.wrapping_add(tag))
}

impl RngSuite {
    pub fn new(seed: u64) -> Self {
        RngSuite {
            seed,
            genesis: stream(seed, TAG_GENESIS),
            mortality: stream(seed, TAG_MORTALITY),
            partnership: stream(seed, TAG_PARTNERSHIP),
            fertility: stream(seed, TAG_FERTILITY),
            migration: stream(seed, TAG_MIGRATION),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn genesis(&mut self) -> &mut Pcg64 {
        &mut self.genesis
    }

    pub fn mortality(&mut self) -> &mut Pcg64 {
        &mut self.mortality
    }

    pub fn partnership(&mut self) -> &mut Pcg64 {
        &mut self.partnership
    }

    pub fn fertility(&mut self) -> &mut Pcg64 {
        &mut self.fertility
    }

    pub fn migration(&mut self) -> &mut Pcg64 {
        &mut self.migration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn same_seed_same_draws() {
        let mut a = RngSuite::new(42);
        let mut b = RngSuite::new(42);
        let xs: Vec<f64> = (0..8).map(|_| a.mortality().gen::<f64>()).collect();
        let ys: Vec<f64> = (0..8).map(|_| b.mortality().gen::<f64>()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn streams_are_independent() {
        // Draining one stream must not shift another.
        let mut a = RngSuite::new(7);
        let mut b = RngSuite::new(7);
        for _ in 0..100 {
            let _ = a.partnership().gen::<f64>();
        }
        assert_eq!(a.mortality().gen::<u64>(), b.mortality().gen::<u64>());
        assert_eq!(a.fertility().gen::<u64>(), b.fertility().gen::<u64>());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = RngSuite::new(1);
        let mut b = RngSuite::new(2);
        let xs: Vec<u64> = (0..4).map(|_| a.mortality().gen::<u64>()).collect();
        let ys: Vec<u64> = (0..4).map(|_| b.mortality().gen::<u64>()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn serde_round_trip_preserves_stream_state() {
        let mut suite = RngSuite::new(9);
        for _ in 0..13 {
            let _ = suite.migration().gen::<f64>();
        }
        let bytes = bincode::serialize(&suite).unwrap();
        let mut restored: RngSuite = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, suite);
        assert_eq!(restored.migration().gen::<u64>(), suite.migration().gen::<u64>());
        assert_eq!(restored.mortality().gen::<u64>(), suite.mortality().gen::<u64>());
    }
}
