use std::sync::Mutex;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use shared::domain::UserId;

/// Strategy for picking reviewers out of an eligible set.
///
/// Implementations return at most `count` distinct entries of `candidates`,
/// each subset of that size being equally likely.
pub trait ReviewerSampler: Send + Sync {
    fn sample(&self, candidates: Vec<UserId>, count: usize) -> Vec<UserId>;
}

/// Uniform sampling without replacement over the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSampler;

impl ReviewerSampler for RandomSampler {
    fn sample(&self, candidates: Vec<UserId>, count: usize) -> Vec<UserId> {
        let mut rng = rand::thread_rng();
        candidates
            .choose_multiple(&mut rng, count)
            .cloned()
            .collect()
    }
}

/// Uniform sampling driven by a seeded RNG, for reproducible runs.
#[derive(Debug)]
pub struct SeededSampler {
    rng: Mutex<StdRng>,
}

impl SeededSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl ReviewerSampler for SeededSampler {
    fn sample(&self, candidates: Vec<UserId>, count: usize) -> Vec<UserId> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        candidates
            .choose_multiple(&mut *rng, count)
            .cloned()
            .collect()
    }
}
