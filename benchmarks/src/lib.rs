use rand::prelude::*;
use rand::rngs::StdRng;

/// One synthetic observation: an input complexity and the execution
/// complexity a surrogate would have reported for it, used to drive
/// `ProfileStore` benchmarks without depending on a real surrogate.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticObservation {
    pub input_complexity: f64,
    pub observed_complexity: f64,
}

/// Generates `count` deterministic synthetic observations, seeded the same
/// way on every run so numbers are comparable across benchmark runs.
pub fn generate_test_data(count: usize) -> Vec<SyntheticObservation> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut observations = Vec::with_capacity(count);
    for _ in 0..count {
        let input_complexity = rng.gen_range(1.0..10_000.0);
        let observed_complexity = input_complexity * rng.gen_range(0.01..0.05);
        observations.push(SyntheticObservation {
            input_complexity,
            observed_complexity,
        });
    }
    observations
}
