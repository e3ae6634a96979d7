use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Source of uniform draws in `[0, 1)`. Injected so scheduling and frontier
/// selection can be made deterministic.
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            // A poisoned lock still holds a usable generator.
            Err(poisoned) => poisoned.into_inner().gen::<f64>(),
        }
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
pub struct FixedRandom {
    values: Vec<f64>,
    cursor: Mutex<usize>,
}

impl FixedRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values: if values.is_empty() { vec![0.0] } else { values },
            cursor: Mutex::new(0),
        }
    }

    pub fn always(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for FixedRandom {
    fn next_unit(&self) -> f64 {
        let mut cursor = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let value = self.values[*cursor % self.values.len()];
        *cursor += 1;
        value
    }
}
