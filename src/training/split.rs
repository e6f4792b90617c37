//! Seeded train/validation split

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

/// Row indices of the two parts, each sorted ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainValidationSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl TrainValidationSplit {
    /// Shuffle `0..n_samples` with `seed` and hold out the last
    /// ceil(fraction * n) rows. When either part would be empty every row
    /// goes to training.
    pub fn new(n_samples: usize, fraction: f64, seed: u64) -> Self {
        let all = || Self {
            train: (0..n_samples).collect(),
            validation: Vec::new(),
        };
        if fraction <= 0.0 || fraction.is_nan() {
            return all();
        }

        let n_validation = (fraction * n_samples as f64).ceil() as usize;
        if n_validation == 0 || n_validation >= n_samples {
            warn!(
                n_samples,
                fraction, "Validation split leaves an empty part, training on all rows"
            );
            return all();
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let mut validation = indices.split_off(n_samples - n_validation);
        let mut train = indices;
        train.sort_unstable();
        validation.sort_unstable();
        Self { train, validation }
    }

    pub fn has_validation(&self) -> bool {
        !self.validation.is_empty()
    }
}
