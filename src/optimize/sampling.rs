//! Seeded random sampling inside a box.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::optimize::bounds::Bounds;

/// Default seed for every stochastic optimizer.
pub const DEFAULT_PRNG_SEED: u64 = 12345;

/// Deterministic generator for `seed`.
#[must_use]
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// One point drawn uniformly from the box.
pub fn uniform_point<R: Rng + ?Sized>(rng: &mut R, bounds: &Bounds) -> Vec<f64> {
    (0..bounds.len())
        .map(|i| bounds.lower()[i] + rng.random::<f64>() * bounds.range(i))
        .collect()
}

/// Latin hypercube sample of `samples` points.
///
/// Each dimension is cut into `samples` equal strata and every stratum holds
/// exactly one point, placed uniformly within it.
pub fn latin_hypercube<R: Rng + ?Sized>(
    rng: &mut R,
    bounds: &Bounds,
    samples: usize,
) -> Vec<Vec<f64>> {
    let mut points = vec![vec![0.0; bounds.len()]; samples];
    let mut strata: Vec<usize> = (0..samples).collect();

    for i in 0..bounds.len() {
        strata.shuffle(rng);
        let width = bounds.range(i) / samples as f64;
        for (point, &stratum) in points.iter_mut().zip(strata.iter()) {
            let offset = (stratum as f64 + rng.random::<f64>()) * width;
            point[i] = bounds.repair_at(i, bounds.lower()[i] + offset);
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Bounds {
        Bounds::new(2, &[0.0, -1.0], &[1.0, 1.0], "test").unwrap()
    }

    #[test]
    fn test_uniform_point_inside_box() {
        let bounds = unit_square();
        let mut rng = seeded_rng(DEFAULT_PRNG_SEED);
        for _ in 0..100 {
            assert!(bounds.contains(&uniform_point(&mut rng, &bounds)));
        }
    }

    #[test]
    fn test_latin_hypercube_one_point_per_stratum() {
        let bounds = unit_square();
        let mut rng = seeded_rng(7);
        let points = latin_hypercube(&mut rng, &bounds, 10);
        assert_eq!(points.len(), 10);

        for i in 0..2 {
            let mut strata: Vec<usize> = points
                .iter()
                .map(|p| ((p[i] - bounds.lower()[i]) / bounds.range(i) * 10.0) as usize)
                .map(|s| s.min(9))
                .collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_same_seed_same_samples() {
        let bounds = unit_square();
        let a = latin_hypercube(&mut seeded_rng(3), &bounds, 5);
        let b = latin_hypercube(&mut seeded_rng(3), &bounds, 5);
        assert_eq!(a, b);
    }
}
