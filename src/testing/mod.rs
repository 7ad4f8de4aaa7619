//! Deterministic synthetic data generators for tests and examples.

use rand::prelude::*;
use rand_distr::Normal;

/// Labeled 2-D points drawn from per-class axis-aligned Gaussians.
pub struct GaussianClusters {
    pub features: Vec<[f64; 2]>,
    pub labels: Vec<usize>,
}

/// Generate `per_class` points around each mean with shared standard
/// deviation `sigma`. Points are grouped by class: sample
/// `c * per_class + i` belongs to class `c`.
pub fn gaussian_clusters(
    means: &[[f64; 2]],
    sigma: f64,
    per_class: usize,
    seed: u64,
) -> GaussianClusters {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).expect("sigma must be finite and non-negative");

    let mut features = Vec::with_capacity(means.len() * per_class);
    let mut labels = Vec::with_capacity(means.len() * per_class);

    for (c, mean) in means.iter().enumerate() {
        for _ in 0..per_class {
            features.push([mean[0] + noise.sample(&mut rng), mean[1] + noise.sample(&mut rng)]);
            labels.push(c);
        }
    }

    GaussianClusters { features, labels }
}

/// Draw `n` angles from a von Mises distribution with location `mu` and
/// concentration `kappa`, wrapped to `(-pi, pi]`.
///
/// Uses the Best-Fisher (1979) rejection sampler; `kappa = 0` degenerates
/// to the uniform distribution on the circle.
pub fn von_mises_angles(mu: f64, kappa: f64, n: usize, seed: u64) -> Vec<f32> {
    use std::f64::consts::PI;

    let mut rng = StdRng::seed_from_u64(seed);

    if kappa <= 0.0 {
        return (0..n)
            .map(|_| (rng.gen::<f64>() * 2.0 * PI - PI) as f32)
            .collect();
    }

    let tau = 1.0 + (1.0 + 4.0 * kappa * kappa).sqrt();
    let rho = (tau - (2.0 * tau).sqrt()) / (2.0 * kappa);
    let r = (1.0 + rho * rho) / (2.0 * rho);

    let mut angles = Vec::with_capacity(n);
    while angles.len() < n {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();

        let z = (PI * u1).cos();
        let f = (1.0 + r * z) / (r + z);
        let c = kappa * (r - f);

        if c * (2.0 - c) - u2 > 0.0 || (c / u2).ln() + 1.0 - c >= 0.0 {
            let u3: f64 = rng.gen();
            let theta = mu + (u3 - 0.5).signum() * f.acos();
            angles.push(wrap_angle(theta) as f32);
        }
    }
    angles
}

/// Wrap an angle to `(-pi, pi]`.
fn wrap_angle(theta: f64) -> f64 {
    use std::f64::consts::PI;

    let wrapped = theta.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}
