//! In-process optimizer over a blade-cut surrogate model.
//!
//! Each actuator command acts on a band of rows along the push direction. The
//! blade pulls the terrain in its band toward a sloped cut line:
//!
//! ```text
//! cut_i(u)    = vertical_i + pitch_i * (u - c_i)
//! w_i(u)      = exp(-((u - c_i) / s)^2 / 2)         c_i = (i + 0.5) / A, s = 0.5 / A
//! pred(r, c)  = h(r, c) + ALPHA * sum_i w_i(u) * (cut_i(u) - h(r, c))
//! loss        = mean((pred - desired)^2) + time_weight * sum(pitch^2 + vertical^2)
//! ```
//!
//! where `u = (r + 0.5) / rows`. Band weights depend only on the row, so the
//! loss and its gradient reduce to per-row sums computed once up front; each
//! Adam step is O(rows * actuators).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{ControlOptimizer, OptimizerProfile, check_inputs, check_output};
use crate::core::{ControlSequence, HeightMap};
use crate::error::{Error, Result};

/// Fraction of the gap to the cut line closed by one pass.
const ALPHA: f64 = 0.5;

/// Half-width of the uniform initial guess.
const INIT_SPREAD: f64 = 0.05;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// Per-row sufficient statistics of an (initial, desired) pair.
struct RowStats {
    /// Normalized row position `u`
    u: f64,
    sum_h: f64,
    sum_h2: f64,
    sum_d: f64,
    sum_d2: f64,
    sum_hd: f64,
}

/// Loss landscape of one optimization problem.
struct Problem {
    rows: Vec<RowStats>,
    cols: f64,
    cells: f64,
    actuators: usize,
    time_weight: f64,
}

impl Problem {
    fn new(initial: &HeightMap, desired: &HeightMap, actuators: usize, time_weight: f64) -> Self {
        let (n_rows, n_cols) = initial.shape();
        let rows = (0..n_rows)
            .map(|r| {
                let mut stats = RowStats {
                    u: (r as f64 + 0.5) / n_rows as f64,
                    sum_h: 0.0,
                    sum_h2: 0.0,
                    sum_d: 0.0,
                    sum_d2: 0.0,
                    sum_hd: 0.0,
                };
                for (&h, &d) in initial.row(r).iter().zip(desired.row(r)) {
                    let (h, d) = (h as f64, d as f64);
                    stats.sum_h += h;
                    stats.sum_h2 += h * h;
                    stats.sum_d += d;
                    stats.sum_d2 += d * d;
                    stats.sum_hd += h * d;
                }
                stats
            })
            .collect();
        Self {
            rows,
            cols: n_cols as f64,
            cells: (n_rows * n_cols) as f64,
            actuators,
            time_weight,
        }
    }

    fn center(&self, i: usize) -> f64 {
        (i as f64 + 0.5) / self.actuators as f64
    }

    fn weight(&self, i: usize, u: f64) -> f64 {
        let s = 0.5 / self.actuators as f64;
        let z = (u - self.center(i)) / s;
        (-0.5 * z * z).exp()
    }

    /// Loss and gradient for flat `[p0, v0, p1, v1, ...]` parameters.
    fn evaluate(&self, params: &[f64], grad: &mut [f64]) -> f64 {
        grad.fill(0.0);
        let mut sq_err = 0.0;

        for row in &self.rows {
            // pred = a * h + b, constant a and b across the row
            let mut total_w = 0.0;
            let mut b = 0.0;
            for i in 0..self.actuators {
                let w = self.weight(i, row.u);
                let (pitch, vertical) = (params[2 * i], params[2 * i + 1]);
                total_w += w;
                b += w * (vertical + pitch * (row.u - self.center(i)));
            }
            let a = 1.0 - ALPHA * total_w;
            let b = ALPHA * b;

            sq_err += a * a * row.sum_h2 + self.cols * b * b + row.sum_d2
                + 2.0 * a * b * row.sum_h
                - 2.0 * a * row.sum_hd
                - 2.0 * b * row.sum_d;

            // d(sum_c e^2)/db = 2 * sum_c e
            let sum_e = a * row.sum_h + self.cols * b - row.sum_d;
            for i in 0..self.actuators {
                let dk = 2.0 * sum_e * ALPHA * self.weight(i, row.u) / self.cells;
                grad[2 * i] += dk * (row.u - self.center(i));
                grad[2 * i + 1] += dk;
            }
        }

        let mut effort = 0.0;
        for (g, &p) in grad.iter_mut().zip(params) {
            effort += p * p;
            *g += 2.0 * self.time_weight * p;
        }
        // Rounding can push a perfect fit slightly negative
        sq_err.max(0.0) / self.cells + self.time_weight * effort
    }
}

/// Seeded Adam descent over the blade-cut surrogate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurrogateOptimizer;

impl SurrogateOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Surrogate loss of `sequence` for a problem.
    pub fn loss(
        initial: &HeightMap,
        desired: &HeightMap,
        sequence: &ControlSequence,
        time_weight: f64,
    ) -> f64 {
        let problem = Problem::new(initial, desired, sequence.len(), time_weight);
        let params: Vec<f64> = sequence.flatten().iter().map(|&v| v as f64).collect();
        let mut grad = vec![0.0; params.len()];
        problem.evaluate(&params, &mut grad)
    }

    /// Seeded initial guess in `[-INIT_SPREAD, INIT_SPREAD)`.
    fn initial_guess(profile: &OptimizerProfile) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(profile.seed);
        (0..profile.actuators * 2)
            .map(|_| rng.random_range(-INIT_SPREAD..INIT_SPREAD))
            .collect()
    }
}

impl ControlOptimizer for SurrogateOptimizer {
    fn optimize(
        &self,
        initial: &HeightMap,
        desired: &HeightMap,
        profile: &OptimizerProfile,
    ) -> Result<ControlSequence> {
        check_inputs(initial, desired, profile)?;

        let problem = Problem::new(initial, desired, profile.actuators, profile.time_weight);
        let mut params = Self::initial_guess(profile);
        let mut grad = vec![0.0; params.len()];
        let mut m = vec![0.0; params.len()];
        let mut v = vec![0.0; params.len()];

        let start_loss = problem.evaluate(&params, &mut grad);
        let mut loss = start_loss;
        for iter in 0..profile.num_iters {
            if !loss.is_finite() {
                return Err(Error::OptimizationDivergence(format!(
                    "loss became {} at iteration {}",
                    loss, iter
                )));
            }
            let t = (iter + 1) as i32;
            let bias1 = 1.0 - BETA1.powi(t);
            let bias2 = 1.0 - BETA2.powi(t);
            for k in 0..params.len() {
                m[k] = BETA1 * m[k] + (1.0 - BETA1) * grad[k];
                v[k] = BETA2 * v[k] + (1.0 - BETA2) * grad[k] * grad[k];
                let m_hat = m[k] / bias1;
                let v_hat = v[k] / bias2;
                params[k] -= profile.learning_rate * m_hat / (v_hat.sqrt() + EPSILON);
            }
            loss = problem.evaluate(&params, &mut grad);

            if (iter + 1) % 500 == 0 {
                log::debug!("Surrogate iter {}: loss {:.6e}", iter + 1, loss);
            }
        }
        if !loss.is_finite() {
            return Err(Error::OptimizationDivergence(format!(
                "final loss is {}",
                loss
            )));
        }

        log::info!(
            "Surrogate optimization ({} iters, case {}, scenario {}): loss {:.6e} -> {:.6e}",
            profile.num_iters,
            profile.case,
            profile.scenario,
            start_loss,
            loss
        );

        let flat: Vec<f32> = params.iter().map(|&p| p as f32).collect();
        check_output(ControlSequence::from_flat(&flat, profile.actuators)?, profile)
    }

    fn name(&self) -> &'static str {
        "surrogate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DEFAULT_COLS, DEFAULT_ROWS};
    use crate::optimize::{DesiredConfig, create_desired_heightmap};
    use approx::assert_relative_eq;

    fn desired() -> HeightMap {
        create_desired_heightmap(&DesiredConfig::default(), DEFAULT_ROWS, DEFAULT_COLS).unwrap()
    }

    #[test]
    fn test_zeros_to_center_has_two_by_two_shape() {
        let initial = HeightMap::zeros(DEFAULT_ROWS, DEFAULT_COLS);
        let seq = SurrogateOptimizer::new()
            .optimize(&initial, &desired(), &OptimizerProfile::default())
            .unwrap();

        assert_eq!(seq.shape(), (2, 2));
        assert_eq!(seq.to_text().lines().count(), 2);
        assert!(seq.commands().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let initial = HeightMap::from_fn(50, 20, |r, c| ((r * 7 + c) % 11) as f32 * 0.01);
        let target = HeightMap::zeros(50, 20);
        let profile = OptimizerProfile {
            num_iters: 300,
            seed: 42,
            ..Default::default()
        };
        let a = SurrogateOptimizer::new().optimize(&initial, &target, &profile).unwrap();
        let b = SurrogateOptimizer::new().optimize(&initial, &target, &profile).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_loss_decreases() {
        let initial = HeightMap::zeros(DEFAULT_ROWS, DEFAULT_COLS);
        let target = desired();
        let profile = OptimizerProfile {
            learning_rate: 1e-2,
            num_iters: 500,
            ..Default::default()
        };

        let guess: Vec<f32> = SurrogateOptimizer::initial_guess(&profile)
            .iter()
            .map(|&p| p as f32)
            .collect();
        let start = ControlSequence::from_flat(&guess, profile.actuators).unwrap();
        let optimized = SurrogateOptimizer::new()
            .optimize(&initial, &target, &profile)
            .unwrap();

        let before = SurrogateOptimizer::loss(&initial, &target, &start, profile.time_weight);
        let after = SurrogateOptimizer::loss(&initial, &target, &optimized, profile.time_weight);
        assert!(after < before, "loss {} -> {}", before, after);
    }

    #[test]
    fn test_row_sums_match_dense_loss() {
        let initial = HeightMap::from_fn(12, 5, |r, c| (r as f32 * 0.03) - (c as f32 * 0.01));
        let target = HeightMap::from_fn(12, 5, |r, _| if r > 6 { 0.2 } else { 0.0 });
        let seq = ControlSequence::from_flat(&[0.3, 0.1, -0.2, 0.05], 2).unwrap();
        let tw = 1e-3;

        // Evaluate the model cell by cell
        let problem = Problem::new(&initial, &target, 2, tw);
        let params: Vec<f64> = seq.flatten().iter().map(|&v| v as f64).collect();
        let mut dense = 0.0;
        for r in 0..12 {
            let u = (r as f64 + 0.5) / 12.0;
            for c in 0..5 {
                let h = initial.get(r, c).unwrap() as f64;
                let mut pred = h;
                for i in 0..2 {
                    let cut = params[2 * i + 1] + params[2 * i] * (u - problem.center(i));
                    pred += ALPHA * problem.weight(i, u) * (cut - h);
                }
                let e = pred - target.get(r, c).unwrap() as f64;
                dense += e * e;
            }
        }
        dense = dense / 60.0 + tw * params.iter().map(|p| p * p).sum::<f64>();

        let fast = SurrogateOptimizer::loss(&initial, &target, &seq, tw);
        assert_relative_eq!(fast, dense, epsilon = 1e-9);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let initial = HeightMap::from_fn(20, 4, |r, _| (r as f32 * 0.05).sin());
        let target = HeightMap::zeros(20, 4);
        let problem = Problem::new(&initial, &target, 2, 1e-4);
        let params = vec![0.1, -0.05, 0.2, 0.02];

        let mut grad = vec![0.0; 4];
        problem.evaluate(&params, &mut grad);

        let h = 1e-6;
        let mut scratch = vec![0.0; 4];
        for k in 0..4 {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[k] += h;
            minus[k] -= h;
            let numeric = (problem.evaluate(&plus, &mut scratch)
                - problem.evaluate(&minus, &mut scratch))
                / (2.0 * h);
            assert_relative_eq!(grad[k], numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut values = vec![0.0; 20];
        values[3] = f32::NAN;
        let initial = HeightMap::from_vec(4, 5, values).unwrap();
        let err = SurrogateOptimizer::new()
            .optimize(&initial, &HeightMap::zeros(4, 5), &OptimizerProfile::default())
            .unwrap_err();
        assert!(matches!(err, Error::OptimizationDivergence(_)));
    }
}
