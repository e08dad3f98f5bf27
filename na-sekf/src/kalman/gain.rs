use nd::{Array1, Array2, ArrayView1, Axis, Zip};
use num_traits::Float;

use crate::ensemble::LevelIndex;
use crate::jacobian::Jacobian;

#[derive(Clone, Debug)]
pub struct Gain<E> {
  /// (time, k)
  pub values: Array2<E>,
  /// Posterior variance of each perturbed level, (k).
  pub analysis_variance: Array1<E>,
  pub levels: Vec<LevelIndex>,
}

/// An observation time takes part in the update only with a finite, positive
/// error variance.
pub fn usable_variance<E: Float>(r: E) -> bool {
  r.is_finite() && r > E::zero()
}

/// `cov_ana[k] = 1 / (1/b_scale² + Σ_t J[t,k]² / R[t])` and
/// `Gain[t,k] = cov_ana[k] J[t,k] / R[t]`.
pub fn estimate_gain<E>(jacobian: &Jacobian<E>,
                        obs_variance: ArrayView1<E>,
                        b_scale: E) -> Gain<E>
  where E: Float,
{
  let (times, levels) = jacobian.values.dim();
  assert_eq!(times, obs_variance.len());

  let inv_r = obs_variance.mapv(|r| {
    if usable_variance(r) { r.recip() } else { E::zero() }
  });
  let inv_b = (b_scale * b_scale).recip();

  let mut analysis_variance = Array1::zeros(levels);
  Zip::from(&mut analysis_variance)
    .and(jacobian.values.axis_iter(Axis(1)))
    .for_each(|cov, j| {
      let htrinvh = j.iter()
        .zip(inv_r.iter())
        .fold(E::zero(), |acc, (&j, &ir)| acc + j * j * ir );
      *cov = (inv_b + htrinvh).recip();
    });

  let mut values = Array2::zeros((times, levels));
  Zip::indexed(&mut values)
    .for_each(|(t, k), g| {
      *g = analysis_variance[k] * jacobian.values[[t, k]] * inv_r[t];
    });

  Gain {
    values: values,
    analysis_variance: analysis_variance,
    levels: jacobian.levels.clone(),
  }
}
