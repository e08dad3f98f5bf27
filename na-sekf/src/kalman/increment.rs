use nd::{Array1, ArrayView1, Axis, Zip};
use num_traits::Float;

use crate::ensemble::LevelIndex;
use super::gain::Gain;

#[derive(Clone, Debug)]
pub struct Increment<E> {
  /// (k)
  pub values: Array1<E>,
  pub levels: Vec<LevelIndex>,
}

impl<E> Increment<E>
  where E: Float,
{
  /// Spreads the increment over `n_levels` levels, zero where no member
  /// perturbed the level.
  pub fn reindex(&self, n_levels: usize) -> Array1<E> {
    let mut out = Array1::zeros(n_levels);
    for (&v, l) in self.values.iter().zip(self.levels.iter()) {
      if l.0 < n_levels {
        out[l.0] = v;
      }
    }
    out
  }

  pub fn is_zero(&self) -> bool {
    self.values.iter().all(|v| v.is_zero() )
  }
}

/// `Δx[k] = Σ_t Gain[t, k] d[t]`, skipping products that are not finite (no
/// observation at `t`).
pub fn build_increment<E>(gain: &Gain<E>, innovation: ArrayView1<E>) -> Increment<E>
  where E: Float,
{
  assert_eq!(gain.values.dim().0, innovation.len());

  let mut values = Array1::zeros(gain.values.dim().1);
  Zip::from(&mut values)
    .and(gain.values.axis_iter(Axis(1)))
    .for_each(|inc, g| {
      *inc = g.iter()
        .zip(innovation.iter())
        .map(|(&g, &d)| g * d )
        .filter(|p| p.is_finite() )
        .fold(E::zero(), |acc, p| acc + p );
    });

  Increment {
    values: values,
    levels: gain.levels.clone(),
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{arr1, arr2};
  use na_core::tol::within_rel_tol;

  fn gain(values: nd::Array2<f64>, levels: &[usize]) -> Gain<f64> {
    Gain {
      analysis_variance: Array1::ones(values.dim().1),
      values: values,
      levels: levels.iter().cloned().map(LevelIndex).collect(),
    }
  }

  #[test]
  fn worked_example() {
    let g = gain(arr2(&[[48.0 / 1152.25]]), &[0]);
    let inc = build_increment(&g, arr1(&[0.8]).view());
    assert!(within_rel_tol(inc.values[0], 0.0333261, 1.0e-5),
            "increment = {}", inc.values[0]);
  }

  #[test]
  fn zero_innovation_gives_zero_increment() {
    let g = gain(arr2(&[[0.1, -0.3], [2.0, 0.5]]), &[0, 1]);
    let inc = build_increment(&g, arr1(&[0.0, 0.0]).view());
    assert!(inc.is_zero());
  }

  #[test]
  fn missing_observations_are_skipped() {
    let g = gain(arr2(&[[0.1], [0.2], [0.4]]), &[0]);
    let inc = build_increment(&g, arr1(&[1.0, ::std::f64::NAN, 2.0]).view());
    assert!(within_rel_tol(inc.values[0], 0.9, 1.0e-12));
  }

  #[test]
  fn reindex_fills_unperturbed_levels() {
    let g = gain(arr2(&[[1.0, 2.0]]), &[3, 1]);
    let inc = build_increment(&g, arr1(&[0.5]).view());
    assert_eq!(inc.reindex(5).to_vec(), vec![0.0, 1.0, 0.0, 0.5, 0.0]);
  }
}
