//! The per-cell sequential finite-difference Kalman filter.

use nd::{Array2, Array3, ArrayView2, Axis, Zip};
use num_traits::Float;

use std::collections::BTreeMap;

use na_core::{Error, Result};

use crate::ensemble::{LevelIndex, PerturbationEnsemble};
use crate::jacobian::{estimate_jacobian, DegenerateReason, DegenerateSensitivity,
                      SensitivityLimits};
use crate::kalman::{build_increment, estimate_gain};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sekf<E> {
  pub upper_limit: E,
  /// Prior standard deviation of each level.
  pub b_scale: E,
  pub perturbation_band: Option<(E, E)>,
}

#[derive(Clone, Debug)]
pub struct Assimilation<E> {
  /// `y - H(x_control)`, (time, cell); `NaN` without an observation.
  pub innovation: Array2<E>,
  /// (time, cell), zero without an observation.
  pub obs_variance: Array2<E>,
  /// (time, k, cell)
  pub jacobian: Array3<E>,
  /// (time, k, cell)
  pub gain: Array3<E>,
  /// (k, cell)
  pub analysis_variance: Array2<E>,
  /// (k, cell)
  pub increment: Array2<E>,
  pub levels: Vec<LevelIndex>,
  /// Masked sensitivities with the cell they occurred in.
  pub degenerate: Vec<(usize, DegenerateSensitivity)>,
}

impl<E> Sekf<E>
  where E: Float,
{
  pub fn new(upper_limit: E, b_scale: E) -> Sekf<E> {
    Sekf {
      upper_limit: upper_limit,
      b_scale: b_scale,
      perturbation_band: None,
    }
  }

  fn limits(&self) -> SensitivityLimits<E> {
    SensitivityLimits {
      upper_limit: self.upper_limit,
      perturbation_band: self.perturbation_band,
    }
  }

  /// Runs the update for every cell independently. `observations` and
  /// `obs_variance` are (time, cell) aligned with the first guess;
  /// non-finite observations mark cells without data.
  pub fn assimilate(&self,
                    ensemble: &PerturbationEnsemble<E>,
                    observations: ArrayView2<E>,
                    obs_variance: ArrayView2<E>) -> Result<Assimilation<E>> {
    let (times, cells) = (ensemble.times(), ensemble.cells());
    if observations.dim() != (times, cells) || obs_variance.dim() != (times, cells) {
      return Err(Error::Config(format!("observations are {:?} and {:?}, the first guess is ({}, {})",
                                       observations.dim(), obs_variance.dim(),
                                       times, cells)));
    }

    let mut innovation = Array2::zeros((times, cells));
    let mut variance = Array2::zeros((times, cells));
    Zip::from(&mut innovation)
      .and(&mut variance)
      .and(&observations)
      .and(&obs_variance)
      .and(&ensemble.control_first_guess())
      .for_each(|d, r, &y, &obs_r, &hx| {
        if y.is_finite() {
          *d = y - hx;
          *r = obs_r;
        } else {
          *d = E::nan();
          *r = E::zero();
        }
      });

    let n_k = ensemble.mapping.len();
    let mut jacobian = Array3::zeros((times, n_k, cells));
    let mut gain = Array3::zeros((times, n_k, cells));
    let mut analysis_variance = Array2::zeros((n_k, cells));
    let mut increment = Array2::zeros((n_k, cells));
    let mut degenerate = Vec::new();

    let limits = self.limits();
    for cell in 0..cells {
      let column = ensemble.column(cell);
      let jac = estimate_jacobian(column.background, column.first_guess,
                                  &ensemble.mapping, &limits);
      let g = estimate_gain(&jac, variance.column(cell), self.b_scale);
      let inc = build_increment(&g, innovation.column(cell));

      jacobian.index_axis_mut(Axis(2), cell).assign(&jac.values);
      gain.index_axis_mut(Axis(2), cell).assign(&g.values);
      analysis_variance.column_mut(cell).assign(&g.analysis_variance);
      increment.column_mut(cell).assign(&inc.values);
      degenerate.extend(jac.masked.into_iter().map(|m| (cell, m) ));
    }

    report_degenerate(&degenerate);

    Ok(Assimilation {
      innovation: innovation,
      obs_variance: variance,
      jacobian: jacobian,
      gain: gain,
      analysis_variance: analysis_variance,
      increment: increment,
      levels: ensemble.mapping.levels(),
      degenerate: degenerate,
    })
  }
}

fn report_degenerate(degenerate: &[(usize, DegenerateSensitivity)]) {
  if degenerate.is_empty() {
    return;
  }
  let mut by_reason: BTreeMap<String, usize> = BTreeMap::new();
  for &(cell, ref m) in degenerate.iter() {
    debug!("cell {}, {} ({}), time {:?}: sensitivity {} masked, {}",
           cell, m.member, m.level, m.time, m.value, m.reason);
    *by_reason.entry(m.reason.to_string()).or_insert(0) += 1;
  }
  for (reason, count) in by_reason.iter() {
    warn!("{} sensitivities masked: {}", count, reason);
  }
}

impl<E> Assimilation<E>
  where E: Float,
{
  pub fn cells(&self) -> usize { self.increment.dim().1 }

  /// Cells where a whole member was discarded.
  pub fn discarded_members(&self) -> usize {
    self.degenerate.iter()
      .filter(|&&(_, ref m)| m.time.is_none() &&
              m.reason != DegenerateReason::ExceedsUpperLimit )
      .count()
  }
}
