//! Finite-difference sensitivity of the observed quantity with respect to the
//! state of each perturbed level.

use nd::{Array2, ArrayView2, Axis};
use num_traits::Float;

use std::fmt;

use crate::ensemble::{LevelIndex, MemberId, MemberLevels};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DegenerateReason {
  /// `|J| >= upper_limit`
  ExceedsUpperLimit,
  /// Division produced `±inf` or `NaN`.
  NonFinite,
  /// The member's background equals the control at its perturbed level.
  ZeroPerturbation,
  /// `|Δ_state|` lies outside the configured perturbation band.
  OutsidePerturbationBand,
}

impl fmt::Display for DegenerateReason {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let s = match self {
      &DegenerateReason::ExceedsUpperLimit => "exceeds upper limit",
      &DegenerateReason::NonFinite => "non-finite",
      &DegenerateReason::ZeroPerturbation => "zero perturbation",
      &DegenerateReason::OutsidePerturbationBand => "perturbation outside band",
    };
    f.write_str(s)
  }
}

/// A sensitivity that was forced to zero. Recorded, never raised.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DegenerateSensitivity {
  pub member: MemberId,
  pub level: LevelIndex,
  /// `None` when the whole member was discarded.
  pub time: Option<usize>,
  /// The offending value: the Jacobian entry, or `Δ_state` for whole-member
  /// rejections.
  pub value: f64,
  pub reason: DegenerateReason,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensitivityLimits<E> {
  pub upper_limit: E,
  /// Accepted range of `|Δ_state|`, when the perturbation design is known.
  pub perturbation_band: Option<(E, E)>,
}

impl<E> SensitivityLimits<E> {
  pub fn new(upper_limit: E) -> SensitivityLimits<E> {
    SensitivityLimits {
      upper_limit: upper_limit,
      perturbation_band: None,
    }
  }
}

#[derive(Clone, Debug)]
pub struct Jacobian<E> {
  /// (time, k), column `k` belonging to `levels[k]`.
  pub values: Array2<E>,
  pub levels: Vec<LevelIndex>,
  pub masked: Vec<DegenerateSensitivity>,
}

impl<E> Jacobian<E>
  where E: Float,
{
  pub fn times(&self) -> usize { self.values.dim().0 }

  /// Number of (time, level) entries that survived masking.
  pub fn valid_entries(&self) -> usize {
    self.values.iter().filter(|v| !v.is_zero() ).count()
  }
}

fn to_f64<E: Float>(v: E) -> f64 {
  v.to_f64().unwrap_or(::std::f64::NAN)
}

/// `J[t, k] = (fg[m, t] - fg[0, t]) / (bg[m, l] - bg[0, l])` for the `k`-th
/// pair `(m, l)` of `mapping`.
///
/// `background` is (member, level) and `first_guess` (member, time) for a
/// single cell.
pub fn estimate_jacobian<E>(background: ArrayView2<E>,
                            first_guess: ArrayView2<E>,
                            mapping: &MemberLevels,
                            limits: &SensitivityLimits<E>) -> Jacobian<E>
  where E: Float,
{
  assert_eq!(background.dim().0, mapping.member_count());
  assert_eq!(first_guess.dim().0, mapping.member_count());

  let times = first_guess.dim().1;
  let mut values = Array2::zeros((times, mapping.len()));
  let mut masked = Vec::new();

  let control_fg = first_guess.index_axis(Axis(0), MemberId::CONTROL.0);

  for (k, &(member, level)) in mapping.iter().enumerate() {
    let delta_state = background[[member.0, level.0]] -
      background[[MemberId::CONTROL.0, level.0]];

    let rejected = if delta_state.is_zero() {
      Some(DegenerateReason::ZeroPerturbation)
    } else if let Some((lo, hi)) = limits.perturbation_band {
      let mag = delta_state.abs();
      if mag < lo || mag > hi {
        Some(DegenerateReason::OutsidePerturbationBand)
      } else {
        None
      }
    } else {
      None
    };
    if let Some(reason) = rejected {
      masked.push(DegenerateSensitivity {
        member: member,
        level: level,
        time: None,
        value: to_f64(delta_state),
        reason: reason,
      });
      continue;
    }

    let member_fg = first_guess.index_axis(Axis(0), member.0);
    let mut column = values.column_mut(k);
    for t in 0..times {
      let j = (member_fg[t] - control_fg[t]) / delta_state;
      let reason = if !j.is_finite() {
        Some(DegenerateReason::NonFinite)
      } else if j.abs() >= limits.upper_limit {
        Some(DegenerateReason::ExceedsUpperLimit)
      } else {
        None
      };

      match reason {
        None => { column[t] = j; },
        Some(reason) => {
          masked.push(DegenerateSensitivity {
            member: member,
            level: level,
            time: Some(t),
            value: to_f64(j),
            reason: reason,
          });
        },
      }
    }
  }

  Jacobian {
    values: values,
    levels: mapping.levels(),
    masked: masked,
  }
}
