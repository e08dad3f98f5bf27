use nd::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_traits::Float;

use na_core::{Error, Result};

use crate::ensemble::LevelIndex;
use crate::kalman::Increment;

/// Control state plus increment at the perturbed levels; every other level is
/// copied unchanged.
pub fn build_analysis<E>(control: ArrayView1<E>, increment: &Increment<E>) -> Array1<E>
  where E: Float,
{
  let mut out = control.to_owned();
  for (&inc, level) in increment.values.iter().zip(increment.levels.iter()) {
    if !inc.is_zero() {
      out[level.0] = out[level.0] + inc;
    }
  }
  out
}

/// The analysis of every cell.
#[derive(Clone, Debug)]
pub struct Analysis<E> {
  /// (level, cell)
  pub values: Array2<E>,
  /// Increment spread over all levels, (level, cell). Zero where nothing
  /// changed.
  pub increment: Array2<E>,
}

impl<E> Analysis<E>
  where E: Float,
{
  /// `control` is (level, cell), `increment` (k, cell) labelled by `levels`.
  pub fn new(control: ArrayView2<E>,
             increment: ArrayView2<E>,
             levels: &[LevelIndex]) -> Result<Analysis<E>> {
    let (n_levels, cells) = control.dim();
    if increment.dim() != (levels.len(), cells) {
      return Err(Error::Config(format!("increment is {:?}, expected ({}, {})",
                                       increment.dim(), levels.len(), cells)));
    }
    if let Some(l) = levels.iter().find(|l| l.0 >= n_levels ) {
      return Err(Error::Config(format!("{} is outside the {} level state", l, n_levels)));
    }

    let mut values = control.to_owned();
    let mut full = Array2::zeros(control.dim());
    for (inc, level) in increment.axis_iter(Axis(0)).zip(levels.iter()) {
      full.row_mut(level.0).assign(&inc);
      let mut row = values.row_mut(level.0);
      row.zip_mut_with(&inc, |v, &inc| {
        if !inc.is_zero() {
          *v = *v + inc;
        }
      });
    }

    Ok(Analysis {
      values: values,
      increment: full,
    })
  }

  /// (level, cell) positions where the analysis differs from the control.
  pub fn updated<'a>(&'a self) -> impl Iterator<Item = (usize, usize)> + 'a {
    self.increment.indexed_iter()
      .filter(|&(_, v)| !v.is_zero() )
      .map(|(idx, _)| idx )
  }

  pub fn is_unchanged(&self) -> bool {
    self.increment.iter().all(|v| v.is_zero() )
  }
}
