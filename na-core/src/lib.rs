extern crate ndarray as nd;
extern crate num_traits;
extern crate thiserror;

use nd::prelude::*;

pub use error::{Result, Error};
pub use tol::PartialEqWithinTol;

pub mod error;
pub mod tol;

/// A (possibly nonlinear) map from one discretization to another, e.g. the
/// first-guess grid onto the analysis columns.
pub trait Operator<E, Dim>: Send + Sync
  where Dim: nd::Dimension,
{
  fn operator_input_dim(&self) -> usize;
  fn operator_output_dim(&self) -> usize;
  fn eval_at(&self, x: ArrayView<E, Dim>,
             out: ArrayViewMut<E, Dim>) -> Result<()>;

  fn eval(&self, x: ArrayView<E, Dim>) -> Result<Array<E, Dim>>
    where E: Clone + num_traits::Zero,
          Dim: nd::Dimension,
  {
    let mut shape = x.raw_dim();
    let last = shape.ndim() - 1;
    shape[last] = self.operator_output_dim();
    let mut out = Array::zeros(shape);
    self.eval_at(x, out.view_mut())?;
    Ok(out)
  }
}
